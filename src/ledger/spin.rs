use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::{daily_reset::current_view, Rejection, ENERGY_CAP};
use crate::models::users::User;

pub const DAILY_SPIN_LIMIT: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SpinError {
    #[error("Daily spin limit reached (7/7). Come back tomorrow!")]
    DailyLimitReached,
    #[error("No spins available")]
    NoSpins,
}

impl Rejection for SpinError {
    fn code(&self) -> &'static str {
        match self {
            SpinError::DailyLimitReached => "DAILY_LIMIT_REACHED",
            SpinError::NoSpins => "NO_SPINS",
        }
    }
}

/// One slice of the reward wheel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinOutcome {
    pub label: &'static str,
    pub reward_coins: f64,
    pub reward_energy: i64,
}

// Upper bounds of consecutive slices over [0, 1), in draw order.
const WHEEL: [(f64, SpinOutcome); 4] = [
    (
        0.10,
        SpinOutcome {
            label: "Jackpot! 0.05",
            reward_coins: 0.05,
            reward_energy: 0,
        },
    ),
    (
        0.30,
        SpinOutcome {
            label: "50 Energy",
            reward_coins: 0.0,
            reward_energy: 50,
        },
    ),
    (
        0.60,
        SpinOutcome {
            label: "0.005 Coins",
            reward_coins: 0.005,
            reward_energy: 0,
        },
    ),
    (
        1.0,
        SpinOutcome {
            label: "0.001 Coins",
            reward_coins: 0.001,
            reward_energy: 0,
        },
    ),
];

impl SpinOutcome {
    /// Maps a uniform draw in `[0, 1)` onto the wheel. Out-of-range draws
    /// land on the last slice.
    pub fn from_draw(draw: f64) -> SpinOutcome {
        WHEEL
            .iter()
            .find(|(upper, _)| draw < *upper)
            .map(|(_, outcome)| *outcome)
            .unwrap_or(WHEEL[WHEEL.len() - 1].1)
    }
}

/// Consumes one spin and applies the pre-drawn outcome.
pub fn spin_wheel(user: &mut User, outcome: SpinOutcome, now: DateTime<FixedOffset>) -> Result<SpinOutcome, SpinError> {
    let mut next = current_view(user, now);

    if next.daily_spin_count >= DAILY_SPIN_LIMIT {
        return Err(SpinError::DailyLimitReached);
    }
    if next.spins_available < 1 {
        return Err(SpinError::NoSpins);
    }

    next.balance += outcome.reward_coins;
    next.energy = (next.energy + outcome.reward_energy).min(ENERGY_CAP);
    next.spins_available -= 1;
    next.daily_spin_count += 1;
    *user = next;

    Ok(outcome)
}

/// Credits one spin after an ad view. No eligibility check beyond the caller's.
pub fn grant_bonus_spin(user: &mut User, now: DateTime<FixedOffset>) -> i64 {
    let mut next = current_view(user, now);

    next.spins_available += 1;
    next.daily_ads_watched += 1;

    let spins = next.spins_available;
    *user = next;
    spins
}
