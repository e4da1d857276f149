use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::{daily_reset::DailyResetPatch, Rejection};
use crate::models::{settings::Gamification, users::User};

pub const DAILY_GOAL_REWARD: f64 = 0.05;

const CLAIM_WINDOW_HOURS: f64 = 24.0;
const STREAK_WINDOW_HOURS: f64 = 48.0;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum DailyBonusError {
    #[error("Daily bonus already claimed, {hours_left:.1}h left")]
    AlreadyClaimed { hours_left: f64 },
}

impl Rejection for DailyBonusError {
    fn code(&self) -> &'static str {
        "ALREADY_CLAIMED"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DailyGoalError {
    #[error("New day started, goals reset.")]
    GoalsReset,
    #[error("Daily goal reward already claimed.")]
    AlreadyClaimed,
}

impl Rejection for DailyGoalError {
    fn code(&self) -> &'static str {
        match self {
            DailyGoalError::GoalsReset => "GOALS_RESET",
            DailyGoalError::AlreadyClaimed => "ALREADY_CLAIMED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBonus {
    pub bonus: f64,
    pub streak: i64,
}

/// Claims the once-per-24h bonus. A claim within 48h of the previous one
/// continues the streak, anything later starts over at 1. The bonus grows
/// linearly with the streak and is not capped.
pub fn claim_daily_bonus(
    user: &mut User,
    game: &Gamification,
    now: DateTime<FixedOffset>,
) -> Result<DailyBonus, DailyBonusError> {
    let last_claim_ms = user
        .last_daily_bonus
        .map(|at| at.timestamp_millis())
        .unwrap_or(0);
    let hours_since = (now.timestamp_millis() - last_claim_ms) as f64 / 3_600_000.0;

    if hours_since < CLAIM_WINDOW_HOURS {
        return Err(DailyBonusError::AlreadyClaimed {
            hours_left: CLAIM_WINDOW_HOURS - hours_since,
        });
    }

    let streak = if hours_since < STREAK_WINDOW_HOURS {
        user.daily_streak + 1
    } else {
        1
    };
    let bonus = game.daily_bonus_base * streak as f64;

    DailyResetPatch::for_user(user, now).apply(user);
    user.balance += bonus;
    user.last_daily_bonus = Some(now.to_utc());
    user.daily_streak = streak;

    Ok(DailyBonus { bonus, streak })
}

/// Claims the fixed reward for meeting the day's goals. Evaluated against the
/// stored record: if the day has rolled over the claim is refused so the
/// caller sees fresh counters first. Goal thresholds are the caller's check.
pub fn claim_daily_goal(user: &mut User, now: DateTime<FixedOffset>) -> Result<f64, DailyGoalError> {
    if !DailyResetPatch::for_user(user, now).is_empty() {
        return Err(DailyGoalError::GoalsReset);
    }
    if user.daily_goal_claimed {
        return Err(DailyGoalError::AlreadyClaimed);
    }

    user.balance += DAILY_GOAL_REWARD;
    user.daily_goal_claimed = true;

    Ok(DAILY_GOAL_REWARD)
}
