use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::{daily_reset::current_view, level_for_xp, Rejection, ENERGY_CAP};
use crate::models::{settings::Gamification, users::User};

pub const DAILY_REFILL_LIMIT: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MineError {
    #[error("Not enough energy: {energy} available, {cost} required")]
    OutOfEnergy { energy: i64, cost: i64 },
}

impl Rejection for MineError {
    fn code(&self) -> &'static str {
        "OUT_OF_ENERGY"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RefillError {
    #[error("Daily refill limit reached (10/10). Come back tomorrow!")]
    DailyLimitReached,
}

impl Rejection for RefillError {
    fn code(&self) -> &'static str {
        "DAILY_LIMIT_REACHED"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mined {
    pub reward: f64,
    pub xp_gained: i64,
    pub energy: i64,
    pub level: i64,
}

/// One click: spends energy, earns coins and xp.
pub fn mine(user: &mut User, game: &Gamification, now: DateTime<FixedOffset>) -> Result<Mined, MineError> {
    let mut next = current_view(user, now);
    let cost = game.energy_cost_per_click;

    if next.energy < cost {
        return Err(MineError::OutOfEnergy {
            energy: next.energy,
            cost,
        });
    }

    next.energy -= cost;
    next.balance += game.click_reward;
    next.xp += game.xp_per_click;
    next.level = level_for_xp(next.xp);
    next.daily_mining_count += 1;

    let mined = Mined {
        reward: game.click_reward,
        xp_gained: game.xp_per_click,
        energy: next.energy,
        level: next.level,
    };
    *user = next;

    Ok(mined)
}

/// Full refill after an ad view. The ad view itself is not verified here.
pub fn refill_energy(user: &mut User, now: DateTime<FixedOffset>) -> Result<i64, RefillError> {
    let mut next = current_view(user, now);

    if next.daily_refill_count >= DAILY_REFILL_LIMIT {
        return Err(RefillError::DailyLimitReached);
    }

    next.energy = ENERGY_CAP;
    next.daily_refill_count += 1;

    let refills_left = DAILY_REFILL_LIMIT - next.daily_refill_count;
    *user = next;

    Ok(refills_left)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::testing::{at, user_at};

    #[test]
    fn mining_spends_energy_and_credits_rewards() {
        let now = at(2024, 5, 1, 12);
        let mut user = user_at("u1", now);
        user.xp = 95;
        let game = Gamification::default();

        let mined = mine(&mut user, &game, now).unwrap();

        assert_eq!(user.energy, 90);
        assert!((user.balance - 0.0005).abs() < 1e-12);
        assert_eq!(user.xp, 105);
        assert_eq!(user.level, 2);
        assert_eq!(user.daily_mining_count, 1);
        assert_eq!(mined.energy, 90);
        assert_eq!(mined.level, 2);
    }

    #[test]
    fn energy_never_goes_negative() {
        let now = at(2024, 5, 1, 12);
        let game = Gamification::default();

        for energy in 0..=25 {
            let mut user = user_at("u1", now);
            user.energy = energy;
            let before = user.clone();

            match mine(&mut user, &game, now) {
                Ok(_) => {
                    assert!(energy >= 10);
                    assert_eq!(user.energy, energy - 10);
                }
                Err(MineError::OutOfEnergy { .. }) => {
                    assert!(energy < 10);
                    assert_eq!(user, before);
                }
            }
        }
    }

    #[test]
    fn mining_uses_configured_costs() {
        let now = at(2024, 5, 1, 12);
        let mut user = user_at("u1", now);
        user.energy = 30;
        let game = Gamification {
            energy_cost_per_click: 25,
            xp_per_click: 1,
            click_reward: 0.01,
            ..Gamification::default()
        };

        mine(&mut user, &game, now).unwrap();
        assert_eq!(user.energy, 5);
        assert_eq!(mine(&mut user, &game, now), Err(MineError::OutOfEnergy { energy: 5, cost: 25 }));
    }

    #[test]
    fn mining_persists_reset_with_its_own_changes() {
        let yesterday = at(2024, 5, 1, 12);
        let today = at(2024, 5, 2, 8);
        let mut user = user_at("u1", yesterday);
        user.daily_mining_count = 50;
        user.daily_spin_count = 7;

        mine(&mut user, &Gamification::default(), today).unwrap();

        assert_eq!(user.daily_mining_count, 1);
        assert_eq!(user.daily_spin_count, 0);
        assert_eq!(user.last_daily_goal_reset, Some(today.to_utc()));
    }

    #[test]
    fn refill_sets_full_energy_until_daily_limit() {
        let now = at(2024, 5, 1, 12);
        let mut user = user_at("u1", now);
        user.energy = 20;

        for i in 1..=DAILY_REFILL_LIMIT {
            assert_eq!(refill_energy(&mut user, now), Ok(DAILY_REFILL_LIMIT - i));
            assert_eq!(user.energy, 100);
            user.energy = 0;
        }

        assert_eq!(refill_energy(&mut user, now), Err(RefillError::DailyLimitReached));
        assert_eq!(user.energy, 0);
        assert_eq!(user.daily_refill_count, DAILY_REFILL_LIMIT);
    }

    #[test]
    fn refill_limit_resets_next_day() {
        let mut user = user_at("u1", at(2024, 5, 1, 12));
        user.daily_refill_count = DAILY_REFILL_LIMIT;

        assert!(refill_energy(&mut user, at(2024, 5, 2, 0)).is_ok());
        assert_eq!(user.daily_refill_count, 1);
    }
}
