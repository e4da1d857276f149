//! Reward ledger rules.
//!
//! Every rule here is a plain function over an in-memory [`User`] view. The
//! caller supplies the settings snapshot and the current instant, and is
//! responsible for running the rule inside a store transaction so the
//! resulting record is written back atomically. A rule that returns `Err`
//! leaves the record untouched.

use chrono::{DateTime, FixedOffset, Utc};
use rand::Rng;

use crate::models::users::User;

pub mod bonus;
pub mod daily_reset;
pub mod mining;
pub mod referral;
pub mod spin;
pub mod tasks;
pub mod withdrawals;

pub use bonus::{claim_daily_bonus, claim_daily_goal, DailyBonusError, DailyGoalError};
pub use mining::{mine, refill_energy, MineError, RefillError};
pub use referral::{redeem_referral, ReferralError};
pub use spin::{grant_bonus_spin, spin_wheel, SpinError, SpinOutcome};
pub use tasks::{complete_task, completion_terms, TaskCompletionError};
pub use withdrawals::{process_withdrawal, request_withdrawal, ProcessOutcome, WithdrawalError};

pub const ENERGY_CAP: i64 = 100;
pub const XP_PER_LEVEL: i64 = 100;

/// A business-rule rejection that callers surface to the end user as-is.
pub trait Rejection: std::error::Error + Send + Sync + 'static {
    /// Stable signal name, e.g. `OUT_OF_ENERGY`.
    fn code(&self) -> &'static str;
}

impl Rejection for std::convert::Infallible {
    fn code(&self) -> &'static str {
        match *self {}
    }
}

pub fn level_for_xp(xp: i64) -> i64 {
    1 + xp.div_euclid(XP_PER_LEVEL)
}

/// Source of "now". The offset decides where the calendar day boundary falls.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<FixedOffset>;
}

pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(utc_offset_minutes: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes.checked_mul(60)?)?;
        Some(SystemClock { offset })
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Uniform draws in `[0, 1)` for the reward wheel.
pub trait DrawSource: Send + Sync + 'static {
    fn draw(&self) -> f64;
}

pub struct ThreadRngDraw;

impl DrawSource for ThreadRngDraw {
    fn draw(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use chrono::{DateTime, Duration, FixedOffset, TimeZone};

    use super::{Clock, DrawSource};
    use crate::models::users::User;

    pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(year, month, day, hour, 0, 0)
            .unwrap()
    }

    /// A user whose daily epoch started at `now`.
    pub fn user_at(uid: &str, now: DateTime<FixedOffset>) -> User {
        User::new(uid, &format!("{uid}@example.com"), format!("{uid:0>6}").to_uppercase(), false, now.to_utc())
    }

    pub struct FixedClock(Mutex<DateTime<FixedOffset>>);

    impl FixedClock {
        pub fn new(now: DateTime<FixedOffset>) -> Self {
            FixedClock(Mutex::new(now))
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<FixedOffset> {
            *self.0.lock().unwrap()
        }
    }

    pub struct FixedDraw(pub f64);

    impl DrawSource for FixedDraw {
        fn draw(&self) -> f64 {
            self.0
        }
    }
}
