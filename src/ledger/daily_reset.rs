use chrono::{DateTime, FixedOffset, Utc};

use crate::models::users::User;

/// Fields that bring a stale record's daily counters up to the current day.
///
/// The patch is never written on its own; it is applied to the in-memory
/// view before limits are evaluated and persisted together with the
/// operation's own changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DailyResetPatch {
    reset_at: Option<DateTime<Utc>>,
}

impl DailyResetPatch {
    /// Empty when the stored reset marker falls on today's calendar date in
    /// `now`'s offset. A missing marker counts as stale.
    pub fn for_user(user: &User, now: DateTime<FixedOffset>) -> Self {
        let today = now.date_naive();
        let last_reset = user
            .last_daily_goal_reset
            .map(|at| at.with_timezone(now.offset()).date_naive());

        if last_reset == Some(today) {
            DailyResetPatch { reset_at: None }
        } else {
            DailyResetPatch {
                reset_at: Some(now.to_utc()),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reset_at.is_none()
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(reset_at) = self.reset_at {
            user.daily_refill_count = 0;
            user.daily_spin_count = 0;
            user.daily_ads_watched = 0;
            user.daily_mining_count = 0;
            user.daily_goal_claimed = false;
            user.last_daily_goal_reset = Some(reset_at);
        }
    }
}

/// A copy of `user` with the daily reset applied.
pub fn current_view(user: &User, now: DateTime<FixedOffset>) -> User {
    let mut view = user.clone();
    DailyResetPatch::for_user(user, now).apply(&mut view);
    view
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::ledger::testing::{at, user_at};

    fn busy_user(now: DateTime<FixedOffset>) -> User {
        let mut user = user_at("u1", now);
        user.daily_refill_count = 10;
        user.daily_spin_count = 7;
        user.daily_ads_watched = 3;
        user.daily_mining_count = 40;
        user.daily_goal_claimed = true;
        user
    }

    #[test]
    fn same_day_patch_is_empty() {
        let user = busy_user(at(2024, 5, 1, 1));
        let patch = DailyResetPatch::for_user(&user, at(2024, 5, 1, 23));

        assert!(patch.is_empty());

        let mut view = user.clone();
        patch.apply(&mut view);
        assert_eq!(view, user);
    }

    #[test]
    fn next_day_zeroes_counters() {
        let user = busy_user(at(2024, 5, 1, 23));
        let now = at(2024, 5, 2, 0);
        let view = current_view(&user, now);

        assert_eq!(view.daily_refill_count, 0);
        assert_eq!(view.daily_spin_count, 0);
        assert_eq!(view.daily_ads_watched, 0);
        assert_eq!(view.daily_mining_count, 0);
        assert!(!view.daily_goal_claimed);
        assert_eq!(view.last_daily_goal_reset, Some(now.to_utc()));
    }

    #[test]
    fn missing_marker_is_stale() {
        let mut user = busy_user(at(2024, 5, 1, 12));
        user.last_daily_goal_reset = None;

        assert!(!DailyResetPatch::for_user(&user, at(2024, 5, 1, 12)).is_empty());
    }

    #[test]
    fn day_boundary_follows_clock_offset() {
        // 22:00 UTC on May 1st is already May 2nd at UTC+3.
        let user = busy_user(at(2024, 5, 1, 20));
        let plus_three = FixedOffset::east_opt(3 * 3600).unwrap();
        let now = plus_three.with_ymd_and_hms(2024, 5, 2, 1, 0, 0).unwrap();

        assert!(!DailyResetPatch::for_user(&user, now).is_empty());
        assert!(DailyResetPatch::for_user(&user, at(2024, 5, 1, 22)).is_empty());
    }

    #[test]
    fn other_fields_survive_reset() {
        let mut user = busy_user(at(2024, 5, 1, 12));
        user.balance = 3.25;
        user.energy = 40;
        let view = current_view(&user, at(2024, 5, 1, 12) + Duration::days(3));

        assert_eq!(view.balance, 3.25);
        assert_eq!(view.energy, 40);
    }
}
