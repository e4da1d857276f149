use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ENERGY: i64 = 100;

/// One document per account. Field names follow the stored document shape.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub email: String,
    pub balance: f64,
    pub referral_code: String,
    #[serde(default)]
    pub referred_by: Option<String>,
    #[serde(default)]
    pub completed_task_ids: Vec<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_banned: bool,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub referral_count: i64,

    #[serde(default = "default_energy")]
    pub energy: i64,
    #[serde(default = "default_energy")]
    pub max_energy: i64,
    #[serde(default)]
    pub xp: i64,
    #[serde(default = "default_one")]
    pub level: i64,
    #[serde(default = "default_one")]
    pub mining_power: i64,

    #[serde(default)]
    pub last_daily_bonus: Option<DateTime<Utc>>,
    #[serde(default)]
    pub daily_streak: i64,
    #[serde(default)]
    pub spins_available: i64,

    #[serde(default)]
    pub daily_refill_count: i64,
    #[serde(default)]
    pub daily_spin_count: i64,
    #[serde(default)]
    pub daily_ads_watched: i64,
    #[serde(default)]
    pub daily_mining_count: i64,
    #[serde(default)]
    pub last_daily_goal_reset: Option<DateTime<Utc>>,
    #[serde(default)]
    pub daily_goal_claimed: bool,
}

fn default_energy() -> i64 {
    DEFAULT_MAX_ENERGY
}

fn default_one() -> i64 {
    1
}

impl User {
    /// A freshly registered account: full energy, one free spin and the
    /// daily epoch starting now.
    pub fn new(uid: &str, email: &str, referral_code: String, is_admin: bool, now: DateTime<Utc>) -> Self {
        User {
            uid: uid.to_string(),
            email: email.to_string(),
            balance: 0.0,
            referral_code,
            referred_by: None,
            completed_task_ids: Vec::new(),
            is_admin,
            is_banned: false,
            joined_at: now,
            referral_count: 0,
            energy: DEFAULT_MAX_ENERGY,
            max_energy: DEFAULT_MAX_ENERGY,
            xp: 0,
            level: 1,
            mining_power: 1,
            last_daily_bonus: None,
            daily_streak: 0,
            spins_available: 1,
            daily_refill_count: 0,
            daily_spin_count: 0,
            daily_ads_watched: 0,
            daily_mining_count: 0,
            last_daily_goal_reset: Some(now),
            daily_goal_claimed: false,
        }
    }

    pub fn completions_of(&self, task_id: &str) -> usize {
        self.completed_task_ids
            .iter()
            .filter(|id| id.as_str() == task_id)
            .count()
    }
}

/// Fields an admin may override on any account.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub balance: Option<f64>,
    pub is_banned: Option<bool>,
    pub energy: Option<i64>,
    pub spins_available: Option<i64>,
}

impl UserPatch {
    pub fn apply(&self, user: &mut User) {
        if let Some(balance) = self.balance {
            user.balance = balance;
        }
        if let Some(is_banned) = self.is_banned {
            user.is_banned = is_banned;
        }
        if let Some(energy) = self.energy {
            user.energy = energy;
        }
        if let Some(spins) = self.spins_available {
            user.spins_available = spins;
        }
    }

    pub fn describe(&self) -> String {
        let mut fields = Vec::new();
        if let Some(balance) = self.balance {
            fields.push(format!("balance={balance}"));
        }
        if let Some(is_banned) = self.is_banned {
            fields.push(format!("isBanned={is_banned}"));
        }
        if let Some(energy) = self.energy {
            fields.push(format!("energy={energy}"));
        }
        if let Some(spins) = self.spins_available {
            fields.push(format!("spinsAvailable={spins}"));
        }
        fields.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_counters_deserialize_to_defaults() {
        let raw = r#"{
            "uid": "u1",
            "email": "a@b.c",
            "balance": 1.5,
            "referralCode": "ABC123",
            "joinedAt": "2024-01-01T00:00:00Z"
        }"#;
        let user: User = serde_json::from_str(raw).unwrap();

        assert_eq!(user.energy, 100);
        assert_eq!(user.level, 1);
        assert_eq!(user.spins_available, 0);
        assert!(user.last_daily_goal_reset.is_none());
        assert!(user.completed_task_ids.is_empty());
    }

    #[test]
    fn counts_repeated_completions() {
        let mut user = User::new("u1", "a@b.c", "ABC123".into(), false, Utc::now());
        user.completed_task_ids = vec!["t1".into(), "t2".into(), "t1".into()];

        assert_eq!(user.completions_of("t1"), 2);
        assert_eq!(user.completions_of("t3"), 0);
    }
}
