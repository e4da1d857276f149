use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnouncementType {
    Info,
    Warning,
    Success,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Announcement {
    pub enabled: bool,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: AnnouncementType,
}

impl Default for Announcement {
    fn default() -> Self {
        Announcement {
            enabled: true,
            message: "Welcome to Brickearner! Complete tasks to earn crypto.".to_string(),
            kind: AnnouncementType::Info,
        }
    }
}

/// Tunables read by the mining and daily bonus rules.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Gamification {
    pub daily_bonus_base: f64,
    pub xp_per_click: i64,
    pub energy_cost_per_click: i64,
    pub click_reward: f64,
}

impl Default for Gamification {
    fn default() -> Self {
        Gamification {
            daily_bonus_base: 0.01,
            xp_per_click: 10,
            energy_cost_per_click: 10,
            click_reward: 0.0005,
        }
    }
}

/// The singleton settings document. Any field missing from the stored
/// document falls back to its default.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalSettings {
    pub ads_enabled: bool,
    pub coins_per_ad: f64,
    pub referral_bonus: f64,
    pub announcement: Announcement,
    pub gamification: Gamification,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        GlobalSettings {
            ads_enabled: true,
            coins_per_ad: 0.005,
            referral_bonus: 0.10,
            announcement: Announcement::default(),
            gamification: Gamification::default(),
        }
    }
}
