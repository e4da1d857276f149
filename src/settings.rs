use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct Server {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            listen: default_listen(),
        }
    }
}

/// Super-admin allow-list. Either field may be left empty.
#[derive(Debug, Default, Deserialize)]
pub struct Admin {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub uid: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Clock {
    /// Offset of the calendar day used for daily resets.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub postgres: Option<Postgres>,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub admin: Admin,
    #[serde(default)]
    pub clock: Clock,
}

fn default_max_connections() -> u32 {
    5
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

impl Settings {
    /// Loads `path`, then applies `BRICKEARNER__SECTION__KEY` overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("BRICKEARNER").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
