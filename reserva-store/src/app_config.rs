use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub booking: BookingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    /// Must exceed the expected duration of the protected transaction with
    /// margin, and stay short enough that a crashed holder cannot wedge a
    /// slot for long.
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_seconds: u64,
    #[serde(default = "default_resources")]
    pub resources: Vec<String>,
}

fn default_lock_ttl() -> u64 {
    30
}

fn default_resources() -> Vec<String> {
    ["room_A", "room_B", "room_C", "room_D"]
        .iter()
        .map(|r| r.to_string())
        .collect()
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            lock_ttl_seconds: default_lock_ttl(),
            resources: default_resources(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of RESERVA)
            .add_source(config::Environment::with_prefix("RESERVA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_rules_defaults() {
        let rules = BookingRules::default();
        assert_eq!(rules.lock_ttl_seconds, 30);
        assert!(rules.resources.contains(&"room_A".to_string()));
    }
}
