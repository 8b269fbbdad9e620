use std::env;
use std::path::PathBuf;

use chrono::NaiveTime;

use crate::frequency::SlotTimes;

// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_time(key: &str, default: NaiveTime) -> NaiveTime {
    match env_opt(key) {
        Some(v) => NaiveTime::parse_from_str(&v, "%H:%M").unwrap_or_else(|_| {
            tracing::warn!("ignoring {key}={v}: expected HH:MM");
            default
        }),
        None => default,
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub slots: SlotTimes,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("data"),
            host: "0.0.0.0".to_string(),
            port: 3000,
            slots: SlotTimes::default(),
        }
    }
}

impl Config {
    // Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            data_dir: env_opt("SWEEP_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            host: env_or("SWEEP_HOST", &defaults.host),
            port: env_opt("SWEEP_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            slots: SlotTimes {
                morning: env_time("SWEEP_MORNING_SLOT", defaults.slots.morning),
                afternoon: env_time("SWEEP_AFTERNOON_SLOT", defaults.slots.afternoon),
            },
        }
    }
}
