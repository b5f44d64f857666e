//! Process configuration read from the environment.
//!
//! An optional `.env` file in the working directory is loaded first (see
//! `main.rs`), then every `TRUCKLOG_*` variable is read here. Runtime
//! settings that operators edit through the API (company profile) live in
//! the `local_settings` table instead, see [`crate::db::get_setting`].

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

pub const ENV_DATA_DIR: &str = "TRUCKLOG_DATA_DIR";
pub const ENV_BIND: &str = "TRUCKLOG_BIND";
pub const ENV_LOG: &str = "TRUCKLOG_LOG";
pub const ENV_SESSION_IDLE_MINUTES: &str = "TRUCKLOG_SESSION_IDLE_MINUTES";
pub const ENV_SESSION_MAX_HOURS: &str = "TRUCKLOG_SESSION_MAX_HOURS";
pub const ENV_CORS_ORIGIN: &str = "TRUCKLOG_CORS_ORIGIN";

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_LOG_FILTER: &str = "info,trucklog_lib=debug";
const DEFAULT_SESSION_IDLE_MINUTES: i64 = 60;
const DEFAULT_SESSION_MAX_HOURS: i64 = 12;
pub const MAX_SESSION_IDLE_MINUTES: i64 = 1440;
pub const MAX_SESSION_HOURS: i64 = 8760;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
    pub log_filter: String,
    pub session_idle_minutes: i64,
    pub session_max_hours: i64,
    pub cors_origin: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            session_idle_minutes: DEFAULT_SESSION_IDLE_MINUTES,
            session_max_hours: DEFAULT_SESSION_MAX_HOURS,
            cors_origin: None,
        }
    }
}

impl AppConfig {
    /// Build the configuration from `TRUCKLOG_*` variables, falling back to
    /// defaults for anything unset or blank.
    pub fn from_env() -> AppResult<Self> {
        let data_dir = env_value(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let bind_raw = env_value(ENV_BIND).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_raw
            .parse()
            .map_err(|e| AppError::validation(format!("{ENV_BIND}={bind_raw}: {e}")))?;

        let log_filter = env_value(ENV_LOG)
            .or_else(|| env_value("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let session_idle_minutes = bounded_int(
            ENV_SESSION_IDLE_MINUTES,
            DEFAULT_SESSION_IDLE_MINUTES,
            MAX_SESSION_IDLE_MINUTES,
        )?;
        let session_max_hours =
            bounded_int(ENV_SESSION_MAX_HOURS, DEFAULT_SESSION_MAX_HOURS, MAX_SESSION_HOURS)?;

        Ok(Self {
            data_dir,
            bind,
            log_filter,
            session_idle_minutes,
            session_max_hours,
            cors_origin: env_value(ENV_CORS_ORIGIN),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(crate::db::DB_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn proof_dir(&self) -> PathBuf {
        self.data_dir.join("delivery-proofs")
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Integer in `1..=max`, or `default` when unset.
fn bounded_int(key: &str, default: i64, max: i64) -> AppResult<i64> {
    match env_value(key) {
        None => Ok(default),
        Some(raw) => match raw.parse::<i64>() {
            Ok(n) if (1..=max).contains(&n) => Ok(n),
            _ => Err(AppError::validation(format!(
                "{key} must be an integer from 1 to {max} (got {raw:?})"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_KEYS: &[&str] = &[
        ENV_DATA_DIR,
        ENV_BIND,
        ENV_LOG,
        ENV_SESSION_IDLE_MINUTES,
        ENV_SESSION_MAX_HOURS,
        ENV_CORS_ORIGIN,
        "RUST_LOG",
    ];

    fn clear_env() {
        for key in ALL_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_when_unset() {
        clear_env();
        let config = AppConfig::from_env().expect("defaults");
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.session_idle_minutes, 60);
        assert_eq!(config.session_max_hours, 12);
        assert!(config.cors_origin.is_none());
        assert!(config.db_path().ends_with("trucklog.db"));
    }

    #[test]
    #[serial]
    fn reads_overrides_from_env() {
        clear_env();
        std::env::set_var(ENV_DATA_DIR, "/var/lib/trucklog");
        std::env::set_var(ENV_BIND, "0.0.0.0:9000");
        std::env::set_var(ENV_SESSION_IDLE_MINUTES, "15");
        std::env::set_var(ENV_CORS_ORIGIN, "https://office.example.com");
        let config = AppConfig::from_env().expect("overrides");
        clear_env();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/trucklog"));
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.session_idle_minutes, 15);
        assert_eq!(
            config.cors_origin.as_deref(),
            Some("https://office.example.com")
        );
        assert_eq!(
            config.proof_dir(),
            PathBuf::from("/var/lib/trucklog/delivery-proofs")
        );
    }

    #[test]
    #[serial]
    fn rejects_non_positive_session_window() {
        clear_env();
        std::env::set_var(ENV_SESSION_MAX_HOURS, "0");
        let err = AppConfig::from_env().expect_err("zero hours");
        clear_env();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    #[serial]
    fn rejects_oversized_session_window() {
        clear_env();
        std::env::set_var(ENV_SESSION_MAX_HOURS, "10000000000000");
        let err = AppConfig::from_env().expect_err("huge hours");
        assert!(matches!(err, AppError::Validation(_)));

        std::env::set_var(ENV_SESSION_MAX_HOURS, "8760");
        std::env::set_var(ENV_SESSION_IDLE_MINUTES, "1441");
        let err = AppConfig::from_env().expect_err("idle over a day");
        clear_env();
        assert!(err.to_string().contains(ENV_SESSION_IDLE_MINUTES));
    }

    #[test]
    #[serial]
    fn rejects_bad_bind_address() {
        clear_env();
        std::env::set_var(ENV_BIND, "not-an-address");
        let err = AppConfig::from_env().expect_err("bad bind");
        clear_env();
        assert!(err.to_string().contains(ENV_BIND));
    }
}
