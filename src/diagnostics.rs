//! Diagnostics for support requests.
//!
//! Provides:
//! - **About info**: version, build timestamp, git SHA, platform
//! - **Health**: schema version, database size, row counts per table
//! - **Diagnostics bundle**: about, health, redacted settings and the most
//!   recent log files packed into a zip.
//! - **Log retention**: pruning of old rolling log files.

use std::fs;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::{json, Map, Value};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::AppConfig;
use crate::db::{self, DbState};
use crate::error::{AppError, AppResult};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Rolling log files are named `trucklog.YYYY-MM-DD`.
pub const LOG_FILE_PREFIX: &str = "trucklog.";

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// Log files copied into a bundle, newest first.
const BUNDLE_LOG_FILES: usize = 3;

/// Maximum bytes read from each log file (5 MB).
pub const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

/// Settings categories left out of bundles. Lockout counters are keyed by
/// e-mail address.
const PRIVATE_SETTING_CATEGORIES: &[&str] = &["lockout"];

// ---------------------------------------------------------------------------
// About info
// ---------------------------------------------------------------------------

pub fn about() -> Value {
    json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "rustVersion": env!("CARGO_PKG_RUST_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

pub fn health(db: &DbState) -> AppResult<Value> {
    let conn = db.lock()?;
    let schema_version = db::schema_version(&conn)?;
    let counts: Map<String, Value> = db::table_counts(&conn)?
        .into_iter()
        .map(|(table, n)| (table, json!(n)))
        .collect();
    drop(conn);

    let db_size = fs::metadata(&db.db_path).map(|m| m.len()).unwrap_or(0);

    Ok(json!({
        "status": "ok",
        "schemaVersion": schema_version,
        "expectedSchemaVersion": db::CURRENT_SCHEMA_VERSION,
        "dbSizeBytes": db_size,
        "tableCounts": counts,
        "checkedAt": db::now_ts(),
    }))
}

// ---------------------------------------------------------------------------
// Diagnostics bundle
// ---------------------------------------------------------------------------

fn write_json<W: std::io::Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    value: &Value,
    options: SimpleFileOptions,
) -> AppResult<()> {
    let body = serde_json::to_vec_pretty(value).map_err(|e| AppError::Internal(e.to_string()))?;
    zip.start_file(name, options)?;
    zip.write_all(&body)?;
    Ok(())
}

/// Settings grouped by category, without private categories and with
/// secret-looking keys masked.
fn bundle_settings(db: &DbState) -> AppResult<Value> {
    let all = {
        let conn = db.lock()?;
        db::get_all_settings(&conn)?
    };
    let filtered = match all {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(category, _)| !PRIVATE_SETTING_CATEGORIES.contains(&category.as_str()))
                .collect(),
        ),
        other => other,
    };
    Ok(redact_sensitive_fields(filtered))
}

/// Writes `trucklog-diagnostics-<timestamp>.zip` into `out_dir` and returns
/// its path.
pub fn export_bundle(db: &DbState, config: &AppConfig, out_dir: &Path) -> AppResult<PathBuf> {
    fs::create_dir_all(out_dir)?;
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let zip_path = out_dir.join(format!("trucklog-diagnostics-{timestamp}.zip"));

    let file = fs::File::create(&zip_path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    write_json(&mut zip, "about.json", &about(), options)?;
    write_json(&mut zip, "health.json", &health(db)?, options)?;
    write_json(&mut zip, "settings.json", &bundle_settings(db)?, options)?;

    let config_summary = redact_sensitive_fields(json!({
        "dataDir": config.data_dir.display().to_string(),
        "bind": config.bind.to_string(),
        "logFilter": config.log_filter,
        "sessionIdleMinutes": config.session_idle_minutes,
        "sessionMaxHours": config.session_max_hours,
        "corsOrigin": config.cors_origin,
    }));
    write_json(&mut zip, "config.json", &config_summary, options)?;

    for path in log_files(&config.log_dir()).into_iter().take(BUNDLE_LOG_FILES) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut buf = Vec::new();
        match fs::File::open(&path) {
            Ok(f) => {
                f.take(MAX_LOG_SIZE).read_to_end(&mut buf)?;
            }
            Err(e) => {
                warn!("Skipping log file {}: {e}", path.display());
                continue;
            }
        }
        zip.start_file(format!("logs/{name}"), options)?;
        zip.write_all(&buf)?;
    }

    zip.finish()?;
    info!(path = %zip_path.display(), "diagnostics bundle written");
    Ok(zip_path)
}

pub(crate) fn redact_sensitive_fields(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, value) in map {
                if should_redact_key(&key) {
                    redacted.insert(key, Value::String("[REDACTED]".to_string()));
                } else {
                    redacted.insert(key, redact_sensitive_fields(value));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(redact_sensitive_fields).collect()),
        other => other,
    }
}

fn should_redact_key(key: &str) -> bool {
    let normalized = key.to_ascii_lowercase();
    let sensitive_markers = [
        "api_key",
        "apikey",
        "secret",
        "password",
        "token",
        "authorization",
        "cookie",
        "hash",
    ];
    sensitive_markers
        .iter()
        .any(|marker| normalized.contains(marker))
}

// ---------------------------------------------------------------------------
// Log retention
// ---------------------------------------------------------------------------

/// Log files in `log_dir`, newest first.
fn log_files(log_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<(PathBuf, SystemTime)> = Vec::new();
    let Ok(entries) = fs::read_dir(log_dir) else {
        return Vec::new();
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if path.is_file() && is_log {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((path, modified));
        }
    }
    // Newest first; names carry the date, so they break ties.
    files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
    files.into_iter().map(|(p, _)| p).collect()
}

/// Delete all but the newest `MAX_LOG_FILES` log files. Returns how many
/// were removed.
pub fn prune_old_logs(log_dir: &Path) -> usize {
    let mut removed = 0;
    for path in log_files(log_dir).iter().skip(MAX_LOG_FILES) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to prune log file {}: {e}", path.display()),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_about_info_has_required_fields() {
        let info = about();
        assert_eq!(info["version"], json!(env!("CARGO_PKG_VERSION")));
        assert!(info.get("buildTimestamp").is_some());
        assert!(info.get("gitSha").is_some());
        assert!(info.get("platform").is_some());
        assert!(info.get("arch").is_some());
    }

    #[test]
    fn test_health_reports_schema_and_counts() {
        let dir = TempDir::new().expect("tempdir");
        let db_state = db::init(dir.path()).expect("init");
        let health = health(&db_state).expect("health");
        assert_eq!(health["schemaVersion"], json!(db::CURRENT_SCHEMA_VERSION));
        assert_eq!(health["tableCounts"]["trips"], json!(0));
        assert!(health["dbSizeBytes"].as_u64().expect("size") > 0);
    }

    #[test]
    fn test_export_bundle_creates_zip_without_private_settings() {
        let dir = TempDir::new().expect("tempdir");
        let config = AppConfig {
            data_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        };
        let db_state = db::init(dir.path()).expect("init");
        {
            let conn = db_state.lock().expect("lock");
            db::set_setting(&conn, "company", "name", "Kongu Roadways").expect("company");
            db::set_setting(&conn, "lockout", "clerk@example.com:attempts", "3").expect("lockout");
            db::set_setting(&conn, "integrations", "api_key", "sk-live-123").expect("secret");
        }
        fs::create_dir_all(config.log_dir()).expect("log dir");
        fs::write(config.log_dir().join("trucklog.2026-10-19"), "INFO started\n").expect("log");

        let path = export_bundle(&db_state, &config, &dir.path().join("out")).expect("bundle");
        let file = fs::File::open(&path).expect("open zip");
        let mut archive = zip::ZipArchive::new(file).expect("valid zip");
        for name in ["about.json", "health.json", "settings.json", "config.json"] {
            assert!(archive.by_name(name).is_ok(), "missing {name}");
        }
        assert!(archive.by_name("logs/trucklog.2026-10-19").is_ok());

        let mut settings = String::new();
        archive
            .by_name("settings.json")
            .expect("settings")
            .read_to_string(&mut settings)
            .expect("read");
        let settings: Value = serde_json::from_str(&settings).expect("json");
        assert_eq!(settings["company"]["name"], json!("Kongu Roadways"));
        assert!(settings.get("lockout").is_none());
        assert_eq!(settings["integrations"]["api_key"], json!("[REDACTED]"));
    }

    #[test]
    fn test_prune_keeps_newest_logs() {
        let dir = TempDir::new().expect("tempdir");
        for day in 1..=14 {
            fs::write(dir.path().join(format!("trucklog.2026-10-{day:02}")), "x").expect("write");
        }
        fs::write(dir.path().join("unrelated.txt"), "keep").expect("write");

        assert_eq!(prune_old_logs(dir.path()), 4);
        let left = log_files(dir.path());
        assert_eq!(left.len(), MAX_LOG_FILES);
        assert!(dir.path().join("unrelated.txt").exists());
        assert!(dir.path().join("trucklog.2026-10-14").exists());
    }

    #[test]
    fn test_prune_missing_dir_is_noop() {
        let dir = TempDir::new().expect("tempdir");
        assert_eq!(prune_old_logs(&dir.path().join("absent")), 0);
    }

    #[test]
    fn test_should_redact_key_matches_sensitive_markers() {
        assert!(should_redact_key("api_key"));
        assert!(should_redact_key("Authorization"));
        assert!(should_redact_key("password_hash"));
        assert!(!should_redact_key("status"));
    }

    #[test]
    fn test_redact_sensitive_fields_recurses_through_objects() {
        let value = json!({
            "token": "tk-val",
            "nested": {
                "api_key": "key-value",
                "status": "ok"
            },
            "items": [
                { "password": "1234" },
                { "name": "safe" }
            ]
        });

        let redacted = redact_sensitive_fields(value);
        assert_eq!(redacted["token"], json!("[REDACTED]"));
        assert_eq!(redacted["nested"]["api_key"], json!("[REDACTED]"));
        assert_eq!(redacted["nested"]["status"], json!("ok"));
        assert_eq!(redacted["items"][0]["password"], json!("[REDACTED]"));
        assert_eq!(redacted["items"][1]["name"], json!("safe"));
    }
}
