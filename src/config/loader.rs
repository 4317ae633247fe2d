//! TOML configuration loading, env-var overrides, and atomic saves.
//!
//! # Loading order
//! 1. Parse `~/.sigap/config.toml` (or the path in `SIGAP_CONFIG`)
//! 2. Apply `SIGAP_*` environment variable overrides
//! 3. Fall back to [`AppConfig::default()`] if the file is missing
//!
//! # Atomic save
//! Writes to `<path>.tmp` → fsync → rename to `<path>` to avoid partial
//! writes corrupting the config file.

use std::{
    env,
    fs,
    path::{Path, PathBuf},
};

use super::schema::AppConfig;

// ─── default_config_path ─────────────────────────────────────────────────────

/// Return the default config file path: `~/.sigap/config.toml`.
pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::home_dir()
        .map(|h| h.join(".sigap").join("config.toml"))
        .ok_or_else(|| "could not determine home directory".to_string())
}

// ─── load_config ─────────────────────────────────────────────────────────────

/// Load [`AppConfig`] from the given path, falling back to defaults if the
/// file does not exist, then applying environment variable overrides.
pub fn load_config(path: &Path) -> Result<AppConfig, String> {
    let mut config = match fs::read_to_string(path) {
        Ok(content) => toml::from_str::<AppConfig>(&content)
            .map_err(|e| format!("failed to parse config at {path:?}: {e}"))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(e) => return Err(format!("failed to read config at {path:?}: {e}")),
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load config from the default path, creating the directory if needed.
pub fn load_default_config() -> AppConfig {
    let path = env::var("SIGAP_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_config_path().unwrap_or_else(|_| PathBuf::from("config.toml")));

    load_config(&path).unwrap_or_default()
}

// ─── apply_env_overrides ─────────────────────────────────────────────────────

/// Apply `SIGAP_*` environment variable overrides to `config`.
///
/// Supported overrides:
/// - `SIGAP_HTTP_BASE_URL`            → `http.base_url`
/// - `SIGAP_HTTP_POOL_SIZE`           → `http.pool_size`
/// - `SIGAP_POLL_INTERVAL_SECS`       → `timers.poll_interval_secs`
/// - `SIGAP_POLL_MAX_MINUTES`         → `timers.poll_max_minutes`
/// - `SIGAP_PROMOTE_SAME_COOKIE_JOBS` → `orchestrator.promote_same_cookie_jobs` (1/0)
/// - `SIGAP_STORE_PATH`               → `store.path`
fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(v) = env::var("SIGAP_HTTP_BASE_URL") {
        config.http.base_url = v;
    }
    if let Ok(v) = env::var("SIGAP_HTTP_POOL_SIZE") {
        if let Ok(n) = v.parse::<usize>() {
            config.http.pool_size = n;
        }
    }
    if let Ok(v) = env::var("SIGAP_POLL_INTERVAL_SECS") {
        if let Ok(secs) = v.parse::<i64>() {
            config.timers.poll_interval_secs = secs;
        }
    }
    if let Ok(v) = env::var("SIGAP_POLL_MAX_MINUTES") {
        if let Ok(mins) = v.parse::<i64>() {
            config.timers.poll_max_minutes = mins;
        }
    }
    if let Ok(v) = env::var("SIGAP_PROMOTE_SAME_COOKIE_JOBS") {
        config.orchestrator.promote_same_cookie_jobs = v == "1" || v.eq_ignore_ascii_case("true");
    }
    if let Ok(v) = env::var("SIGAP_STORE_PATH") {
        config.store.path = Some(v);
    }
}

// ─── save_config ─────────────────────────────────────────────────────────────

/// Atomically save `config` to `path`.
///
/// Writes to `<path>.tmp`, syncs to disk, creates a backup of the existing
/// file as `<path>.bak`, then renames the temp file to `<path>`.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| format!("failed to serialise config: {e}"))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("failed to create config dir: {e}"))?;
    }

    let tmp_path = path.with_extension("toml.tmp");

    fs::write(&tmp_path, &content).map_err(|e| format!("failed to write temp config: {e}"))?;

    if path.exists() {
        let bak_path = path.with_extension("toml.bak");
        fs::copy(path, &bak_path).map_err(|e| format!("failed to backup config: {e}"))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| format!("failed to replace config file: {e}"))?;

    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn load_partial_config_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[http]
base_url = "https://example.test"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.http.base_url, "https://example.test");
        // Other fields should use defaults.
        assert_eq!(config.timers.retry_attempts, 3);
        assert_eq!(config.sites.bromo.id_site, 4);
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut original = AppConfig::default();
        original.http.pool_size = 250;
        original.orchestrator.promote_same_cookie_jobs = true;

        save_config(&path, &original).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, original, "config should round-trip through save/load");
    }

    #[test]
    fn save_creates_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        save_config(&path, &AppConfig::default()).unwrap();
        save_config(&path, &AppConfig::default()).unwrap();

        let bak = path.with_extension("toml.bak");
        assert!(bak.exists(), "backup file should exist after second save");
    }

    #[test]
    fn env_override_pool_size() {
        let key = "SIGAP_HTTP_POOL_SIZE";
        // SAFETY: single-threaded test context; no other threads read this var.
        unsafe {
            env::set_var(key, "42");
        }
        let config = load_default_config();
        unsafe {
            env::remove_var(key);
        }
        assert_eq!(config.http.pool_size, 42);
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "this is not valid toml!!!");
        let result = load_config(&path);
        assert!(result.is_err(), "invalid TOML should return an error");
    }
}
