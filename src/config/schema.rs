//! TOML configuration schema for the booking engine.
//!
//! All fields have `#[serde(default)]` so a partially-filled `config.toml`
//! works correctly. Missing sections fall back to their `Default` impl.
//!
//! Example `~/.sigap/config.toml`:
//! ```toml
//! [sites.bromo]
//! id_site = 4
//!
//! [timers]
//! prewarm_secs = 120
//! poll_interval_secs = 60
//! poll_max_minutes = 180
//!
//! [http]
//! pool_size = 100
//! ```

use serde::{Deserialize, Serialize};

// ─── SiteConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteConfig {
    pub id_site: u32,
    pub sector: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SitesConfig {
    pub bromo: SiteConfig,
    pub semeru: SiteConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id_site: 4, sector: 1 }
    }
}

impl Default for SitesConfig {
    fn default() -> Self {
        Self {
            bromo: SiteConfig { id_site: 4, sector: 1 },
            semeru: SiteConfig { id_site: 8, sector: 3 },
        }
    }
}

// ─── TimerConfig ──────────────────────────────────────────────────────────

/// Timer windows from spec.md §6 Configuration. Every knob is independently
/// overridable — the `view-` jitter and the short-window retry jitter are
/// deliberately separate fields (spec.md §9 open question).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimerConfig {
    pub prewarm_secs: i64,
    pub poll_interval_secs: i64,
    pub poll_max_minutes: i64,
    pub view_lead_minutes: i64,
    pub view_trail_minutes: i64,
    pub view_jitter_base_secs: f64,
    pub view_jitter_cap_secs: f64,
    pub retry_attempts: u32,
    pub retry_jitter_base_secs: f64,
    pub retry_jitter_cap_secs: f64,
    pub stuck_threshold_secs: u64,
    /// How many polling ticks between throttled status notifications.
    pub poll_notify_every: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            prewarm_secs: 120,
            poll_interval_secs: 60,
            poll_max_minutes: 180,
            view_lead_minutes: 5,
            view_trail_minutes: 15,
            view_jitter_base_secs: 3.0,
            view_jitter_cap_secs: 7.0,
            retry_attempts: 3,
            retry_jitter_base_secs: 0.1,
            retry_jitter_cap_secs: 1.0,
            stuck_threshold_secs: 120,
            poll_notify_every: 5,
        }
    }
}

// ─── HttpConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub pool_size: usize,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub submission_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "https://bromotenggersemeru.id".to_string(),
            pool_size: 100,
            connect_timeout_secs: 7,
            read_timeout_secs: 30,
            submission_timeout_secs: 60,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

// ─── StoreConfig ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Override path to the job-store JSON document (default:
    /// `~/.sigap/jobs.json`).
    pub path: Option<String>,
}

// ─── OrchestratorConfig ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Opt-in: after a successful `main-` run, promote the next pending
    /// future job with identical cookies to run immediately. Disabled by
    /// default — spec.md §9 leaves this as an open question.
    pub promote_same_cookie_jobs: bool,
}

// ─── AppConfig ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub sites: SitesConfig,
    pub timers: TimerConfig,
    pub http: HttpConfig,
    pub store: StoreConfig,
    pub orchestrator: OrchestratorConfig,
}
