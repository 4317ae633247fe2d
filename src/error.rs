//! Crate-wide error type.
//!
//! Mirrors the shape of the teacher's `database::DbError`: one `thiserror`
//! enum covering every failure surface, with the domain-specific kinds
//! spec.md §7 distinguishes called out as their own variants rather than
//! collapsed into a single opaque string.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Connect/read timeout, 5xx, or an empty body. Retried by the
    /// aggressive retry envelope; never fatal to the job record.
    #[error("transient network error: {0}")]
    NetworkTransient(String),

    /// The booking page's embedded JSON descriptor could not be found or
    /// parsed. Fatal to the current attempt; raw HTML is archived by the
    /// caller.
    #[error("failed to extract secret/form_hash from booking page: {0}")]
    TokenExtraction(String),

    /// Not an error condition per se — signals the orchestrator to arm a
    /// polling track instead of treating the attempt as failed.
    #[error("quota unavailable for requested date")]
    QuotaUnavailable,

    /// The upstream server indicated the `ci_session` cookie is stale.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// Semeru roster saturation ("maksimal 9 anggota") surfaced after the
    /// one permitted session-rebuild-and-retry.
    #[error("roster saturated after retry: {0}")]
    RosterSaturation(String),

    /// Semeru duplicate identity ("nomor identitas ganda") surfaced after
    /// the roster purge and retry.
    #[error("duplicate identity after purge retry: {0}")]
    DuplicateIdentity(String),

    /// `status=false` with an explanatory message from the upstream site.
    #[error("upstream validation failed: {0}")]
    ValidationServer(String),

    /// Arming a timer with `when < now`.
    #[error("deadline has already passed")]
    PastDeadline,

    /// Job store read/write/parse failure.
    #[error("job store error: {0}")]
    Store(String),

    /// Configuration load/save failure.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
