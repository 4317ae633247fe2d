//! HTTP Session Factory (spec §4.C).
//!
//! Grounded on the teacher's `OpenAICompatibleProvider::new` (shared
//! `reqwest::Client` built once with pool/timeout settings) and on
//! `network_opt.py`'s `create_optimized_session`/`prewarm_session`. Cookies
//! are not handed to `reqwest`'s built-in jar (which would tie a private
//! jar to its own `Client`, defeating the shared connection pool); instead
//! each [`Session`] clones the shared `Client` (cheap — `reqwest::Client`
//! is an `Arc` internally) and attaches a manually-built `Cookie` header
//! per request.

use std::time::{Duration, Instant};

use reqwest::{Client, Method, RequestBuilder};
use url::Url;

use crate::config::HttpConfig;
use crate::error::{AppError, AppResult};
use crate::model::JobCookies;

/// `_ga`/`_ga_session` live on the parent (registrable) domain; `ci_session`
/// is always scoped to the apex domain (spec.md §9 open question #2).
const COOKIE_PATH: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
struct CookieSpec {
    name: String,
    value: String,
}

/// Build the deterministic, deduplicated cookie list for a job: job-level
/// `ga`, `ga_session`, `ci_session` first, falling back to the user-global
/// `ci_session` token when the job has none of its own.
fn build_cookie_specs(cookies: &JobCookies, user_global_ci: Option<&str>) -> Vec<CookieSpec> {
    let mut specs: Vec<CookieSpec> = Vec::new();
    let mut upsert = |name: &str, value: String| {
        if let Some(existing) = specs.iter_mut().find(|s| s.name == name) {
            existing.value = value;
        } else {
            specs.push(CookieSpec {
                name: name.to_string(),
                value,
            });
        }
    };

    if let Some(ga) = &cookies.ga {
        upsert("_ga", ga.clone());
    }
    if let Some(ga_session) = &cookies.ga_session {
        upsert("_ga_session", ga_session.clone());
    }
    let ci = cookies
        .ci_session
        .clone()
        .or_else(|| user_global_ci.map(|s| s.to_string()));
    if let Some(ci) = ci {
        upsert("ci_session", ci);
    }
    specs
}

/// Produces [`Session`]s sharing one pooled `reqwest::Client`.
pub struct HttpSessionFactory {
    client: Client,
    base_url: Url,
    user_agent: String,
    submission_timeout: Duration,
}

impl HttpSessionFactory {
    pub fn new(config: &HttpConfig) -> AppResult<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.pool_size)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .gzip(true)
            .cookie_store(false)
            .build()
            .map_err(AppError::Http)?;
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| AppError::Config(format!("invalid http.base_url: {e}")))?;
        Ok(Self {
            client,
            base_url,
            user_agent: config.user_agent.clone(),
            submission_timeout: Duration::from_secs(config.submission_timeout_secs),
        })
    }

    /// Build a session for one job, seeding its cookie jar per spec.md §4.C.
    pub fn make_session(&self, cookies: &JobCookies, user_global_ci: Option<&str>) -> Session {
        Session {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            user_agent: self.user_agent.clone(),
            cookies: build_cookie_specs(cookies, user_global_ci),
            submission_timeout: self.submission_timeout,
        }
    }
}

/// A job-scoped HTTP session: shared connection pool, private cookie jar.
#[derive(Clone)]
pub struct Session {
    client: Client,
    base_url: Url,
    user_agent: String,
    cookies: Vec<CookieSpec>,
    submission_timeout: Duration,
}

impl Session {
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The submission-specific timeout budget (spec.md §5), for the one
    /// `do_booking` POST per attempt that runs longer than the shared
    /// client's general read timeout.
    pub fn submission_timeout(&self) -> Duration {
        self.submission_timeout
    }

    /// `name=value; name2=value2` in insertion order, the de-duplicated
    /// set built at session creation.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn ci_session(&self) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == "ci_session")
            .map(|c| c.value.as_str())
    }

    /// Overwrite (or add) a cookie after the fact — used when an action
    /// response sets a fresh `ci_session` mid-flow.
    pub fn set_cookie(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(existing) = self.cookies.iter_mut().find(|c| c.name == name) {
            existing.value = value;
        } else {
            self.cookies.push(CookieSpec {
                name: name.to_string(),
                value,
            });
        }
    }

    /// A plain GET/POST request builder against `path`, pre-populated with
    /// `Cookie` and `User-Agent`. Callers add AJAX headers themselves.
    pub fn request(&self, method: Method, path: &str) -> AppResult<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| AppError::Config(format!("invalid request path {path:?}: {e}")))?;
        let mut builder = self
            .client
            .request(method, url)
            .header(reqwest::header::USER_AGENT, &self.user_agent);
        if !self.cookies.is_empty() {
            builder = builder.header(reqwest::header::COOKIE, self.cookie_header());
        }
        Ok(builder)
    }

    /// AJAX-flavored POST to the action endpoint: adds `X-Requested-With`,
    /// `Origin`, and `Referer` per spec.md §4.E "Session priming".
    pub fn ajax_request(&self, method: Method, path: &str, referer: &str) -> AppResult<RequestBuilder> {
        let origin = format!(
            "{}://{}",
            self.base_url.scheme(),
            self.base_url.host_str().unwrap_or_default()
        );
        Ok(self
            .request(method, path)?
            .header("X-Requested-With", "XMLHttpRequest")
            .header(reqwest::header::ORIGIN, origin)
            .header(reqwest::header::REFERER, referer.to_string()))
    }

    /// Two cheap GETs to warm TLS/keep-alive and the cookie jar before the
    /// trigger burst. Non-fatal: network failures here are swallowed, as
    /// in `network_opt.py`'s `prewarm_session`.
    #[tracing::instrument(name = "http.prewarm", skip(self))]
    pub async fn prewarm(&self) {
        for path in ["/", "/member/booking"] {
            let start = Instant::now();
            match self.request(Method::GET, path) {
                Ok(builder) => match builder.send().await {
                    Ok(resp) => {
                        tracing::debug!(
                            path,
                            status = resp.status().as_u16(),
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "prewarm request completed"
                        );
                    }
                    Err(e) => {
                        tracing::debug!(path, error = %e, "prewarm request failed (non-fatal)");
                    }
                },
                Err(e) => {
                    tracing::debug!(path, error = %e, "prewarm request could not be built");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> HttpSessionFactory {
        HttpSessionFactory::new(&HttpConfig {
            base_url: "https://bromotenggersemeru.id".to_string(),
            pool_size: 10,
            connect_timeout_secs: 1,
            read_timeout_secs: 1,
            submission_timeout_secs: 1,
            user_agent: "test-agent".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn cookie_specs_prefer_job_ci_session_over_global() {
        let cookies = JobCookies {
            ga: Some("ga-val".to_string()),
            ga_session: None,
            ci_session: Some("job-ci".to_string()),
        };
        let specs = build_cookie_specs(&cookies, Some("global-ci"));
        let ci = specs.iter().find(|s| s.name == "ci_session").unwrap();
        assert_eq!(ci.value, "job-ci");
    }

    #[test]
    fn cookie_specs_fall_back_to_global_ci_session() {
        let cookies = JobCookies::default();
        let specs = build_cookie_specs(&cookies, Some("global-ci"));
        let ci = specs.iter().find(|s| s.name == "ci_session").unwrap();
        assert_eq!(ci.value, "global-ci");
    }

    #[test]
    fn cookie_specs_dedupe_last_write_wins() {
        let mut specs = Vec::new();
        let mut upsert = |name: &str, value: String| {
            if let Some(existing) = specs.iter_mut().find(|s: &&mut CookieSpec| s.name == name) {
                existing.value = value;
            } else {
                specs.push(CookieSpec {
                    name: name.to_string(),
                    value,
                });
            }
        };
        upsert("ci_session", "first".to_string());
        upsert("ci_session", "second".to_string());
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].value, "second");
    }

    #[test]
    fn cookie_header_joins_in_order() {
        let session = factory().make_session(
            &JobCookies {
                ga: Some("g1".to_string()),
                ga_session: Some("gs1".to_string()),
                ci_session: Some("ci1".to_string()),
            },
            None,
        );
        assert_eq!(session.cookie_header(), "_ga=g1; _ga_session=gs1; ci_session=ci1");
    }

    #[test]
    fn request_builds_url_relative_to_base() {
        let session = factory().make_session(&JobCookies::default(), None);
        let builder = session.request(Method::GET, "/booking/site/bromo").unwrap();
        let req = builder.build().unwrap();
        assert_eq!(req.url().as_str(), "https://bromotenggersemeru.id/booking/site/bromo");
    }
}
