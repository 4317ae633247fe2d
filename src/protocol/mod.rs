//! Protocol Driver (spec §4.E): the multi-step upstream booking flow.
//!
//! `book()` is intentionally infallible at the type level — it always
//! returns an [`Outcome`], swallowing internal errors into
//! `Outcome{success:false, message, ..}` — because that is the contract
//! spec.md §4.E names (`book(...) -> Outcome`). The short-window aggressive
//! retry envelope around repeated `book()` calls lives in the orchestrator,
//! which owns the `DecorrelatedJitter` instances (spec.md §9).

pub mod bromo;
pub mod errors;
pub mod semeru;
pub mod token;

use std::time::Instant;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::capacity::check_capacity;
use crate::error::AppError;
use crate::http::Session;
use crate::model::{Outcome, Profile, Site};

/// Country-code placeholder the upstream roster forms require on every
/// member/passenger row; the site has no real use for it beyond "present".
const DEFAULT_COUNTRY_ID: &str = "99";

/// The exact `Outcome::message` `book()` produces on a capacity-precondition
/// miss. The orchestrator matches on this to decide "arm a poll timer"
/// rather than "report a terminal failure" (spec.md §4.F).
pub fn quota_unavailable_message() -> String {
    AppError::QuotaUnavailable.to_string()
}

/// Drive one full booking attempt: capacity precondition, token acquisition,
/// session priming, then the site-specific submission path.
#[tracing::instrument(name = "protocol.book", skip(session, profile), fields(site = site.as_str(), %date))]
pub async fn book(session: &mut Session, id_site: u32, site: Site, date: NaiveDate, profile: &Profile) -> Outcome {
    let start = Instant::now();

    let capacity = check_capacity(session, id_site, date).await;
    if !capacity.map(|c| c.available).unwrap_or(false) {
        return Outcome {
            success: false,
            message: quota_unavailable_message(),
            link: None,
            booking_code: None,
            raw: String::new(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
    }

    match run_submission(session, id_site, site, date, profile).await {
        Ok(mut outcome) => {
            outcome.elapsed_ms = start.elapsed().as_millis() as u64;
            outcome
        }
        Err(e) => Outcome {
            success: false,
            message: e.to_string(),
            link: None,
            booking_code: None,
            raw: String::new(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        },
    }
}

async fn run_submission(
    session: &mut Session,
    id_site: u32,
    site: Site,
    date: NaiveDate,
    profile: &Profile,
) -> crate::error::AppResult<Outcome> {
    let descriptor = token::fetch_descriptor(session, site, date).await?;
    let referer = format!("{}booking/site/{}", session.base_url(), site.slug());
    token::prime_session(session, &descriptor, &referer).await?;

    match profile {
        Profile::Bromo(p) => bromo::submit(session, &referer, date, p, &descriptor).await,
        Profile::Semeru(p) => semeru::submit(session, &referer, id_site, date, p, &descriptor).await,
    }
}

/// Build an [`Outcome`] from a successful action-endpoint JSON body,
/// extracting the booking code and link per spec.md §4.E's cascade.
fn outcome_from_response(body: &Value) -> Outcome {
    let link = body
        .get("link")
        .and_then(Value::as_str)
        .map(str::to_string);
    let booking_code = extract_booking_code(body, link.as_deref());
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("booking submitted")
        .to_string();

    Outcome {
        success: true,
        message,
        link,
        booking_code,
        raw: body.to_string(),
        elapsed_ms: 0,
    }
}

/// Booking code cascade (spec.md §4.E "Booking code extraction"): JSON
/// fields `code|booking_code|bookingCode`, then nested `booking.code`, then
/// `?code=` in the link, then a path segment matching `^[A-Z]{2,}-[0-9-]{6,}$`.
fn extract_booking_code(body: &Value, link: Option<&str>) -> Option<String> {
    for key in ["code", "booking_code", "bookingCode"] {
        if let Some(code) = body.get(key).and_then(Value::as_str) {
            return Some(code.to_string());
        }
    }
    if let Some(code) = body.get("booking").and_then(|b| b.get("code")).and_then(Value::as_str) {
        return Some(code.to_string());
    }
    let link = link?;
    if let Some(code) = code_from_query(link) {
        return Some(code);
    }
    code_from_path_pattern(link)
}

fn code_from_query(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
}

fn code_from_path_pattern(link: &str) -> Option<String> {
    let re = Regex::new(r"[A-Z]{2,}-[0-9-]{6,}").ok()?;
    re.find(link).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_code_from_top_level_field() {
        let body = json!({"status": true, "code": "BTS-20251001-01"});
        assert_eq!(extract_booking_code(&body, None), Some("BTS-20251001-01".to_string()));
    }

    #[test]
    fn extracts_code_from_booking_code_alias() {
        let body = json!({"status": true, "booking_code": "SMR-1"});
        assert_eq!(extract_booking_code(&body, None), Some("SMR-1".to_string()));
    }

    #[test]
    fn extracts_code_from_nested_booking_object() {
        let body = json!({"status": true, "booking": {"code": "NESTED-1"}});
        assert_eq!(extract_booking_code(&body, None), Some("NESTED-1".to_string()));
    }

    #[test]
    fn extracts_code_from_link_query() {
        let body = json!({"status": true, "link": "https://site/detail?code=FROM-QUERY-1"});
        let link = body.get("link").and_then(Value::as_str);
        assert_eq!(extract_booking_code(&body, link), Some("FROM-QUERY-1".to_string()));
    }

    #[test]
    fn extracts_code_from_link_path_pattern() {
        let body = json!({"status": true, "link": "https://site/booking/BTS-202510-001"});
        let link = body.get("link").and_then(Value::as_str);
        assert_eq!(extract_booking_code(&body, link), Some("BTS-202510-001".to_string()));
    }

    #[test]
    fn no_code_anywhere_yields_none() {
        let body = json!({"status": true, "message": "ok"});
        assert_eq!(extract_booking_code(&body, None), None);
    }

    #[test]
    fn outcome_from_response_marks_success_and_captures_raw() {
        let body = json!({"status": true, "code": "X-1", "link": "https://site/x"});
        let outcome = outcome_from_response(&body);
        assert!(outcome.success);
        assert_eq!(outcome.booking_code, Some("X-1".to_string()));
        assert_eq!(outcome.link, Some("https://site/x".to_string()));
    }
}
