//! Token acquisition and session priming (spec §4.E).

use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::Value;

use super::errors::is_session_expired;
use crate::error::{AppError, AppResult};
use crate::html::{extract_descriptor, PageDescriptor};
use crate::http::Session;
use crate::model::Site;

const ACTION_PATH: &str = "/website/booking/action";

/// GET the booking page with a cache-busting query and pull `{secret,
/// form_hash}` out of its embedded descriptor.
#[tracing::instrument(name = "protocol.fetch_descriptor", skip(session))]
pub async fn fetch_descriptor(session: &Session, site: Site, date: NaiveDate) -> AppResult<PageDescriptor> {
    let path = format!(
        "/booking/site/{}?date_depart={}&_={}",
        site.slug(),
        date.format("%Y-%m-%d"),
        Utc::now().timestamp_millis(),
    );
    let response = session
        .request(Method::GET, &path)?
        .send()
        .await
        .map_err(|e| AppError::NetworkTransient(e.to_string()))?;
    let html = response
        .text()
        .await
        .map_err(|e| AppError::NetworkTransient(e.to_string()))?;
    extract_descriptor(&html)
}

/// `update_hash` then `validate_booking` against the action endpoint.
/// Either failing is fatal to this attempt (spec.md §4.E "Session
/// priming": "Failures here are fatal").
#[tracing::instrument(name = "protocol.prime_session", skip(session, descriptor))]
pub async fn prime_session(
    session: &Session,
    descriptor: &PageDescriptor,
    referer: &str,
) -> AppResult<()> {
    send_action(
        session,
        referer,
        &[
            ("action", "update_hash"),
            ("secret", &descriptor.secret),
            ("form_hash", &descriptor.form_hash),
        ],
    )
    .await?;

    send_action(
        session,
        referer,
        &[
            ("action", "validate_booking"),
            ("secret", &descriptor.secret),
            ("form_hash", &descriptor.form_hash),
        ],
    )
    .await?;
    Ok(())
}

/// POST one action-endpoint request and decode its JSON envelope. Maps a
/// non-`status: true` response to [`AppError::SessionExpired`] or
/// [`AppError::ValidationServer`] (depending on the message text) and a
/// transport failure to [`AppError::NetworkTransient`] so callers can
/// pattern-match without re-parsing.
pub async fn send_action(session: &Session, referer: &str, params: &[(&str, &str)]) -> AppResult<Value> {
    let builder = session
        .ajax_request(Method::POST, ACTION_PATH, referer)?
        .form(params);
    send_and_decode(builder).await
}

/// Like [`send_action`] but overrides the client's default read timeout
/// with `timeout` — used for `do_booking`, the one call on the happy path
/// the site's own submission budget (spec.md §5) runs longer than the
/// general AJAX timeout.
pub async fn send_submission_action(
    session: &Session,
    referer: &str,
    params: &[(&str, &str)],
    timeout: std::time::Duration,
) -> AppResult<Value> {
    let builder = session
        .ajax_request(Method::POST, ACTION_PATH, referer)?
        .timeout(timeout)
        .form(params);
    send_and_decode(builder).await
}

async fn send_and_decode(builder: reqwest::RequestBuilder) -> AppResult<Value> {
    let response = builder
        .send()
        .await
        .map_err(|e| AppError::NetworkTransient(e.to_string()))?;

    if response.status().is_server_error() {
        return Err(AppError::NetworkTransient(format!(
            "upstream returned {}",
            response.status()
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| AppError::NetworkTransient(format!("non-JSON response: {e}")))?;

    let status_ok = body.get("status").and_then(Value::as_bool).unwrap_or(false);
    if !status_ok {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("upstream rejected the request")
            .to_string();
        if is_session_expired(&message) {
            return Err(AppError::SessionExpired(message));
        }
        return Err(AppError::ValidationServer(message));
    }
    Ok(body)
}
