//! Booking Lookup (spec §4.H): reconstruct a booking's roster from its
//! confirmation code via two DataTables-style grids. Used by the `job
//! show`/detail control-surface command and by the Semeru duplicate-identity
//! recovery branch (spec §4.E step 5), which needs every existing roster
//! row for a `(secret, date)` pair before it can purge them.

use reqwest::Method;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::html::PageDescriptor;
use crate::http::Session;

const MEMBER_GRID_PATH: &str = "/member/booking/grid";
const PUBLIC_GRID_PATH: &str = "/website/booking/grid";
const PAGE_LENGTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    pub id: String,
    pub name: String,
}

/// Server-side DataTables form fields for a single-term search over
/// `columns`, paged at `(start, length)`.
fn datatables_form(search_value: &str, start: usize, length: usize, columns: &[&str]) -> Vec<(String, String)> {
    let mut params = vec![
        ("draw".to_string(), "1".to_string()),
        ("start".to_string(), start.to_string()),
        ("length".to_string(), length.to_string()),
        ("search[value]".to_string(), search_value.to_string()),
        ("search[regex]".to_string(), "false".to_string()),
    ];
    for (i, name) in columns.iter().enumerate() {
        params.push((format!("columns[{i}][data]"), name.to_string()));
        params.push((format!("columns[{i}][name]"), name.to_string()));
        params.push((format!("columns[{i}][searchable]"), "true".to_string()));
        params.push((format!("columns[{i}][orderable]"), "false".to_string()));
    }
    params
}

/// POST the member-visible grid filtered by `search[value]=code`, returning
/// the `{secret, form_hash}` of the first matching row.
#[tracing::instrument(name = "lookup.by_code", skip(session))]
pub async fn lookup_by_code(session: &Session, code: &str) -> AppResult<PageDescriptor> {
    let columns = ["code", "secret", "form_hash", "name", "date_depart"];
    let params = datatables_form(code, 0, 10, &columns);
    let str_params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    let referer = session.base_url().as_str().to_string();
    let response = session
        .ajax_request(Method::POST, MEMBER_GRID_PATH, &referer)?
        .form(&str_params)
        .send()
        .await
        .map_err(|e| AppError::NetworkTransient(e.to_string()))?;
    let body: Value = response
        .json()
        .await
        .map_err(|e| AppError::NetworkTransient(format!("non-JSON grid response: {e}")))?;

    let row = body
        .get("data")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .ok_or_else(|| AppError::ValidationServer(format!("no booking found for code {code}")))?;

    let secret = row
        .get("secret")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::ValidationServer("grid row missing secret".to_string()))?;
    let form_hash = row
        .get("form_hash")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::ValidationServer("grid row missing form_hash".to_string()))?;

    Ok(PageDescriptor {
        secret: secret.to_string(),
        form_hash: form_hash.to_string(),
    })
}

async fn fetch_roster_page(
    session: &Session,
    secret: &str,
    start: usize,
    length: usize,
) -> AppResult<(Vec<RosterRow>, usize)> {
    let columns = ["id", "name"];
    let params = datatables_form(secret, start, length, &columns);
    let str_params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    let referer = session.base_url().as_str().to_string();
    let response = session
        .ajax_request(Method::POST, PUBLIC_GRID_PATH, &referer)?
        .form(&str_params)
        .send()
        .await
        .map_err(|e| AppError::NetworkTransient(e.to_string()))?;
    let body: Value = response
        .json()
        .await
        .map_err(|e| AppError::NetworkTransient(format!("non-JSON grid response: {e}")))?;

    let total = body
        .get("recordsTotal")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;

    let rows = body
        .get("data")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let id = row.get("id").and_then(Value::as_str)?.to_string();
                    let name = row.get("name").and_then(Value::as_str).unwrap_or("").to_string();
                    Some(RosterRow { id, name })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok((rows, total))
}

/// Enumerate every roster row belonging to `secret` by paging the public
/// booking grid with DataTables `start`/`length`.
#[tracing::instrument(name = "lookup.roster_rows", skip(session))]
pub async fn list_roster_rows(session: &Session, secret: &str) -> AppResult<Vec<RosterRow>> {
    let mut rows = Vec::new();
    let mut start = 0usize;
    loop {
        let (page, total) = fetch_roster_page(session, secret, start, PAGE_LENGTH).await?;
        let page_len = page.len();
        rows.extend(page);
        start += PAGE_LENGTH;
        if page_len < PAGE_LENGTH || rows.len() >= total {
            break;
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datatables_form_includes_paging_and_columns() {
        let params = datatables_form("BTS-1", 50, 25, &["id", "name"]);
        assert!(params.contains(&("start".to_string(), "50".to_string())));
        assert!(params.contains(&("length".to_string(), "25".to_string())));
        assert!(params.contains(&("search[value]".to_string(), "BTS-1".to_string())));
        assert!(params.contains(&("columns[0][data]".to_string(), "id".to_string())));
        assert!(params.contains(&("columns[1][data]".to_string(), "name".to_string())));
    }
}
