//! Capacity Probe (spec §4.D): fetch the monthly quota grid and read off
//! one date's row. Network or parse failures are treated as "unknown", not
//! fatal — callers (Protocol Driver, poll track, `view-` diff) simply treat
//! a `None` the same as `available=false` and try again later.

use chrono::{Datelike, NaiveDate};
use reqwest::Method;
use scraper::{Html, Selector};

use crate::http::Session;
use crate::model::CapacityRow;

const CAPACITY_PATH: &str = "/website/home/get_view";

/// POST `{action:kapasitas, id_site, year_month}` and parse the HTML table
/// row for `date`. The response must not be cached — callers probe again
/// at the exact trigger instant.
#[tracing::instrument(name = "capacity.check", skip(session), fields(id_site, %date))]
pub async fn check_capacity(session: &Session, id_site: u32, date: NaiveDate) -> Option<CapacityRow> {
    let body = fetch_capacity_raw(session, id_site, date).await?;
    parse_capacity_html(&body, date)
}

/// POST the same `kapasitas` view and return the raw HTML body, for the
/// `view-` timer track's tick-over-tick diff (spec.md §4.F). Kept separate
/// from [`check_capacity`] because the diff needs the unparsed body while
/// the rest of the engine only ever needs the parsed row.
#[tracing::instrument(name = "capacity.fetch_raw", skip(session), fields(id_site, %date))]
pub async fn fetch_capacity_raw(session: &Session, id_site: u32, date: NaiveDate) -> Option<String> {
    let year_month = date.format("%Y-%m").to_string();
    let id_site_str = id_site.to_string();
    let params = [
        ("action", "kapasitas"),
        ("id_site", id_site_str.as_str()),
        ("year_month", year_month.as_str()),
    ];

    let referer = session.base_url().as_str().to_string();
    let builder = session
        .ajax_request(Method::POST, CAPACITY_PATH, &referer)
        .ok()?;
    let response = builder.form(&params).send().await.ok()?;
    response.text().await.ok()
}

/// Scan every `<tr>` for one whose first `<td>` matches `date`, then take
/// the first numeric cell after it as the quota.
fn parse_capacity_html(html: &str, date: NaiveDate) -> Option<CapacityRow> {
    let document = Html::parse_document(html);
    let row_selector = Selector::parse("tr").ok()?;
    let cell_selector = Selector::parse("td").ok()?;

    let day_plain = date.day().to_string();
    let day_padded = format!("{:02}", date.day());
    let iso = date.format("%Y-%m-%d").to_string();

    for row in document.select(&row_selector) {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|c| c.text().collect::<String>().trim().to_string())
            .collect();
        let Some(date_label) = cells.first() else {
            continue;
        };
        let is_match = date_label == &day_plain || date_label == &day_padded || date_label == &iso;
        if !is_match {
            continue;
        }
        if let Some(quota) = cells.iter().skip(1).find_map(|c| c.parse::<u32>().ok()) {
            return Some(CapacityRow::from_quota(date_label.clone(), quota));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_html(rows: &[(&str, &str)]) -> String {
        let body: String = rows
            .iter()
            .map(|(date, quota)| format!("<tr><td>{date}</td><td>{quota}</td></tr>"))
            .collect();
        format!("<html><body><table>{body}</table></body></html>")
    }

    #[test]
    fn parses_matching_row_with_padded_day() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let html = table_html(&[("30", "2"), ("01", "5")]);
        let row = parse_capacity_html(&html, date).unwrap();
        assert_eq!(row.quota, 5);
        assert!(row.available);
    }

    #[test]
    fn parses_matching_row_with_iso_label() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let html = table_html(&[("2025-10-01", "0")]);
        let row = parse_capacity_html(&html, date).unwrap();
        assert_eq!(row.quota, 0);
        assert!(!row.available);
    }

    #[test]
    fn zero_quota_is_unavailable() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let html = table_html(&[("1", "0")]);
        let row = parse_capacity_html(&html, date).unwrap();
        assert_eq!(row.quota, 0);
        assert!(!row.available);
    }

    #[test]
    fn no_matching_row_returns_none() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let html = table_html(&[("2", "5"), ("3", "1")]);
        assert!(parse_capacity_html(&html, date).is_none());
    }

    #[test]
    fn malformed_html_returns_none_rather_than_panicking() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        assert!(parse_capacity_html("<not even close to a table>", date).is_none());
    }
}
