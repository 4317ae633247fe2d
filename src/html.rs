//! Embedded booking-page descriptor extraction (spec §4.E "Token
//! acquisition", §9 "HTML-embedded state").
//!
//! The site embeds `{secret, form_hash}` in one of three shapes depending on
//! the page build; we try each in order and short-circuit on first success.
//! A total miss is fatal and carries the raw HTML so the caller can archive
//! it for debugging, per spec.md §4.E.

use scraper::{Html, Selector};
use serde_json::Value;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDescriptor {
    pub secret: String,
    pub form_hash: String,
}

/// Parse `{secret, form_hash}` out of a booking page's HTML, trying in
/// order: a `.cnt-page` element, a `<script id="cnt-page"
/// type="application/json">`, then any inline `<script>` whose text
/// contains both `"booking"` and `"secret"` (innermost balanced `{...}`
/// that parses and carries both keys wins).
pub fn extract_descriptor(html: &str) -> AppResult<PageDescriptor> {
    let document = Html::parse_document(html);

    if let Some(d) = try_class_holder(&document) {
        return Ok(d);
    }
    if let Some(d) = try_typed_script(&document) {
        return Ok(d);
    }
    if let Some(d) = try_inline_script_cascade(&document) {
        return Ok(d);
    }

    Err(AppError::TokenExtraction(html.to_string()))
}

fn try_class_holder(document: &Html) -> Option<PageDescriptor> {
    let selector = Selector::parse(".cnt-page").ok()?;
    let el = document.select(&selector).next()?;
    let text = el.text().collect::<String>();
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    descriptor_from_value(&value)
}

fn try_typed_script(document: &Html) -> Option<PageDescriptor> {
    let selector = Selector::parse(r#"script#cnt-page[type="application/json"]"#).ok()?;
    let el = document.select(&selector).next()?;
    let text = el.text().collect::<String>();
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    descriptor_from_value(&value)
}

fn try_inline_script_cascade(document: &Html) -> Option<PageDescriptor> {
    let selector = Selector::parse("script").ok()?;
    for el in document.select(&selector) {
        let text = el.text().collect::<String>();
        if text.contains("booking") && text.contains("secret") {
            if let Some(value) = innermost_balanced_object(&text) {
                if let Some(descriptor) = descriptor_from_value(&value) {
                    return Some(descriptor);
                }
            }
        }
    }
    None
}

/// Scan `text` for every balanced `{...}` substring, try each as JSON
/// shortest-first, and return the first that parses into an object
/// satisfying [`descriptor_from_value`]. "Innermost" here means the
/// smallest balanced span, which for nested JSON literals is the deepest
/// nested object rather than the whole blob.
fn innermost_balanced_object(text: &str) -> Option<Value> {
    let mut stack: Vec<usize> = Vec::new();
    let mut spans: Vec<(usize, usize, usize)> = Vec::new(); // (len, start, end)
    for (i, ch) in text.char_indices() {
        match ch {
            '{' => stack.push(i),
            '}' => {
                if let Some(start) = stack.pop() {
                    let end = i + ch.len_utf8();
                    spans.push((end - start, start, end));
                }
            }
            _ => {}
        }
    }
    spans.sort_by_key(|(len, _, _)| *len);

    for (_, start, end) in spans {
        if let Ok(value) = serde_json::from_str::<Value>(&text[start..end]) {
            if descriptor_from_value(&value).is_some() {
                return Some(value);
            }
        }
    }
    None
}

/// `{secret, form_hash}` either at the object's top level or nested under
/// a `"booking"` key.
fn descriptor_from_value(value: &Value) -> Option<PageDescriptor> {
    let secret = value.get("secret").and_then(Value::as_str);
    let form_hash = value.get("form_hash").and_then(Value::as_str);
    if let (Some(secret), Some(form_hash)) = (secret, form_hash) {
        return Some(PageDescriptor {
            secret: secret.to_string(),
            form_hash: form_hash.to_string(),
        });
    }
    value.get("booking").and_then(descriptor_from_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_class_holder() {
        let html = r#"<html><body>
            <div class="cnt-page">{"secret":"abc","form_hash":"xyz"}</div>
        </body></html>"#;
        let d = extract_descriptor(html).unwrap();
        assert_eq!(d.secret, "abc");
        assert_eq!(d.form_hash, "xyz");
    }

    #[test]
    fn extracts_from_typed_script_when_class_holder_absent() {
        let html = r#"<html><body>
            <script id="cnt-page" type="application/json">{"secret":"s1","form_hash":"f1"}</script>
        </body></html>"#;
        let d = extract_descriptor(html).unwrap();
        assert_eq!(d.secret, "s1");
        assert_eq!(d.form_hash, "f1");
    }

    #[test]
    fn extracts_from_inline_script_cascade() {
        let html = r#"<html><body>
            <script>
                window.__APP = {"booking": {"meta": {"x": 1}, "secret": "deep", "form_hash": "deeper"}};
            </script>
        </body></html>"#;
        let d = extract_descriptor(html).unwrap();
        assert_eq!(d.secret, "deep");
        assert_eq!(d.form_hash, "deeper");
    }

    #[test]
    fn picks_innermost_object_when_outer_is_unparseable_json() {
        // The outer object isn't valid JSON (unquoted identifier `window.__APP =`
        // keeps it from parsing directly) — only the nested literal is.
        let html = r#"<html><body>
            <script>
                var config = {foo: function(){}, booking: {"secret":"inner","form_hash":"ih"}};
            </script>
        </body></html>"#;
        let d = extract_descriptor(html).unwrap();
        assert_eq!(d.secret, "inner");
        assert_eq!(d.form_hash, "ih");
    }

    #[test]
    fn missing_descriptor_is_fatal_and_carries_raw_html() {
        let html = "<html><body><p>no descriptor here</p></body></html>";
        let err = extract_descriptor(html).unwrap_err();
        match err {
            AppError::TokenExtraction(raw) => assert!(raw.contains("no descriptor here")),
            other => panic!("expected TokenExtraction, got {other:?}"),
        }
    }
}
