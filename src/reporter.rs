//! Status Reporter (spec §4.G): normalizes orchestrator events into
//! chat-facing notifications. The sink is the one piece of the "chat
//! surface" collaborator this crate still owns an interface for — message
//! composition and chunking, not delivery (spec.md §1 Out-of-scope).

use async_trait::async_trait;

use crate::error::AppResult;

/// Maximum characters per chunk handed to a sink in one call.
const MAX_CHUNK_CHARS: usize = 3900;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    PlainText,
    Markdown,
}

/// `(chat_id, text, format, preview?)` notification sink. Implementations
/// own delivery (chat API calls, CLI stdout, test capture); this module
/// owns composition and chunking.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, chat_id: &str, text: &str, format: MessageFormat, preview: bool) -> AppResult<()>;
}

/// Mask all but the first 6 and last 4 characters of a cookie value, as
/// spec.md §4.G requires for reminder notifications (`head6…tail4`).
pub fn mask_cookie(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 10 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

/// Split `text` into chunks no longer than [`MAX_CHUNK_CHARS`], breaking on
/// line boundaries where possible so a sink never has to split mid-line.
pub fn chunk_message(text: &str) -> Vec<String> {
    if text.chars().count() <= MAX_CHUNK_CHARS {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if current.chars().count() + line.chars().count() > MAX_CHUNK_CHARS && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if line.chars().count() > MAX_CHUNK_CHARS {
            // A single line longer than the limit: hard-split it.
            for hard_chunk in hard_split(line, MAX_CHUNK_CHARS) {
                chunks.push(hard_chunk);
            }
        } else {
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn hard_split(text: &str, max_len: usize) -> Vec<String> {
    text.chars()
        .collect::<Vec<_>>()
        .chunks(max_len)
        .map(|c| c.iter().collect())
        .collect()
}

/// Status Reporter: composes notifications and hands chunks to a sink.
pub struct StatusReporter {
    sink: std::sync::Arc<dyn NotificationSink>,
}

impl StatusReporter {
    pub fn new(sink: std::sync::Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    async fn deliver(&self, chat_id: &str, text: &str, format: MessageFormat, preview: bool) -> AppResult<()> {
        for chunk in chunk_message(text) {
            self.sink.send(chat_id, &chunk, format, preview).await?;
        }
        Ok(())
    }

    pub async fn scheduling_confirmed(&self, chat_id: &str, job_name: &str, exec_at: &str) -> AppResult<()> {
        let text = format!("✅ Dijadwalkan: `{job_name}`\nWaktu eksekusi: {exec_at}");
        self.deliver(chat_id, &text, MessageFormat::Markdown, false).await
    }

    pub async fn reminder(&self, chat_id: &str, job_name: &str, ci_session: &str) -> AppResult<()> {
        let text = format!(
            "⏰ Pengingat: `{job_name}` akan dieksekusi sebentar lagi.\nci_session: {}",
            mask_cookie(ci_session)
        );
        self.deliver(chat_id, &text, MessageFormat::Markdown, false).await
    }

    pub async fn polling_status(&self, chat_id: &str, job_name: &str, tick: u32) -> AppResult<()> {
        let text = format!("🔄 `{job_name}` masih menunggu kuota (percobaan ke-{tick})…");
        self.deliver(chat_id, &text, MessageFormat::Markdown, false).await
    }

    pub async fn terminal_result(
        &self,
        chat_id: &str,
        job_name: &str,
        success: bool,
        message: &str,
        booking_code: Option<&str>,
        link: Option<&str>,
        elapsed_ms: u64,
    ) -> AppResult<()> {
        let icon = if success { "✅" } else { "❌" };
        let mut text = format!("{icon} `{job_name}`: {message} ({elapsed_ms}ms)");
        if let Some(code) = booking_code {
            text.push_str(&format!("\nKode booking: {code}"));
        }
        if let Some(link) = link {
            text.push_str(&format!("\nLink: {link}"));
        }
        self.deliver(chat_id, &text, MessageFormat::Markdown, link.is_some()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CapturingSink {
        messages: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl NotificationSink for CapturingSink {
        async fn send(&self, chat_id: &str, text: &str, _format: MessageFormat, _preview: bool) -> AppResult<()> {
            self.messages.lock().unwrap().push((chat_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[test]
    fn mask_cookie_keeps_head_and_tail() {
        assert_eq!(mask_cookie("abcdefghijklmnop"), "abcdef…mnop");
    }

    #[test]
    fn mask_cookie_short_value_fully_masked() {
        assert_eq!(mask_cookie("short"), "*****");
    }

    #[test]
    fn chunk_message_under_limit_is_single_chunk() {
        let chunks = chunk_message("short message");
        assert_eq!(chunks, vec!["short message".to_string()]);
    }

    #[test]
    fn chunk_message_splits_long_text_on_line_boundaries() {
        let line = "a".repeat(100) + "\n";
        let text = line.repeat(50); // 5,050 chars > 3900
        let chunks = chunk_message(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= MAX_CHUNK_CHARS);
        }
        assert_eq!(chunks.join(""), text);
    }

    #[tokio::test]
    async fn terminal_result_includes_code_and_link_on_success() {
        let sink = Arc::new(CapturingSink::default());
        let reporter = StatusReporter::new(sink.clone());
        reporter
            .terminal_result("chat-1", "bromo-1-x", true, "BERHASIL", Some("BTS-1"), Some("https://x"), 1234)
            .await
            .unwrap();
        let messages = sink.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("BTS-1"));
        assert!(messages[0].1.contains("https://x"));
    }

    #[tokio::test]
    async fn reminder_masks_cookie() {
        let sink = Arc::new(CapturingSink::default());
        let reporter = StatusReporter::new(sink.clone());
        reporter.reminder("chat-1", "job-a", "super-secret-ci-session-token").await.unwrap();
        let messages = sink.messages.lock().unwrap();
        assert!(!messages[0].1.contains("super-secret-ci-session-token"));
    }
}
