use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[async_trait]
pub trait OtpSource: Send + Sync {
    /// Waits up to `timeout` for a verification code. `None` when none arrived.
    async fn get_otp(&self, timeout: Duration) -> Option<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEmail {
    pub from: String,
    pub subject: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
}

/// Verification mail is only useful for a few minutes.
const MAIL_RETENTION: Duration = Duration::from_secs(10 * 60);
const MAX_UNSEEN: usize = 32;

struct Delivered {
    email: InboundEmail,
    received_at: Instant,
}

/// Unseen messages delivered by the inbound-mail webhook. Messages older than
/// the retention window are dropped, and only the newest `MAX_UNSEEN` are kept.
#[derive(Default)]
pub struct InboundMailbox {
    unseen: Mutex<Vec<Delivered>>,
    arrived: Notify,
}

impl InboundMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, email: InboundEmail) {
        if let Ok(mut unseen) = self.unseen.lock() {
            let now = Instant::now();
            unseen.push(Delivered {
                email,
                received_at: now,
            });
            prune(&mut unseen, now);
        }
        self.arrived.notify_waiters();
    }

    /// Removes and returns the newest unseen message matching the filters.
    /// Older matching messages are discarded with it.
    pub fn take_latest(
        &self,
        subject_filter: Option<&str>,
        sender_filter: Option<&str>,
    ) -> Option<InboundEmail> {
        let mut unseen = self.unseen.lock().ok()?;
        prune(&mut unseen, Instant::now());
        let matches = |email: &InboundEmail| {
            subject_filter
                .map(|f| contains_ignore_case(&email.subject, f))
                .unwrap_or(true)
                && sender_filter
                    .map(|f| contains_ignore_case(&email.from, f))
                    .unwrap_or(true)
        };
        let index = unseen.iter().rposition(|d| matches(&d.email))?;
        let latest = unseen.remove(index);

        let mut position = 0;
        unseen.retain(|d| {
            position += 1;
            position > index || !matches(&d.email)
        });
        Some(latest.email)
    }

    pub fn unseen_count(&self) -> usize {
        self.unseen.lock().map(|u| u.len()).unwrap_or(0)
    }
}

fn prune(unseen: &mut Vec<Delivered>, now: Instant) {
    unseen.retain(|d| now.saturating_duration_since(d.received_at) < MAIL_RETENTION);
    if unseen.len() > MAX_UNSEEN {
        let excess = unseen.len() - MAX_UNSEEN;
        unseen.drain(..excess);
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

pub struct MailboxOtpSource {
    mailbox: std::sync::Arc<InboundMailbox>,
    subject_filter: Option<String>,
    sender_filter: Option<String>,
}

impl MailboxOtpSource {
    pub fn new(
        mailbox: std::sync::Arc<InboundMailbox>,
        subject_filter: Option<String>,
        sender_filter: Option<String>,
    ) -> Self {
        Self {
            mailbox,
            subject_filter,
            sender_filter,
        }
    }
}

#[async_trait]
impl OtpSource for MailboxOtpSource {
    async fn get_otp(&self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;

        loop {
            while let Some(email) = self
                .mailbox
                .take_latest(self.subject_filter.as_deref(), self.sender_filter.as_deref())
            {
                if let Some(code) = extract_otp(&email) {
                    tracing::info!(from = %email.from, "verification code received");
                    return Some(code);
                }
                tracing::debug!(subject = %email.subject, "matching email had no code");
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(timeout_secs = timeout.as_secs(), "verification code not received");
                return None;
            }
            let wait = POLL_INTERVAL.min(deadline - now);
            let _ = tokio::time::timeout(wait, self.mailbox.arrived.notified()).await;
        }
    }
}

fn plain_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A leading '#' means a CSS colour, not a code.
    RE.get_or_init(|| Regex::new(r"(?:^|[^#\w])(\d{6})\b").expect("valid regex"))
}

fn heading_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<h2[^>]*>\s*(\d{6})\s*</h2>").expect("valid regex"))
}

fn text_node_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r">\s*(\d{6})\s*<").expect("valid regex"))
}

pub fn extract_otp(email: &InboundEmail) -> Option<String> {
    if let Some(code) = email.text.as_deref().and_then(extract_plain_code) {
        return Some(code);
    }
    email.html.as_deref().and_then(extract_html_code)
}

pub fn extract_plain_code(text: &str) -> Option<String> {
    plain_code_re()
        .captures(text)
        .map(|caps| caps[1].to_string())
}

pub fn extract_html_code(html: &str) -> Option<String> {
    heading_code_re()
        .captures(html)
        .or_else(|| text_node_code_re().captures(html))
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn email(subject: &str, text: Option<&str>, html: Option<&str>) -> InboundEmail {
        InboundEmail {
            from: "no-reply@gethealthie.com".to_string(),
            subject: subject.to_string(),
            text: text.map(str::to_string),
            html: html.map(str::to_string),
        }
    }

    #[test]
    fn test_plain_code() {
        assert_eq!(
            extract_plain_code("Your sign-in code is 482913. It expires soon."),
            Some("482913".to_string())
        );
        assert_eq!(extract_plain_code("482913"), Some("482913".to_string()));
    }

    #[test]
    fn test_plain_code_skips_colours_and_long_numbers() {
        assert_eq!(
            extract_plain_code("color: #123456; ref 12345678 then 654321"),
            Some("654321".to_string())
        );
        assert_eq!(extract_plain_code("no code here"), None);
    }

    #[test]
    fn test_html_code() {
        let html = r##"<div style="color:#112233"><H2 class="code"> 771204 </H2></div>"##;
        assert_eq!(extract_html_code(html), Some("771204".to_string()));
        let html = r#"<td><span>  300150 </span></td>"#;
        assert_eq!(extract_html_code(html), Some("300150".to_string()));
    }

    #[test]
    fn test_extract_prefers_text_part() {
        let e = email("Sign-in verification code", Some("code 111111"), Some("<h2>222222</h2>"));
        assert_eq!(extract_otp(&e), Some("111111".to_string()));
        let e = email("Sign-in verification code", Some("nothing"), Some("<h2>222222</h2>"));
        assert_eq!(extract_otp(&e), Some("222222".to_string()));
    }

    #[test]
    fn test_take_latest_filters() {
        let mailbox = InboundMailbox::new();
        mailbox.deliver(email("Sign-in verification code", Some("123456"), None));
        mailbox.deliver(email("Weekly newsletter", Some("999999"), None));
        mailbox.deliver(email("Sign-in verification code", Some("654321"), None));

        let latest = mailbox
            .take_latest(Some("sign-in verification"), Some("gethealthie"))
            .unwrap();
        assert_eq!(latest.text.as_deref(), Some("654321"));
        // The older code went with it; the newsletter stays.
        assert_eq!(mailbox.unseen_count(), 1);
        assert!(mailbox.take_latest(Some("sign-in"), Some("someone-else")).is_none());
    }

    #[test]
    fn test_mailbox_is_capped() {
        let mailbox = InboundMailbox::new();
        for i in 0..(MAX_UNSEEN + 10) {
            mailbox.deliver(email(&format!("Spam {i}"), Some("hello"), None));
        }
        assert_eq!(mailbox.unseen_count(), MAX_UNSEEN);
        assert!(mailbox.take_latest(Some("Spam 0"), None).is_none());
        assert!(mailbox.take_latest(Some("Spam 41"), None).is_some());
    }

    #[test]
    fn test_prune_drops_stale_mail() {
        let start = Instant::now();
        let mut unseen = vec![
            Delivered {
                email: email("Sign-in verification code", Some("111111"), None),
                received_at: start,
            },
            Delivered {
                email: email("Sign-in verification code", Some("222222"), None),
                received_at: start + Duration::from_secs(9 * 60),
            },
        ];
        prune(&mut unseen, start + MAIL_RETENTION + Duration::from_secs(1));
        assert_eq!(unseen.len(), 1);
        assert_eq!(unseen[0].email.text.as_deref(), Some("222222"));
    }

    #[tokio::test]
    async fn test_get_otp_waits_for_delivery() {
        let mailbox = Arc::new(InboundMailbox::new());
        let source = MailboxOtpSource::new(
            mailbox.clone(),
            Some("Sign-in verification code".to_string()),
            None,
        );

        let sender = mailbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            sender.deliver(email("Sign-in verification code", Some("Code: 246810"), None));
        });

        let code = source.get_otp(Duration::from_secs(5)).await;
        assert_eq!(code.as_deref(), Some("246810"));
    }

    #[tokio::test]
    async fn test_get_otp_times_out() {
        let mailbox = Arc::new(InboundMailbox::new());
        mailbox.deliver(email("Unrelated", Some("123456"), None));
        let source = MailboxOtpSource::new(mailbox, Some("Sign-in".to_string()), None);

        let code = source.get_otp(Duration::from_millis(100)).await;
        assert_eq!(code, None);
    }
}
