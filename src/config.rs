use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    /// Bearer token for `/api/*`. Empty disables the check (dev mode).
    pub api_token: String,
    pub automation_url: String,
    pub portal_base_url: String,
    pub portal_email: String,
    pub portal_password: String,
    /// Shared secret signing `/webhook/mail` bodies. Empty disables the check (dev mode).
    pub mail_webhook_secret: String,
    pub otp_subject_filter: String,
    pub otp_sender_filter: Option<String>,
    pub otp_timeout_secs: u64,
    pub session_ttl_minutes: i64,
    pub max_lookup_attempts: u32,
    pub max_booking_attempts: u32,
    pub max_clarifications: u32,
    pub name_policy: String,
    /// `birthdate_match` unless set. The portal's own behaviour of taking the
    /// first of several matches is still available as `first_match`.
    pub disambiguation_policy: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parsed("PORT", 3000),
            api_token: env::var("API_TOKEN").unwrap_or_default(),
            automation_url: env::var("AUTOMATION_URL").unwrap_or_default(),
            portal_base_url: env::var("PORTAL_BASE_URL")
                .unwrap_or_else(|_| "https://secure.gethealthie.com/".to_string()),
            portal_email: env::var("PORTAL_EMAIL").unwrap_or_default(),
            portal_password: env::var("PORTAL_PASSWORD").unwrap_or_default(),
            mail_webhook_secret: env::var("MAIL_WEBHOOK_SECRET").unwrap_or_default(),
            otp_subject_filter: env::var("OTP_SUBJECT_FILTER")
                .unwrap_or_else(|_| "Sign-in verification code".to_string()),
            otp_sender_filter: env::var("OTP_SENDER_FILTER")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            otp_timeout_secs: parsed("OTP_TIMEOUT_SECS", 30),
            session_ttl_minutes: parsed("SESSION_TTL_MINUTES", 30),
            max_lookup_attempts: parsed("MAX_LOOKUP_ATTEMPTS", 3),
            max_booking_attempts: parsed("MAX_BOOKING_ATTEMPTS", 3),
            max_clarifications: parsed("MAX_CLARIFICATIONS", 4),
            name_policy: env::var("NAME_POLICY").unwrap_or_else(|_| "amend".to_string()),
            disambiguation_policy: env::var("DISAMBIGUATION_POLICY")
                .unwrap_or_else(|_| "birthdate_match".to_string()),
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
