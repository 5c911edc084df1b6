use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use clinicbook::config::AppConfig;
use clinicbook::services::automation::remote::RemoteAutomationDriver;
use clinicbook::services::channel::{run_conversation, StdioChannel};
use clinicbook::services::conversation::{BookingOrchestrator, OrchestratorSettings, SystemClock};
use clinicbook::services::disambiguation;
use clinicbook::services::otp::{InboundEmail, InboundMailbox, MailboxOtpSource};

/// Talk to the booking agent from a terminal. The verification code is
/// read from `OTP_CODE` when set, since no mail webhook runs here.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env();
    anyhow::ensure!(!config.automation_url.is_empty(), "AUTOMATION_URL must be set");

    let mailbox = Arc::new(InboundMailbox::new());
    if let Ok(code) = std::env::var("OTP_CODE") {
        mailbox.deliver(InboundEmail {
            from: "console".to_string(),
            subject: config.otp_subject_filter.clone(),
            text: Some(code),
            html: None,
        });
    }
    let otp = MailboxOtpSource::new(
        mailbox,
        Some(config.otp_subject_filter.clone()),
        None,
    );
    let driver = RemoteAutomationDriver::new(
        config.automation_url.clone(),
        config.portal_email.clone(),
        config.portal_password.clone(),
        Arc::new(otp),
        Duration::from_secs(config.otp_timeout_secs),
    )?;

    let orchestrator = BookingOrchestrator::new(
        Arc::new(driver),
        disambiguation::from_config(&config.disambiguation_policy),
        OrchestratorSettings::from_config(&config)?,
        Arc::new(SystemClock),
    );

    let session = run_conversation(&StdioChannel::new(), &orchestrator).await?;
    eprintln!(
        "conversation ended in stage {} after {} messages",
        session.stage.as_str(),
        session.messages.len()
    );
    Ok(())
}
