use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use clinicbook::config::AppConfig;
use clinicbook::handlers;
use clinicbook::services::automation::remote::RemoteAutomationDriver;
use clinicbook::services::conversation::{BookingOrchestrator, OrchestratorSettings, SystemClock};
use clinicbook::services::disambiguation;
use clinicbook::services::otp::{InboundMailbox, MailboxOtpSource};
use clinicbook::services::sessions::SessionStore;
use clinicbook::state::AppState;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    anyhow::ensure!(!config.automation_url.is_empty(), "AUTOMATION_URL must be set");
    if config.api_token.is_empty() {
        tracing::warn!("API_TOKEN is empty, /api routes are open (dev mode)");
    }
    if config.mail_webhook_secret.is_empty() {
        tracing::warn!("MAIL_WEBHOOK_SECRET is empty, /webhook/mail accepts unsigned mail (dev mode)");
    }

    let mailbox = Arc::new(InboundMailbox::new());
    let otp = MailboxOtpSource::new(
        Arc::clone(&mailbox),
        Some(config.otp_subject_filter.clone()),
        config.otp_sender_filter.clone(),
    );
    let driver = RemoteAutomationDriver::new(
        config.automation_url.clone(),
        config.portal_email.clone(),
        config.portal_password.clone(),
        Arc::new(otp),
        Duration::from_secs(config.otp_timeout_secs),
    )?;

    let strategy = disambiguation::from_config(&config.disambiguation_policy);
    tracing::info!(
        automation_url = %config.automation_url,
        disambiguation = strategy.name(),
        name_policy = %config.name_policy,
        "booking orchestrator configured"
    );
    let orchestrator = BookingOrchestrator::new(
        Arc::new(driver),
        strategy,
        OrchestratorSettings::from_config(&config)?,
        Arc::new(SystemClock),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        orchestrator,
        sessions: SessionStore::new(),
        mailbox,
    });

    let purge_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let now = purge_state.orchestrator.now();
            purge_state.sessions.purge_expired(now);
        }
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/webhook/mail", post(handlers::mail::inbound_mail))
        .route("/api/sessions", post(handlers::sessions::create_session))
        .route(
            "/api/sessions/:id",
            get(handlers::sessions::get_session).delete(handlers::sessions::end_session),
        )
        .route("/api/sessions/:id/turn", post(handlers::sessions::take_turn))
        .route("/api/portal/login", post(handlers::portal::login))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
