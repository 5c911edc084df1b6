use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use super::AutomationDriver;
use crate::models::{BookingAttempt, PatientRef, PatientSearch};
use crate::services::dates::{format_driver_date, format_driver_time};
use crate::services::otp::OtpSource;

/// UI flows in the portal (search, calendar paging) are slow.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum LoginResponse {
    Ok,
    OtpRequired,
    Failed {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Talks to the browser automation sidecar that owns the portal session.
pub struct RemoteAutomationDriver {
    base_url: String,
    email: String,
    password: String,
    otp: Arc<dyn OtpSource>,
    otp_timeout: Duration,
    client: reqwest::Client,
    logged_in: Mutex<bool>,
}

impl RemoteAutomationDriver {
    pub fn new(
        base_url: String,
        email: String,
        password: String,
        otp: Arc<dyn OtpSource>,
        otp_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build automation HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            email,
            password,
            otp,
            otp_timeout,
            client,
            logged_in: Mutex::new(false),
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<T> {
        let resp = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to call automation service {path}"))?
            .error_for_status()
            .context("automation service returned error")?;

        resp.json::<T>()
            .await
            .with_context(|| format!("failed to parse automation response from {path}"))
    }

    /// Posts on the portal session, logging in first. When the sidecar says
    /// the session is gone the call is retried once after a fresh login.
    async fn post_authenticated<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<T> {
        self.login().await?;
        match self.post(path, body).await {
            Ok(resp) => Ok(resp),
            Err(e) if session_expired(&e) => {
                tracing::warn!(path, "portal session expired, logging in again");
                self.invalidate_session().await;
                self.login().await?;
                self.post(path, body).await
            }
            Err(e) => {
                self.invalidate_session().await;
                Err(e)
            }
        }
    }

    async fn invalidate_session(&self) {
        *self.logged_in.lock().await = false;
    }
}

fn session_expired(err: &anyhow::Error) -> bool {
    err.downcast_ref::<reqwest::Error>()
        .and_then(reqwest::Error::status)
        .map(|s| s == StatusCode::UNAUTHORIZED || s == StatusCode::FORBIDDEN)
        .unwrap_or(false)
}

#[async_trait]
impl AutomationDriver for RemoteAutomationDriver {
    async fn login(&self) -> anyhow::Result<()> {
        let mut logged_in = self.logged_in.lock().await;
        if *logged_in {
            return Ok(());
        }

        tracing::info!("logging into clinic portal");
        let resp: LoginResponse = self
            .post(
                "/session/login",
                &json!({ "email": self.email, "password": self.password }),
            )
            .await?;

        match resp {
            LoginResponse::Ok => {}
            LoginResponse::OtpRequired => {
                tracing::info!("portal requested a verification code");
                let code = self
                    .otp
                    .get_otp(self.otp_timeout)
                    .await
                    .ok_or_else(|| anyhow::anyhow!("verification code not received"))?;

                let resp: LoginResponse = self.post("/session/otp", &json!({ "code": code })).await?;
                match resp {
                    LoginResponse::Ok => {}
                    LoginResponse::OtpRequired => {
                        anyhow::bail!("portal rejected the verification code")
                    }
                    LoginResponse::Failed { reason } => anyhow::bail!(
                        "portal login failed after verification: {}",
                        reason.unwrap_or_default()
                    ),
                }
            }
            LoginResponse::Failed { reason } => {
                anyhow::bail!("portal login failed: {}", reason.unwrap_or_default())
            }
        }

        tracing::info!("logged into clinic portal");
        *logged_in = true;
        Ok(())
    }

    async fn find_patient(
        &self,
        name: &str,
        birthdate: NaiveDate,
    ) -> anyhow::Result<PatientSearch> {
        tracing::info!(name, %birthdate, "searching portal for patient");

        self.post_authenticated(
            "/patients/search",
            &json!({
                "name": name,
                "date_of_birth": format_driver_date(birthdate),
            }),
        )
        .await
    }

    async fn create_appointment(
        &self,
        patient_ref: &PatientRef,
        date: NaiveDate,
        time: NaiveTime,
    ) -> anyhow::Result<BookingAttempt> {
        tracing::info!(patient = %patient_ref, %date, %time, "creating appointment");

        self.post_authenticated(
            "/appointments",
            &json!({
                "patient_id": patient_ref.as_str(),
                "date": format_driver_date(date),
                "time": format_driver_time(time),
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::State;
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::post;
    use axum::{Json, Router};

    struct NoOtp;

    #[async_trait]
    impl OtpSource for NoOtp {
        async fn get_otp(&self, _timeout: Duration) -> Option<String> {
            None
        }
    }

    /// Sidecar whose portal session expires after the first search.
    #[derive(Default)]
    struct Sidecar {
        logins: AtomicUsize,
        searches: AtomicUsize,
    }

    async fn sidecar_login(State(sidecar): State<Arc<Sidecar>>) -> Json<serde_json::Value> {
        sidecar.logins.fetch_add(1, Ordering::SeqCst);
        Json(json!({ "status": "ok" }))
    }

    async fn sidecar_search(
        State(sidecar): State<Arc<Sidecar>>,
    ) -> Result<Json<serde_json::Value>, HttpStatus> {
        let n = sidecar.searches.fetch_add(1, Ordering::SeqCst);
        let logins = sidecar.logins.load(Ordering::SeqCst);
        // The second search lands after the portal dropped the first login.
        if n >= 1 && logins < 2 {
            return Err(HttpStatus::UNAUTHORIZED);
        }
        Ok(Json(json!({
            "rows": [{ "patient_id": "13632834", "name": "Noel Nathan Planell Bosch" }]
        })))
    }

    async fn spawn_sidecar() -> (String, Arc<Sidecar>) {
        let sidecar = Arc::new(Sidecar::default());
        let app = Router::new()
            .route("/session/login", post(sidecar_login))
            .route("/patients/search", post(sidecar_search))
            .with_state(Arc::clone(&sidecar));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), sidecar)
    }

    fn driver(base_url: String) -> RemoteAutomationDriver {
        RemoteAutomationDriver::new(
            base_url,
            "front-desk@example.com".to_string(),
            "secret".to_string(),
            Arc::new(NoOtp),
            Duration::from_millis(10),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_logs_in_again_when_session_expires() {
        let (base_url, sidecar) = spawn_sidecar().await;
        let driver = driver(base_url);
        let birthdate = NaiveDate::from_ymd_opt(2003, 8, 28).unwrap();

        let first = driver.find_patient("Noel Nathan Planell Bosch", birthdate).await.unwrap();
        assert_eq!(first.rows.len(), 1);
        assert_eq!(sidecar.logins.load(Ordering::SeqCst), 1);

        let second = driver.find_patient("Noel Nathan Planell Bosch", birthdate).await.unwrap();
        assert_eq!(second.rows[0].patient_id.as_deref(), Some("13632834"));
        assert_eq!(sidecar.logins.load(Ordering::SeqCst), 2);
        assert_eq!(sidecar.searches.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_session_expired_only_for_auth_statuses() {
        assert!(!session_expired(&anyhow::anyhow!("connection refused")));
    }

    #[test]
    fn test_login_response_shapes() {
        let ok: LoginResponse = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert!(matches!(ok, LoginResponse::Ok));

        let otp: LoginResponse = serde_json::from_str(r#"{"status":"otp_required"}"#).unwrap();
        assert!(matches!(otp, LoginResponse::OtpRequired));

        let failed: LoginResponse =
            serde_json::from_str(r#"{"status":"failed","reason":"still on sign-in page"}"#).unwrap();
        match failed {
            LoginResponse::Failed { reason } => {
                assert_eq!(reason.as_deref(), Some("still on sign-in page"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_raw_outcomes_tolerate_missing_fields() {
        let search: PatientSearch =
            serde_json::from_str(r#"{"rows":[{"patient_id":"13632834","name":"Noel Nathan Planell Bosch"}]}"#)
                .unwrap();
        assert!(!search.no_results_banner);
        assert_eq!(search.rows.len(), 1);
        assert_eq!(search.rows[0].date_of_birth, None);

        let attempt: BookingAttempt =
            serde_json::from_str(r#"{"flash_message":"You have another event scheduled at this time"}"#)
                .unwrap();
        assert!(!attempt.appointment_visible);
        assert!(attempt.meeting_link.is_none());
    }
}
