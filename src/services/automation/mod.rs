pub mod remote;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};

use crate::models::{BookingAttempt, PatientRef, PatientSearch};

/// Drives the clinic portal UI. Returns what the screen showed; the
/// interpreter turns that into booking signals.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    async fn login(&self) -> anyhow::Result<()>;

    async fn find_patient(&self, name: &str, birthdate: NaiveDate)
        -> anyhow::Result<PatientSearch>;

    async fn create_appointment(
        &self,
        patient_ref: &PatientRef,
        date: NaiveDate,
        time: NaiveTime,
    ) -> anyhow::Result<BookingAttempt>;
}
