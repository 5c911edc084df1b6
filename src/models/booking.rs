use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a patient record in the clinic portal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientRef(pub String);

impl PatientRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PatientRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientCandidate {
    pub patient_ref: Option<PatientRef>,
    pub display_name: String,
    pub birthdate: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatientResult {
    Found {
        patient_ref: PatientRef,
        display_name: String,
    },
    NotFound,
    AmbiguousMultipleMatches(Vec<PatientCandidate>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppointmentResult {
    Booked { meeting_link: String },
    SlotTaken,
    Failed(FailureCause),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    PastDate,
    Rejected(String),
    NotConfirmed,
    MissingMeetingLink,
    Unknown(String),
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCause::PastDate => "past_date",
            FailureCause::Rejected(_) => "rejected",
            FailureCause::NotConfirmed => "not_confirmed",
            FailureCause::MissingMeetingLink => "missing_meeting_link",
            FailureCause::Unknown(_) => "unknown",
        }
    }
}

// ── Raw driver outcomes ──

/// What the clients list showed after searching by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientSearch {
    #[serde(default)]
    pub no_results_banner: bool,
    #[serde(default)]
    pub rows: Vec<PatientRow>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientRow {
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// What the appointment modal and appointments list showed after submitting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingAttempt {
    #[serde(default)]
    pub flash_message: Option<String>,
    #[serde(default)]
    pub past_date_rejected: bool,
    #[serde(default)]
    pub appointment_visible: bool,
    #[serde(default)]
    pub meeting_link: Option<String>,
}
