use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Name,
    Birthdate,
    AppointmentDate,
    AppointmentTime,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Name => "name",
            FieldKind::Birthdate => "birthdate",
            FieldKind::AppointmentDate => "appointment_date",
            FieldKind::AppointmentTime => "appointment_time",
        }
    }

    /// How the slot is referred to when speaking to the caller.
    pub fn spoken(&self) -> &'static str {
        match self {
            FieldKind::Name => "full name",
            FieldKind::Birthdate => "date of birth",
            FieldKind::AppointmentDate => "appointment date",
            FieldKind::AppointmentTime => "appointment time",
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, FieldKind::Name | FieldKind::Birthdate)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Name(String),
    Date(NaiveDate),
    Time(NaiveTime),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClarificationReason {
    Empty,
    NotAName,
    /// Month and day were heard but no year.
    MissingYear,
    /// Only a month, or a month and year.
    MissingDay,
    RelativeDate,
    /// Numeric date like 03/04/2027 that reads both ways.
    AmbiguousNumericDate { first: u32, second: u32 },
    InvalidDate,
    FutureBirthdate,
    ImplausibleBirthdate,
    PastDate,
    /// Hour without AM/PM, e.g. "at 3".
    AmbiguousMeridiem { hour: u32 },
    InvalidTime,
    TimeAlreadyPassed,
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Accepted(FieldValue),
    NeedsClarification(ClarificationReason),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted(_))
    }

    /// True when the utterance said something about the slot that was wrong,
    /// as opposed to simply not mentioning it.
    pub fn is_substantive_clarification(&self) -> bool {
        matches!(
            self,
            ValidationOutcome::NeedsClarification(reason)
                if !matches!(reason, ClarificationReason::Unrecognized | ClarificationReason::Empty)
        )
    }
}
