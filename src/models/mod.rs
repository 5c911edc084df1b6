pub mod booking;
pub mod conversation;
pub mod slot;

pub use booking::{
    AppointmentResult, BookingAttempt, FailureCause, PatientCandidate, PatientRef, PatientResult,
    PatientRow, PatientSearch,
};
pub use conversation::{
    ApplyEffect, ConversationMessage, LookupKey, NamePolicy, Session, Slot, Stage,
};
pub use slot::{ClarificationReason, FieldKind, FieldValue, ValidationOutcome};
