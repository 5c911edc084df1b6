use chrono::{NaiveDate, NaiveTime};
use url::Url;

use crate::models::{
    AppointmentResult, BookingAttempt, FailureCause, PatientCandidate, PatientRef, PatientResult,
    PatientSearch,
};
use crate::services::automation::AutomationDriver;
use crate::services::dates::parse_portal_date;

pub const ANOTHER_EVENT_FLASH: &str = "you have another event scheduled at this time";

pub fn interpret_patient_search(raw: &PatientSearch) -> PatientResult {
    if raw.no_results_banner || raw.rows.is_empty() {
        return PatientResult::NotFound;
    }

    if let [row] = raw.rows.as_slice() {
        return match row.patient_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => PatientResult::Found {
                patient_ref: PatientRef(id.to_string()),
                display_name: row.name.trim().to_string(),
            },
            _ => {
                tracing::warn!(name = %row.name, "patient row has no identifier");
                PatientResult::NotFound
            }
        };
    }

    let candidates = raw
        .rows
        .iter()
        .map(|row| PatientCandidate {
            patient_ref: row
                .patient_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| PatientRef(id.to_string())),
            display_name: row.name.trim().to_string(),
            birthdate: row.date_of_birth.as_deref().and_then(parse_portal_date),
        })
        .collect();
    PatientResult::AmbiguousMultipleMatches(candidates)
}

pub fn interpret_booking(raw: &BookingAttempt, portal_base: &Url) -> AppointmentResult {
    if let Some(flash) = raw.flash_message.as_deref().map(str::trim) {
        if !flash.is_empty() {
            if flash.to_lowercase().contains(ANOTHER_EVENT_FLASH) {
                return AppointmentResult::SlotTaken;
            }
            return AppointmentResult::Failed(FailureCause::Rejected(flash.to_string()));
        }
    }

    if raw.past_date_rejected {
        return AppointmentResult::Failed(FailureCause::PastDate);
    }

    if !raw.appointment_visible {
        return AppointmentResult::Failed(FailureCause::NotConfirmed);
    }

    match raw.meeting_link.as_deref().map(str::trim) {
        Some(link) if !link.is_empty() => match portal_base.join(link) {
            Ok(url) => AppointmentResult::Booked {
                meeting_link: url.to_string(),
            },
            Err(e) => AppointmentResult::Failed(FailureCause::Unknown(format!(
                "unusable meeting link {link}: {e}"
            ))),
        },
        _ => AppointmentResult::Failed(FailureCause::MissingMeetingLink),
    }
}

pub async fn find_patient(
    driver: &dyn AutomationDriver,
    name: &str,
    birthdate: NaiveDate,
) -> PatientResult {
    match driver.find_patient(name, birthdate).await {
        Ok(raw) => interpret_patient_search(&raw),
        Err(e) => {
            tracing::error!(error = %e, name, "patient search failed");
            PatientResult::NotFound
        }
    }
}

pub async fn create_appointment(
    driver: &dyn AutomationDriver,
    patient_ref: &PatientRef,
    date: NaiveDate,
    time: NaiveTime,
    portal_base: &Url,
) -> AppointmentResult {
    match driver.create_appointment(patient_ref, date, time).await {
        Ok(raw) => interpret_booking(&raw, portal_base),
        Err(e) => {
            tracing::error!(error = %e, patient = %patient_ref, "appointment creation failed");
            AppointmentResult::Failed(FailureCause::Unknown(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatientRow;

    fn base() -> Url {
        Url::parse("https://secure.gethealthie.com/").unwrap()
    }

    fn row(id: Option<&str>, name: &str, dob: Option<&str>) -> PatientRow {
        PatientRow {
            patient_id: id.map(str::to_string),
            name: name.to_string(),
            date_of_birth: dob.map(str::to_string),
            email: None,
            phone_number: None,
        }
    }

    #[test]
    fn test_no_results_banner() {
        let raw = PatientSearch {
            no_results_banner: true,
            rows: vec![],
        };
        assert_eq!(interpret_patient_search(&raw), PatientResult::NotFound);
    }

    #[test]
    fn test_zero_rows() {
        assert_eq!(
            interpret_patient_search(&PatientSearch::default()),
            PatientResult::NotFound
        );
    }

    #[test]
    fn test_exactly_one_row() {
        let raw = PatientSearch {
            no_results_banner: false,
            rows: vec![row(Some("13632834"), "Noel Nathan Planell Bosch", Some("Aug 28, 2003"))],
        };
        assert_eq!(
            interpret_patient_search(&raw),
            PatientResult::Found {
                patient_ref: PatientRef("13632834".to_string()),
                display_name: "Noel Nathan Planell Bosch".to_string(),
            }
        );
    }

    #[test]
    fn test_row_without_id_is_not_found() {
        let raw = PatientSearch {
            no_results_banner: false,
            rows: vec![row(Some("  "), "Noel Bosch", None)],
        };
        assert_eq!(interpret_patient_search(&raw), PatientResult::NotFound);
    }

    #[test]
    fn test_multiple_rows() {
        let raw = PatientSearch {
            no_results_banner: false,
            rows: vec![
                row(Some("1"), "Noel Bosch", Some("Aug 28, 2003")),
                row(None, "Noel Bosch", Some("not a date")),
            ],
        };
        match interpret_patient_search(&raw) {
            PatientResult::AmbiguousMultipleMatches(candidates) => {
                assert_eq!(candidates.len(), 2);
                assert_eq!(candidates[0].patient_ref, Some(PatientRef("1".to_string())));
                assert_eq!(candidates[0].birthdate, NaiveDate::from_ymd_opt(2003, 8, 28));
                assert_eq!(candidates[1].patient_ref, None);
                assert_eq!(candidates[1].birthdate, None);
            }
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn test_slot_taken_flash() {
        let raw = BookingAttempt {
            flash_message: Some("You have another event scheduled at this time".to_string()),
            ..Default::default()
        };
        assert_eq!(interpret_booking(&raw, &base()), AppointmentResult::SlotTaken);
    }

    #[test]
    fn test_other_flash_is_rejection() {
        let raw = BookingAttempt {
            flash_message: Some("Provider is unavailable".to_string()),
            appointment_visible: true,
            ..Default::default()
        };
        assert_eq!(
            interpret_booking(&raw, &base()),
            AppointmentResult::Failed(FailureCause::Rejected("Provider is unavailable".to_string()))
        );
    }

    #[test]
    fn test_past_date_and_unconfirmed() {
        let raw = BookingAttempt {
            past_date_rejected: true,
            ..Default::default()
        };
        assert_eq!(
            interpret_booking(&raw, &base()),
            AppointmentResult::Failed(FailureCause::PastDate)
        );
        assert_eq!(
            interpret_booking(&BookingAttempt::default(), &base()),
            AppointmentResult::Failed(FailureCause::NotConfirmed)
        );
    }

    #[test]
    fn test_booked_relative_link_joined() {
        let raw = BookingAttempt {
            appointment_visible: true,
            meeting_link: Some("/appointments/987/video".to_string()),
            ..Default::default()
        };
        assert_eq!(
            interpret_booking(&raw, &base()),
            AppointmentResult::Booked {
                meeting_link: "https://secure.gethealthie.com/appointments/987/video".to_string()
            }
        );
    }

    #[test]
    fn test_booked_absolute_link_kept() {
        let raw = BookingAttempt {
            appointment_visible: true,
            meeting_link: Some("https://meet.example.com/abc".to_string()),
            ..Default::default()
        };
        assert_eq!(
            interpret_booking(&raw, &base()),
            AppointmentResult::Booked {
                meeting_link: "https://meet.example.com/abc".to_string()
            }
        );
    }

    #[test]
    fn test_visible_without_link() {
        let raw = BookingAttempt {
            appointment_visible: true,
            ..Default::default()
        };
        assert_eq!(
            interpret_booking(&raw, &base()),
            AppointmentResult::Failed(FailureCause::MissingMeetingLink)
        );
    }
}
