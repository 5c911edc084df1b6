use chrono::NaiveDate;

use crate::models::{PatientCandidate, PatientRef};

#[derive(Debug, Clone, PartialEq)]
pub enum Disambiguation {
    Selected {
        patient_ref: PatientRef,
        display_name: String,
    },
    Unresolved,
}

/// Picks one record when a search matches several patients.
pub trait DisambiguationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn choose(&self, candidates: &[PatientCandidate], birthdate: NaiveDate) -> Disambiguation;
}

/// Takes the first listed record, as the portal's own search does.
pub struct FirstMatch;

impl DisambiguationStrategy for FirstMatch {
    fn name(&self) -> &'static str {
        "first_match"
    }

    fn choose(&self, candidates: &[PatientCandidate], _birthdate: NaiveDate) -> Disambiguation {
        match candidates.first() {
            Some(PatientCandidate {
                patient_ref: Some(patient_ref),
                display_name,
                ..
            }) => Disambiguation::Selected {
                patient_ref: patient_ref.clone(),
                display_name: display_name.clone(),
            },
            _ => Disambiguation::Unresolved,
        }
    }
}

/// Accepts only the single record whose date of birth matches the caller's.
pub struct BirthdateMatch;

impl DisambiguationStrategy for BirthdateMatch {
    fn name(&self) -> &'static str {
        "birthdate_match"
    }

    fn choose(&self, candidates: &[PatientCandidate], birthdate: NaiveDate) -> Disambiguation {
        let matching: Vec<(&PatientRef, &str)> = candidates
            .iter()
            .filter(|c| c.birthdate == Some(birthdate))
            .filter_map(|c| {
                c.patient_ref
                    .as_ref()
                    .map(|r| (r, c.display_name.as_str()))
            })
            .collect();

        match matching.as_slice() {
            [(patient_ref, display_name)] => Disambiguation::Selected {
                patient_ref: (*patient_ref).clone(),
                display_name: display_name.to_string(),
            },
            _ => Disambiguation::Unresolved,
        }
    }
}

/// Unknown or empty names fall back to [`BirthdateMatch`] rather than the
/// portal's first-row pick.
pub fn from_config(name: &str) -> Box<dyn DisambiguationStrategy> {
    match name.trim().to_lowercase().as_str() {
        "first_match" | "first" => Box::new(FirstMatch),
        _ => Box::new(BirthdateMatch),
    }
}
