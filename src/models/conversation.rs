use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::booking::PatientRef;
use super::slot::{FieldKind, FieldValue, ValidationOutcome};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CollectIdentity,
    LookupPatient,
    CollectAppointment,
    BookAppointment,
    Confirmed,
    Abandoned,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CollectIdentity => "collect_identity",
            Stage::LookupPatient => "lookup_patient",
            Stage::CollectAppointment => "collect_appointment",
            Stage::BookAppointment => "book_appointment",
            Stage::Confirmed => "confirmed",
            Stage::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Confirmed | Stage::Abandoned)
    }
}

/// How a newly accepted name combines with one already on file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamePolicy {
    Amend,
    Replace,
}

impl NamePolicy {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "replace" => NamePolicy::Replace,
            _ => NamePolicy::Amend,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Slot<T> {
    pub value: Option<T>,
    pub needs_confirmation: bool,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: None,
            needs_confirmation: false,
        }
    }
}

impl<T> Slot<T> {
    pub fn set(&mut self, value: T) {
        self.value = Some(value);
        self.needs_confirmation = false;
    }

    pub fn is_settled(&self) -> bool {
        self.value.is_some() && !self.needs_confirmation
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupKey {
    pub name: String,
    pub birthdate: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyEffect {
    Stored,
    /// Clarification outcome; whatever was on file stays.
    Kept,
    /// Value not allowed for this slot right now.
    Refused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub full_name: Slot<String>,
    pub birthdate: Slot<NaiveDate>,
    pub patient_ref: Option<PatientRef>,
    pub patient_display_name: Option<String>,
    pub appointment_date: Slot<NaiveDate>,
    pub appointment_time: Slot<NaiveTime>,
    pub stage: Stage,
    pub awaiting: Option<FieldKind>,
    pub attempted_lookups: Vec<LookupKey>,
    pub attempted_slots: Vec<(NaiveDate, NaiveTime)>,
    pub lookup_failures: u32,
    pub booking_failures: u32,
    pub clarifications: u32,
    pub meeting_link: Option<String>,
    pub messages: Vec<ConversationMessage>,
    pub created_at: NaiveDateTime,
    pub last_activity: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl Session {
    pub fn new(now: NaiveDateTime, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name: Slot::default(),
            birthdate: Slot::default(),
            patient_ref: None,
            patient_display_name: None,
            appointment_date: Slot::default(),
            appointment_time: Slot::default(),
            stage: Stage::CollectIdentity,
            awaiting: None,
            attempted_lookups: Vec::new(),
            attempted_slots: Vec::new(),
            lookup_failures: 0,
            booking_failures: 0,
            clarifications: 0,
            meeting_link: None,
            messages: Vec::new(),
            created_at: now,
            last_activity: now,
            expires_at: now + ttl,
        }
    }

    /// Merge a validation outcome into the slot. Clarifications never erase
    /// an accepted value.
    pub fn apply(
        &mut self,
        field: FieldKind,
        outcome: ValidationOutcome,
        name_policy: NamePolicy,
    ) -> ApplyEffect {
        let value = match outcome {
            ValidationOutcome::Accepted(value) => value,
            ValidationOutcome::NeedsClarification(_) => return ApplyEffect::Kept,
        };

        if !field.is_identity() && self.patient_ref.is_none() {
            tracing::warn!(
                session_id = %self.id,
                field = field.as_str(),
                "appointment slot offered before patient lookup, refusing"
            );
            return ApplyEffect::Refused;
        }

        match (field, value) {
            (FieldKind::Name, FieldValue::Name(name)) => {
                let merged = merge_name(self.full_name.value.as_deref(), &name, name_policy);
                self.full_name.set(merged);
            }
            (FieldKind::Birthdate, FieldValue::Date(date)) => self.birthdate.set(date),
            (FieldKind::AppointmentDate, FieldValue::Date(date)) => {
                self.appointment_date.set(date)
            }
            (FieldKind::AppointmentTime, FieldValue::Time(time)) => {
                self.appointment_time.set(time)
            }
            (field, value) => {
                tracing::warn!(field = field.as_str(), ?value, "value does not fit slot");
                return ApplyEffect::Refused;
            }
        }
        ApplyEffect::Stored
    }

    pub fn has_value(&self, field: FieldKind) -> bool {
        match field {
            FieldKind::Name => self.full_name.value.is_some(),
            FieldKind::Birthdate => self.birthdate.value.is_some(),
            FieldKind::AppointmentDate => self.appointment_date.value.is_some(),
            FieldKind::AppointmentTime => self.appointment_time.value.is_some(),
        }
    }

    pub fn needs_confirmation(&self, field: FieldKind) -> bool {
        match field {
            FieldKind::Name => self.full_name.needs_confirmation,
            FieldKind::Birthdate => self.birthdate.needs_confirmation,
            FieldKind::AppointmentDate => self.appointment_date.needs_confirmation,
            FieldKind::AppointmentTime => self.appointment_time.needs_confirmation,
        }
    }

    pub fn confirm(&mut self, field: FieldKind) {
        self.set_confirmation(field, false);
    }

    pub fn mark_for_confirmation(&mut self, fields: &[FieldKind]) {
        for field in fields {
            self.set_confirmation(*field, true);
        }
    }

    fn set_confirmation(&mut self, field: FieldKind, flag: bool) {
        // Only slots holding a value can await confirmation.
        if !self.has_value(field) {
            return;
        }
        match field {
            FieldKind::Name => self.full_name.needs_confirmation = flag,
            FieldKind::Birthdate => self.birthdate.needs_confirmation = flag,
            FieldKind::AppointmentDate => self.appointment_date.needs_confirmation = flag,
            FieldKind::AppointmentTime => self.appointment_time.needs_confirmation = flag,
        }
    }

    /// A usable name has at least a first and a last part.
    pub fn name_is_complete(&self) -> bool {
        self.full_name
            .value
            .as_deref()
            .map(|n| n.split_whitespace().count() >= 2)
            .unwrap_or(false)
    }

    pub fn is_ready_for(&self, stage: Stage) -> bool {
        let identity_ready = self.name_is_complete()
            && self.full_name.is_settled()
            && self.birthdate.is_settled();
        match stage {
            Stage::CollectIdentity | Stage::Abandoned => true,
            Stage::LookupPatient => identity_ready,
            Stage::CollectAppointment => self.patient_ref.is_some(),
            Stage::BookAppointment => {
                self.patient_ref.is_some()
                    && self.appointment_date.is_settled()
                    && self.appointment_time.is_settled()
            }
            Stage::Confirmed => self.meeting_link.is_some(),
        }
    }

    /// First slot that still has to be asked before `stage` can be entered.
    pub fn next_missing(&self, stage: Stage) -> Option<FieldKind> {
        match stage {
            Stage::LookupPatient => {
                if !(self.full_name.is_settled() && self.name_is_complete()) {
                    Some(FieldKind::Name)
                } else if !self.birthdate.is_settled() {
                    Some(FieldKind::Birthdate)
                } else {
                    None
                }
            }
            Stage::BookAppointment => {
                if !self.appointment_date.is_settled() {
                    Some(FieldKind::AppointmentDate)
                } else if !self.appointment_time.is_settled() {
                    Some(FieldKind::AppointmentTime)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn lookup_key(&self) -> Option<LookupKey> {
        match (&self.full_name.value, self.birthdate.value) {
            (Some(name), Some(birthdate)) => Some(LookupKey {
                name: name.clone(),
                birthdate,
            }),
            _ => None,
        }
    }

    pub fn requested_slot(&self) -> Option<(NaiveDate, NaiveTime)> {
        match (self.appointment_date.value, self.appointment_time.value) {
            (Some(date), Some(time)) => Some((date, time)),
            _ => None,
        }
    }

    pub fn record_patient(&mut self, patient_ref: PatientRef, display_name: String) {
        self.patient_ref = Some(patient_ref);
        self.patient_display_name = Some(display_name);
    }

    pub fn push_message(&mut self, role: &str, content: &str) {
        self.messages.push(ConversationMessage {
            role: role.to_string(),
            content: content.to_string(),
        });
    }

    pub fn touch(&mut self, now: NaiveDateTime, ttl: Duration) {
        self.last_activity = now;
        self.expires_at = now + ttl;
    }

    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expires_at <= now
    }
}

/// Combine a newly heard name with the one on file.
///
/// Under [`NamePolicy::Amend`] a name that is still only a first name is
/// extended with whatever follows, unless the caller restates it. Once a
/// complete name is on file, each incoming token replaces the closest stored
/// token (a spelling fix) or is appended when nothing is close, and a
/// restatement at least as long as it, or a complete name with no token in
/// common, replaces it outright. A stored token is corrected at most once
/// per utterance.
pub fn merge_name(existing: Option<&str>, incoming: &str, policy: NamePolicy) -> String {
    let existing = match existing {
        Some(e) if policy == NamePolicy::Amend => e,
        _ => return incoming.to_string(),
    };

    let mut current: Vec<String> = existing.split_whitespace().map(str::to_string).collect();
    let new_tokens: Vec<&str> = incoming.split_whitespace().collect();

    let any_similar = new_tokens
        .iter()
        .any(|t| current.iter().any(|c| tokens_similar(c, t)));

    if current.len() < 2 {
        // "John" then "John Johnson" is a restatement; "John" then "Johnson"
        // or "Planell Bosch" is the missing last name.
        if new_tokens.len() >= 2 && any_similar {
            return incoming.to_string();
        }
        for token in new_tokens {
            if !current.iter().any(|c| c.eq_ignore_ascii_case(token)) {
                current.push(token.to_string());
            }
        }
        return current.join(" ");
    }

    if new_tokens.len() >= 2 && (new_tokens.len() >= current.len() || !any_similar) {
        return incoming.to_string();
    }

    let mut touched = vec![false; current.len()];
    for token in new_tokens {
        if let Some(i) = current.iter().position(|c| c.eq_ignore_ascii_case(token)) {
            touched[i] = true;
            continue;
        }
        let closest = current
            .iter()
            .enumerate()
            .filter(|(i, c)| !touched[*i] && tokens_similar(c, token))
            .min_by_key(|(_, c)| edit_distance(&c.to_lowercase(), &token.to_lowercase()))
            .map(|(i, _)| i);
        match closest {
            Some(i) => {
                current[i] = token.to_string();
                touched[i] = true;
            }
            None => {
                current.push(token.to_string());
                touched.push(true);
            }
        }
    }

    current.join(" ")
}

fn tokens_similar(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return true;
    }
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a_len >= 3 && b_len >= 3 && a.chars().take(3).eq(b.chars().take(3)) {
        return true;
    }
    let threshold = std::cmp::max(1, (a_len.max(b_len) + 2) / 3);
    edit_distance(&a, &b) <= threshold
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::slot::ClarificationReason;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2026-03-01 09:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn session() -> Session {
        Session::new(now(), Duration::minutes(30))
    }

    fn name(s: &str) -> ValidationOutcome {
        ValidationOutcome::Accepted(FieldValue::Name(s.to_string()))
    }

    fn date(s: &str) -> ValidationOutcome {
        ValidationOutcome::Accepted(FieldValue::Date(
            NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap(),
        ))
    }

    #[test]
    fn test_clarification_keeps_accepted_name() {
        let mut s = session();
        s.apply(FieldKind::Name, name("Noel Bosch"), NamePolicy::Amend);

        let effect = s.apply(
            FieldKind::Name,
            ValidationOutcome::NeedsClarification(ClarificationReason::NotAName),
            NamePolicy::Amend,
        );
        assert_eq!(effect, ApplyEffect::Kept);
        assert_eq!(s.full_name.value.as_deref(), Some("Noel Bosch"));

        s.apply(
            FieldKind::Name,
            ValidationOutcome::NeedsClarification(ClarificationReason::Empty),
            NamePolicy::Replace,
        );
        assert_eq!(s.full_name.value.as_deref(), Some("Noel Bosch"));
    }

    #[test]
    fn test_appointment_slots_refused_without_patient() {
        let mut s = session();
        let effect = s.apply(FieldKind::AppointmentDate, date("2026-03-25"), NamePolicy::Amend);
        assert_eq!(effect, ApplyEffect::Refused);
        assert!(s.appointment_date.value.is_none());

        s.record_patient(PatientRef("13632834".to_string()), "Noel".to_string());
        let effect = s.apply(FieldKind::AppointmentDate, date("2026-03-25"), NamePolicy::Amend);
        assert_eq!(effect, ApplyEffect::Stored);
    }

    #[test]
    fn test_mismatched_value_refused() {
        let mut s = session();
        let effect = s.apply(FieldKind::Birthdate, name("Noel"), NamePolicy::Amend);
        assert_eq!(effect, ApplyEffect::Refused);
        assert!(s.birthdate.value.is_none());
    }

    #[test]
    fn test_ready_for_lookup_requires_full_name_and_birthdate() {
        let mut s = session();
        assert!(!s.is_ready_for(Stage::LookupPatient));
        assert_eq!(s.next_missing(Stage::LookupPatient), Some(FieldKind::Name));

        s.apply(FieldKind::Name, name("Noel"), NamePolicy::Amend);
        assert_eq!(s.next_missing(Stage::LookupPatient), Some(FieldKind::Name));

        s.apply(FieldKind::Name, name("Planell Bosch"), NamePolicy::Amend);
        assert_eq!(s.full_name.value.as_deref(), Some("Noel Planell Bosch"));
        assert_eq!(s.next_missing(Stage::LookupPatient), Some(FieldKind::Birthdate));

        s.apply(FieldKind::Birthdate, date("2003-08-28"), NamePolicy::Amend);
        assert!(s.is_ready_for(Stage::LookupPatient));
        assert_eq!(s.next_missing(Stage::LookupPatient), None);
    }

    #[test]
    fn test_confirmation_flags() {
        let mut s = session();
        s.apply(FieldKind::Name, name("Noel Bosch"), NamePolicy::Amend);
        s.apply(FieldKind::Birthdate, date("2003-08-28"), NamePolicy::Amend);
        s.mark_for_confirmation(&[FieldKind::Name, FieldKind::Birthdate]);
        assert!(!s.is_ready_for(Stage::LookupPatient));
        assert_eq!(s.next_missing(Stage::LookupPatient), Some(FieldKind::Name));

        s.confirm(FieldKind::Name);
        assert_eq!(s.next_missing(Stage::LookupPatient), Some(FieldKind::Birthdate));

        // A fresh value settles the slot as well.
        s.apply(FieldKind::Birthdate, date("2003-08-29"), NamePolicy::Amend);
        assert!(s.is_ready_for(Stage::LookupPatient));
    }

    #[test]
    fn test_empty_slot_cannot_await_confirmation() {
        let mut s = session();
        s.mark_for_confirmation(&[FieldKind::Birthdate]);
        assert!(!s.birthdate.needs_confirmation);
    }

    #[test]
    fn test_merge_name_spelling_fix() {
        let merged = merge_name(Some("Noel Nathan Planel Bosch"), "Planell", NamePolicy::Amend);
        assert_eq!(merged, "Noel Nathan Planell Bosch");
    }

    #[test]
    fn test_merge_name_restated_full_name() {
        let merged = merge_name(
            Some("Noel Nathan Planel Bosch"),
            "Noel Nathan Planell Bosch",
            NamePolicy::Amend,
        );
        assert_eq!(merged, "Noel Nathan Planell Bosch");
    }

    #[test]
    fn test_merge_name_unrelated_full_name_replaces() {
        let merged = merge_name(Some("Noel Bosch"), "Maria Lopez", NamePolicy::Amend);
        assert_eq!(merged, "Maria Lopez");
    }

    #[test]
    fn test_merge_name_restatement_keeps_spoken_order() {
        let merged = merge_name(Some("Noel Bosch"), "Noel Planell Bosch", NamePolicy::Amend);
        assert_eq!(merged, "Noel Planell Bosch");

        let merged = merge_name(Some("Noel"), "Planell Bosch", NamePolicy::Amend);
        assert_eq!(merged, "Noel Planell Bosch");
    }

    #[test]
    fn test_merge_name_last_name_sharing_a_prefix_is_appended() {
        assert_eq!(merge_name(Some("John"), "Johnson", NamePolicy::Amend), "John Johnson");
        assert_eq!(merge_name(Some("Maria"), "Martinez", NamePolicy::Amend), "Maria Martinez");
        assert_eq!(merge_name(Some("John"), "John Johnson", NamePolicy::Amend), "John Johnson");
        assert_eq!(merge_name(Some("John"), "john", NamePolicy::Amend), "John");
    }

    #[test]
    fn test_merge_name_corrects_each_stored_token_once() {
        let merged = merge_name(Some("Noel Nathan Planel Bosch"), "Planell Bosh", NamePolicy::Amend);
        assert_eq!(merged, "Noel Nathan Planell Bosh");
    }

    #[test]
    fn test_merge_name_replace_policy() {
        let merged = merge_name(Some("Noel Nathan Planel Bosch"), "Planell", NamePolicy::Replace);
        assert_eq!(merged, "Planell");
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("planel", "planell"), 1);
        assert_eq!(edit_distance("bosch", "bosh"), 1);
        assert_eq!(edit_distance("", "abc"), 3);
        assert!(!tokens_similar("Al", "Ed"));
        assert!(tokens_similar("Nathan", "Nate"));
    }

    #[test]
    fn test_expiry() {
        let mut s = session();
        assert!(!s.is_expired(now()));
        assert!(s.is_expired(now() + Duration::minutes(31)));
        s.touch(now() + Duration::minutes(20), Duration::minutes(30));
        assert!(!s.is_expired(now() + Duration::minutes(31)));
    }
}
