use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use url::Url;

use crate::config::AppConfig;
use crate::models::{
    AppointmentResult, ApplyEffect, ClarificationReason, FailureCause, FieldKind, NamePolicy,
    PatientRef, PatientResult, Session, Stage, ValidationOutcome,
};
use crate::services::automation::AutomationDriver;
use crate::services::dates::{combine, spoken_date, spoken_time};
use crate::services::disambiguation::{Disambiguation, DisambiguationStrategy};
use crate::services::validator::{is_affirmation, is_negation, validate};
use crate::services::{interpreter, prompts};

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Wall clock of the clinic host.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub name_policy: NamePolicy,
    pub max_lookup_attempts: u32,
    pub max_booking_attempts: u32,
    pub max_clarifications: u32,
    pub portal_base: Url,
    pub session_ttl: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let portal_base = Url::parse(&config.portal_base_url)
            .with_context(|| format!("invalid PORTAL_BASE_URL {}", config.portal_base_url))?;
        Ok(Self {
            name_policy: NamePolicy::parse(&config.name_policy),
            max_lookup_attempts: config.max_lookup_attempts,
            max_booking_attempts: config.max_booking_attempts,
            max_clarifications: config.max_clarifications,
            portal_base,
            session_ttl: Duration::minutes(config.session_ttl_minutes),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub message: String,
    pub stage: Stage,
    pub awaiting: Option<FieldKind>,
    pub meeting_link: Option<String>,
    pub finished: bool,
}

enum LookupFailure {
    NotFound,
    Ambiguous,
    Unchanged,
}

/// Drives one caller from greeting to a booked appointment.
///
/// Every turn ends in a user-input stage or a terminal one; patient lookup
/// and booking happen inside the turn that completes their inputs.
pub struct BookingOrchestrator {
    driver: Arc<dyn AutomationDriver>,
    disambiguation: Box<dyn DisambiguationStrategy>,
    settings: OrchestratorSettings,
    clock: Arc<dyn Clock>,
}

impl BookingOrchestrator {
    pub fn new(
        driver: Arc<dyn AutomationDriver>,
        disambiguation: Box<dyn DisambiguationStrategy>,
        settings: OrchestratorSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            driver,
            disambiguation,
            settings,
            clock,
        }
    }

    pub fn new_session(&self) -> Session {
        Session::new(self.clock.now(), self.settings.session_ttl)
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn driver(&self) -> &dyn AutomationDriver {
        self.driver.as_ref()
    }

    pub fn greet(&self, session: &mut Session) -> AgentReply {
        session.stage = Stage::CollectIdentity;
        session.awaiting = Some(FieldKind::Name);
        session.push_message("assistant", prompts::GREETING);
        tracing::info!(session_id = %session.id, "conversation started");
        reply(session, prompts::GREETING.to_string())
    }

    pub async fn handle_user_utterance(&self, session: &mut Session, text: &str) -> AgentReply {
        // A finished conversation extends neither its lifetime nor its transcript.
        let already_finished = session.stage.is_terminal();
        if !already_finished {
            session.push_message("user", text);
            session.touch(self.clock.now(), self.settings.session_ttl);
        }

        let message = match session.stage {
            Stage::CollectIdentity => self.collect_identity(session, text).await,
            Stage::LookupPatient => self.lookup_patient(session).await,
            Stage::CollectAppointment => self.collect_appointment(session, text).await,
            Stage::BookAppointment => self.book_appointment(session).await,
            Stage::Confirmed => prompts::already_booked(session.meeting_link.as_deref().unwrap_or("")),
            Stage::Abandoned => prompts::ABANDONED_REMINDER.to_string(),
        };

        if !already_finished {
            session.push_message("assistant", &message);
        }
        tracing::info!(
            session_id = %session.id,
            stage = session.stage.as_str(),
            awaiting = ?session.awaiting,
            "turn handled"
        );
        reply(session, message)
    }

    // ── Identity ──

    async fn collect_identity(&self, session: &mut Session, text: &str) -> String {
        let field = session
            .awaiting
            .filter(FieldKind::is_identity)
            .or_else(|| session.next_missing(Stage::LookupPatient))
            .unwrap_or(FieldKind::Name);

        if session.needs_confirmation(field) {
            if is_affirmation(text) {
                session.confirm(field);
                session.clarifications = 0;
                return self.advance_identity(session, field).await;
            }
            if is_negation(text) {
                return self.reask(session, field, prompts::ask(field));
            }
        }

        let outcome = validate(field, text, self.clock.today());
        if let ValidationOutcome::NeedsClarification(reason) = &outcome {
            tracing::info!(session_id = %session.id, field = field.as_str(), ?reason, "clarifying");
            let prompt = prompts::clarify(field, reason);
            session.apply(field, outcome.clone(), self.settings.name_policy);
            return self.reask(session, field, prompt);
        }

        session.apply(field, outcome, self.settings.name_policy);
        self.advance_identity(session, field).await
    }

    async fn advance_identity(&self, session: &mut Session, answered: FieldKind) -> String {
        match session.next_missing(Stage::LookupPatient) {
            // The same slot is still open, e.g. only a first name was heard.
            Some(field) if field == answered => {
                let prompt = self.prompt_for(session, field);
                self.reask(session, field, prompt)
            }
            Some(field) => {
                session.clarifications = 0;
                session.awaiting = Some(field);
                self.prompt_for(session, field)
            }
            None => {
                session.clarifications = 0;
                session.stage = Stage::LookupPatient;
                self.lookup_patient(session).await
            }
        }
    }

    async fn lookup_patient(&self, session: &mut Session) -> String {
        let Some(key) = session.lookup_key().filter(|_| session.is_ready_for(Stage::LookupPatient))
        else {
            session.stage = Stage::CollectIdentity;
            let field = session
                .next_missing(Stage::LookupPatient)
                .unwrap_or(FieldKind::Name);
            session.awaiting = Some(field);
            return self.prompt_for(session, field);
        };

        if session.attempted_lookups.contains(&key) {
            tracing::info!(session_id = %session.id, "identity unchanged since failed lookup");
            return self.lookup_failed(session, LookupFailure::Unchanged);
        }
        session.attempted_lookups.push(key.clone());

        tracing::info!(
            session_id = %session.id,
            name = %key.name,
            birthdate = %key.birthdate,
            "looking up patient"
        );
        match interpreter::find_patient(self.driver.as_ref(), &key.name, key.birthdate).await {
            PatientResult::Found {
                patient_ref,
                display_name,
            } => self.patient_found(session, patient_ref, display_name),
            PatientResult::AmbiguousMultipleMatches(candidates) => {
                match self.disambiguation.choose(&candidates, key.birthdate) {
                    Disambiguation::Selected {
                        patient_ref,
                        display_name,
                    } => {
                        tracing::info!(
                            session_id = %session.id,
                            strategy = self.disambiguation.name(),
                            candidates = candidates.len(),
                            "resolved multiple matches"
                        );
                        self.patient_found(session, patient_ref, display_name)
                    }
                    Disambiguation::Unresolved => {
                        self.lookup_failed(session, LookupFailure::Ambiguous)
                    }
                }
            }
            PatientResult::NotFound => self.lookup_failed(session, LookupFailure::NotFound),
        }
    }

    fn patient_found(
        &self,
        session: &mut Session,
        patient_ref: PatientRef,
        display_name: String,
    ) -> String {
        tracing::info!(session_id = %session.id, patient = %patient_ref, "patient found");
        let message = prompts::patient_found(&display_name);
        session.record_patient(patient_ref, display_name);
        session.stage = Stage::CollectAppointment;
        session.awaiting = Some(FieldKind::AppointmentDate);
        session.clarifications = 0;
        message
    }

    fn lookup_failed(&self, session: &mut Session, failure: LookupFailure) -> String {
        session.lookup_failures += 1;
        tracing::warn!(
            session_id = %session.id,
            failures = session.lookup_failures,
            "patient lookup failed"
        );
        if session.lookup_failures >= self.settings.max_lookup_attempts {
            return self.abandon(session, "lookup attempts exhausted");
        }

        let name = session.full_name.value.clone().unwrap_or_default();
        let birthdate = session.birthdate.value.map(spoken_date).unwrap_or_default();
        let explanation = match failure {
            LookupFailure::NotFound => prompts::patient_not_found(&name, &birthdate),
            LookupFailure::Ambiguous => prompts::patient_ambiguous(&name),
            LookupFailure::Unchanged => prompts::identity_unchanged(),
        };

        session.stage = Stage::CollectIdentity;
        session.mark_for_confirmation(&[FieldKind::Name, FieldKind::Birthdate]);
        session.awaiting = Some(FieldKind::Name);
        format!("{explanation} {}", self.prompt_for(session, FieldKind::Name))
    }

    // ── Appointment ──

    async fn collect_appointment(&self, session: &mut Session, text: &str) -> String {
        let awaited = session
            .awaiting
            .filter(|f| !f.is_identity())
            .or_else(|| session.next_missing(Stage::BookAppointment))
            .unwrap_or(FieldKind::AppointmentDate);

        if session.needs_confirmation(awaited) {
            if is_affirmation(text) {
                session.confirm(awaited);
                session.clarifications = 0;
                return self.advance_appointment(session).await;
            }
            if is_negation(text) {
                return self.reask(session, awaited, prompts::ask(awaited));
            }
        }

        // One utterance may carry both the date and the time.
        let today = self.clock.today();
        let outcomes = [
            (
                FieldKind::AppointmentDate,
                validate(FieldKind::AppointmentDate, text, today),
            ),
            (
                FieldKind::AppointmentTime,
                validate(FieldKind::AppointmentTime, text, today),
            ),
        ];

        let mut stored = false;
        for (field, outcome) in &outcomes {
            if session.apply(*field, outcome.clone(), self.settings.name_policy) == ApplyEffect::Stored
            {
                stored = true;
            }
        }

        let substantive = outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_substantive_clarification())
            .min_by_key(|(field, _)| *field != awaited);
        if let Some((field, ValidationOutcome::NeedsClarification(reason))) = substantive {
            tracing::info!(session_id = %session.id, field = field.as_str(), ?reason, "clarifying");
            let prompt = prompts::clarify(*field, reason);
            return self.reask(session, *field, prompt);
        }

        if !stored {
            let prompt = prompts::clarify(awaited, &ClarificationReason::Unrecognized);
            return self.reask(session, awaited, prompt);
        }

        session.clarifications = 0;
        self.advance_appointment(session).await
    }

    async fn advance_appointment(&self, session: &mut Session) -> String {
        if let Some(field) = session.next_missing(Stage::BookAppointment) {
            session.awaiting = Some(field);
            return self.prompt_for(session, field);
        }
        let Some((date, time)) = session.requested_slot() else {
            session.awaiting = Some(FieldKind::AppointmentDate);
            return prompts::ask(FieldKind::AppointmentDate);
        };

        if combine(date, time) <= self.clock.now() {
            session.mark_for_confirmation(&[FieldKind::AppointmentTime]);
            let prompt =
                prompts::clarify(FieldKind::AppointmentTime, &ClarificationReason::TimeAlreadyPassed);
            return self.reask(session, FieldKind::AppointmentTime, prompt);
        }

        if session.attempted_slots.contains(&(date, time)) {
            tracing::info!(session_id = %session.id, %date, %time, "slot already attempted");
            session.mark_for_confirmation(&[FieldKind::AppointmentDate, FieldKind::AppointmentTime]);
            let prompt = format!(
                "{} {}",
                prompts::slot_already_tried(&spoken_date(date), &spoken_time(time)),
                prompts::ask_other_slot()
            );
            return self.reask(session, FieldKind::AppointmentDate, prompt);
        }

        session.stage = Stage::BookAppointment;
        self.book_appointment(session).await
    }

    async fn book_appointment(&self, session: &mut Session) -> String {
        let (Some(patient_ref), Some((date, time))) =
            (session.patient_ref.clone(), session.requested_slot())
        else {
            tracing::warn!(session_id = %session.id, "booking requested without patient or slot");
            session.stage = if session.patient_ref.is_some() {
                Stage::CollectAppointment
            } else {
                Stage::CollectIdentity
            };
            let field = session
                .next_missing(Stage::BookAppointment)
                .filter(|_| session.patient_ref.is_some())
                .or_else(|| session.next_missing(Stage::LookupPatient))
                .unwrap_or(FieldKind::Name);
            session.awaiting = Some(field);
            return self.prompt_for(session, field);
        };
        if !session.is_ready_for(Stage::BookAppointment) {
            session.stage = Stage::CollectAppointment;
            let field = session
                .next_missing(Stage::BookAppointment)
                .unwrap_or(FieldKind::AppointmentDate);
            session.awaiting = Some(field);
            return self.prompt_for(session, field);
        }

        session.attempted_slots.push((date, time));
        tracing::info!(
            session_id = %session.id,
            patient = %patient_ref,
            %date,
            %time,
            "booking appointment"
        );

        let result = interpreter::create_appointment(
            self.driver.as_ref(),
            &patient_ref,
            date,
            time,
            &self.settings.portal_base,
        )
        .await;

        let (date_spoken, time_spoken) = (spoken_date(date), spoken_time(time));
        match result {
            AppointmentResult::Booked { meeting_link } => {
                tracing::info!(session_id = %session.id, %meeting_link, "appointment booked");
                let name = session
                    .patient_display_name
                    .clone()
                    .or_else(|| session.full_name.value.clone())
                    .unwrap_or_default();
                let message = prompts::booked(&name, &date_spoken, &time_spoken, &meeting_link);
                session.meeting_link = Some(meeting_link);
                session.stage = Stage::Confirmed;
                session.awaiting = None;
                message
            }
            AppointmentResult::SlotTaken => {
                let explanation = prompts::slot_taken(&date_spoken, &time_spoken);
                self.booking_failed(session, None, explanation)
            }
            AppointmentResult::Failed(cause) => {
                let explanation = prompts::booking_failed(&cause, &date_spoken, &time_spoken);
                self.booking_failed(session, Some(cause), explanation)
            }
        }
    }

    fn booking_failed(
        &self,
        session: &mut Session,
        cause: Option<FailureCause>,
        explanation: String,
    ) -> String {
        session.booking_failures += 1;
        tracing::warn!(
            session_id = %session.id,
            failures = session.booking_failures,
            cause = cause.as_ref().map(|c| c.as_str()).unwrap_or("slot_taken"),
            "booking failed"
        );
        if session.booking_failures >= self.settings.max_booking_attempts {
            return self.abandon(session, "booking attempts exhausted");
        }

        session.stage = Stage::CollectAppointment;
        session.mark_for_confirmation(&[FieldKind::AppointmentDate, FieldKind::AppointmentTime]);
        session.awaiting = Some(FieldKind::AppointmentDate);
        session.clarifications = 0;
        format!("{explanation} {}", prompts::ask_other_slot())
    }

    // ── Shared ──

    /// Ask for `field` again, counting towards the clarification ceiling.
    fn reask(&self, session: &mut Session, field: FieldKind, prompt: String) -> String {
        session.clarifications += 1;
        if session.clarifications > self.settings.max_clarifications {
            return self.abandon(session, "clarification limit reached");
        }
        session.awaiting = Some(field);
        prompt
    }

    fn prompt_for(&self, session: &Session, field: FieldKind) -> String {
        if session.needs_confirmation(field) {
            if let Some(value) = display_value(session, field) {
                return prompts::confirm(field, &value);
            }
        }
        match (field, session.full_name.value.as_deref()) {
            (FieldKind::Name, Some(first)) if !session.name_is_complete() => {
                prompts::ask_last_name(first)
            }
            _ => prompts::ask(field),
        }
    }

    fn abandon(&self, session: &mut Session, why: &str) -> String {
        tracing::warn!(session_id = %session.id, reason = why, "abandoning conversation");
        session.stage = Stage::Abandoned;
        session.awaiting = None;
        prompts::ABANDONED.to_string()
    }
}

fn display_value(session: &Session, field: FieldKind) -> Option<String> {
    match field {
        FieldKind::Name => session.full_name.value.clone(),
        FieldKind::Birthdate => session.birthdate.value.map(spoken_date),
        FieldKind::AppointmentDate => session.appointment_date.value.map(spoken_date),
        FieldKind::AppointmentTime => session.appointment_time.value.map(spoken_time),
    }
}

fn reply(session: &Session, message: String) -> AgentReply {
    AgentReply {
        message,
        stage: session.stage,
        awaiting: session.awaiting,
        meeting_link: session.meeting_link.clone(),
        finished: session.stage.is_terminal(),
    }
}
