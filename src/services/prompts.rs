use chrono::NaiveDate;

use crate::models::{ClarificationReason, FailureCause, FieldKind};

pub const GREETING: &str =
    "Hello, thanks for calling. I can book an appointment for you. To start, what is your full name?";

pub const ABANDONED: &str = "I'm sorry I couldn't complete your booking. \
     A member of our staff will follow up with you. Goodbye.";

pub const ABANDONED_REMINDER: &str =
    "This call has ended. Please contact the clinic directly to book your appointment.";

pub fn ask(field: FieldKind) -> String {
    match field {
        FieldKind::Name => "What is your full name, first and last?".to_string(),
        FieldKind::Birthdate => "Thank you. What is your date of birth?".to_string(),
        FieldKind::AppointmentDate => "What date would you like for your appointment?".to_string(),
        FieldKind::AppointmentTime => "And what time would you like?".to_string(),
    }
}

pub fn ask_last_name(first: &str) -> String {
    format!("Thanks, {first}. Could you also tell me your last name?")
}

pub fn confirm(field: FieldKind, value: &str) -> String {
    match field {
        FieldKind::Name | FieldKind::Birthdate => format!(
            "I have your {} as {value}. Is that correct? If not, please tell me again.",
            field.spoken()
        ),
        FieldKind::AppointmentDate | FieldKind::AppointmentTime => format!(
            "Should I keep {value} as the {}, or would you like a different one?",
            field.spoken()
        ),
    }
}

pub fn clarify(field: FieldKind, reason: &ClarificationReason) -> String {
    let spoken = field.spoken();
    match reason {
        ClarificationReason::Empty | ClarificationReason::Unrecognized => {
            format!("Sorry, I didn't catch your {spoken}. Could you say it again?")
        }
        ClarificationReason::NotAName => {
            "That didn't sound like a name. Could you tell me your first and last name?".to_string()
        }
        ClarificationReason::MissingYear => {
            format!("Which year was that? Please tell me the full {spoken}, including the year.")
        }
        ClarificationReason::MissingDay => {
            format!("Which day of the month? Please tell me the full {spoken}.")
        }
        ClarificationReason::RelativeDate => match field {
            FieldKind::Birthdate => {
                "Please tell me your exact date of birth, for example August 28, 2003.".to_string()
            }
            _ => "Could you give me an exact date, for example March 25?".to_string(),
        },
        ClarificationReason::AmbiguousNumericDate { first, second } => {
            match (month_name(*first), month_name(*second)) {
                (Some(a), Some(b)) => format!(
                    "Did you mean {a} {second} or {b} {first}? Please say the month as a word."
                ),
                _ => format!("Could you say the {spoken} with the month as a word?"),
            }
        }
        ClarificationReason::InvalidDate => {
            format!("That date doesn't exist. Could you say the {spoken} again?")
        }
        ClarificationReason::FutureBirthdate => {
            "That date is in the future. What is your date of birth?".to_string()
        }
        ClarificationReason::ImplausibleBirthdate => {
            "That seems too far back. Could you repeat your date of birth?".to_string()
        }
        ClarificationReason::PastDate => {
            "That date has already passed. Which upcoming date would you like?".to_string()
        }
        ClarificationReason::AmbiguousMeridiem { hour } => {
            format!("Is that {hour} in the morning or {hour} in the afternoon?")
        }
        ClarificationReason::InvalidTime => {
            "That isn't a valid time. What time would you like, for example 11:00 AM?".to_string()
        }
        ClarificationReason::TimeAlreadyPassed => {
            "That time has already passed. What later time would work for you?".to_string()
        }
    }
}

pub fn patient_found(display_name: &str) -> String {
    format!(
        "Thank you, {display_name}, I found your record. \
         What date and time would you like for your appointment?"
    )
}

pub fn patient_not_found(name: &str, birthdate: &str) -> String {
    format!("I couldn't find a patient record for {name}, born {birthdate}.")
}

pub fn patient_ambiguous(name: &str) -> String {
    format!("I found more than one patient named {name}, so I can't tell which record is yours.")
}

pub fn identity_unchanged() -> String {
    "That's the same name and date of birth I already searched for, and it still doesn't match a record."
        .to_string()
}

pub fn slot_taken(date: &str, time: &str) -> String {
    format!("I'm sorry, {date} at {time} is already taken.")
}

pub fn booking_failed(cause: &FailureCause, date: &str, time: &str) -> String {
    match cause {
        FailureCause::PastDate => {
            format!("The clinic calendar won't accept {date} because it's in the past.")
        }
        FailureCause::Rejected(flash) => {
            format!("The clinic calendar didn't accept {date} at {time}. It said: {flash}.")
        }
        FailureCause::NotConfirmed => {
            format!("I tried to book {date} at {time}, but the appointment didn't show up afterwards.")
        }
        FailureCause::MissingMeetingLink | FailureCause::Unknown(_) => {
            format!("Something went wrong while booking {date} at {time}.")
        }
    }
}

pub fn slot_already_tried(date: &str, time: &str) -> String {
    format!("I already tried {date} at {time} and couldn't book it.")
}

pub fn ask_other_slot() -> &'static str {
    "What other date and time would work for you?"
}

pub fn booked(display_name: &str, date: &str, time: &str, meeting_link: &str) -> String {
    format!(
        "You're all set, {display_name}. Your appointment is booked for {date} at {time}. \
         Your meeting link is {meeting_link}"
    )
}

pub fn already_booked(meeting_link: &str) -> String {
    format!("Your appointment is already booked. Your meeting link is {meeting_link}")
}

fn month_name(month: u32) -> Option<String> {
    NaiveDate::from_ymd_opt(2000, month, 1).map(|d| d.format("%B").to_string())
}
