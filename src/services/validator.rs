use std::sync::OnceLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use regex::Regex;

use crate::models::{ClarificationReason, FieldKind, FieldValue, ValidationOutcome};

const MAX_AGE_YEARS: i32 = 130;

/// Check one utterance against one slot. Pure; `today` anchors relative
/// and past/future checks.
pub fn validate(field: FieldKind, raw: &str, today: NaiveDate) -> ValidationOutcome {
    if raw.trim().is_empty() {
        return clarify(ClarificationReason::Empty);
    }
    match field {
        FieldKind::Name => validate_name(raw),
        FieldKind::Birthdate => validate_birthdate(raw, today),
        FieldKind::AppointmentDate => validate_appointment_date(raw, today),
        FieldKind::AppointmentTime => validate_appointment_time(raw),
    }
}

fn clarify(reason: ClarificationReason) -> ValidationOutcome {
    ValidationOutcome::NeedsClarification(reason)
}

// ── Names ──

const LEADING_FILLER: &[&[&str]] = &[
    &["my", "full", "name", "is"],
    &["my", "name", "is"],
    &["the", "name", "is"],
    &["name", "is"],
    &["it's"],
    &["its"],
    &["it", "is"],
    &["this", "is"],
    &["i'm"],
    &["i", "am"],
    &["yes"],
    &["yeah"],
    &["no"],
    &["sorry"],
    &["okay"],
    &["ok"],
    &["sure"],
    &["actually"],
];

const DROPPED_WORDS: &[&str] = &["spelled", "spelt", "please", "thanks"];

/// Hesitations and greetings are never part of a name.
const HESITATIONS: &[&str] = &[
    "um", "umm", "uh", "uhm", "uhh", "er", "erm", "ah", "hmm", "hm", "mm", "hello", "hi", "hey",
];

fn validate_name(raw: &str) -> ValidationOutcome {
    let mut tokens: Vec<String> = raw
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|t| {
            t.trim_matches(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
                .to_string()
        })
        .filter(|t| !t.is_empty())
        .collect();

    tokens.retain(|t| !HESITATIONS.contains(&t.to_lowercase().as_str()));
    strip_leading_filler(&mut tokens);
    tokens.retain(|t| !DROPPED_WORDS.contains(&t.to_lowercase().as_str()));
    if tokens.len() >= 2 {
        let last_two = tokens[tokens.len() - 2..].join(" ").to_lowercase();
        if last_two == "thank you" {
            tokens.truncate(tokens.len() - 2);
        }
    }

    if tokens.iter().any(|t| t.chars().any(|c| c.is_ascii_digit())) {
        return clarify(ClarificationReason::NotAName);
    }

    let tokens = collapse_spelled_letters(tokens);

    if tokens.is_empty() {
        return clarify(ClarificationReason::Empty);
    }
    let well_formed = tokens.iter().all(|t| {
        t.chars().any(char::is_alphabetic)
            && t.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '-')
    });
    if !well_formed {
        return clarify(ClarificationReason::NotAName);
    }

    let mut words: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        // "Planell, P-L-A-N-E-L-L" says the same word twice.
        if words
            .last()
            .map(|prev| prev.eq_ignore_ascii_case(&token))
            .unwrap_or(false)
        {
            continue;
        }
        words.push(capitalize(&token));
    }

    ValidationOutcome::Accepted(FieldValue::Name(words.join(" ")))
}

fn strip_leading_filler(tokens: &mut Vec<String>) {
    loop {
        let lower: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let matched = LEADING_FILLER.iter().find(|phrase| {
            phrase.len() <= lower.len() && phrase.iter().zip(&lower).all(|(p, t)| *p == t.as_str())
        });
        match matched {
            Some(phrase) => {
                tokens.drain(..phrase.len());
            }
            None => break,
        }
    }
}

fn is_single_letter(t: &str) -> bool {
    let mut chars = t.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
}

/// "P-L-A-N-E-L-L" and "P L A N E L L" both become "PLANELL". A lone
/// initial is left alone.
fn collapse_spelled_letters(tokens: Vec<String>) -> Vec<String> {
    let tokens: Vec<String> = tokens
        .into_iter()
        .map(|t| {
            let parts: Vec<&str> = t.split('-').collect();
            if parts.len() >= 2 && parts.iter().all(|p| is_single_letter(p)) {
                parts.concat()
            } else {
                t
            }
        })
        .collect();

    let mut out: Vec<String> = Vec::new();
    let mut run: Vec<String> = Vec::new();
    for token in tokens {
        if is_single_letter(&token) {
            run.push(token);
            continue;
        }
        flush_letter_run(&mut run, &mut out);
        out.push(token);
    }
    flush_letter_run(&mut run, &mut out);
    out
}

fn flush_letter_run(run: &mut Vec<String>, out: &mut Vec<String>) {
    match run.len() {
        0 => {}
        1 => out.append(run),
        _ => out.push(run.drain(..).collect::<String>()),
    }
}

fn capitalize(token: &str) -> String {
    let is_lower = token.chars().all(|c| !c.is_uppercase());
    let is_upper = token.chars().all(|c| !c.is_lowercase());
    if !(is_lower || is_upper) {
        return token.to_string();
    }
    let mut chars = token.chars();
    match chars.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + &chars.as_str().to_lowercase(),
    }
}

// ── Dates ──

#[derive(Debug, PartialEq)]
enum DateExpr {
    Full(NaiveDate),
    MonthDay { month: u32, day: u32 },
    /// Month only, month and year, or a bare year.
    Partial,
    Ambiguous { first: u32, second: u32 },
    Invalid,
    Relative(RelativeDay),
    Nothing,
}

#[derive(Debug, PartialEq)]
enum RelativeDay {
    Today,
    Tomorrow,
    Yesterday,
    Weekday(Weekday),
    Vague,
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").expect("valid regex"))
}

fn numeric_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{4})$").expect("valid regex"))
}

fn date_tokens(raw: &str) -> Vec<String> {
    raw.to_lowercase()
        .chars()
        .map(|c| match c {
            ',' | '.' | '!' | '?' | ';' | '(' | ')' => ' ',
            c => c,
        })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn parse_date_expr(raw: &str) -> DateExpr {
    let tokens = date_tokens(raw);

    for token in &tokens {
        if let Some(caps) = iso_date_re().captures(token) {
            let (y, m, d) = (caps[1].parse().ok(), caps[2].parse().ok(), caps[3].parse().ok());
            return match (y, m, d) {
                (Some(y), Some(m), Some(d)) => ymd(y, m, d),
                _ => DateExpr::Invalid,
            };
        }
        if let Some(caps) = numeric_date_re().captures(token) {
            let (a, b, y) = (caps[1].parse().ok(), caps[2].parse().ok(), caps[3].parse().ok());
            return match (a, b, y) {
                (Some(a), Some(b), Some(y)) => resolve_numeric(a, b, y),
                _ => DateExpr::Invalid,
            };
        }
    }

    let words: Vec<&str> = tokens
        .iter()
        .map(String::as_str)
        .filter(|w| !matches!(*w, "the" | "of" | "on"))
        .collect();
    let year = words.iter().find_map(|w| year_from_word(w));

    if let Some(mi) = words.iter().position(|w| month_from_word(w).is_some()) {
        let month = month_from_word(words[mi]).unwrap_or(1);
        let day = words
            .get(mi + 1)
            .and_then(|w| day_from_word(w))
            .or_else(|| {
                mi.checked_sub(1)
                    .and_then(|i| words.get(i))
                    .and_then(|w| day_from_word(w))
            });
        return match (day, year) {
            (Some(day), Some(year)) => ymd(year, month, day),
            (Some(day), None) => DateExpr::MonthDay { month, day },
            (None, _) => DateExpr::Partial,
        };
    }

    if words.contains(&"today") {
        return DateExpr::Relative(RelativeDay::Today);
    }
    if words.contains(&"tomorrow") {
        return DateExpr::Relative(RelativeDay::Tomorrow);
    }
    if words.contains(&"yesterday") {
        return DateExpr::Relative(RelativeDay::Yesterday);
    }
    if let Some(weekday) = words.iter().find_map(|w| weekday_from_word(w)) {
        return DateExpr::Relative(RelativeDay::Weekday(weekday));
    }
    let vague = ["ago", "last", "week", "weeks", "month", "months", "soon", "later"];
    if words.iter().any(|w| vague.contains(w)) {
        return DateExpr::Relative(RelativeDay::Vague);
    }
    if year.is_some() {
        return DateExpr::Partial;
    }

    DateExpr::Nothing
}

fn ymd(year: i32, month: u32, day: u32) -> DateExpr {
    NaiveDate::from_ymd_opt(year, month, day)
        .map(DateExpr::Full)
        .unwrap_or(DateExpr::Invalid)
}

/// Numeric dates are read month first; a first part above 12 can only be a day.
fn resolve_numeric(a: u32, b: u32, year: i32) -> DateExpr {
    match (a <= 12, b <= 12) {
        (true, true) if a != b => DateExpr::Ambiguous {
            first: a,
            second: b,
        },
        (true, _) => ymd(year, a, b),
        (false, true) => ymd(year, b, a),
        (false, false) => DateExpr::Invalid,
    }
}

fn month_from_word(w: &str) -> Option<u32> {
    let month = match w {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn weekday_from_word(w: &str) -> Option<Weekday> {
    let weekday = match w {
        "monday" => Weekday::Mon,
        "tuesday" => Weekday::Tue,
        "wednesday" => Weekday::Wed,
        "thursday" => Weekday::Thu,
        "friday" => Weekday::Fri,
        "saturday" => Weekday::Sat,
        "sunday" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

const ORDINALS: [&str; 19] = [
    "first",
    "second",
    "third",
    "fourth",
    "fifth",
    "sixth",
    "seventh",
    "eighth",
    "ninth",
    "tenth",
    "eleventh",
    "twelfth",
    "thirteenth",
    "fourteenth",
    "fifteenth",
    "sixteenth",
    "seventeenth",
    "eighteenth",
    "nineteenth",
];

fn day_from_word(w: &str) -> Option<u32> {
    let digits = ["st", "nd", "rd", "th"]
        .iter()
        .find_map(|suffix| w.strip_suffix(suffix))
        .unwrap_or(w);
    if !digits.is_empty() && digits.len() <= 2 && digits.chars().all(|c| c.is_ascii_digit()) {
        return digits.parse().ok().filter(|d| (1..=31).contains(d));
    }
    ordinal_word(w)
}

fn ordinal_word(w: &str) -> Option<u32> {
    if let Some(i) = ORDINALS.iter().position(|o| *o == w) {
        return Some(i as u32 + 1);
    }
    match w {
        "twentieth" => Some(20),
        "thirtieth" => Some(30),
        _ => {
            let (tens, unit) = w.split_once('-')?;
            let base = match tens {
                "twenty" => 20,
                "thirty" => 30,
                _ => return None,
            };
            let unit = ORDINALS[..9].iter().position(|o| *o == unit)? as u32 + 1;
            Some(base + unit)
        }
    }
}

fn year_from_word(w: &str) -> Option<i32> {
    if w.len() == 4 && w.chars().all(|c| c.is_ascii_digit()) {
        w.parse().ok().filter(|y| *y >= 1000)
    } else {
        None
    }
}

fn validate_birthdate(raw: &str, today: NaiveDate) -> ValidationOutcome {
    match parse_date_expr(raw) {
        DateExpr::Full(date) if date > today => clarify(ClarificationReason::FutureBirthdate),
        DateExpr::Full(date) if today.year() - date.year() > MAX_AGE_YEARS => {
            clarify(ClarificationReason::ImplausibleBirthdate)
        }
        DateExpr::Full(date) => ValidationOutcome::Accepted(FieldValue::Date(date)),
        DateExpr::MonthDay { .. } => clarify(ClarificationReason::MissingYear),
        DateExpr::Partial => clarify(ClarificationReason::MissingDay),
        DateExpr::Ambiguous { first, second } => {
            clarify(ClarificationReason::AmbiguousNumericDate { first, second })
        }
        DateExpr::Invalid => clarify(ClarificationReason::InvalidDate),
        DateExpr::Relative(_) => clarify(ClarificationReason::RelativeDate),
        DateExpr::Nothing => clarify(ClarificationReason::Unrecognized),
    }
}

fn validate_appointment_date(raw: &str, today: NaiveDate) -> ValidationOutcome {
    let accepted = |date: NaiveDate| ValidationOutcome::Accepted(FieldValue::Date(date));
    match parse_date_expr(raw) {
        DateExpr::Full(date) if date < today => clarify(ClarificationReason::PastDate),
        DateExpr::Full(date) => accepted(date),
        DateExpr::MonthDay { month, day } => next_occurrence(month, day, today)
            .map(accepted)
            .unwrap_or_else(|| clarify(ClarificationReason::InvalidDate)),
        DateExpr::Partial => clarify(ClarificationReason::MissingDay),
        DateExpr::Ambiguous { first, second } => {
            clarify(ClarificationReason::AmbiguousNumericDate { first, second })
        }
        DateExpr::Invalid => clarify(ClarificationReason::InvalidDate),
        DateExpr::Relative(RelativeDay::Today) => accepted(today),
        DateExpr::Relative(RelativeDay::Tomorrow) => accepted(today + Duration::days(1)),
        DateExpr::Relative(RelativeDay::Yesterday) => clarify(ClarificationReason::PastDate),
        DateExpr::Relative(RelativeDay::Weekday(weekday)) => (1..=7)
            .map(|n| today + Duration::days(n))
            .find(|d| d.weekday() == weekday)
            .map(accepted)
            .unwrap_or_else(|| clarify(ClarificationReason::InvalidDate)),
        DateExpr::Relative(RelativeDay::Vague) => clarify(ClarificationReason::RelativeDate),
        DateExpr::Nothing => clarify(ClarificationReason::Unrecognized),
    }
}

/// Month and day without a year: the first such date on or after today.
fn next_occurrence(month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
    (today.year()..=today.year() + 4)
        .filter_map(|year| NaiveDate::from_ymd_opt(year, month, day))
        .find(|date| *date >= today)
}

// ── Times ──

fn clock_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2}):(\d{2})\s*(am|pm)?\b").expect("valid regex"))
}

fn hour_meridiem_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2})\s*(am|pm)\b").expect("valid regex"))
}

fn oclock_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2})\s*o'?clock\b").expect("valid regex"))
}

fn at_hour_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bat\s+(\d{1,2})\b").expect("valid regex"))
}

fn bare_hour_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d{1,2})(?:\s+in\s+the\s+(?:morning|afternoon|evening))?\s*$").expect("valid regex"))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Meridiem {
    Am,
    Pm,
}

fn validate_appointment_time(raw: &str) -> ValidationOutcome {
    let text = raw
        .to_lowercase()
        .replace("a.m.", "am")
        .replace("p.m.", "pm");

    if text.contains("noon") || text.contains("midday") {
        return resolve_time(12, 0, Some(Meridiem::Pm), None);
    }

    let hint = if text.contains("morning") {
        Some(Meridiem::Am)
    } else if text.contains("afternoon") || text.contains("evening") || text.contains("tonight") {
        Some(Meridiem::Pm)
    } else {
        None
    };

    if let Some(caps) = clock_re().captures(&text) {
        let hour = caps[1].parse().unwrap_or(99);
        let minute = caps[2].parse().unwrap_or(99);
        let explicit = caps.get(3).map(|m| meridiem(m.as_str()));
        return resolve_time(hour, minute, explicit, hint);
    }
    if let Some(caps) = hour_meridiem_re().captures(&text) {
        let hour = caps[1].parse().unwrap_or(99);
        return resolve_time(hour, 0, Some(meridiem(&caps[2])), hint);
    }
    let bare = oclock_re()
        .captures(&text)
        .or_else(|| at_hour_re().captures(&text))
        .or_else(|| bare_hour_re().captures(&text));
    if let Some(caps) = bare {
        let hour = caps[1].parse().unwrap_or(99);
        return resolve_time(hour, 0, None, hint);
    }

    clarify(ClarificationReason::Unrecognized)
}

fn meridiem(s: &str) -> Meridiem {
    if s == "pm" {
        Meridiem::Pm
    } else {
        Meridiem::Am
    }
}

fn resolve_time(
    hour: u32,
    minute: u32,
    explicit: Option<Meridiem>,
    hint: Option<Meridiem>,
) -> ValidationOutcome {
    if minute > 59 {
        return clarify(ClarificationReason::InvalidTime);
    }
    let hour24 = match (explicit, hour) {
        (Some(_), h) if h == 0 || h > 12 => return clarify(ClarificationReason::InvalidTime),
        (Some(m), h) => to_24h(h, m),
        (None, 13..=23) => hour,
        (None, 0) => 0,
        (None, 1..=12) => match hint {
            Some(m) => to_24h(hour, m),
            None => return clarify(ClarificationReason::AmbiguousMeridiem { hour }),
        },
        (None, _) => return clarify(ClarificationReason::InvalidTime),
    };
    NaiveTime::from_hms_opt(hour24, minute, 0)
        .map(|t| ValidationOutcome::Accepted(FieldValue::Time(t)))
        .unwrap_or_else(|| clarify(ClarificationReason::InvalidTime))
}

fn to_24h(hour: u32, m: Meridiem) -> u32 {
    match m {
        Meridiem::Am => hour % 12,
        Meridiem::Pm => hour % 12 + 12,
    }
}

// ── Confirmations ──

const AFFIRMATIVE: &[&str] = &[
    "yes", "yeah", "yep", "yup", "correct", "right", "exactly", "sure", "same", "ok", "okay",
    "absolutely", "confirmed", "true",
];
const AFFIRMATIVE_FILLER: &[&str] = &["that's", "thats", "that", "is", "it", "please", "still", "keep"];
const NEGATIVE: &[&str] = &["no", "nope", "nah", "wrong", "incorrect", "not", "isn't"];
const NEGATIVE_FILLER: &[&str] = &["that's", "thats", "that", "is", "it", "right", "quite"];

fn plain_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|w| {
            w.trim_matches(|c: char| !(c.is_alphanumeric() || c == '\''))
                .to_string()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Utterance made only of agreement ("yes", "that's right").
pub fn is_affirmation(text: &str) -> bool {
    let words = plain_words(text);
    !words.is_empty()
        && words.iter().any(|w| AFFIRMATIVE.contains(&w.as_str()))
        && words
            .iter()
            .all(|w| AFFIRMATIVE.contains(&w.as_str()) || AFFIRMATIVE_FILLER.contains(&w.as_str()))
}

/// Utterance made only of disagreement ("no", "that's not right").
pub fn is_negation(text: &str) -> bool {
    let words = plain_words(text);
    !words.is_empty()
        && words.iter().any(|w| NEGATIVE.contains(&w.as_str()))
        && words
            .iter()
            .all(|w| NEGATIVE.contains(&w.as_str()) || NEGATIVE_FILLER.contains(&w.as_str()))
}
