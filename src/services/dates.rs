use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

const DRIVER_DATE_FORMAT: &str = "%Y-%m-%d";
const DRIVER_TIME_FORMAT: &str = "%I:%M %p";

/// Formats the portal prints dates of birth in.
const PORTAL_DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y", "%m/%d/%Y"];

pub fn format_driver_date(date: NaiveDate) -> String {
    date.format(DRIVER_DATE_FORMAT).to_string()
}

/// "11:00 AM"
pub fn format_driver_time(time: NaiveTime) -> String {
    time.format(DRIVER_TIME_FORMAT).to_string()
}

pub fn parse_portal_date(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    PORTAL_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// "August 28, 2003"
pub fn spoken_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// "11:00 AM"
pub fn spoken_time(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}

pub fn combine(date: NaiveDate, time: NaiveTime) -> NaiveDateTime {
    date.and_time(time)
}
