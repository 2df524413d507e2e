use chrono::{DateTime, Datelike, Timelike, Utc};
use std::time::SystemTime;

/// Convert time to DOS format, returned as `(time, date)`.
///
/// DOS dates cannot express anything before 1980, so earlier timestamps
/// clamp to 1980-01-01 00:00:00.
pub fn dos_time(time: Option<SystemTime>) -> (u16, u16) {
    let datetime: DateTime<Utc> = time.unwrap_or_else(SystemTime::now).into();

    if datetime.year() < 1980 {
        return (0, (1 << 5) | 1);
    }

    let year = (datetime.year() - 1980).min(127) as u16;
    let date = (year << 9) | ((datetime.month() as u16) << 5) | datetime.day() as u16;
    let time = ((datetime.hour() as u16) << 11)
        | ((datetime.minute() as u16) << 5)
        | (datetime.second() as u16 >> 1);

    (time, date)
}
