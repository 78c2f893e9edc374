use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// Format used for StartTime/EndTime columns of the activity log.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// This is the standard way of converting a moment into a log timestamp. Timestamps are written in
/// local time, without an offset.
pub fn format_log_timestamp(moment: DateTime<Utc>) -> String {
    moment
        .with_timezone(&Local)
        .format(LOG_TIMESTAMP_FORMAT)
        .to_string()
}

/// Inverse of [format_log_timestamp]. Ambiguous local times (DST fold) resolve to the earlier one.
pub fn parse_log_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), LOG_TIMESTAMP_FORMAT)?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|v| v.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("{value} doesn't exist in the local timezone"))
}

/// Formats seconds as `dd hh:mm:ss`.
pub fn format_day_duration(total_seconds: i64) -> String {
    let total_seconds = total_seconds.max(0);
    let days = total_seconds / 86400;
    let hours = (total_seconds % 86400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{days:02} {hours:02}:{minutes:02}:{seconds:02}")
}
