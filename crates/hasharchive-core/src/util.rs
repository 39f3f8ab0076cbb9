use chrono::{DateTime, Utc};

/// Current wall-clock time in whole seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

/// Render a sequence timestamp for humans, e.g. `2016-01-02 03:04:05 UTC`.
pub fn format_time(time: u64) -> String {
    i64::try_from(time)
        .ok()
        .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("@{time}"))
}
