use chrono::Utc;

/// Wall-clock time in nanoseconds since the Unix epoch.
pub fn now_nanos() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .map(|n| n.max(0) as u64)
        .unwrap_or(0)
}
