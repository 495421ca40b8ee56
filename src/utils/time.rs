use chrono::Utc;

/// Wall-clock timestamp in milliseconds since the Unix epoch.
pub fn time_millis() -> i64 {
    Utc::now().timestamp_millis()
}
