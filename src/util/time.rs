use chrono::Utc;

/// Current wall-clock time as unix seconds.
pub fn now_unix_seconds() -> i64 {
    Utc::now().timestamp()
}
