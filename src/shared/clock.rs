use chrono::Utc;

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub fn unix_timestamp() -> i64 {
    Utc::now().timestamp()
}
