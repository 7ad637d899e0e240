use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::AquaError;

/// Compact UTC timestamp carried in `local_timestamp`: `YYYYMMDDhhmmss`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, AquaError> {
    if text.len() != 14 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AquaError::Serialization(format!(
            "timestamp `{}` is not 14 digits",
            text
        )));
    }
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| AquaError::Serialization(format!("invalid timestamp `{}`: {}", text, e)))
}

pub fn is_valid_timestamp(text: &str) -> bool {
    parse_timestamp(text).is_ok()
}
