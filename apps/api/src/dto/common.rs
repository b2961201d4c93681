use chrono::{DateTime, SecondsFormat, Utc};

/// Formats a timestamp the way every response carries it.
#[must_use]
pub(super) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
