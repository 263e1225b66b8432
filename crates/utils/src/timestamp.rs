use chrono::{DateTime, Duration, Utc};

/// Timestamp for the next version of a document.
///
/// Version ordering within a document is by `created_at`, so two appends must
/// never share a timestamp. When the wall clock has not advanced past the
/// previous latest version, the new timestamp is bumped one millisecond past
/// it instead.
pub fn next_version_timestamp(latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match latest {
        Some(prev) if now <= prev => prev + Duration::milliseconds(1),
        _ => now,
    }
}
