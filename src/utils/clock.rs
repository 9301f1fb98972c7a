use chrono::{DateTime, SecondsFormat, Utc};

/// Horodatage ISO-8601 UTC à largeur fixe ("2026-10-19T08:30:00.000Z").
/// Comparable lexicographiquement, c'est ce qui définit "le plus récent".
pub fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_iso() -> String {
    iso(Utc::now())
}
