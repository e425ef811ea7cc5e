//! Human-readable sizes and relative times for the model table.

const SIZE_UNITS: [&str; 8] = ["", "K", "M", "G", "T", "P", "E", "Z"];

/// (label, seconds per unit, largest value shown before moving to the next unit)
const TIMESINCE_CHUNKS: [(&str, f64, Option<f64>); 7] = [
    ("second", 1.0, Some(60.0)),
    ("minute", 60.0, Some(60.0)),
    ("hour", 60.0 * 60.0, Some(24.0)),
    ("day", 60.0 * 60.0 * 24.0, Some(6.0)),
    ("week", 60.0 * 60.0 * 24.0 * 7.0, Some(6.0)),
    ("month", 60.0 * 60.0 * 24.0 * 30.0, Some(11.0)),
    ("year", 60.0 * 60.0 * 24.0 * 365.0, None),
];

/// Formats a byte count with SI prefixes (factor 1000, one decimal).
pub fn format_size(size: u64) -> String {
    let mut size = size as f64;
    for unit in SIZE_UNITS {
        if size.abs() < 1000.0 {
            return format!("{:3.1}{}", size, unit);
        }
        size /= 1000.0;
    }
    format!("{:.1}Y", size)
}

/// Formats a Unix timestamp as a coarse "time ago" string relative to now.
pub fn format_timesince(timestamp: f64) -> String {
    format_timesince_at(timestamp, now_timestamp())
}

pub fn format_timesince_at(timestamp: f64, now: f64) -> String {
    let delta = now - timestamp;
    if delta < 20.0 {
        return "a few seconds ago".to_string();
    }

    let mut label = "";
    let mut value = 0.0;
    for (chunk_label, divider, max_value) in TIMESINCE_CHUNKS {
        label = chunk_label;
        value = (delta / divider).round_ties_even();
        if max_value.is_some_and(|max| value <= max) {
            break;
        }
    }

    let plural = if value > 1.0 { "s" } else { "" };
    format!("{} {}{} ago", value as u64, label, plural)
}

pub fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
