//! Formatting helpers shared by the CLI and exporters.

use chrono::{DateTime, Local, SecondsFormat, Utc};

/// How long ago a finding was first seen (e.g., "2m ago").
pub fn format_age(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(ts);

    if elapsed.num_seconds() < 1 {
        "just now".to_string()
    } else if elapsed.num_seconds() < 60 {
        format!("{}s ago", elapsed.num_seconds())
    } else if elapsed.num_minutes() < 60 {
        format!("{}m ago", elapsed.num_minutes())
    } else if elapsed.num_hours() < 24 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        ts.with_timezone(&Local).format("%b %d").to_string()
    }
}

/// Local wall-clock time, e.g. `2025-06-01 14:03:22`.
pub fn format_local(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// UTC with millisecond precision, e.g. `2025-06-01T12:03:22.120Z`.
pub fn format_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Render bucket counts as a block sparkline.
pub fn format_sparkline(counts: &[usize]) -> String {
    const BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

    let Some(&max) = counts.iter().max() else {
        return String::new();
    };
    if max == 0 {
        return BLOCKS[0].to_string().repeat(counts.len());
    }
    counts
        .iter()
        .map(|&c| BLOCKS[(c * (BLOCKS.len() - 1)) / max])
        .collect()
}
