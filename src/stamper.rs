//! Appends the aligned collection instant to un-timestamped sample lines.
//!
//! Prometheus exposition lines are `name{labels} value [timestamp]`. A
//! line is treated as already-timestamped the moment it splits (on
//! whitespace) into three or more tokens — matching spec.md §4.2's
//! recognition rule exactly, rather than trying to parse the value and
//! timestamp out.

use chrono::{DateTime, Utc};

/// Stamp every un-timestamped sample line in `payload` with `instant`,
/// expressed in milliseconds since the Unix epoch.
///
/// Comment lines (`#...`), blank lines, and lines that already carry a
/// timestamp pass through byte-for-byte.
#[must_use]
pub fn stamp(payload: &[u8], instant: DateTime<Utc>) -> Vec<u8> {
    let millis = instant.timestamp_millis();
    let text = String::from_utf8_lossy(payload);

    // `lines()` drops the line terminator; we always re-emit `\n`, which
    // matches Prometheus exposition format's convention and keeps the
    // output stable regardless of the input's original line endings.
    let mut out = String::with_capacity(text.len() + text.len() / 4);

    for line in text.lines() {
        if needs_stamp(line) {
            out.push_str(line);
            out.push(' ');
            out.push_str(&millis.to_string());
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }

    out.into_bytes()
}

fn is_sample_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

/// Only a well-formed, un-timestamped sample line (exactly two
/// whitespace-separated tokens: name{labels} and value) gets a
/// timestamp appended. A line with a single token is malformed and
/// passes through unchanged per spec.md §4.2, rather than being
/// mistaken for an un-timestamped sample.
fn needs_stamp(line: &str) -> bool {
    is_sample_line(line) && line.split_whitespace().count() == 2
}
