//! Line-level Prometheus exposition grammar.
//!
//! `name{k="v",k="v"} value [timestamp]`. Parsing here is intentionally
//! lenient: a line that doesn't match is simply not a [`Sample`], never
//! an error — spec.md §4.4 requires malformed lines to be skipped, not
//! fatal.

use once_cell_replacement::LazyRegex;
use std::collections::HashMap;

/// One parsed exposition line.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub value: f64,
    pub timestamp_ms: Option<i64>,
}

impl Sample {
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

static LINE_RE: LazyRegex = LazyRegex::new(
    r"^([a-zA-Z_:][a-zA-Z0-9_:]*)(\{[^}]*\})?\s+(\S+)(\s+(-?\d+))?\s*$",
);

static LABEL_RE: LazyRegex = LazyRegex::new(r#"([a-zA-Z_][a-zA-Z0-9_]*)\s*=\s*"([^"]*)""#);

/// Parse a single exposition line into a [`Sample`].
///
/// Returns `None` for comments, blank lines, and anything that doesn't
/// match the grammar above (including a value that isn't a valid
/// `f64`).
#[must_use]
pub fn parse_line(line: &str) -> Option<Sample> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let caps = LINE_RE.get().captures(trimmed)?;

    let name = caps.get(1)?.as_str().to_string();
    let labels = caps
        .get(2)
        .map(|m| parse_labels(m.as_str()))
        .unwrap_or_default();
    let value: f64 = caps.get(3)?.as_str().parse().ok()?;
    let timestamp_ms = caps.get(5).and_then(|m| m.as_str().parse().ok());

    Some(Sample {
        name,
        labels,
        value,
        timestamp_ms,
    })
}

fn parse_labels(blob: &str) -> HashMap<String, String> {
    LABEL_RE
        .get()
        .captures_iter(blob)
        .map(|c| {
            let key = c.get(1).map_or("", |m| m.as_str()).to_string();
            let value = c.get(2).map_or("", |m| m.as_str()).to_string();
            (key, value)
        })
        .collect()
}

/// Tiny `OnceLock`-backed lazy regex, so the grammar above reads like a
/// plain `Regex` constant without paying to recompile it per call and
/// without reaching for an extra lazy-static crate.
mod once_cell_replacement {
    use regex::Regex;
    use std::sync::OnceLock;

    pub struct LazyRegex {
        pattern: &'static str,
        cell: OnceLock<Regex>,
    }

    impl LazyRegex {
        #[must_use]
        pub const fn new(pattern: &'static str) -> Self {
            Self {
                pattern,
                cell: OnceLock::new(),
            }
        }

        #[allow(clippy::expect_used)]
        pub fn get(&self) -> &Regex {
            self.cell
                .get_or_init(|| Regex::new(self.pattern).expect("static regex pattern is valid"))
        }
    }
}
