//! Multi-logger synchronization.
//!
//! Loggers worn during one session start and stop at slightly different
//! moments. Every sequence is cropped to the interval all loggers cover.

use std::fmt;

use crate::core::sequence::LoggerSequence;

/// Closed interval `[start, end]` shared by every logger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncWindow {
    pub start: f64,
    pub end: f64,
}

impl SyncWindow {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Why no common window exists.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncIssue {
    /// No sequences were given.
    NoInput,
    /// At least one logger has no samples.
    EmptySequence { names: Vec<String> },
    /// The latest start is after the earliest end.
    NoOverlap { start: f64, end: f64 },
}

impl fmt::Display for SyncIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncIssue::NoInput => write!(f, "no logger sequences to synchronize"),
            SyncIssue::EmptySequence { names } => {
                write!(f, "empty logger sequences: {}", names.join(", "))
            }
            SyncIssue::NoOverlap { start, end } => write!(
                f,
                "loggers do not overlap (latest start {:.2} > earliest end {:.2})",
                start, end
            ),
        }
    }
}

/// Output of [`synchronize_loggers`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedSet {
    /// Common window, when one exists.
    pub window: Option<SyncWindow>,
    /// One sequence per input, same order. Empty when `issue` is set.
    pub sequences: Vec<LoggerSequence>,
    pub issue: Option<SyncIssue>,
}

impl SyncedSet {
    pub fn is_synchronized(&self) -> bool {
        self.issue.is_none()
    }
}

/// Crop every sequence to `[max of starts, min of ends]`, inclusive.
///
/// Order of sequences and of samples within each sequence is preserved.
/// Missing input, an empty sequence or disjoint ranges produce empty
/// sequences and a [`SyncIssue`] instead of an error.
pub fn synchronize_loggers(sequences: &[LoggerSequence]) -> SyncedSet {
    let empty = |issue: SyncIssue| SyncedSet {
        window: None,
        sequences: sequences
            .iter()
            .map(|s| LoggerSequence::new(s.name.clone()))
            .collect(),
        issue: Some(issue),
    };

    if sequences.is_empty() {
        return empty(SyncIssue::NoInput);
    }

    let empty_names: Vec<String> = sequences
        .iter()
        .filter(|s| s.is_empty())
        .map(|s| s.name.clone())
        .collect();
    if !empty_names.is_empty() {
        return empty(SyncIssue::EmptySequence { names: empty_names });
    }

    let ranges: Vec<(f64, f64)> = sequences.iter().filter_map(|s| s.time_range()).collect();
    let start = ranges.iter().map(|r| r.0).fold(f64::NEG_INFINITY, f64::max);
    let end = ranges.iter().map(|r| r.1).fold(f64::INFINITY, f64::min);

    if start > end {
        return empty(SyncIssue::NoOverlap { start, end });
    }

    let window = SyncWindow { start, end };
    log::info!(
        "Synchronized window {:.2} to {:.2} ({:.1} s)",
        start,
        end,
        window.duration()
    );

    SyncedSet {
        window: Some(window),
        sequences: sequences.iter().map(|s| s.clip(start, end)).collect(),
        issue: None,
    }
}
