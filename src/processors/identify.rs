//! Time column identification.
//!
//! Loggers write their seven clock fields into columns whose names cannot be
//! trusted: the same `g_*` headers appear in every file, but which one holds
//! the hour or the hundredths changes between firmware builds. Roles are
//! recovered from the values themselves, using the session date and starting
//! hour as anchors.
//!
//! Roles are resolved in a fixed order, each claiming exactly one column from
//! the remaining pool:
//!
//! 1. year, month, day: every value is the expected value or `0`
//! 2. hour: one or two non-zero values, all within an hour of the session hour
//! 3. hundredths: spans `0..=99` with more than 50 distinct values
//! 4. second: in `0..=59`, changing roughly every 100 samples
//! 5. minute: in `0..=59`, stepping by at most one across each second rollover
//!
//! A role with no candidate, or more than one, is a hard failure naming the
//! role and the competing columns.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::core::loaders::ImuTable;

/// Canonical names of the global clock columns, in role order.
pub const CANONICAL_TIME_COLUMNS: [&str; 7] = [
    "g_year", "g_month", "g_day", "g_hour", "g_minute", "g_second", "g_hund",
];

/// Mean sample spacing between second changes accepted for a ~100 Hz logger.
const SECOND_SPACING: (f64, f64) = (80.0, 120.0);

/// Minimum number of distinct readings for a hundredths counter.
const MIN_HUND_DISTINCT: usize = 50;

/// Errors raised while identifying time columns.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdentifyError {
    #[error("No expected time columns found.")]
    NoCandidates,

    #[error("{role} column not found (no matching candidates)")]
    NotFound { role: TimeRole },

    #[error("{role} column not uniquely identified: {columns:?}")]
    NotUnique { role: TimeRole, columns: Vec<String> },

    #[error("Invalid session date '{0}': expected yymmdd")]
    InvalidDate(String),

    #[error("cannot rename {from} to {column}: another column already has that name")]
    NameConflict { from: String, column: String },
}

/// Result type for identification.
pub type Result<T> = std::result::Result<T, IdentifyError>;

/// Semantic role of a clock column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeRole {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Hund,
}

impl TimeRole {
    /// All roles in field order (year first).
    pub const ALL: [TimeRole; 7] = [
        TimeRole::Year,
        TimeRole::Month,
        TimeRole::Day,
        TimeRole::Hour,
        TimeRole::Minute,
        TimeRole::Second,
        TimeRole::Hund,
    ];

    /// Canonical `g_*` column for this role.
    pub fn canonical_column(self) -> &'static str {
        CANONICAL_TIME_COLUMNS[self as usize]
    }

    fn label(self) -> &'static str {
        match self {
            TimeRole::Year => "Year",
            TimeRole::Month => "Month",
            TimeRole::Day => "Day",
            TimeRole::Hour => "Hour",
            TimeRole::Minute => "Minute",
            TimeRole::Second => "Second",
            TimeRole::Hund => "Hundredths",
        }
    }
}

impl fmt::Display for TimeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Externally known facts about a session used to anchor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHints {
    /// Two-digit year.
    pub year: u32,
    pub month: u32,
    pub day: u32,
    /// Hour the session started, 24-hour clock.
    pub hour: u32,
}

impl SessionHints {
    /// Builds hints from a `yymmdd` date string and the session hour.
    pub fn from_date_part(date_part: &str, hour: u32) -> Result<Self> {
        let invalid = || IdentifyError::InvalidDate(date_part.to_string());
        if date_part.len() != 6 || !date_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let field = |range: std::ops::Range<usize>| -> Result<u32> {
            date_part[range].parse().map_err(|_| invalid())
        };
        Ok(Self {
            year: field(0..2)?,
            month: field(2..4)?,
            day: field(4..6)?,
            hour,
        })
    }

    /// Hours accepted for the hour column: the session hour and its neighbours.
    fn hour_window(&self) -> [f64; 3] {
        let h = self.hour % 24;
        [((h + 23) % 24) as f64, h as f64, ((h + 1) % 24) as f64]
    }
}

/// Role → source column binding for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    columns: [String; 7],
}

impl ColumnMapping {
    /// Source column bound to `role`.
    pub fn column(&self, role: TimeRole) -> &str {
        &self.columns[role as usize]
    }

    /// `(role, column)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (TimeRole, &str)> {
        TimeRole::ALL
            .iter()
            .map(move |&role| (role, self.column(role)))
    }

    /// Renames needed to bring the source columns to canonical names.
    /// Columns already canonical are left out.
    pub fn rename_map(&self) -> HashMap<String, String> {
        self.iter()
            .filter(|(role, col)| *col != role.canonical_column())
            .map(|(role, col)| (col.to_string(), role.canonical_column().to_string()))
            .collect()
    }
}

fn present(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| !v.is_nan())
}

fn distinct(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut set: Vec<f64> = values.collect();
    set.sort_by(f64::total_cmp);
    set.dedup();
    set
}

fn all_within(values: &[f64], lo: f64, hi: f64) -> bool {
    values.iter().all(|&v| v >= lo && v <= hi)
}

/// Every reading is `expected` or the unsynchronized sentinel `0`.
fn matches_constant(values: &[f64], expected: f64) -> bool {
    present(values).all(|v| v == expected || v == 0.0)
}

/// One or two distinct non-zero readings, all inside the session hour window.
fn matches_hour(values: &[f64], window: &[f64; 3]) -> bool {
    let non_zero = distinct(present(values).filter(|&v| v != 0.0));
    !non_zero.is_empty() && non_zero.len() <= 2 && non_zero.iter().all(|v| window.contains(v))
}

/// Behaves like a free-running 0-99 sub-second counter.
fn matches_hundredths(values: &[f64]) -> bool {
    let set = distinct(present(values));
    set.first() == Some(&0.0) && set.last() == Some(&99.0) && set.len() > MIN_HUND_DISTINCT
}

/// In `0..=59` and, over its non-zero readings, changes value on average
/// every 80-120 rows.
fn matches_second(values: &[f64]) -> bool {
    if !all_within(values, 0.0, 59.0) {
        return false;
    }

    let non_zero: Vec<usize> = (0..values.len()).filter(|&i| values[i] != 0.0).collect();
    if non_zero.len() < 2 {
        return false;
    }

    // Row of the last reading before each change.
    let change_rows: Vec<usize> = non_zero
        .windows(2)
        .filter(|w| values[w[1]] != values[w[0]])
        .map(|w| w[0])
        .collect();
    if change_rows.len() < 2 {
        return false;
    }

    let spacings: Vec<f64> = change_rows
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64)
        .collect();
    let mean = spacings.iter().sum::<f64>() / spacings.len() as f64;
    (SECOND_SPACING.0..=SECOND_SPACING.1).contains(&mean)
}

/// In `0..=59` and, at every row where the second column rolls over,
/// advances by at most one minute (59 -> 0 counts as one).
fn matches_minute(values: &[f64], seconds: &[f64]) -> bool {
    if !all_within(values, 0.0, 59.0) || values.len() != seconds.len() {
        return false;
    }

    let rollovers: Vec<usize> = seconds
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[1] < w[0])
        .map(|(i, _)| i)
        .collect();
    if rollovers.len() < 2 {
        return false;
    }

    rollovers.iter().all(|&i| {
        let (from, to) = (values[i], values[i + 1]);
        (to - from).abs() <= 1.0 || (from == 59.0 && to == 0.0)
    })
}

/// Remaining candidate columns while roles are being claimed.
struct CandidatePool<'a> {
    table: &'a ImuTable,
    names: Vec<String>,
}

impl<'a> CandidatePool<'a> {
    fn new(table: &'a ImuTable, candidates: &[String]) -> Self {
        let mut names: Vec<String> = Vec::with_capacity(candidates.len());
        for name in candidates {
            if table.has_column(name) && !names.contains(name) {
                names.push(name.clone());
            }
        }
        Self { table, names }
    }

    /// Claims the single column satisfying `rule` for `role`.
    fn claim<F>(&mut self, role: TimeRole, rule: F) -> Result<String>
    where
        F: Fn(&[f64]) -> bool,
    {
        let matches: Vec<String> = self
            .names
            .iter()
            .filter(|name| self.table.column(name).map_or(false, |values| rule(values)))
            .cloned()
            .collect();

        match matches.len() {
            0 => Err(IdentifyError::NotFound { role }),
            1 => {
                let chosen = matches[0].clone();
                self.names.retain(|n| *n != chosen);
                log::debug!("{} -> {}", role, chosen);
                Ok(chosen)
            }
            _ => Err(IdentifyError::NotUnique {
                role,
                columns: matches,
            }),
        }
    }
}

/// Candidate columns present in `table`, in candidate order.
pub fn available_time_columns(table: &ImuTable, candidates: &[String]) -> Vec<String> {
    CandidatePool::new(table, candidates).names
}

/// Returns true if every listed column is zero in every row.
///
/// Files recorded before the logger synchronized its clock carry nothing
/// but zeros; these are skipped rather than treated as failures.
pub fn time_columns_all_zero(table: &ImuTable, columns: &[String]) -> bool {
    columns
        .iter()
        .filter_map(|c| table.column(c))
        .all(|values| values.iter().all(|&v| v == 0.0))
}

/// Bind each of the seven time roles to exactly one candidate column.
///
/// # Arguments
///
/// * `table` - Rows of one logger file (or a representative window of them)
/// * `candidates` - Column names eligible for a time role
/// * `hints` - Session date and starting hour
///
/// # Errors
///
/// [`IdentifyError::NoCandidates`] if no candidate column exists;
/// [`IdentifyError::NotFound`] / [`IdentifyError::NotUnique`] for the first
/// role that cannot be bound to exactly one column.
pub fn identify_time_columns(
    table: &ImuTable,
    candidates: &[String],
    hints: &SessionHints,
) -> Result<ColumnMapping> {
    let mut pool = CandidatePool::new(table, candidates);
    if pool.names.is_empty() {
        return Err(IdentifyError::NoCandidates);
    }

    let year = pool.claim(TimeRole::Year, |v| matches_constant(v, hints.year as f64))?;
    let month = pool.claim(TimeRole::Month, |v| matches_constant(v, hints.month as f64))?;
    let day = pool.claim(TimeRole::Day, |v| matches_constant(v, hints.day as f64))?;

    let window = hints.hour_window();
    let hour = pool.claim(TimeRole::Hour, |v| matches_hour(v, &window))?;
    let hund = pool.claim(TimeRole::Hund, matches_hundredths)?;
    let second = pool.claim(TimeRole::Second, matches_second)?;

    let second_values = table.column(&second).unwrap_or_default();
    let minute = pool.claim(TimeRole::Minute, |v| matches_minute(v, second_values))?;

    Ok(ColumnMapping {
        columns: [year, month, day, hour, minute, second, hund],
    })
}
