//! Local-time reconstruction.
//!
//! Some loggers only latch their global clock (`g_*`) sporadically: most rows
//! read zero, and the rest may freeze or jump. The local hundredths counter
//! (`l_hund`) keeps ticking reliably, so a dense global clock is rebuilt by
//! taking the first synchronized row as an anchor and accumulating the
//! forward distance of `l_hund` from row to row.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;

use crate::core::loaders::{self, list_csv_files, ImuTable, LoaderError};
use crate::core::writers::{
    self, quarantine_copy, write_table_csv_unique, LogTag, RunLog, WriteError,
};
use crate::processors::identify::CANONICAL_TIME_COLUMNS;

/// Local clock columns, in field order matching [`CANONICAL_TIME_COLUMNS`].
pub const LOCAL_TIME_COLUMNS: [&str; 7] = [
    "l_year", "l_month", "l_day", "l_hour", "l_minute", "l_second", "l_hund",
];

const LOCAL_HUND: &str = "l_hund";
const LOCAL_MINUTE: &str = "l_minute";
const LOCAL_SECOND: &str = "l_second";

/// Counter jumps above this many hundredths are candidates for the
/// register-aliasing correction.
const ALIAS_DELTA_HUNDREDTHS: u32 = 5;

/// Errors that can occur during reconstruction.
#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("no row carries a non-zero global time field")]
    NoAnchor,

    #[error("row {row}: {column} value {value} is not a valid clock reading")]
    InvalidReading {
        row: usize,
        column: &'static str,
        value: f64,
    },

    #[error(transparent)]
    Load(#[from] LoaderError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Result type for reconstruction.
pub type Result<T> = std::result::Result<T, ReconstructError>;

/// Running global clock carried from row to row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockState {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub hund: u32,
    /// `l_hund` of the row this state belongs to.
    pub prev_local_hund: u32,
}

/// Forward distance from `prev` to `current` on a 0-99 counter.
#[inline]
pub fn hundredths_delta(prev: u32, current: u32) -> u32 {
    (current + 100 - prev % 100) % 100
}

impl ClockState {
    /// Advances the clock by `delta` hundredths (`delta < 100`), carrying
    /// into seconds, minutes and hours. Hours wrap at 24 without touching
    /// the date.
    pub fn advance(self, delta: u32) -> Self {
        let mut next = self;
        next.hund += delta;
        if next.hund >= 100 {
            next.hund -= 100;
            next.second += 1;
            if next.second >= 60 {
                next.second = 0;
                next.minute += 1;
                if next.minute >= 60 {
                    next.minute = 0;
                    next.hour += 1;
                    if next.hour >= 24 {
                        next.hour = 0;
                    }
                }
            }
        }
        next
    }

    /// Consumes one row's local counter. Returns the new state and whether
    /// the aliasing correction replaced the measured delta.
    pub fn step(self, local_hund: u32, aliased: bool) -> (Self, bool) {
        let raw_delta = hundredths_delta(self.prev_local_hund, local_hund);
        let corrected = aliased && raw_delta > ALIAS_DELTA_HUNDREDTHS;
        let delta = if corrected { 1 } else { raw_delta };

        let mut next = self.advance(delta);
        next.prev_local_hund = local_hund;
        (next, corrected)
    }
}

/// Summary of one reconstruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconstructReport {
    /// Index of the anchor row in the input.
    pub anchor_row: usize,
    /// Rows before the anchor that were discarded.
    pub dropped_rows: usize,
    /// Rows in the output (anchor included).
    pub rows: usize,
    /// Rows whose delta was replaced by the aliasing correction.
    pub alias_corrections: usize,
    /// Times the reconstructed hour wrapped past midnight.
    pub midnight_wraps: usize,
}

fn reading(table: &ImuTable, column: &'static str, row: usize) -> Result<u32> {
    let value = table
        .column(column)
        .map(|values| values[row])
        .ok_or_else(|| ReconstructError::MissingColumns(column.to_string()))?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as u32)
    } else {
        Err(ReconstructError::InvalidReading { row, column, value })
    }
}

/// Like [`reading`], but also rejects values above `max`.
fn clock_reading(table: &ImuTable, column: &'static str, row: usize, max: u32) -> Result<u32> {
    let value = reading(table, column, row)?;
    if value > max {
        return Err(ReconstructError::InvalidReading {
            row,
            column,
            value: value as f64,
        });
    }
    Ok(value)
}

/// Reads `l_minute, l_second, l_hund == g_hour, g_minute, g_second` for a row.
fn registers_alias(table: &ImuTable, row: usize) -> bool {
    let pairs = [
        (LOCAL_MINUTE, "g_hour"),
        (LOCAL_SECOND, "g_minute"),
        (LOCAL_HUND, "g_second"),
    ];
    pairs.iter().all(|(local, global)| {
        match (table.column(local), table.column(global)) {
            (Some(l), Some(g)) => l[row] == g[row],
            _ => false,
        }
    })
}

/// Rebuild the global clock of `table` from its local hundredths counter.
///
/// Rows before the anchor (the first row with any non-zero `g_*` field) are
/// dropped. From the anchor onward, `g_hour..g_hund` are replaced by the
/// accumulated clock and `g_year..g_day` by the anchor's date; the same
/// values are copied into whichever `l_*` columns exist.
///
/// # Arguments
///
/// * `table` - One logger file with `g_*` and `l_hund` columns
/// * `alias_correction` - Apply the register-aliasing correction
///
/// # Errors
///
/// [`ReconstructError::NoAnchor`] if every global field is zero;
/// [`ReconstructError::MissingColumns`] if a `g_*` column or `l_hund` is
/// absent; [`ReconstructError::InvalidReading`] for a non-integral counter.
pub fn reconstruct_local_time(
    table: &ImuTable,
    alias_correction: bool,
) -> Result<(ImuTable, ReconstructReport)> {
    let globals: Vec<&[f64]> = CANONICAL_TIME_COLUMNS
        .iter()
        .map(|c| {
            table
                .column(c)
                .ok_or_else(|| ReconstructError::MissingColumns(c.to_string()))
        })
        .collect::<Result<_>>()?;
    if !table.has_column(LOCAL_HUND) {
        return Err(ReconstructError::MissingColumns(LOCAL_HUND.to_string()));
    }

    let n = table.num_rows();
    let anchor = (0..n)
        .find(|&row| globals.iter().any(|col| col[row] != 0.0 && !col[row].is_nan()))
        .ok_or(ReconstructError::NoAnchor)?;

    let date = [
        reading(table, "g_year", anchor)?,
        reading(table, "g_month", anchor)?,
        reading(table, "g_day", anchor)?,
    ];
    let start = ClockState {
        hour: clock_reading(table, "g_hour", anchor, 23)?,
        minute: clock_reading(table, "g_minute", anchor, 59)?,
        second: clock_reading(table, "g_second", anchor, 59)?,
        hund: clock_reading(table, "g_hund", anchor, 99)?,
        prev_local_hund: reading(table, LOCAL_HUND, anchor)?,
    };

    let local: Vec<u32> = (anchor..n)
        .map(|row| reading(table, LOCAL_HUND, row))
        .collect::<Result<_>>()?;

    let mut report = ReconstructReport {
        anchor_row: anchor,
        dropped_rows: anchor,
        rows: n - anchor,
        ..Default::default()
    };

    let states: Vec<ClockState> = std::iter::once(start)
        .chain((anchor + 1..n).zip(&local[1..]).scan(start, |state, (row, &hund)| {
            let aliased = alias_correction && registers_alias(table, row);
            let (next, corrected) = state.step(hund, aliased);
            if corrected {
                report.alias_corrections += 1;
            }
            if next.hour < state.hour {
                report.midnight_wraps += 1;
            }
            *state = next;
            Some(next)
        }))
        .collect();

    let mut output = table.slice_rows(anchor..n);
    let fields: [Vec<f64>; 7] = [
        vec![date[0] as f64; states.len()],
        vec![date[1] as f64; states.len()],
        vec![date[2] as f64; states.len()],
        states.iter().map(|s| s.hour as f64).collect(),
        states.iter().map(|s| s.minute as f64).collect(),
        states.iter().map(|s| s.second as f64).collect(),
        states.iter().map(|s| s.hund as f64).collect(),
    ];

    for ((global, local), values) in CANONICAL_TIME_COLUMNS
        .iter()
        .zip(LOCAL_TIME_COLUMNS)
        .zip(fields)
    {
        if output.has_column(local) {
            output.set_column(local, values.clone());
        }
        output.set_column(*global, values);
    }

    if report.alias_corrections > 0 {
        log::debug!(
            "aliasing correction applied to {} rows",
            report.alias_corrections
        );
    }

    Ok((output, report))
}

/// Outcome of reconstructing one file.
#[derive(Debug)]
pub enum ReconstructOutcome {
    Written {
        path: PathBuf,
        report: ReconstructReport,
    },
    Skipped {
        reason: String,
    },
    Quarantined {
        copy: PathBuf,
        error: String,
    },
}

/// Reconstruct one file into `output_dir` under the same name.
///
/// Files without an anchor are logged as skipped. Any other failure is
/// logged and the original is copied unmodified to
/// `output_dir/<quarantine_folder>`.
pub fn reconstruct_file(
    input: &Path,
    output_dir: &Path,
    quarantine_folder: &str,
    alias_correction: bool,
    log: &RunLog,
) -> std::result::Result<ReconstructOutcome, WriteError> {
    let file_name = input
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let attempt = || -> Result<(PathBuf, ReconstructReport)> {
        let table = loaders::load_imu_csv(input)?;
        let (fixed, report) = reconstruct_local_time(&table, alias_correction)?;
        let path = write_table_csv_unique(output_dir, &file_name, &fixed)?;
        Ok((path, report))
    };

    match attempt() {
        Ok((path, report)) => {
            log.record(
                LogTag::Success,
                &format!(
                    "{}: {} rows from anchor row {} ({} aliasing corrections)",
                    file_name, report.rows, report.anchor_row, report.alias_corrections
                ),
            );
            Ok(ReconstructOutcome::Written { path, report })
        }
        Err(ReconstructError::NoAnchor) => {
            let reason = "all global time columns are zero".to_string();
            log.record(LogTag::Skipped, &format!("{}: {}", file_name, reason));
            Ok(ReconstructOutcome::Skipped { reason })
        }
        Err(e) => {
            log.record(LogTag::Error, &format!("{}: {}", file_name, e));
            let copy = quarantine_copy(input, &output_dir.join(quarantine_folder))?;
            log::warn!("Original file copied to: {}", copy.display());
            Ok(ReconstructOutcome::Quarantined {
                copy,
                error: e.to_string(),
            })
        }
    }
}

/// Reconstruct every CSV in `input_dir` in parallel.
///
/// Each file is independent; a failure never stops its siblings. Outcomes
/// are returned in file order.
pub fn reconstruct_folder(
    input_dir: &Path,
    output_dir: &Path,
    quarantine_folder: &str,
    alias_correction: bool,
    log: &RunLog,
) -> anyhow::Result<Vec<(PathBuf, ReconstructOutcome)>> {
    let files = list_csv_files(input_dir)?;

    let outcomes = files
        .par_iter()
        .map(|path| {
            let outcome =
                reconstruct_file(path, output_dir, quarantine_folder, alias_correction, log)?;
            Ok((path.clone(), outcome))
        })
        .collect::<std::result::Result<Vec<_>, WriteError>>()?;

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timestamp::ClockZone;
    use std::fs;
    use tempfile::TempDir;

    /// Table with sparse global fields and a local counter.
    fn local_table(l_hund: &[f64], anchor_row: usize, anchor: [f64; 7]) -> ImuTable {
        let n = l_hund.len();
        let mut table = ImuTable::new();
        table.push_column("ax", (0..n).map(|i| i as f64).collect());
        for (i, name) in CANONICAL_TIME_COLUMNS.iter().enumerate() {
            let mut values = vec![0.0; n];
            values[anchor_row] = anchor[i];
            table.push_column(*name, values);
        }
        table.push_column("l_minute", vec![0.0; n]);
        table.push_column("l_second", vec![0.0; n]);
        table.push_column("l_hund", l_hund.to_vec());
        table
    }

    #[test]
    fn test_out_of_range_anchor_names_the_reading() {
        let table = local_table(&[10.0, 11.0], 1, [25.0, 3.0, 3.0, 13.0, 75.0, 10.0, 40.0]);
        match reconstruct_local_time(&table, true) {
            Err(ReconstructError::InvalidReading { row, column, value }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "g_minute");
                assert_eq!(value, 75.0);
            }
            other => panic!("expected an invalid g_minute reading, got {:?}", other),
        }
    }

    #[test]
    fn test_hundredths_delta_wraps() {
        assert_eq!(hundredths_delta(97, 98), 1);
        assert_eq!(hundredths_delta(99, 0), 1);
        assert_eq!(hundredths_delta(95, 2), 7);
        assert_eq!(hundredths_delta(40, 40), 0);
    }

    #[test]
    fn test_carry_cascade() {
        let table = local_table(
            &[95.0, 99.0, 2.0, 3.0],
            0,
            [25.0, 3.0, 3.0, 13.0, 20.0, 10.0, 95.0],
        );
        let (out, report) = reconstruct_local_time(&table, true).unwrap();

        assert_eq!(report.rows, 4);
        assert_eq!(out.column("g_hund").unwrap(), &[95.0, 99.0, 2.0, 3.0]);
        assert_eq!(out.column("g_second").unwrap(), &[10.0, 10.0, 11.0, 11.0]);
        assert_eq!(out.column("g_minute").unwrap(), &[20.0; 4]);
        assert_eq!(out.column("g_hour").unwrap(), &[13.0; 4]);
    }

    #[test]
    fn test_carry_into_minute_and_hour() {
        let start = ClockState {
            hour: 13,
            minute: 59,
            second: 59,
            hund: 98,
            prev_local_hund: 0,
        };
        let next = start.advance(3);
        assert_eq!((next.hour, next.minute, next.second, next.hund), (14, 0, 0, 1));

        let late = ClockState { hour: 23, ..start }.advance(3);
        assert_eq!((late.hour, late.minute, late.second, late.hund), (0, 0, 0, 1));
    }

    #[test]
    fn test_rows_before_anchor_are_dropped() {
        let table = local_table(
            &[10.0, 11.0, 12.0, 13.0, 14.0],
            2,
            [25.0, 3.0, 3.0, 13.0, 20.0, 10.0, 50.0],
        );
        let (out, report) = reconstruct_local_time(&table, true).unwrap();

        assert_eq!(report.anchor_row, 2);
        assert_eq!(report.dropped_rows, 2);
        assert_eq!(out.num_rows(), 3);
        assert_eq!(out.column("ax").unwrap(), &[2.0, 3.0, 4.0]);
        assert_eq!(out.column("g_hund").unwrap(), &[50.0, 51.0, 52.0]);
        assert_eq!(out.column("g_year").unwrap(), &[25.0; 3]);
        assert_eq!(out.column("g_day").unwrap(), &[3.0; 3]);
    }

    #[test]
    fn test_reconstructed_time_is_monotonic() {
        let l_hund: Vec<f64> = (0..1_000).map(|i| ((97 + i * 3) % 100) as f64).collect();
        let table = local_table(&l_hund, 0, [25.0, 3.0, 3.0, 13.0, 59.0, 58.0, 0.0]);
        let (out, _) = reconstruct_local_time(&table, true).unwrap();

        let zone = ClockZone::default();
        let times: Vec<f64> = (0..out.num_rows())
            .map(|row| {
                let values: [f64; 7] =
                    std::array::from_fn(|i| out.column(CANONICAL_TIME_COLUMNS[i]).unwrap()[row]);
                zone.values_to_unix_time(values).unwrap()
            })
            .collect();

        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(out.column("g_hour").unwrap().last(), Some(&14.0));
    }

    #[test]
    fn test_local_columns_receive_reconstructed_values() {
        let table = local_table(&[98.0, 99.0, 0.0, 1.0], 0, [25.0, 3.0, 3.0, 9.0, 5.0, 7.0, 98.0]);
        let (out, _) = reconstruct_local_time(&table, true).unwrap();

        assert_eq!(out.column("l_second").unwrap(), out.column("g_second").unwrap());
        assert_eq!(out.column("l_minute").unwrap(), &[5.0; 4]);
        assert_eq!(out.column("l_hund").unwrap(), &[98.0, 99.0, 0.0, 1.0]);
        assert!(!out.has_column("l_year"));
    }

    #[test]
    fn test_alias_correction_forces_single_tick() {
        // Row 1 jumps by 40 hundredths while l_minute/l_second/l_hund mirror
        // g_hour/g_minute/g_second.
        let mut table = local_table(&[10.0, 50.0, 51.0], 0, [25.0, 3.0, 3.0, 13.0, 20.0, 10.0, 0.0]);
        let mut g_hour = table.column("g_hour").unwrap().to_vec();
        let mut g_minute = table.column("g_minute").unwrap().to_vec();
        let mut g_second = table.column("g_second").unwrap().to_vec();
        let mut l_minute = table.column("l_minute").unwrap().to_vec();
        let mut l_second = table.column("l_second").unwrap().to_vec();
        g_hour[1] = 13.0;
        g_minute[1] = 20.0;
        g_second[1] = 50.0;
        l_minute[1] = 13.0;
        l_second[1] = 20.0;
        table.set_column("g_hour", g_hour);
        table.set_column("g_minute", g_minute);
        table.set_column("g_second", g_second);
        table.set_column("l_minute", l_minute);
        table.set_column("l_second", l_second);

        let (out, report) = reconstruct_local_time(&table, true).unwrap();
        assert_eq!(report.alias_corrections, 1);
        assert_eq!(out.column("g_hund").unwrap(), &[0.0, 1.0, 2.0]);

        let (raw, report) = reconstruct_local_time(&table, false).unwrap();
        assert_eq!(report.alias_corrections, 0);
        assert_eq!(raw.column("g_hund").unwrap(), &[0.0, 40.0, 41.0]);
    }

    #[test]
    fn test_no_anchor() {
        let table = local_table(&[1.0, 2.0], 0, [0.0; 7]);
        assert!(matches!(
            reconstruct_local_time(&table, true),
            Err(ReconstructError::NoAnchor)
        ));
    }

    #[test]
    fn test_missing_local_counter() {
        let mut table = local_table(&[1.0, 2.0], 0, [25.0, 3.0, 3.0, 13.0, 0.0, 0.0, 0.0]);
        table.drop_column("l_hund");
        assert!(matches!(
            reconstruct_local_time(&table, true),
            Err(ReconstructError::MissingColumns(_))
        ));
    }

    #[test]
    fn test_reconstruct_folder_outcomes() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let log = RunLog::new(output.path().join("log.txt"));

        let good = local_table(&[1.0, 2.0, 3.0], 1, [25.0, 3.0, 3.0, 13.0, 0.0, 0.0, 5.0]);
        let zero = local_table(&[1.0, 2.0], 0, [0.0; 7]);
        let mut broken = good.clone();
        broken.drop_column("l_hund");
        writers::write_table_csv(&input.path().join("a.csv"), &good).unwrap();
        writers::write_table_csv(&input.path().join("b.csv"), &zero).unwrap();
        writers::write_table_csv(&input.path().join("c.csv"), &broken).unwrap();

        let outcomes =
            reconstruct_folder(input.path(), output.path(), "Still_needs_to_fix", true, &log)
                .unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0].1, ReconstructOutcome::Written { .. }));
        assert!(matches!(outcomes[1].1, ReconstructOutcome::Skipped { .. }));
        assert!(matches!(outcomes[2].1, ReconstructOutcome::Quarantined { .. }));

        assert!(output.path().join("a.csv").exists());
        assert_eq!(
            fs::read(input.path().join("c.csv")).unwrap(),
            fs::read(output.path().join("Still_needs_to_fix").join("c.csv")).unwrap()
        );

        let log_text = fs::read_to_string(log.path()).unwrap();
        assert!(log_text.contains("[SUCCESS] a.csv"));
        assert!(log_text.contains("[SKIPPED] b.csv"));
        assert!(log_text.contains("[ERROR] c.csv"));
    }
}
