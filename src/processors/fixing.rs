//! Repair of mislabelled logger files.
//!
//! Each file is loaded, its clock columns are identified by value and renamed
//! to canonical names, and the result is written under a name derived from
//! the session date and the first synchronized clock reading. Files that
//! cannot be repaired are copied unmodified into a quarantine folder so they
//! can be fixed by hand.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;

use crate::core::loaders::{self, list_csv_files, ImuTable, LoaderError};
use crate::core::writers::{quarantine_copy, write_table_csv_unique, LogTag, RunLog, WriteError};
use crate::processors::identify::{
    available_time_columns, identify_time_columns, time_columns_all_zero, IdentifyError,
    SessionHints, CANONICAL_TIME_COLUMNS,
};

/// Errors that can occur while fixing a file.
#[derive(Debug, Error)]
pub enum FixError {
    #[error(transparent)]
    Load(#[from] LoaderError),

    #[error(transparent)]
    Identify(#[from] IdentifyError),

    #[error("no row carries a non-zero time field")]
    NoSyncedRow,

    #[error("input file has no name: {0}")]
    NoFileName(PathBuf),

    #[error(transparent)]
    Write(#[from] WriteError),
}

pub type Result<T> = std::result::Result<T, FixError>;

/// What happened to one input file.
#[derive(Debug)]
pub enum FixOutcome {
    /// Repaired file written to `path`.
    Fixed { path: PathBuf },
    /// Nothing to repair (clock never synchronized).
    Skipped { reason: String },
    /// Repair failed; the original was copied to `copy`.
    Quarantined { copy: PathBuf, error: String },
}

impl FixOutcome {
    pub fn is_fixed(&self) -> bool {
        matches!(self, FixOutcome::Fixed { .. })
    }
}

/// Settings shared by every file of one fix run.
#[derive(Debug, Clone)]
pub struct FixSettings<'a> {
    pub hints: SessionHints,
    pub candidates: &'a [String],
    pub quarantine_folder: &'a str,
}

/// Text after the last `_` of a file name, extension included.
///
/// `440502_171135_03.csv` → `03.csv`; a name without `_` is returned whole.
pub fn file_suffix(file_name: &str) -> &str {
    file_name.rsplit('_').next().unwrap_or(file_name)
}

/// Output name `{yymmdd}_{HHMMSS}_{suffix}` for a repaired file.
pub fn fixed_file_name(hints: &SessionHints, table: &ImuTable, suffix: &str) -> Result<String> {
    let columns: Vec<&[f64]> = CANONICAL_TIME_COLUMNS
        .iter()
        .filter_map(|c| table.column(c))
        .collect();
    let row = (0..table.num_rows())
        .find(|&r| columns.iter().any(|col| col[r] != 0.0 && !col[r].is_nan()))
        .ok_or(FixError::NoSyncedRow)?;

    let field = |name: &str| table.column(name).map(|c| c[row] as i64).unwrap_or(0);
    Ok(format!(
        "{:02}{:02}{:02}_{:02}{:02}{:02}_{}",
        hints.year,
        hints.month,
        hints.day,
        field("g_hour"),
        field("g_minute"),
        field("g_second"),
        suffix
    ))
}

/// Returns a copy of `table` with its clock columns identified and renamed.
///
/// Returns `Ok(None)` when every candidate column is zero. Renaming keeps
/// each column at its original position, and fails with
/// [`IdentifyError::NameConflict`] when a canonical name is already held by
/// a column that stays unrenamed.
pub fn fix_table(table: &ImuTable, settings: &FixSettings<'_>) -> Result<Option<ImuTable>> {
    let available = available_time_columns(table, settings.candidates);
    if available.is_empty() {
        return Err(IdentifyError::NoCandidates.into());
    }
    if time_columns_all_zero(table, &available) {
        return Ok(None);
    }

    let mapping = identify_time_columns(table, settings.candidates, &settings.hints)?;
    let renames = mapping.rename_map();
    let conflict = renames
        .iter()
        .find(|(_, to)| table.has_column(to) && !renames.contains_key(to.as_str()));
    if let Some((from, to)) = conflict {
        return Err(IdentifyError::NameConflict {
            from: from.clone(),
            column: to.clone(),
        }
        .into());
    }

    let mut fixed = table.clone();
    fixed.rename_columns(&renames);
    Ok(Some(fixed))
}

/// Repair one file into `output_dir`.
///
/// Outcomes are appended to `log` as `[SUCCESS]`, `[SKIPPED]` or `[ERROR]`.
/// Only a failure to write the quarantine copy itself is returned as an
/// error.
pub fn fix_imu_file(
    input: &Path,
    output_dir: &Path,
    settings: &FixSettings<'_>,
    log: &RunLog,
) -> std::result::Result<FixOutcome, WriteError> {
    let file_name = input
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let attempt = || -> Result<Option<PathBuf>> {
        if file_name.is_empty() {
            return Err(FixError::NoFileName(input.to_path_buf()));
        }
        let table = loaders::load_imu_csv(input)?;
        let Some(fixed) = fix_table(&table, settings)? else {
            return Ok(None);
        };

        let name = fixed_file_name(&settings.hints, &fixed, file_suffix(&file_name))?;
        let path = write_table_csv_unique(output_dir, &name, &fixed)?;
        Ok(Some(path))
    };

    match attempt() {
        Ok(Some(path)) => {
            log.record(LogTag::Success, &format!("Saved: {}", path.display()));
            Ok(FixOutcome::Fixed { path })
        }
        Ok(None) => {
            let reason = "all time columns are zero".to_string();
            log.record(LogTag::Skipped, &format!("{}: {}", file_name, reason));
            Ok(FixOutcome::Skipped { reason })
        }
        Err(e) => {
            log.record(LogTag::Error, &format!("{}: {}", file_name, e));
            let copy = quarantine_copy(input, &output_dir.join(settings.quarantine_folder))?;
            log::warn!("Original file copied to: {}", copy.display());
            Ok(FixOutcome::Quarantined {
                copy,
                error: e.to_string(),
            })
        }
    }
}

/// Repair every CSV in `input_dir` in parallel.
///
/// Outcomes are returned in file order. A file that fails never stops the
/// others.
pub fn fix_folder(
    input_dir: &Path,
    output_dir: &Path,
    settings: &FixSettings<'_>,
    log: &RunLog,
) -> anyhow::Result<Vec<(PathBuf, FixOutcome)>> {
    let files = list_csv_files(input_dir)?;
    log::info!("Fixing {} files from {}", files.len(), input_dir.display());

    let outcomes = files
        .par_iter()
        .map(|path| Ok((path.clone(), fix_imu_file(path, output_dir, settings, log)?)))
        .collect::<std::result::Result<Vec<_>, WriteError>>()?;

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timestamp::TimeFields;
    use crate::processors::fixtures::{canonical_candidates, synthetic_recording, write_recording};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn start() -> TimeFields {
        TimeFields {
            year: 25,
            month: 3,
            day: 7,
            hour: 13,
            minute: 20,
            second: 30,
            hund: 0,
        }
    }

    fn settings(candidates: &[String]) -> FixSettings<'_> {
        FixSettings {
            hints: SessionHints::from_date_part("250307", 13).unwrap(),
            candidates,
            quarantine_folder: "Still_needs_to_fix",
        }
    }

    #[test]
    fn test_file_suffix() {
        assert_eq!(file_suffix("440502_171135_03.csv"), "03.csv");
        assert_eq!(file_suffix("plain.csv"), "plain.csv");
    }

    #[test]
    fn test_fix_renames_and_names_output() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let log = RunLog::new(output.path().join("fix_log.txt"));
        let candidates = canonical_candidates();

        let mut table = synthetic_recording(start(), 12_000, 20);
        let canonical_order = table.columns.clone();
        let swap: HashMap<String, String> = [("g_minute", "g_hund"), ("g_hund", "g_minute")]
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        table.rename_columns(&swap);
        let path = write_recording(input.path(), "440502_171135_03.csv", &table);

        let outcome = fix_imu_file(&path, output.path(), &settings(&candidates), &log).unwrap();
        let FixOutcome::Fixed { path: fixed } = outcome else {
            panic!("expected a fixed file, got {:?}", outcome);
        };
        assert_eq!(fixed, output.path().join("250307_132030_03.csv"));

        let written = loaders::load_imu_csv(&fixed).unwrap();
        assert_eq!(written.columns, canonical_order);
        assert_eq!(written.column("g_minute").unwrap()[20], 20.0);
        assert_eq!(written.column("g_hund").unwrap()[21], 1.0);

        let log_text = fs::read_to_string(log.path()).unwrap();
        assert!(log_text.starts_with("[SUCCESS] Saved:"));
    }

    #[test]
    fn test_rename_onto_existing_column_is_rejected() {
        let candidates: Vec<String> = CANONICAL_TIME_COLUMNS
            .iter()
            .filter(|c| **c != "g_hund")
            .map(|c| c.to_string())
            .chain(std::iter::once("counter".to_string()))
            .collect();

        let mut table = synthetic_recording(start(), 12_000, 20);
        let rename: HashMap<String, String> = [("g_hund".to_string(), "counter".to_string())].into();
        table.rename_columns(&rename);
        let n = table.num_rows();
        table.push_column("g_hund", vec![7.0; n]);

        match fix_table(&table, &settings(&candidates)) {
            Err(FixError::Identify(IdentifyError::NameConflict { from, column })) => {
                assert_eq!(from, "counter");
                assert_eq!(column, "g_hund");
            }
            other => panic!("expected a name conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_fix_is_idempotent_on_canonical_file() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let log = RunLog::new(output.path().join("fix_log.txt"));
        let candidates = canonical_candidates();

        let table = synthetic_recording(start(), 12_000, 0);
        let path = write_recording(input.path(), "000000_000000_07.csv", &table);

        let outcome = fix_imu_file(&path, output.path(), &settings(&candidates), &log).unwrap();
        let FixOutcome::Fixed { path: fixed } = outcome else {
            panic!("expected a fixed file");
        };
        let written = loaders::load_imu_csv(&fixed).unwrap();
        assert_eq!(written.columns, table.columns);
        assert_eq!(written.data, table.data);
    }

    #[test]
    fn test_name_collision_gets_numbered() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let log = RunLog::new(output.path().join("fix_log.txt"));
        let candidates = canonical_candidates();

        let table = synthetic_recording(start(), 12_000, 0);
        let a = write_recording(input.path(), "a_03.csv", &table);
        let b = write_recording(input.path(), "b_03.csv", &table);

        fix_imu_file(&a, output.path(), &settings(&candidates), &log).unwrap();
        let second = fix_imu_file(&b, output.path(), &settings(&candidates), &log).unwrap();
        match second {
            FixOutcome::Fixed { path } => {
                assert_eq!(path, output.path().join("250307_132030_03_02.csv"))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_all_zero_file_is_skipped() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let log = RunLog::new(output.path().join("fix_log.txt"));
        let candidates = canonical_candidates();

        let table = synthetic_recording(start(), 0, 300);
        let path = write_recording(input.path(), "440502_171135_04.csv", &table);

        let outcome = fix_imu_file(&path, output.path(), &settings(&candidates), &log).unwrap();
        assert!(matches!(outcome, FixOutcome::Skipped { .. }));

        let log_text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            log_text.trim_end(),
            "[SKIPPED] 440502_171135_04.csv: all time columns are zero"
        );
        assert!(!output.path().join("Still_needs_to_fix").exists());
    }

    #[test]
    fn test_ambiguous_hour_is_quarantined() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let log = RunLog::new(output.path().join("fix_log.txt"));
        let candidates = canonical_candidates();

        // Short recording: the minute column never leaves 13, so it passes
        // the hour rule alongside the real hour column.
        let begin = TimeFields { minute: 13, second: 0, ..start() };
        let table = synthetic_recording(begin, 3_000, 0);
        let path = write_recording(input.path(), "440502_171135_03.csv", &table);
        let original_bytes = fs::read(&path).unwrap();

        let outcome = fix_imu_file(&path, output.path(), &settings(&candidates), &log).unwrap();
        let FixOutcome::Quarantined { copy, error } = outcome else {
            panic!("expected quarantine");
        };
        assert_eq!(copy, output.path().join("Still_needs_to_fix").join("440502_171135_03.csv"));
        assert_eq!(fs::read(&copy).unwrap(), original_bytes);
        assert!(error.contains("Hour column not uniquely identified"));

        let log_text = fs::read_to_string(log.path()).unwrap();
        assert!(log_text.starts_with("[ERROR] 440502_171135_03.csv:"));
        assert!(log_text.contains("g_hour") && log_text.contains("g_minute"));
    }

    #[test]
    fn test_no_candidates_is_quarantined() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let log = RunLog::new(output.path().join("fix_log.txt"));
        let candidates = canonical_candidates();

        let table = ImuTable::from_columns(vec![("ax", vec![1.0, 2.0])]);
        let path = write_recording(input.path(), "x_01.csv", &table);

        let outcome = fix_imu_file(&path, output.path(), &settings(&candidates), &log).unwrap();
        match outcome {
            FixOutcome::Quarantined { error, .. } => {
                assert_eq!(error, "No expected time columns found.")
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_fix_folder_keeps_going() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let log = RunLog::new(output.path().join("fix_log.txt"));
        let candidates = canonical_candidates();

        write_recording(input.path(), "a_01.csv", &synthetic_recording(start(), 12_000, 0));
        write_recording(input.path(), "b_02.csv", &ImuTable::from_columns(vec![("ax", vec![1.0])]));
        write_recording(input.path(), "c_03.csv", &synthetic_recording(start(), 0, 10));

        let outcomes = fix_folder(input.path(), output.path(), &settings(&candidates), &log).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].1.is_fixed());
        assert!(matches!(outcomes[1].1, FixOutcome::Quarantined { .. }));
        assert!(matches!(outcomes[2].1, FixOutcome::Skipped { .. }));
        assert_eq!(fs::read_to_string(log.path()).unwrap().lines().count(), 3);
    }
}
