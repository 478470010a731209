//! Logger folder loading: merge a logger's files into one trimmed sequence.
//!
//! A logger writes a new CSV file every few minutes. All files of one logger
//! are concatenated in name order, filtered to valid rows with a plausible
//! date, stamped with an absolute time computed from the global clock
//! fields, and trimmed to drop the warm-up period at the start of the
//! recording.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ProcessingConfig;
use crate::core::loaders::{
    self, list_csv_files, ImuTable, LoaderError, SENSOR_COLUMNS, UNIX_TIME_COLUMN, VALID_COLUMN,
};
use crate::core::sequence::{LoggerSequence, NUM_CHANNELS};
use crate::core::timestamp::{ClockZone, TimeError};
use crate::processors::identify::CANONICAL_TIME_COLUMNS;

/// Errors that can occur while loading a logger folder.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no CSV files in {0}")]
    NoFiles(PathBuf),

    #[error("failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: LoaderError,
    },

    #[error(transparent)]
    Columns(#[from] LoaderError),

    #[error("invalid clock zone: {0}")]
    Zone(#[from] TimeError),
}

pub type Result<T> = std::result::Result<T, MergeError>;

/// Row counts at each stage of loading one logger folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub files: usize,
    pub rows_read: usize,
    /// Rows left after the `valid == 1` filter.
    pub rows_valid: usize,
    /// Rows left after the plausible-date filter.
    pub rows_dated: usize,
    /// Rows dropped because their clock fields are not a real civil time.
    pub rows_invalid_time: usize,
    /// Rows dropped by the start-of-recording trim.
    pub rows_trimmed: usize,
    /// Rows found earlier in time than their predecessor before sorting.
    pub rows_out_of_order: usize,
    pub rows_out: usize,
    /// Duplicate column names dropped while reading.
    pub duplicate_columns: Vec<String>,
}

/// Concatenate every CSV in `folder`, in name order.
///
/// A stale `Unix Time` column is dropped from each file, as are repeated
/// column names (first occurrence wins). Columns are aligned by name.
pub fn combine_csv_files(folder: &Path) -> Result<(ImuTable, LoadReport)> {
    let files = list_csv_files(folder).map_err(|source| MergeError::Load {
        path: folder.to_path_buf(),
        source,
    })?;
    if files.is_empty() {
        return Err(MergeError::NoFiles(folder.to_path_buf()));
    }

    let mut report = LoadReport {
        files: files.len(),
        ..Default::default()
    };

    let mut tables = Vec::with_capacity(files.len());
    for path in &files {
        let mut table = loaders::load_imu_csv(path).map_err(|source| MergeError::Load {
            path: path.clone(),
            source,
        })?;
        if table.drop_column(UNIX_TIME_COLUMN) > 0 {
            log::debug!("{}: dropped stale {}", path.display(), UNIX_TIME_COLUMN);
        }
        for name in table.dedup_columns() {
            if !report.duplicate_columns.contains(&name) {
                report.duplicate_columns.push(name);
            }
        }
        tables.push(table);
    }

    let combined = ImuTable::concat(&tables);
    report.rows_read = combined.num_rows();
    Ok((combined, report))
}

fn plausible_date(year: f64, month: f64, day: f64, min_year: f64) -> bool {
    year >= min_year && (1.0..=12.0).contains(&month) && (1.0..=31.0).contains(&day)
}

/// Load, merge, filter, stamp and trim one logger folder.
///
/// # Arguments
///
/// * `folder` - Directory holding the logger's CSV files
/// * `name` - Logger name given to the returned sequence
/// * `config` - Trim window, clock zone and year threshold
///
/// # Returns
///
/// The logger sequence sorted by time, with columns `Unix Time, ax..mz`,
/// and a [`LoadReport`]. A folder whose rows are all filtered out yields an
/// empty sequence.
pub fn preprocess_logger_folder(
    folder: &Path,
    name: &str,
    config: &ProcessingConfig,
) -> Result<(LoggerSequence, LoadReport)> {
    let zone = ClockZone::new(config.utc_offset_hours, config.year_base)?;
    let (table, mut report) = combine_csv_files(folder)?;

    let valid = table.require_column(VALID_COLUMN)?;
    let clock: Vec<&[f64]> = CANONICAL_TIME_COLUMNS
        .iter()
        .map(|c| table.require_column(c))
        .collect::<std::result::Result<_, _>>()?;
    let channels: Vec<&[f64]> = SENSOR_COLUMNS
        .iter()
        .map(|c| table.require_column(c))
        .collect::<std::result::Result<_, _>>()?;

    let mut stamped: Vec<(f64, usize)> = Vec::with_capacity(table.num_rows());
    for row in 0..table.num_rows() {
        if valid[row] != 1.0 {
            continue;
        }
        report.rows_valid += 1;

        if !plausible_date(clock[0][row], clock[1][row], clock[2][row], config.min_year) {
            continue;
        }
        report.rows_dated += 1;

        let values: [f64; 7] = std::array::from_fn(|i| clock[i][row]);
        match zone.values_to_unix_time(values) {
            Ok(t) => stamped.push((t, row)),
            Err(e) => {
                if report.rows_invalid_time == 0 {
                    log::warn!("{}: first invalid clock reading at row {}: {}", name, row, e);
                }
                report.rows_invalid_time += 1;
            }
        }
    }

    if report.rows_invalid_time > 0 {
        log::warn!("{}: dropped {} rows with invalid clock readings", name, report.rows_invalid_time);
    }

    if let Some(min_time) = stamped.iter().map(|&(t, _)| t).reduce(f64::min) {
        let trim_time = min_time + config.trim_minutes * 60.0;
        let before = stamped.len();
        stamped.retain(|&(t, _)| t >= trim_time);
        report.rows_trimmed = before - stamped.len();
    }

    report.rows_out_of_order = stamped.windows(2).filter(|w| w[1].0 < w[0].0).count();
    if report.rows_out_of_order > 0 {
        log::warn!("{}: {} rows out of time order, sorting", name, report.rows_out_of_order);
        stamped.sort_by(|a, b| a.0.total_cmp(&b.0));
    }

    let mut sequence = LoggerSequence::with_capacity(name, stamped.len());
    for (t, row) in stamped {
        let sample: [f64; NUM_CHANNELS] = std::array::from_fn(|c| channels[c][row]);
        sequence.push(t, sample);
    }
    report.rows_out = sequence.len();

    if sequence.is_empty() {
        log::warn!("{}: no rows left after filtering", name);
    } else {
        log::info!(
            "{}: {} files, {} rows read, {} kept",
            name,
            report.files,
            report.rows_read,
            report.rows_out
        );
    }

    Ok((sequence, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timestamp::TimeFields;
    use crate::processors::fixtures::{synthetic_recording, write_recording};
    use tempfile::TempDir;

    fn fields(minute: u32) -> TimeFields {
        TimeFields {
            year: 25,
            month: 3,
            day: 7,
            hour: 13,
            minute,
            second: 0,
            hund: 0,
        }
    }

    /// Three consecutive two-minute files with the usual defects.
    fn logger_folder() -> TempDir {
        let dir = TempDir::new().unwrap();

        // Startup file: unsynchronized rows, then some rows flagged invalid.
        let mut first = synthetic_recording(fields(0), 12_000, 200);
        let mut valid = first.column(VALID_COLUMN).unwrap().to_vec();
        valid[500..600].iter_mut().for_each(|v| *v = 0.0);
        first.set_column(VALID_COLUMN, valid);
        write_recording(dir.path(), "250307_130000_01.csv", &first);

        // Previously processed file: two stale Unix Time columns and a
        // repeated temp column.
        let mut second = synthetic_recording(fields(2), 12_000, 0);
        second.push_column(UNIX_TIME_COLUMN, vec![1.0; 12_000]);
        second.push_column(UNIX_TIME_COLUMN, vec![2.0; 12_000]);
        second.push_column("temp", vec![99.0; 12_000]);
        write_recording(dir.path(), "250307_130200_02.csv", &second);

        // Last file: one impossible hour reading.
        let mut third = synthetic_recording(fields(4), 12_000, 0);
        let mut hours = third.column("g_hour").unwrap().to_vec();
        hours[10] = 24.0;
        third.set_column("g_hour", hours);
        write_recording(dir.path(), "250307_130400_03.csv", &third);

        dir
    }

    #[test]
    fn test_combine_csv_files() {
        let dir = logger_folder();
        let (table, report) = combine_csv_files(dir.path()).unwrap();

        assert_eq!(report.files, 3);
        assert_eq!(table.num_rows(), 36_200);
        assert!(!table.has_column(UNIX_TIME_COLUMN));
        assert_eq!(report.duplicate_columns, vec!["temp".to_string()]);
        assert_eq!(table.columns.iter().filter(|c| *c == "temp").count(), 1);
    }

    #[test]
    fn test_preprocess_logger_folder() {
        let dir = logger_folder();
        let config = ProcessingConfig::default();
        let (seq, report) = preprocess_logger_folder(dir.path(), "Logger1", &config).unwrap();

        assert_eq!(seq.name, "Logger1");
        assert_eq!(report.rows_read, 36_200);
        assert_eq!(report.rows_valid, 36_100);
        assert_eq!(report.rows_dated, 35_900);
        assert_eq!(report.rows_invalid_time, 1);
        assert_eq!(report.rows_out_of_order, 0);

        let global_min = ClockZone::default().to_unix_time(&fields(0)).unwrap();
        let start = seq.start().unwrap();
        assert!(start >= global_min + 300.0);
        assert!((start - (global_min + 300.0)).abs() < 1e-6);
        assert!(seq.is_sorted());
        assert_eq!(report.rows_out, seq.len());
        // 13:05:00.00 through 13:05:59.99, minus nothing.
        assert_eq!(seq.len(), 6_000);
    }

    #[test]
    fn test_projection_matches_written_columns() {
        let dir = logger_folder();
        let (seq, _) =
            preprocess_logger_folder(dir.path(), "Logger1", &ProcessingConfig::default()).unwrap();

        let table = seq.to_table();
        assert_eq!(table.columns[0], UNIX_TIME_COLUMN);
        assert_eq!(&table.columns[1..], &SENSOR_COLUMNS.map(String::from)[..]);
        assert_eq!(table.columns.iter().filter(|c| *c == UNIX_TIME_COLUMN).count(), 1);
    }

    #[test]
    fn test_out_of_order_rows_are_sorted() {
        let dir = TempDir::new().unwrap();
        // Named so the later recording is read first.
        write_recording(dir.path(), "a.csv", &synthetic_recording(fields(1), 100, 0));
        write_recording(dir.path(), "b.csv", &synthetic_recording(fields(0), 100, 0));

        let config = ProcessingConfig {
            trim_minutes: 0.0,
            ..Default::default()
        };
        let (seq, report) = preprocess_logger_folder(dir.path(), "Logger2", &config).unwrap();
        assert_eq!(report.rows_out_of_order, 1);
        assert!(seq.is_sorted());
        assert_eq!(seq.len(), 200);
    }

    #[test]
    fn test_empty_folder_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            preprocess_logger_folder(dir.path(), "Logger3", &ProcessingConfig::default()),
            Err(MergeError::NoFiles(_))
        ));
    }

    #[test]
    fn test_missing_valid_column() {
        let dir = TempDir::new().unwrap();
        let mut table = synthetic_recording(fields(0), 10, 0);
        table.drop_column(VALID_COLUMN);
        write_recording(dir.path(), "x.csv", &table);

        assert!(matches!(
            preprocess_logger_folder(dir.path(), "Logger1", &ProcessingConfig::default()),
            Err(MergeError::Columns(LoaderError::MissingColumns(_)))
        ));
    }

    #[test]
    fn test_all_rows_filtered_gives_empty_sequence() {
        let dir = TempDir::new().unwrap();
        write_recording(dir.path(), "x.csv", &synthetic_recording(fields(0), 0, 50));

        let (seq, report) =
            preprocess_logger_folder(dir.path(), "Logger1", &ProcessingConfig::default()).unwrap();
        assert!(seq.is_empty());
        assert_eq!(report.rows_dated, 0);
    }
}
