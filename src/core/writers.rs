//! Data writers for fixed logger files, combined logger sequences and the
//! per-logger run log.
//!
//! This module provides:
//! - CSV output of an [`ImuTable`] in its current column order
//! - CSV output of a [`LoggerSequence`] (`Unix Time, ax, ..., mz`)
//! - Collision-free output naming and byte-exact quarantine copies
//! - An append-only tagged log shared between worker threads

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use super::loaders::{ImuTable, SENSOR_COLUMNS, UNIX_TIME_COLUMN};
use super::sequence::LoggerSequence;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to copy a file.
    #[error("failed to copy '{from}' to '{to}': {source}")]
    CopyFile {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a CSV writer over a buffered file.
fn create_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv_writer_for(file))
}

fn csv_writer_for(file: File) -> csv::Writer<BufWriter<File>> {
    csv::Writer::from_writer(BufWriter::with_capacity(64 * 1024, file))
}

/// Formats a cell: `NaN` as empty, integral values without a decimal point.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Write a table to CSV in its current column order.
///
/// # Errors
///
/// Returns an error if parent directories cannot be created or the file
/// cannot be written.
pub fn write_table_csv(path: &Path, table: &ImuTable) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut csv_writer = create_csv_writer(path)?;
    write_table_records(&mut csv_writer, path, table)
}

/// Write a table as `dir/file_name`, or as the first free `stem_02.ext`,
/// `stem_03.ext`, ... when that name is taken. Returns the path written.
///
/// The name is claimed with an exclusive create, so concurrent writers
/// deriving the same name always end up in distinct files.
pub fn write_table_csv_unique(dir: &Path, file_name: &str, table: &ImuTable) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| WriteError::CreateDirectory {
        path: dir.display().to_string(),
        source: e,
    })?;
    let (path, file) = create_unique_file(dir, file_name)?;
    let mut csv_writer = csv_writer_for(file);
    write_table_records(&mut csv_writer, &path, table)?;
    Ok(path)
}

/// Creates the first free name among `file_name`, `stem_02.ext`,
/// `stem_03.ext`, ... in `dir`.
fn create_unique_file(dir: &Path, file_name: &str) -> Result<(PathBuf, File)> {
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (file_name, String::new()),
    };

    let mut n = 1;
    loop {
        let path = if n == 1 {
            dir.join(file_name)
        } else {
            dir.join(format!("{}_{:02}{}", stem, n, ext))
        };
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => {
                return Err(WriteError::CreateFile {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        }
    }
}

fn write_table_records<W: Write>(
    csv_writer: &mut csv::Writer<W>,
    path: &Path,
    table: &ImuTable,
) -> Result<()> {
    let path_str = path.display().to_string();

    csv_writer
        .write_record(&table.columns)
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for row in 0..table.num_rows() {
        let record: Vec<String> = table.data.iter().map(|col| format_value(col[row])).collect();
        csv_writer
            .write_record(&record)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write a logger sequence with columns `Unix Time, ax, ay, az, gx, gy, gz,
/// mx, my, mz`.
///
/// Times are written with hundredth-of-a-second precision, matching the
/// logger clock resolution.
pub fn write_sequence_csv(path: &Path, sequence: &LoggerSequence) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut csv_writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();

    let mut header = Vec::with_capacity(SENSOR_COLUMNS.len() + 1);
    header.push(UNIX_TIME_COLUMN);
    header.extend(SENSOR_COLUMNS);
    csv_writer
        .write_record(&header)
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for (t, sample) in sequence.unix_time.iter().zip(&sequence.samples) {
        let mut record = Vec::with_capacity(header.len());
        record.push(format!("{:.2}", t));
        record.extend(sample.iter().map(|&v| format_value(v)));
        csv_writer
            .write_record(&record)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Copy `source` unmodified into `dir`, keeping its file name.
///
/// Returns the path of the copy.
pub fn quarantine_copy(source: &Path, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| WriteError::CreateDirectory {
        path: dir.display().to_string(),
        source: e,
    })?;

    let file_name = source.file_name().unwrap_or_default();
    let dest = dir.join(file_name);
    fs::copy(source, &dest).map_err(|e| WriteError::CopyFile {
        from: source.display().to_string(),
        to: dest.display().to_string(),
        source: e,
    })?;
    Ok(dest)
}

/// Tag prefixed to every run-log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTag {
    Error,
    Skipped,
    Skip,
    Warning,
    Ok,
    Success,
}

impl fmt::Display for LogTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            LogTag::Error => "[ERROR]",
            LogTag::Skipped => "[SKIPPED]",
            LogTag::Skip => "[SKIP]",
            LogTag::Warning => "[WARNING]",
            LogTag::Ok => "[OK]",
            LogTag::Success => "[SUCCESS]",
        };
        f.write_str(tag)
    }
}

/// Append-only text log of per-file outcomes.
///
/// Safe to share between rayon workers: appends are serialized so lines
/// never interleave.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RunLog {
    /// Creates a log writing to `path`. The file is created on first append.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `"{tag} {message}"` as a single line.
    pub fn append(&self, tag: LogTag, message: &str) -> Result<()> {
        let line = format!("{} {}\n", tag, message.replace('\n', " "));

        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        ensure_parent_dirs(&self.path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| WriteError::CreateFile {
                path: self.path.display().to_string(),
                source: e,
            })?;
        file.write_all(line.as_bytes())
            .map_err(|e| WriteError::WriteFile {
                path: self.path.display().to_string(),
                source: e,
            })
    }

    /// Appends and mirrors the line to the console log; a failed append is
    /// reported through `log` instead of being returned.
    pub fn record(&self, tag: LogTag, message: &str) {
        match tag {
            LogTag::Error | LogTag::Warning => log::warn!("{} {}", tag, message),
            _ => log::info!("{} {}", tag, message),
        }
        if let Err(e) = self.append(tag, message) {
            log::error!("Could not append to {}: {}", self.path.display(), e);
        }
    }
}
