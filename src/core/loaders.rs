//! Data loaders for IMU logger CSV files.
//!
//! Logger files are read into an [`ImuTable`], a column-major numeric table
//! that keeps the original header order. Empty cells become `NaN` so that
//! heterogeneous files can be concatenated without inventing values.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::BufReader;
use std::ops::Range;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

/// Absolute-time column written by the merger. Never trusted on input.
pub const UNIX_TIME_COLUMN: &str = "Unix Time";

/// Validity flag column.
pub const VALID_COLUMN: &str = "valid";

/// The nine inertial channels, in output order.
pub const SENSOR_COLUMNS: [&str; 9] = ["ax", "ay", "az", "gx", "gy", "gz", "mx", "my", "mz"];

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Column-major numeric table read from one or more logger files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImuTable {
    /// Column names in file order. May contain duplicates straight after loading.
    pub columns: Vec<String>,
    /// One vector per column, all of equal length.
    pub data: Vec<Vec<f64>>,
    /// Source file path, when loaded from a single file.
    pub source_path: Option<PathBuf>,
}

impl ImuTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from `(name, values)` pairs.
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Vec<f64>)>) -> Self {
        let mut table = Self::new();
        for (name, values) in columns {
            table.push_column(name, values);
        }
        table
    }

    /// Returns the number of rows.
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.data.first().map_or(0, |col| col.len())
    }

    /// Returns the number of columns.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the table holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Index of the first column with the given name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Values of the first column with the given name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.column_index(name).map(|idx| self.data[idx].as_slice())
    }

    /// Like [`column`](Self::column) but reports a missing column as an error.
    pub fn require_column(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))
    }

    /// Appends a column.
    pub fn push_column<S: Into<String>>(&mut self, name: S, values: Vec<f64>) {
        debug_assert!(
            self.data.is_empty() || values.len() == self.num_rows(),
            "column length must match table length"
        );
        self.columns.push(name.into());
        self.data.push(values);
    }

    /// Replaces the values of an existing column, or appends it.
    pub fn set_column<S: Into<String>>(&mut self, name: S, values: Vec<f64>) {
        let name = name.into();
        match self.column_index(&name) {
            Some(idx) => self.data[idx] = values,
            None => self.push_column(name, values),
        }
    }

    /// Removes every column with the given name. Returns how many were removed.
    pub fn drop_column(&mut self, name: &str) -> usize {
        let before = self.columns.len();
        let keep: Vec<bool> = self.columns.iter().map(|c| c != name).collect();
        self.retain_columns(&keep);
        before - self.columns.len()
    }

    /// Keeps the first occurrence of every column name and returns the names
    /// of the dropped duplicates.
    pub fn dedup_columns(&mut self) -> Vec<String> {
        let mut seen = HashSet::with_capacity(self.columns.len());
        let keep: Vec<bool> = self.columns.iter().map(|c| seen.insert(c.clone())).collect();
        let dropped = self
            .columns
            .iter()
            .zip(&keep)
            .filter(|&(_, &k)| !k)
            .map(|(c, _)| c.clone())
            .collect();
        self.retain_columns(&keep);
        dropped
    }

    fn retain_columns(&mut self, keep: &[bool]) {
        let columns = std::mem::take(&mut self.columns);
        let data = std::mem::take(&mut self.data);
        for ((name, values), &k) in columns.into_iter().zip(data).zip(keep) {
            if k {
                self.columns.push(name);
                self.data.push(values);
            }
        }
    }

    /// Renames columns simultaneously, so `a -> b` and `b -> a` swap cleanly.
    pub fn rename_columns(&mut self, mapping: &HashMap<String, String>) {
        for name in &mut self.columns {
            if let Some(new_name) = mapping.get(name.as_str()) {
                *name = new_name.clone();
            }
        }
    }

    /// Reorders columns: names listed in `order` first (when present), then
    /// the remaining columns in their current order.
    pub fn reorder_columns(&mut self, order: &[String]) {
        let mut taken = vec![false; self.columns.len()];
        let mut indices = Vec::with_capacity(self.columns.len());

        for name in order {
            let found = self
                .columns
                .iter()
                .enumerate()
                .find(|(i, c)| !taken[*i] && *c == name)
                .map(|(i, _)| i);
            if let Some(i) = found {
                taken[i] = true;
                indices.push(i);
            }
        }
        indices.extend((0..self.columns.len()).filter(|&i| !taken[i]));

        self.columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        self.data = indices.iter().map(|&i| self.data[i].clone()).collect();
    }

    /// Returns a new table with the rows where `mask` is true.
    pub fn filter_rows(&self, mask: &[bool]) -> ImuTable {
        debug_assert_eq!(mask.len(), self.num_rows(), "mask must cover every row");
        let data = self
            .data
            .iter()
            .map(|col| {
                col.iter()
                    .zip(mask)
                    .filter(|&(_, &m)| m)
                    .map(|(&v, _)| v)
                    .collect()
            })
            .collect();
        ImuTable {
            columns: self.columns.clone(),
            data,
            source_path: self.source_path.clone(),
        }
    }

    /// Returns a new table with the rows in `range`.
    pub fn slice_rows(&self, range: Range<usize>) -> ImuTable {
        ImuTable {
            columns: self.columns.clone(),
            data: self.data.iter().map(|col| col[range.clone()].to_vec()).collect(),
            source_path: self.source_path.clone(),
        }
    }

    /// Concatenates tables row-wise, aligning columns by name.
    ///
    /// The result holds the union of column names in first-seen order;
    /// cells for columns a table lacks are `NaN`. Each input should already
    /// be free of duplicate column names.
    pub fn concat(tables: &[ImuTable]) -> ImuTable {
        let mut columns: Vec<String> = Vec::new();
        for table in tables {
            for name in &table.columns {
                if !columns.contains(name) {
                    columns.push(name.clone());
                }
            }
        }

        let total_rows: usize = tables.iter().map(|t| t.num_rows()).sum();
        let mut data: Vec<Vec<f64>> = vec![Vec::with_capacity(total_rows); columns.len()];

        for table in tables {
            let n = table.num_rows();
            for (out, name) in data.iter_mut().zip(&columns) {
                match table.column(name) {
                    Some(values) => out.extend_from_slice(values),
                    None => out.extend(std::iter::repeat(f64::NAN).take(n)),
                }
            }
        }

        ImuTable {
            columns,
            data,
            source_path: None,
        }
    }
}

fn parse_cell(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    trimmed.parse().ok()
}

/// Load an IMU logger CSV into an [`ImuTable`].
///
/// The first row must be a header. Every other cell must be numeric or
/// empty; short rows are padded with `NaN`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, has no header, or contains
/// a non-numeric cell.
pub fn load_imu_csv<P: AsRef<Path>>(path: P) -> Result<ImuTable> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let mut data: Vec<Vec<f64>> = vec![Vec::with_capacity(8192); columns.len()];

    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;
        for (col_idx, out) in data.iter_mut().enumerate() {
            let raw = record.get(col_idx).unwrap_or("");
            let value = parse_cell(raw).ok_or_else(|| {
                LoaderError::ParseError(format!(
                    "{}: row {}, column '{}': invalid value '{}'",
                    path.display(),
                    row_idx + 1,
                    columns[col_idx],
                    raw
                ))
            })?;
            out.push(value);
        }
    }

    Ok(ImuTable {
        columns,
        data,
        source_path: Some(path.to_path_buf()),
    })
}

/// List the CSV files directly inside `dir`, sorted lexically.
///
/// Logger file names start with a `yymmdd_HHMMSS` stamp, so lexical order is
/// chronological order.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}
