//! Overwrite the global date fields of raw logger files.
//!
//! Used when a logger lost its date but kept its time of day. Every row gets
//! the given date except the first, which is zeroed so the file still starts
//! with an unsynchronized row.

use std::path::{Path, PathBuf};

use crate::core::loaders::{list_csv_files, load_imu_csv};
use crate::core::writers::write_table_csv;

const DATE_COLUMNS: [&str; 3] = ["g_year", "g_month", "g_day"];

/// Per-file outcome of a date fill over a folder.
#[derive(Debug, Default)]
pub struct DateFillReport {
    pub updated: Vec<PathBuf>,
    /// Files without all three date columns.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Set `g_year`, `g_month`, `g_day` of every CSV in `folder` to the given
/// values, rewriting the files in place.
pub fn fill_global_date(
    folder: &Path,
    year: u32,
    month: u32,
    day: u32,
) -> anyhow::Result<DateFillReport> {
    let files = list_csv_files(folder)?;
    log::info!("Searching in: {}", folder.display());

    let mut report = DateFillReport::default();
    for path in files {
        let mut table = match load_imu_csv(&path) {
            Ok(table) => table,
            Err(e) => {
                log::error!("Failed to read {}: {}", path.display(), e);
                report.failed.push((path, e.to_string()));
                continue;
            }
        };

        if !DATE_COLUMNS.iter().all(|c| table.has_column(c)) {
            log::warn!("Skipped (missing columns): {}", path.display());
            report.skipped.push(path);
            continue;
        }

        let rows = table.num_rows();
        for (name, value) in DATE_COLUMNS.iter().zip([year, month, day]) {
            let mut values = vec![value as f64; rows];
            if let Some(first) = values.first_mut() {
                *first = 0.0;
            }
            table.set_column(*name, values);
        }

        match write_table_csv(&path, &table) {
            Ok(()) => {
                log::info!("Updated: {}", path.display());
                report.updated.push(path);
            }
            Err(e) => {
                log::error!("Failed to write {}: {}", path.display(), e);
                report.failed.push((path, e.to_string()));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::ImuTable;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_fill_global_date() {
        let dir = TempDir::new().unwrap();
        let table = ImuTable::from_columns(vec![
            ("ax", vec![0.5, 0.6, 0.7]),
            ("g_year", vec![0.0, 0.0, 0.0]),
            ("g_month", vec![0.0, 0.0, 0.0]),
            ("g_day", vec![0.0, 1.0, 0.0]),
            ("g_hour", vec![0.0, 13.0, 13.0]),
        ]);
        write_table_csv(&dir.path().join("a.csv"), &table).unwrap();
        write_table_csv(
            &dir.path().join("b.csv"),
            &ImuTable::from_columns(vec![("g_year", vec![1.0])]),
        )
        .unwrap();
        fs::write(dir.path().join("c.csv"), "g_year,g_month,g_day\nx,1,1\n").unwrap();

        let report = fill_global_date(dir.path(), 25, 3, 7).unwrap();
        assert_eq!(report.updated, vec![dir.path().join("a.csv")]);
        assert_eq!(report.skipped, vec![dir.path().join("b.csv")]);
        assert_eq!(report.failed.len(), 1);

        let filled = load_imu_csv(dir.path().join("a.csv")).unwrap();
        assert_eq!(filled.column("g_year").unwrap(), &[0.0, 25.0, 25.0]);
        assert_eq!(filled.column("g_month").unwrap(), &[0.0, 3.0, 3.0]);
        assert_eq!(filled.column("g_day").unwrap(), &[0.0, 7.0, 7.0]);
        assert_eq!(filled.column("g_hour").unwrap(), &[0.0, 13.0, 13.0]);
        assert_eq!(filled.columns[0], "ax");
    }
}
