//! Sampling-rate diagnostics for processed logger files.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::DiagnosticsConfig;
use crate::core::loaders::{list_csv_files, load_imu_csv, UNIX_TIME_COLUMN};
use crate::core::writers::{LogTag, RunLog};

/// Duration and effective rate of one sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingReport {
    pub samples: usize,
    /// Seconds between first and last sample.
    pub duration: f64,
    /// Samples per second over the duration.
    pub mean_rate_hz: f64,
    /// Relative deviation from the nominal rate.
    pub deviation: f64,
    pub within_tolerance: bool,
}

impl fmt::Display for SamplingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples over {:.2} s, {:.2} Hz ({:+.1}%)",
            self.samples,
            self.duration,
            self.mean_rate_hz,
            self.deviation * 100.0
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SamplingOutcome {
    Checked(SamplingReport),
    Skipped { reason: String },
}

/// Rate statistics for a series of absolute times, or `None` when fewer
/// than two samples span a positive duration.
pub fn sampling_report(unix_time: &[f64], config: &DiagnosticsConfig) -> Option<SamplingReport> {
    let start = unix_time.iter().copied().reduce(f64::min)?;
    let end = unix_time.iter().copied().reduce(f64::max)?;
    let duration = end - start;
    if unix_time.len() < 2 || duration <= 0.0 {
        return None;
    }

    let mean_rate_hz = (unix_time.len() - 1) as f64 / duration;
    let deviation = (mean_rate_hz - config.nominal_rate_hz) / config.nominal_rate_hz;
    Some(SamplingReport {
        samples: unix_time.len(),
        duration,
        mean_rate_hz,
        deviation,
        within_tolerance: deviation.abs() <= config.rate_tolerance,
    })
}

/// Check one processed file and record `[OK]`, `[WARNING]` or `[SKIP]`.
pub fn check_processed_file(path: &Path, config: &DiagnosticsConfig, log: &RunLog) -> SamplingOutcome {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let skip = |reason: String| {
        log.record(LogTag::Skip, &format!("{}: {}", name, reason));
        SamplingOutcome::Skipped { reason }
    };

    let table = match load_imu_csv(path) {
        Ok(table) => table,
        Err(e) => return skip(e.to_string()),
    };
    let Some(times) = table.column(UNIX_TIME_COLUMN) else {
        return skip(format!("no '{}' column", UNIX_TIME_COLUMN));
    };
    let Some(report) = sampling_report(times, config) else {
        return skip("too few samples".to_string());
    };

    let tag = if report.within_tolerance {
        LogTag::Ok
    } else {
        LogTag::Warning
    };
    log.record(tag, &format!("{}: {}", name, report));
    SamplingOutcome::Checked(report)
}

/// Check every CSV in `dir`.
pub fn check_folder(
    dir: &Path,
    config: &DiagnosticsConfig,
    log: &RunLog,
) -> anyhow::Result<Vec<(PathBuf, SamplingOutcome)>> {
    let files = list_csv_files(dir)?;
    Ok(files
        .into_iter()
        .map(|path| {
            let outcome = check_processed_file(&path, config, log);
            (path, outcome)
        })
        .collect())
}
