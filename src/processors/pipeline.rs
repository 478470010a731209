//! Batch processing of patient sessions.
//!
//! For each configured patient and session: locate the logger folders, merge
//! each logger in parallel, crop all loggers to their common window and write
//! one CSV per logger into the processed tree. A logger that fails is logged
//! and left out; it never stops the rest of the batch. Each session keeps a
//! tagged run log next to its processed outputs.

use std::path::{Path, PathBuf};

use anyhow::Context;
use rayon::prelude::*;

use crate::config::{DataConfig, PipelineConfig};
use crate::core::writers::{write_sequence_csv, LogTag, RunLog};
use crate::processors::discovery::{
    get_logger_folders, processed_save_path, processed_session_dir, DataMode, DiscoveryError,
    LoggerFolder,
};
use crate::processors::merging::{preprocess_logger_folder, LoadReport};
use crate::processors::sync::{synchronize_loggers, SyncIssue, SyncWindow};

/// Outcome for one logger of a session.
#[derive(Debug, Clone)]
pub struct LoggerResult {
    pub logger: String,
    pub load: Option<LoadReport>,
    /// Rows written after synchronization.
    pub rows_written: usize,
    pub output: Option<PathBuf>,
    pub error: Option<String>,
}

/// Outcome for one patient session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub patient: String,
    pub session_dir: PathBuf,
    pub loggers: Vec<LoggerResult>,
    pub window: Option<SyncWindow>,
    pub issue: Option<SyncIssue>,
    /// Set when the session could not be scanned at all.
    pub error: Option<String>,
    pub log_path: Option<PathBuf>,
}

impl SessionReport {
    pub fn failed_loggers(&self) -> usize {
        self.loggers.iter().filter(|l| l.error.is_some()).count()
    }
}

/// Run log for a session: `<processed session>/<log_file_name>`, or the
/// processed root when the session is outside the raw tree.
fn session_log(config: &PipelineConfig, session_dir: &Path) -> RunLog {
    let data = &config.data;
    let dir = processed_session_dir(data, session_dir)
        .unwrap_or_else(|_| data.root_dir.join(&data.processed_folder));
    RunLog::new(dir.join(&config.identification.log_file_name))
}

/// Merge, synchronize and save the loggers of one session folder.
///
/// Nothing is written when the loggers cannot be synchronized, so outputs
/// from an earlier run stay in place.
pub fn process_session(
    config: &PipelineConfig,
    patient: &str,
    session_dir: &Path,
    folders: &[LoggerFolder],
) -> SessionReport {
    log::info!("Processing: {} | {}", patient, session_dir.display());
    let run_log = session_log(config, session_dir);

    let loaded: Vec<_> = folders
        .par_iter()
        .map(|folder| {
            preprocess_logger_folder(&folder.path, &folder.logger, &config.processing)
                .with_context(|| format!("Failed to load {}", folder.path.display()))
        })
        .collect();

    let mut results = Vec::with_capacity(folders.len());
    let mut sequences = Vec::new();
    let mut synced_slots = Vec::new();
    for (folder, outcome) in folders.iter().zip(loaded) {
        match outcome {
            Ok((sequence, report)) => {
                synced_slots.push(results.len());
                sequences.push(sequence);
                results.push(LoggerResult {
                    logger: folder.logger.clone(),
                    load: Some(report),
                    rows_written: 0,
                    output: None,
                    error: None,
                });
            }
            Err(e) => {
                run_log.record(LogTag::Error, &format!("{}: {:#}", folder.logger, e));
                results.push(LoggerResult {
                    logger: folder.logger.clone(),
                    load: None,
                    rows_written: 0,
                    output: None,
                    error: Some(format!("{:#}", e)),
                });
            }
        }
    }

    let synced = synchronize_loggers(&sequences);
    if let Some(issue) = &synced.issue {
        run_log.record(
            LogTag::Warning,
            &format!("{} | {}: {}", patient, session_dir.display(), issue),
        );
    } else {
        for (slot, sequence) in synced_slots.into_iter().zip(&synced.sequences) {
            let result = &mut results[slot];
            let written = processed_save_path(&config.data, session_dir, &result.logger)
                .context("Failed to resolve output path")
                .and_then(|path| {
                    write_sequence_csv(&path, sequence)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    Ok(path)
                });

            match written {
                Ok(path) => {
                    let message = format!(
                        "{}: {} rows saved to {}",
                        result.logger,
                        sequence.len(),
                        path.display()
                    );
                    run_log.record(LogTag::Success, &message);
                    result.rows_written = sequence.len();
                    result.output = Some(path);
                }
                Err(e) => {
                    run_log.record(LogTag::Error, &format!("{}: {:#}", result.logger, e));
                    result.error = Some(format!("{:#}", e));
                }
            }
        }
    }

    SessionReport {
        patient: patient.to_string(),
        session_dir: session_dir.to_path_buf(),
        loggers: results,
        window: synced.window,
        issue: synced.issue,
        error: None,
        log_path: Some(run_log.path().to_path_buf()),
    }
}

/// Report for a patient/session pair whose folders could not be listed.
fn scan_failure(
    data: &DataConfig,
    patient: &str,
    session: &str,
    error: DiscoveryError,
) -> SessionReport {
    let error =
        anyhow::Error::new(error).context(format!("Failed to scan {} | {}", patient, session));
    log::error!("{:#}", error);

    SessionReport {
        patient: patient.to_string(),
        session_dir: data.root_dir.join(&data.raw_folder).join(patient),
        loggers: Vec::new(),
        window: None,
        issue: None,
        error: Some(format!("{:#}", error)),
        log_path: None,
    }
}

/// Run every configured patient and session.
///
/// A patient/session that cannot be scanned is reported with its `error`
/// set and the batch moves on; per-logger problems are reported in the
/// session reports.
pub fn run_pipeline(config: &PipelineConfig) -> Vec<SessionReport> {
    let data = &config.data;
    let mut reports = Vec::new();

    for patient in &data.patients {
        for session in &data.sessions {
            let scanned = get_logger_folders(
                data,
                std::slice::from_ref(patient),
                std::slice::from_ref(session),
                &data.loggers,
                DataMode::Raw,
            );
            let folders = match scanned {
                Ok(folders) => folders,
                Err(e) => {
                    reports.push(scan_failure(data, patient, session, e));
                    continue;
                }
            };

            let mut session_dirs: Vec<&PathBuf> = folders.iter().map(|f| &f.session_dir).collect();
            session_dirs.dedup();

            for session_dir in session_dirs {
                let group: Vec<LoggerFolder> = folders
                    .iter()
                    .filter(|f| &f.session_dir == session_dir)
                    .cloned()
                    .collect();
                reports.push(process_session(config, patient, session_dir, &group));
            }
        }
    }

    reports
}
