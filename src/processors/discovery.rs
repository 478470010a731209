//! Locating logger folders in the study data tree.
//!
//! Layout: `<root>/<Raw|Processed>/<patient>/<session>_<yyyymmdd>/WMORE/<logger>`.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;

use crate::config::DataConfig;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to read directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session folder {0} is not inside the raw data tree")]
    OutsideRawTree(PathBuf),

    #[error("cannot read a yyyymmdd date from session folder '{0}'")]
    SessionDate(String),

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Which data tree to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    Raw,
    Processed,
}

impl DataMode {
    /// Folder name of this tree under the data root.
    pub fn folder<'a>(&self, config: &'a DataConfig) -> &'a str {
        match self {
            DataMode::Raw => &config.raw_folder,
            DataMode::Processed => &config.processed_folder,
        }
    }
}

/// One existing logger folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerFolder {
    pub patient: String,
    /// Session folder, e.g. `.../P01/Session2_20250210`.
    pub session_dir: PathBuf,
    pub logger: String,
    pub path: PathBuf,
}

/// Subdirectories of `dir` whose names start with `prefix`, sorted.
fn matching_dirs(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| DiscoveryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .map(|n| n.to_string_lossy().starts_with(prefix))
                    .unwrap_or(false)
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Every existing `<patient>/<session>_*/<device>/<logger>` folder in the
/// `mode` tree, in patient, session, logger order.
///
/// Missing patients, sessions or loggers are silently left out.
pub fn get_logger_folders(
    config: &DataConfig,
    patients: &[String],
    sessions: &[String],
    loggers: &[String],
    mode: DataMode,
) -> Result<Vec<LoggerFolder>> {
    let tree = config.root_dir.join(mode.folder(config));
    let mut folders = Vec::new();

    for patient in patients {
        let patient_path = tree.join(patient);
        if !patient_path.is_dir() {
            log::debug!("No folder for patient {}", patient);
            continue;
        }

        for session in sessions {
            for session_dir in matching_dirs(&patient_path, &format!("{}_", session))? {
                let device_path = session_dir.join(&config.device_folder);
                if !device_path.is_dir() {
                    continue;
                }
                for logger in loggers {
                    let path = device_path.join(logger);
                    if path.is_dir() {
                        folders.push(LoggerFolder {
                            patient: patient.clone(),
                            session_dir: session_dir.clone(),
                            logger: logger.clone(),
                            path,
                        });
                    }
                }
            }
        }
    }

    Ok(folders)
}

/// The raw session folder mirrored into the processed tree.
pub fn processed_session_dir(config: &DataConfig, session_dir: &Path) -> Result<PathBuf> {
    let raw_tree = config.root_dir.join(&config.raw_folder);
    let rel = session_dir
        .strip_prefix(&raw_tree)
        .map_err(|_| DiscoveryError::OutsideRawTree(session_dir.to_path_buf()))?;

    Ok(config.root_dir.join(&config.processed_folder).join(rel))
}

/// Output file for a logger's processed sequence:
/// `<processed session>/<device>/<logger>.csv`.
pub fn processed_save_path(config: &DataConfig, session_dir: &Path, logger: &str) -> Result<PathBuf> {
    Ok(processed_session_dir(config, session_dir)?
        .join(&config.device_folder)
        .join(format!("{}.csv", logger)))
}

/// The `yymmdd` date of a `Session<N>_<yyyymmdd>` folder.
pub fn session_date_part(session_dir: &Path) -> Result<String> {
    let name = session_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let pattern = Regex::new(r"_\d{2}(\d{6})$")?;
    pattern
        .captures(&name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(DiscoveryError::SessionDate(name))
}
