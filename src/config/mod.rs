//! Configuration types for the IMU timesync pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::processors::identify::CANONICAL_TIME_COLUMNS;

/// Which patients, sessions and loggers to process, and where they live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root data directory containing the Raw and Processed trees
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Patient folder names (e.g., ["P01", "P02"])
    #[serde(default = "default_patients")]
    pub patients: Vec<String>,

    /// Session prefixes; matched against `<session>_*` folders
    #[serde(default = "default_sessions")]
    pub sessions: Vec<String>,

    /// Logger folder names (e.g., ["Logger1", "Logger2"])
    #[serde(default = "default_loggers")]
    pub loggers: Vec<String>,

    /// Name of the raw data tree under the root
    #[serde(default = "default_raw_folder")]
    pub raw_folder: String,

    /// Name of the processed data tree under the root
    #[serde(default = "default_processed_folder")]
    pub processed_folder: String,

    /// Device folder between a session and its loggers
    #[serde(default = "default_device_folder")]
    pub device_folder: String,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("Data")
}

fn default_patients() -> Vec<String> {
    vec!["P01".to_string(), "P02".to_string()]
}

fn default_sessions() -> Vec<String> {
    vec!["Session2".to_string()]
}

fn default_loggers() -> Vec<String> {
    vec!["Logger1".to_string(), "Logger2".to_string()]
}

fn default_raw_folder() -> String {
    "Raw".to_string()
}

fn default_processed_folder() -> String {
    "Processed".to_string()
}

fn default_device_folder() -> String {
    "WMORE".to_string()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            patients: default_patients(),
            sessions: default_sessions(),
            loggers: default_loggers(),
            raw_folder: default_raw_folder(),
            processed_folder: default_processed_folder(),
            device_folder: default_device_folder(),
        }
    }
}

/// Configuration for merging and trimming logger folders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Minutes discarded from the start of every logger sequence
    #[serde(default = "default_trim_minutes")]
    pub trim_minutes: f64,

    /// Fixed civil time zone of the logger clocks, in hours east of UTC
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,

    /// Century base added to the two-digit year field
    #[serde(default = "default_year_base")]
    pub year_base: i32,

    /// Smallest two-digit year accepted as a plausible date
    #[serde(default = "default_min_year")]
    pub min_year: f64,
}

fn default_trim_minutes() -> f64 {
    5.0
}

fn default_utc_offset_hours() -> i32 {
    10
}

fn default_year_base() -> i32 {
    2000
}

fn default_min_year() -> f64 {
    25.0
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            trim_minutes: default_trim_minutes(),
            utc_offset_hours: default_utc_offset_hours(),
            year_base: default_year_base(),
            min_year: default_min_year(),
        }
    }
}

/// Configuration for time column identification and file fixing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentificationConfig {
    /// Expected session starting hour (24-hour clock)
    #[serde(default)]
    pub session_hour: Option<u32>,

    /// Columns eligible for a time role
    #[serde(default = "default_candidate_columns")]
    pub candidate_columns: Vec<String>,

    /// Subfolder of the output directory receiving files that failed
    #[serde(default = "default_quarantine_folder")]
    pub quarantine_folder: String,

    /// File name of the per-logger error log
    #[serde(default = "default_log_file_name")]
    pub log_file_name: String,
}

fn default_candidate_columns() -> Vec<String> {
    CANONICAL_TIME_COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn default_quarantine_folder() -> String {
    "Still_needs_to_fix".to_string()
}

fn default_log_file_name() -> String {
    "fix_log.txt".to_string()
}

impl Default for IdentificationConfig {
    fn default() -> Self {
        Self {
            session_hour: None,
            candidate_columns: default_candidate_columns(),
            quarantine_folder: default_quarantine_folder(),
            log_file_name: default_log_file_name(),
        }
    }
}

/// Configuration for local-time reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    /// Treat a large hundredths jump as a single tick when the local and
    /// global registers alias
    #[serde(default = "default_alias_correction")]
    pub alias_correction: bool,
}

fn default_alias_correction() -> bool {
    true
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            alias_correction: default_alias_correction(),
        }
    }
}

/// Configuration for sampling-rate diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Nominal logger sample rate
    #[serde(default = "default_nominal_rate_hz")]
    pub nominal_rate_hz: f64,

    /// Accepted relative deviation from the nominal rate
    #[serde(default = "default_rate_tolerance")]
    pub rate_tolerance: f64,
}

fn default_nominal_rate_hz() -> f64 {
    100.0
}

fn default_rate_tolerance() -> f64 {
    0.05
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            nominal_rate_hz: default_nominal_rate_hz(),
            rate_tolerance: default_rate_tolerance(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub processing: ProcessingConfig,

    #[serde(default)]
    pub identification: IdentificationConfig,

    #[serde(default)]
    pub reconstruction: ReconstructionConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
