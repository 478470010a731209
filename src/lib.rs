//! Timestamp recovery and synchronization for wearable IMU loggers.
//!
//! This crate provides tools for:
//! - Identifying mislabelled clock columns in raw logger CSVs
//! - Rebuilding a dense global clock from the local hundredths counter
//! - Merging a logger's files into one trimmed, time-stamped sequence
//! - Cropping all loggers of a session to their common time window
//!
//! # Example
//!
//! ```no_run
//! use imu_timesync::{processors::preprocess_logger_folder, ProcessingConfig};
//! use std::path::Path;
//!
//! let (sequence, report) = preprocess_logger_folder(
//!     Path::new("Data/Raw/P01/Session2_20250210/WMORE/Logger1"),
//!     "Logger1",
//!     &ProcessingConfig::default(),
//! )
//! .unwrap();
//! println!("{} rows kept of {}", sequence.len(), report.rows_read);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{
    DataConfig, DiagnosticsConfig, IdentificationConfig, PipelineConfig, ProcessingConfig,
    ReconstructionConfig,
};
pub use core::loaders::ImuTable;
pub use core::sequence::LoggerSequence;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
