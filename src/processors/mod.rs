//! Data processing modules.

pub mod date_fill;
pub mod diagnostics;
pub mod discovery;
pub mod fixing;
pub mod identify;
pub mod merging;
pub mod pipeline;
pub mod reconstruct;
pub mod sync;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export key types for convenience
pub use date_fill::{fill_global_date, DateFillReport};
pub use diagnostics::{check_folder, check_processed_file, sampling_report, SamplingOutcome, SamplingReport};
pub use discovery::{
    get_logger_folders, processed_save_path, processed_session_dir, session_date_part, DataMode,
    DiscoveryError, LoggerFolder,
};
pub use fixing::{fix_folder, fix_imu_file, FixError, FixOutcome, FixSettings};
pub use identify::{
    identify_time_columns, ColumnMapping, IdentifyError, SessionHints, TimeRole,
    CANONICAL_TIME_COLUMNS,
};
pub use merging::{combine_csv_files, preprocess_logger_folder, LoadReport, MergeError};
pub use pipeline::{process_session, run_pipeline, LoggerResult, SessionReport};
pub use reconstruct::{
    reconstruct_folder, reconstruct_local_time, ClockState, ReconstructError, ReconstructOutcome,
    ReconstructReport,
};
pub use sync::{synchronize_loggers, SyncIssue, SyncWindow, SyncedSet};
