//! Core data types, clock conversion and I/O operations.

pub mod loaders;
pub mod sequence;
pub mod timestamp;
pub mod writers;

pub use loaders::{ImuTable, LoaderError};
pub use sequence::LoggerSequence;
pub use timestamp::{ClockZone, TimeError, TimeFields};
pub use writers::{
    write_sequence_csv, write_table_csv, write_table_csv_unique, LogTag, RunLog, WriteError,
};
