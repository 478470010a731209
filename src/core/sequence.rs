//! Per-logger time series: absolute time plus the nine inertial channels.

use super::loaders::{ImuTable, Result, SENSOR_COLUMNS, UNIX_TIME_COLUMN};

/// Number of inertial channels carried per sample.
pub const NUM_CHANNELS: usize = SENSOR_COLUMNS.len();

/// One logger's samples across a session, ordered by absolute time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoggerSequence {
    /// Logger name (e.g., "Logger1").
    pub name: String,
    /// Seconds since the epoch for each sample.
    pub unix_time: Vec<f64>,
    /// `ax, ay, az, gx, gy, gz, mx, my, mz` for each sample.
    pub samples: Vec<[f64; NUM_CHANNELS]>,
}

impl LoggerSequence {
    /// Creates an empty sequence.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            unix_time: Vec::new(),
            samples: Vec::new(),
        }
    }

    /// Creates an empty sequence with pre-allocated capacity.
    pub fn with_capacity<S: Into<String>>(name: S, capacity: usize) -> Self {
        Self {
            name: name.into(),
            unix_time: Vec::with_capacity(capacity),
            samples: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.unix_time.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.unix_time.is_empty()
    }

    /// Adds a sample.
    #[inline]
    pub fn push(&mut self, unix_time: f64, sample: [f64; NUM_CHANNELS]) {
        self.unix_time.push(unix_time);
        self.samples.push(sample);
    }

    /// Earliest absolute time, or `None` when empty.
    pub fn start(&self) -> Option<f64> {
        self.unix_time.iter().copied().reduce(f64::min)
    }

    /// Latest absolute time, or `None` when empty.
    pub fn end(&self) -> Option<f64> {
        self.unix_time.iter().copied().reduce(f64::max)
    }

    /// `(start, end)`, or `None` when empty.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        Some((self.start()?, self.end()?))
    }

    /// Returns true if times never decrease.
    pub fn is_sorted(&self) -> bool {
        self.unix_time.windows(2).all(|w| w[0] <= w[1])
    }

    /// Samples whose time lies in `[start, end]`, order preserved.
    pub fn clip(&self, start: f64, end: f64) -> LoggerSequence {
        let mut clipped = LoggerSequence::with_capacity(self.name.clone(), self.len());
        for (&t, sample) in self.unix_time.iter().zip(&self.samples) {
            if t >= start && t <= end {
                clipped.push(t, *sample);
            }
        }
        clipped
    }

    /// Builds a sequence from a table with `Unix Time` and sensor columns.
    pub fn from_table<S: Into<String>>(name: S, table: &ImuTable) -> Result<Self> {
        let time = table.require_column(UNIX_TIME_COLUMN)?;
        let channels: Vec<&[f64]> = SENSOR_COLUMNS
            .iter()
            .map(|c| table.require_column(c))
            .collect::<Result<_>>()?;

        let mut sequence = LoggerSequence::with_capacity(name, time.len());
        for (row, &t) in time.iter().enumerate() {
            let mut sample = [0.0; NUM_CHANNELS];
            for (slot, channel) in sample.iter_mut().zip(&channels) {
                *slot = channel[row];
            }
            sequence.push(t, sample);
        }
        Ok(sequence)
    }

    /// Converts back to a table with columns `Unix Time, ax, ..., mz`.
    pub fn to_table(&self) -> ImuTable {
        let mut table = ImuTable::new();
        table.push_column(UNIX_TIME_COLUMN, self.unix_time.clone());
        for (idx, name) in SENSOR_COLUMNS.iter().enumerate() {
            table.push_column(*name, self.samples.iter().map(|s| s[idx]).collect());
        }
        table
    }
}
