//! Synthetic logger recordings shared by processor tests.

use std::path::{Path, PathBuf};

use crate::core::loaders::{ImuTable, SENSOR_COLUMNS};
use crate::core::timestamp::TimeFields;
use crate::core::writers::write_table_csv;
use crate::processors::identify::CANONICAL_TIME_COLUMNS;

/// The seven canonical `g_*` names as owned candidates.
pub fn canonical_candidates() -> Vec<String> {
    CANONICAL_TIME_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Advances a clock reading by one hundredth, carrying into the hour.
pub fn tick(mut t: TimeFields) -> TimeFields {
    t.hund += 1;
    if t.hund == 100 {
        t.hund = 0;
        t.second += 1;
    }
    if t.second == 60 {
        t.second = 0;
        t.minute += 1;
    }
    if t.minute == 60 {
        t.minute = 0;
        t.hour = (t.hour + 1) % 24;
    }
    t
}

fn time_values(t: &TimeFields) -> [f64; 7] {
    [
        t.year as f64,
        t.month as f64,
        t.day as f64,
        t.hour as f64,
        t.minute as f64,
        t.second as f64,
        t.hund as f64,
    ]
}

/// A 100 Hz recording in logger column layout.
///
/// `unsynced_rows` all-zero clock rows come first (the logger has not yet
/// received its time), followed by `rows` samples starting at `start`.
/// Sensor channels carry the row index so rows can be traced after filtering.
pub fn synthetic_recording(start: TimeFields, rows: usize, unsynced_rows: usize) -> ImuTable {
    let total = rows + unsynced_rows;
    let mut sensors: Vec<Vec<f64>> = vec![Vec::with_capacity(total); SENSOR_COLUMNS.len()];
    let mut clock: Vec<Vec<f64>> = vec![Vec::with_capacity(total); CANONICAL_TIME_COLUMNS.len()];
    let mut temp = Vec::with_capacity(total);

    let mut t = start;
    for row in 0..total {
        for (c, channel) in sensors.iter_mut().enumerate() {
            channel.push(row as f64 + c as f64 / 10.0);
        }
        temp.push(24.5);

        let values = if row < unsynced_rows {
            [0.0; 7]
        } else {
            let v = time_values(&t);
            t = tick(t);
            v
        };
        for (field, value) in clock.iter_mut().zip(values) {
            field.push(value);
        }
    }

    let mut table = ImuTable::new();
    for (name, values) in SENSOR_COLUMNS.iter().zip(sensors) {
        table.push_column(*name, values);
    }
    table.push_column("temp", temp);
    table.push_column("valid", vec![1.0; total]);
    for (name, values) in CANONICAL_TIME_COLUMNS.iter().zip(clock) {
        table.push_column(*name, values);
    }
    table
}

/// Writes `table` as `dir/name` and returns the path.
pub fn write_recording(dir: &Path, name: &str, table: &ImuTable) -> PathBuf {
    let path = dir.join(name);
    write_table_csv(&path, table).unwrap();
    path
}
