//! Fixed-capacity telemetry log.
//!
//! A log is allocated with [`Log::start`] for a duration and a decimation
//! divisor. The owner offers one sample per control tick through
//! [`Log::update`]; every `divisor`-th sample is kept until the buffer is
//! full. [`Log::save`] writes the buffer as text: a `#`-prefixed header with
//! the column names, then one comma-separated row of integers per sample.
//! The first column is always the time in milliseconds since the log started.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Log {
    columns: &'static [&'static str],
    period_ms: u32,
    rows: Vec<Vec<i32>>,
    capacity: usize,
    divisor: u32,
    offered: u64,
    started: bool,
    origin_us: Option<u64>,
}

impl Log {
    /// Create an idle log with the given value columns (time is implied)
    pub fn new(columns: &'static [&'static str], period_ms: u32) -> Self {
        Self {
            columns,
            period_ms: period_ms.max(1),
            rows: Vec::new(),
            capacity: 0,
            divisor: 1,
            offered: 0,
            started: false,
            origin_us: None,
        }
    }

    /// Allocate the buffer and start logging.
    ///
    /// Capacity is `duration_ms / (loop period * divisor)` rows, at least one.
    /// Any previously logged data is discarded.
    pub fn start(&mut self, duration_ms: u32, divisor: u32) -> Result<()> {
        if duration_ms == 0 {
            return Err(Error::invalid("log duration must be positive"));
        }
        if divisor == 0 {
            return Err(Error::invalid("log divisor must be at least 1"));
        }
        let samples = duration_ms / self.period_ms / divisor;
        self.capacity = samples.max(1) as usize;
        self.divisor = divisor;
        self.rows = Vec::with_capacity(self.capacity);
        self.offered = 0;
        self.started = true;
        // Time origin is set by the first offered sample
        self.origin_us = None;
        debug!(
            "Log started: {}ms, divisor {}, {} rows",
            duration_ms, divisor, self.capacity
        );
        Ok(())
    }

    /// Offer one sample. Ignored unless the log is started and not full.
    pub fn update(&mut self, now_us: u64, values: &[i32]) {
        if !self.started {
            return;
        }
        let origin = *self.origin_us.get_or_insert(now_us);

        let keep = self.offered % self.divisor as u64 == 0;
        self.offered += 1;
        if !keep || self.rows.len() >= self.capacity {
            return;
        }

        let mut row = Vec::with_capacity(values.len() + 1);
        row.push((now_us.saturating_sub(origin) / 1000) as i32);
        row.extend_from_slice(values);
        self.rows.push(row);
    }

    /// Write the buffer to `path` and return the number of rows written
    pub fn save(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        if !self.started {
            warn!("Saving log {} that was never started", path.display());
        }

        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "# time,{}", self.columns.join(","))?;
        for row in &self.rows {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(out, "{}", line.join(","))?;
        }
        out.flush()?;

        info!("Saved {} rows to {}", self.rows.len(), path.display());
        Ok(self.rows.len())
    }

    /// Stop logging and drop all data
    pub fn reset(&mut self) {
        self.rows.clear();
        self.capacity = 0;
        self.divisor = 1;
        self.offered = 0;
        self.started = false;
        self.origin_us = None;
    }

    pub fn is_active(&self) -> bool {
        self.started && self.rows.len() < self.capacity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn columns(&self) -> &'static [&'static str] {
        self.columns
    }

    pub fn rows(&self) -> &[Vec<i32>] {
        &self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[&str] = &["a", "b"];

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("drivebase-log-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn test_start_rejects_bad_arguments() {
        let mut log = Log::new(COLUMNS, 5);
        assert!(log.start(0, 4).is_err());
        assert!(log.start(1000, 0).is_err());
        assert!(!log.is_active());
    }

    #[test]
    fn test_capacity_from_duration_and_divisor() {
        let mut log = Log::new(COLUMNS, 5);
        log.start(20000, 4).unwrap();
        assert_eq!(log.capacity(), 1000);

        // Too short for a full row still allocates one
        log.start(1, 4).unwrap();
        assert_eq!(log.capacity(), 1);
    }

    #[test]
    fn test_update_before_start_is_ignored() {
        let mut log = Log::new(COLUMNS, 5);
        log.update(0, &[1, 2]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_decimation_keeps_every_nth_sample() {
        let mut log = Log::new(COLUMNS, 5);
        log.start(1000, 4).unwrap();
        for i in 0..12u64 {
            log.update(1_000_000 + i * 5000, &[i as i32, 0]);
        }
        let kept: Vec<i32> = log.rows().iter().map(|r| r[1]).collect();
        assert_eq!(kept, vec![0, 4, 8]);

        // Time is relative to the first sample
        let times: Vec<i32> = log.rows().iter().map(|r| r[0]).collect();
        assert_eq!(times, vec![0, 20, 40]);
    }

    #[test]
    fn test_stops_when_full() {
        let mut log = Log::new(COLUMNS, 5);
        log.start(20, 1).unwrap();
        assert_eq!(log.capacity(), 4);
        for i in 0..10u64 {
            log.update(i * 5000, &[1, 2]);
        }
        assert_eq!(log.len(), 4);
        assert!(!log.is_active());
    }

    #[test]
    fn test_save_writes_header_and_rows() {
        let mut log = Log::new(COLUMNS, 5);
        log.start(1000, 1).unwrap();
        log.update(0, &[3, -4]);
        log.update(5000, &[5, 6]);

        let path = temp_path("rows.txt");
        assert_eq!(log.save(&path).unwrap(), 2);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "# time,a,b\n0,3,-4\n5,5,6\n");
    }

    #[test]
    fn test_save_never_started_writes_header_only() {
        let log = Log::new(COLUMNS, 5);
        let path = temp_path("empty.txt");
        assert_eq!(log.save(&path).unwrap(), 0);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "# time,a,b\n");
    }

    #[test]
    fn test_reset_clears() {
        let mut log = Log::new(COLUMNS, 5);
        log.start(1000, 1).unwrap();
        log.update(0, &[1, 1]);
        log.reset();
        assert!(log.is_empty());
        assert!(!log.is_active());
        log.update(0, &[1, 1]);
        assert!(log.is_empty());
    }
}
