//! Buffered JSON-lines quote log with time-based file rotation.

use ashare_common::error::{Result, ResultExt};
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::Quote;

/// One poll result as written to the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LogEntry {
    Quote(Quote),
    Error { time: String, error: String },
}

pub struct QuoteLog {
    dir: PathBuf,
    code: String,
    write_interval: Duration,
    file_interval: Duration,
    buffer: Vec<LogEntry>,
    file_start: NaiveDateTime,
    last_write: NaiveDateTime,
}

impl QuoteLog {
    pub fn new(
        dir: impl Into<PathBuf>,
        code: impl Into<String>,
        write_interval: std::time::Duration,
        file_interval: std::time::Duration,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            dir: dir.into(),
            code: code.into(),
            write_interval: to_chrono(write_interval),
            file_interval: to_chrono(file_interval),
            buffer: Vec::new(),
            file_start: now,
            last_write: now,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.buffer.push(entry);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// File currently receiving entries.
    pub fn current_path(&self) -> PathBuf {
        log_file_path(&self.dir, &self.code, self.file_start)
    }

    /// Flush if `write_interval` has elapsed, then rotate if `file_interval`
    /// has elapsed. Returns the file written to, if any.
    pub fn tick(&mut self, now: NaiveDateTime) -> Result<Option<PathBuf>> {
        let written = if now - self.last_write >= self.write_interval && !self.buffer.is_empty() {
            let path = self.flush()?;
            self.last_write = now;
            Some(path)
        } else {
            None
        };

        if now - self.file_start >= self.file_interval {
            self.file_start = now;
        }

        Ok(written)
    }

    /// Append every buffered entry to the current file.
    pub fn flush(&mut self) -> Result<PathBuf> {
        let path = self.current_path();
        fs::create_dir_all(&self.dir)
            .context(format!("Failed to create directory {}", self.dir.display()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(format!("Failed to open {}", path.display()))?;

        let mut lines = String::new();
        for entry in &self.buffer {
            lines.push_str(&serde_json::to_string(entry)?);
            lines.push('\n');
        }
        file.write_all(lines.as_bytes())
            .context(format!("Failed to write {}", path.display()))?;

        self.buffer.clear();
        Ok(path)
    }
}

pub fn log_file_path(dir: &Path, code: &str, start: NaiveDateTime) -> PathBuf {
    dir.join(format!("{}_{}.log", code, start.format("%Y-%m-%d_%H%M")))
}

fn to_chrono(d: std::time::Duration) -> Duration {
    Duration::from_std(d).unwrap_or_else(|_| Duration::days(36_500))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn quote(current: f64) -> LogEntry {
        LogEntry::Quote(Quote {
            time: "2024-01-05 10:00:00".into(),
            current,
            high: current,
            low: current,
        })
    }

    fn log(dir: &Path) -> QuoteLog {
        QuoteLog::new(
            dir,
            "600519",
            StdDuration::from_secs(60),
            StdDuration::from_secs(600),
            at(10, 0, 0),
        )
    }

    #[test]
    fn test_file_name() {
        let path = log_file_path(Path::new("log"), "600519", at(9, 35, 12));
        assert_eq!(path, PathBuf::from("log/600519_2024-01-05_0935.log"));
    }

    #[test]
    fn test_buffers_until_write_interval() {
        let dir = TempDir::new().unwrap();
        let mut log = log(dir.path());
        log.push(quote(10.0));

        assert_eq!(log.tick(at(10, 0, 30)).unwrap(), None);
        assert_eq!(log.buffered(), 1);

        let path = log.tick(at(10, 1, 0)).unwrap().unwrap();
        assert_eq!(log.buffered(), 0);

        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(value["current"], 10.0);
    }

    #[test]
    fn test_error_entries_are_logged() {
        let dir = TempDir::new().unwrap();
        let mut log = log(dir.path());
        log.push(LogEntry::Error {
            time: "2024-01-05 10:00:00".into(),
            error: "Network error: reset".into(),
        });
        let path = log.flush().unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("\"error\":\"Network error: reset\""));
    }

    #[test]
    fn test_rotates_after_file_interval() {
        let dir = TempDir::new().unwrap();
        let mut log = log(dir.path());
        let first = log.current_path();

        log.push(quote(10.0));
        log.tick(at(10, 5, 0)).unwrap();
        assert_eq!(log.current_path(), first);

        log.push(quote(11.0));
        let written = log.tick(at(10, 10, 0)).unwrap().unwrap();
        assert_eq!(written, first);
        assert_ne!(log.current_path(), first);
        assert!(log
            .current_path()
            .to_string_lossy()
            .ends_with("600519_2024-01-05_1010.log"));
    }
}
