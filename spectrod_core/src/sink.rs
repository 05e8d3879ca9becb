//! Append-only daily spectrum files.
//!
//! Records land in `<data_dir>/<YYYY-MM-DD>_spectra.csv`, one line per stored
//! spectrum: timestamp, exposure with nanosecond precision, sensor
//! temperature, then one sample per pixel column. The file rolls over by
//! virtue of the date in the name; nothing is ever rewritten.

use crate::error::AcqError;
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One parsed record line.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub timestamp: String,
    pub exposure_secs: f64,
    pub temperature_c: f64,
    pub samples: Vec<i32>,
}

/// Renders the same line format `append` writes.
impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{:.9},{:.2}",
            self.timestamp, self.exposure_secs, self.temperature_c
        )?;
        for s in &self.samples {
            write!(f, ",{s}")?;
        }
        Ok(())
    }
}

pub struct DataSink {
    data_dir: PathBuf,
    /// The data-file lock. Serializes append/read/count against each other;
    /// disjoint from the session's config lock.
    file: Mutex<()>,
}

impl DataSink {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            file: Mutex::new(()),
        }
    }

    /// Today's file path. Computed per call so long-running daemons roll over
    /// at midnight without any bookkeeping.
    pub fn today_path(&self) -> PathBuf {
        let name = format!("{}_spectra.csv", Local::now().format("%Y-%m-%d"));
        self.data_dir.join(name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.file.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Append one spectrum and flush before releasing the lock.
    pub fn append(
        &self,
        exposure_secs: f64,
        temperature_c: f64,
        samples: &[i32],
    ) -> Result<(), AcqError> {
        let path = self.today_path();
        let _guard = self.lock();
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut line = format!(
            "{},{:.9},{:.2}",
            Local::now().format("%Y-%m-%dT%H:%M:%S"),
            exposure_secs,
            temperature_c
        );
        for s in samples {
            line.push(',');
            line.push_str(&s.to_string());
        }
        line.push('\n');
        f.write_all(line.as_bytes())?;
        f.flush()?;
        tracing::trace!(path = %path.display(), samples = samples.len(), "spectrum appended");
        Ok(())
    }

    /// Last record of today's file, parsed back into its parts. A line that
    /// does not parse is a `Parse` error, not a raw passthrough.
    pub fn read_last(&self) -> Result<Record, AcqError> {
        let path = self.today_path();
        let _guard = self.lock();
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AcqError::EmptyLog);
            }
            Err(e) => return Err(e.into()),
        };
        let mut last = None;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.is_empty() {
                last = Some(line);
            }
        }
        parse_record_line(&last.ok_or(AcqError::EmptyLog)?)
    }

    /// Number of records in today's file, by counting newlines. A missing
    /// file counts as zero.
    pub fn count_lines(&self) -> Result<u64, AcqError> {
        let path = self.today_path();
        let _guard = self.lock();
        count_newlines(&path)
    }
}

fn count_newlines(path: &Path) -> Result<u64, AcqError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut reader = BufReader::new(file);
    let mut buf = [0u8; 8192];
    let mut count = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        count += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
    }
    Ok(count)
}

/// Parse one record line back into its parts. Shared with the fuzz targets.
pub fn parse_record_line(line: &str) -> Result<Record, AcqError> {
    let mut parts = line.trim_end().split(',');
    let timestamp = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AcqError::Parse("missing timestamp".into()))?
        .to_string();
    let exposure_secs: f64 = parts
        .next()
        .ok_or_else(|| AcqError::Parse("missing exposure".into()))?
        .parse()
        .map_err(|e| AcqError::Parse(format!("exposure: {e}")))?;
    let temperature_c: f64 = parts
        .next()
        .ok_or_else(|| AcqError::Parse("missing temperature".into()))?
        .parse()
        .map_err(|e| AcqError::Parse(format!("temperature: {e}")))?;
    let mut samples = Vec::new();
    for p in parts {
        samples.push(
            p.parse::<i32>()
                .map_err(|e| AcqError::Parse(format!("sample {p:?}: {e}")))?,
        );
    }
    if samples.is_empty() {
        return Err(AcqError::Parse("record has no samples".into()));
    }
    Ok(Record {
        timestamp,
        exposure_secs,
        temperature_c,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_a_record() {
        let rec =
            parse_record_line("2026-08-26T10:00:00,0.010000000,-60.12,1,2,3,65535").unwrap();
        assert_eq!(rec.timestamp, "2026-08-26T10:00:00");
        assert!((rec.exposure_secs - 0.01).abs() < 1e-12);
        assert!((rec.temperature_c - (-60.12)).abs() < 1e-9);
        assert_eq!(rec.samples, vec![1, 2, 3, 65535]);
    }

    #[test]
    fn record_renders_the_line_it_was_parsed_from() {
        let line = "2026-08-26T10:00:00,0.010000000,-60.12,1,2,3,65535";
        assert_eq!(parse_record_line(line).unwrap().to_string(), line);
    }

    #[test]
    fn parse_rejects_short_and_garbled_lines() {
        assert!(parse_record_line("").is_err());
        assert!(parse_record_line("2026-08-26T10:00:00").is_err());
        assert!(parse_record_line("2026-08-26T10:00:00,0.01,-60.0").is_err());
        assert!(parse_record_line("2026-08-26T10:00:00,abc,-60.0,1").is_err());
        assert!(parse_record_line("2026-08-26T10:00:00,0.01,-60.0,1,x").is_err());
    }
}
