//! ---
//! mtce_section: "03-persistence-logging"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Small file-backed stores owned by the maintenance agent."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PersistenceError, Result};

/// Format revision written in the journal header line.
pub const JOURNAL_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalHeader {
    version: u16,
    created_at: DateTime<Utc>,
}

/// One customer-visible log as recorded in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerLogRecord {
    /// Assigned on append, starting at one.
    pub sequence: u64,
    /// Wall-clock time the log was raised.
    pub timestamp: DateTime<Utc>,
    /// Host the log concerns.
    pub hostname: String,
    /// Short machine-readable event name (`locked`, `heartbeat-loss`, ...).
    pub event: String,
    /// Human-readable text.
    pub text: String,
}

impl CustomerLogRecord {
    /// Build a record stamped with the current time.
    pub fn new(hostname: impl Into<String>, event: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            timestamp: Utc::now(),
            hostname: hostname.into(),
            event: event.into(),
            text: text.into(),
        }
    }
}

/// Append-only JSON-lines writer for customer logs.
pub struct JournalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    next_sequence: u64,
}

impl JournalWriter {
    /// Open a journal for appending, writing a header if the file is new.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let fresh = !path.exists() || fs::metadata(path)?.len() == 0;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);

        let next_sequence = if fresh {
            let header = JournalHeader {
                version: JOURNAL_VERSION,
                created_at: Utc::now(),
            };
            writer.write_all(serde_json::to_string(&header)?.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            0
        } else {
            last_sequence(path)?
        };

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            next_sequence,
        })
    }

    /// Append a record and return its sequence number.
    pub fn append(&mut self, mut record: CustomerLogRecord) -> Result<u64> {
        self.next_sequence += 1;
        record.sequence = self.next_sequence;
        let line = serde_json::to_string(&record)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(record.sequence)
    }

    /// Location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn last_sequence(path: &Path) -> Result<u64> {
    let reader = BufReader::new(File::open(path)?);
    let mut last = 0u64;
    for line in reader.lines().skip(1) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<CustomerLogRecord>(&line) {
            last = record.sequence;
        }
    }
    Ok(last)
}

/// Replay the journal in order, invoking `handler` for each record.
pub fn replay<F>(path: &Path, mut handler: F) -> Result<usize>
where
    F: FnMut(CustomerLogRecord) -> Result<()>,
{
    let mut count = 0usize;
    for record in JournalReader::open(path)? {
        handler(record?)?;
        count += 1;
    }
    Ok(count)
}

/// Streaming reader over journal records.
pub struct JournalReader {
    lines: std::io::Lines<BufReader<File>>,
}

impl JournalReader {
    /// Open the journal for sequential reading, skipping the header.
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut header = String::new();
        reader.read_line(&mut header)?;
        Ok(Self {
            lines: reader.lines(),
        })
    }
}

impl Iterator for JournalReader {
    type Item = Result<CustomerLogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    return Some(serde_json::from_str(&line).map_err(PersistenceError::from))
                }
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reopen_continues_sequence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("customer.log");
        {
            let mut writer = JournalWriter::open(&path).unwrap();
            writer
                .append(CustomerLogRecord::new("compute-1", "locked", "compute-1 is now 'locked'"))
                .unwrap();
        }
        let mut writer = JournalWriter::open(&path).unwrap();
        let seq = writer
            .append(CustomerLogRecord::new("compute-1", "unlocked", "compute-1 is now 'unlocked'"))
            .unwrap();
        assert_eq!(seq, 2);

        let events: Vec<_> = JournalReader::open(&path)
            .unwrap()
            .map(|record| record.unwrap().event)
            .collect();
        assert_eq!(events, vec!["locked", "unlocked"]);
    }
}
