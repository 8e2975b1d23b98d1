use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::run::{RunResult, RunStatus};

/// One line of the run history
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub run_id: String,
    pub host: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub remote: String,
    pub destination: PathBuf,
    pub status: RunStatus,
    pub files_downloaded: u64,
    pub total_bytes: u64,
    pub connection_incidents: u64,
    pub download_incidents: u64,
    pub listing_incidents: u64,
    pub elapsed_secs: f64,
    pub error: Option<String>,
}

impl JournalEntry {
    pub fn from_result(
        result: &RunResult,
        started_at: DateTime<Utc>,
        remote: &str,
        destination: &Path,
    ) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        let s = &result.stats;
        JournalEntry {
            run_id: uuid::Uuid::new_v4().to_string(),
            host,
            started_at,
            finished_at: Utc::now(),
            remote: remote.to_string(),
            destination: destination.to_path_buf(),
            status: result.status,
            files_downloaded: s.files_downloaded,
            total_bytes: s.total_bytes,
            connection_incidents: s.connection_incidents,
            download_incidents: s.download_incidents,
            listing_incidents: s.listing_incidents,
            elapsed_secs: result.elapsed.as_secs_f64(),
            error: result.error.clone(),
        }
    }
}

pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: &Path) -> Self {
        Journal {
            path: path.to_path_buf(),
        }
    }

    pub fn append(&self, entry: &JournalEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open journal {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read(&self) -> Result<Vec<JournalEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open journal {} for reading", self.path.display()))?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: JournalEntry = serde_json::from_str(&line)
                .with_context(|| format!("journal line {} is malformed", n + 1))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}
