use anyhow::Result;
use chrono::{Local, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::run::RunResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        })
    }
}

/// Sync event sink. Every event is rendered into one line and handed to
/// [`Logger::event`]; sinks only need to implement that.
pub trait Logger: Send + Sync {
    fn event(&self, _level: Level, _msg: &str) {}

    fn run_start(&self, remote: &str, dst: &Path) {
        self.event(
            Level::Info,
            &format!("START remote={} dst={}", remote, dst.display()),
        );
    }
    fn skipped(&self, sentinel: &Path) {
        self.event(
            Level::Warn,
            &format!(
                "SKIP previous run failed; remove {} to retry",
                sentinel.display()
            ),
        );
    }
    fn rotated(&self, from: &Path, to: &Path) {
        self.event(
            Level::Info,
            &format!("ROTATE {} -> {}", from.display(), to.display()),
        );
    }
    fn pruned(&self, path: &Path) {
        self.event(Level::Info, &format!("PRUNE {}", path.display()));
    }
    fn connected(&self, url: &str, attempt: u32) {
        self.event(Level::Info, &format!("CONNECT {} attempt={}", url, attempt));
    }
    fn listed(&self, path: &str, dirs: usize, files: usize) {
        self.event(
            Level::Debug,
            &format!("LIST {} dirs={} files={}", path, dirs, files),
        );
    }
    fn mkdir(&self, path: &Path) {
        self.event(Level::Info, &format!("MKDIR {}", path.display()));
    }
    fn download_start(&self, attempt: u32, remote: &str, local: &Path) {
        self.event(
            Level::Info,
            &format!("[{}] GET '{}' -> '{}'", attempt, remote, local.display()),
        );
    }
    fn download_done(&self, remote: &str, bytes: u64) {
        self.event(Level::Debug, &format!("DONE '{}' bytes={}", remote, bytes));
    }
    fn incident(&self, context: &str, target: &str, msg: &str) {
        self.event(
            Level::Error,
            &format!("INCIDENT ctx={} target={} msg={}", context, target, msg),
        );
    }
    fn done(&self, result: &RunResult) {
        let s = &result.stats;
        self.event(
            Level::Info,
            &format!(
                "END status={} files={} bytes={} connection_incidents={} download_incidents={} listing_incidents={} seconds={:.3}",
                result.status,
                s.files_downloaded,
                s.total_bytes,
                s.connection_incidents,
                s.download_incidents,
                s.listing_incidents,
                result.elapsed.as_secs_f64()
            ),
        );
    }
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Human-readable lines on stderr with local timestamps.
pub struct ConsoleLogger {
    min_level: Level,
}

impl ConsoleLogger {
    pub fn new(verbose: bool) -> Self {
        Self {
            min_level: if verbose { Level::Debug } else { Level::Info },
        }
    }
}

impl Logger for ConsoleLogger {
    fn event(&self, level: Level, msg: &str) {
        if level >= self.min_level {
            eprintln!("{} {:<5} {}", Local::now().format("%F %H:%M:%S"), level, msg);
        }
    }
}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }
}

impl Logger for TextLogger {
    fn event(&self, level: Level, msg: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {} {}", Utc::now().to_rfc3339(), level, msg);
    }
}

/// Fans every event out to several sinks.
pub struct TeeLogger {
    sinks: Vec<Arc<dyn Logger>>,
}

impl TeeLogger {
    pub fn new(sinks: Vec<Arc<dyn Logger>>) -> Self {
        Self { sinks }
    }
}

impl Logger for TeeLogger {
    fn event(&self, level: Level, msg: &str) {
        for sink in &self.sinks {
            sink.event(level, msg);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::capture::CaptureLogger;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn text_logger_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/run.log");
        {
            let log = TextLogger::new(&path).unwrap();
            log.mkdir(Path::new("/backup/a"));
            log.incident("download", "/dav/x", "reset");
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO MKDIR /backup/a"));
        assert!(lines[1].contains("ERROR INCIDENT ctx=download target=/dav/x msg=reset"));
    }

    #[test]
    fn tee_forwards_to_all_sinks() {
        let a = Arc::new(CaptureLogger::default());
        let b = Arc::new(CaptureLogger::default());
        let tee = TeeLogger::new(vec![a.clone() as Arc<dyn Logger>, b.clone() as Arc<dyn Logger>]);
        tee.connected("https://h/dav/", 2);
        assert!(a.contains("CONNECT https://h/dav/ attempt=2"));
        assert!(b.contains("CONNECT https://h/dav/ attempt=2"));
    }
}
