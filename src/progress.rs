//! Cargo-style progress display
//!
//! Log lines scroll above a single spinner line showing files and bytes
//! mirrored so far.

use crossterm::style::{Color, Stylize};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::logger::{Level, Logger};
use crate::run::RunResult;

pub struct SpinnerLogger {
    spinner: ProgressBar,
    inner: Arc<dyn Logger>,
    start_time: Instant,
    files: AtomicU64,
    bytes: AtomicU64,
}

impl SpinnerLogger {
    pub fn new(inner: Arc<dyn Logger>) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        Self {
            spinner,
            inner,
            start_time: Instant::now(),
            files: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    fn status(&self, stage: &str, detail: &str) {
        let msg = format!(
            "{} {} files, {:.2} MB in {:.1}s {}",
            stage.with(Color::Green).bold(),
            self.files.load(Ordering::Relaxed),
            self.bytes.load(Ordering::Relaxed) as f64 / 1_048_576.0,
            self.start_time.elapsed().as_secs_f64(),
            detail.with(Color::Cyan)
        );
        self.spinner.set_message(msg);
    }
}

impl Logger for SpinnerLogger {
    fn event(&self, level: Level, msg: &str) {
        self.spinner.suspend(|| self.inner.event(level, msg));
    }

    fn listed(&self, path: &str, dirs: usize, files: usize) {
        self.status("Scanning", path);
        self.spinner.suspend(|| self.inner.listed(path, dirs, files));
    }

    fn download_start(&self, attempt: u32, remote: &str, local: &Path) {
        self.status("Mirroring", remote);
        self.spinner
            .suspend(|| self.inner.download_start(attempt, remote, local));
    }

    fn download_done(&self, remote: &str, bytes: u64) {
        self.files.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.spinner.suspend(|| self.inner.download_done(remote, bytes));
    }

    fn done(&self, result: &RunResult) {
        self.spinner.finish_and_clear();
        self.inner.done(result);
    }
}
