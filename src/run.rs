//! Run orchestration: rotate, connect, walk and transfer
//!
//! ```text
//! Idle -> Rotating -> Connecting -> Syncing -> Succeeded
//!   |                     |            |
//!   +--> Succeeded(skip)  +------------+--> Failed (sentinel written)
//! ```
//!
//! Rotation failures skip the state machine entirely and surface as `Err`;
//! no sentinel is written for them.

use std::cell::Cell;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::connection::{ConnectionManager, Endpoint, SyncStats};
use crate::error::MirrorError;
use crate::logger::{Level, Logger};
use crate::remote::Connector;
use crate::rotate::rotate;
use crate::transfer::TransferEngine;
use crate::walker::TreeWalker;

/// Marker left in the destination after a failed run.
pub const SENTINEL_NAME: &str = "nobackup";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Rotating,
    Connecting,
    Syncing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RunStatus {
    Succeeded,
    /// Sentinel from an earlier failure was present
    Skipped,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Skipped => "skipped",
            RunStatus::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub status: RunStatus,
    pub stats: SyncStats,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.status != RunStatus::Failed
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub destination: PathBuf,
    /// Remote directory mirrored into `destination`
    pub remote_root: String,
    pub retention: u32,
    pub max_connect_attempts: u32,
    pub max_download_retries: u32,
    pub retry_delay: Duration,
    pub preserve_mtime: bool,
    /// Remove an existing sentinel instead of skipping
    pub force: bool,
}

impl RunOptions {
    pub fn from_config(config: &Config, destination: &Path, remote_root: &str) -> Self {
        Self {
            destination: destination.to_path_buf(),
            remote_root: remote_root.to_string(),
            retention: config.nbackups,
            max_connect_attempts: config.max_connect_attempts,
            max_download_retries: config.max_download_retries,
            retry_delay: config.retry_delay,
            preserve_mtime: config.preserve_mtime,
            force: false,
        }
    }

    pub fn sentinel_path(&self) -> PathBuf {
        self.destination.join(SENTINEL_NAME)
    }
}

pub struct Orchestrator<C: Connector> {
    connector: C,
    endpoint: Endpoint,
    options: RunOptions,
    logger: Arc<dyn Logger>,
    state: Cell<RunState>,
}

impl<C: Connector> Orchestrator<C> {
    pub fn new(connector: C, endpoint: Endpoint, options: RunOptions, logger: Arc<dyn Logger>) -> Self {
        Self {
            connector,
            endpoint,
            options,
            logger,
            state: Cell::new(RunState::Idle),
        }
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn enter(&self, next: RunState) {
        self.logger.event(
            Level::Debug,
            &format!("STATE {:?} -> {:?}", self.state.get(), next),
        );
        self.state.set(next);
    }

    /// Execute one run. `Err` only for failures before any network activity.
    pub fn run(&self) -> Result<RunResult, MirrorError> {
        let started = Instant::now();
        let sentinel = self.options.sentinel_path();
        self.state.set(RunState::Idle);
        self.logger
            .run_start(&self.endpoint.display_url(), &self.options.destination);

        if sentinel.exists() {
            if !self.options.force {
                self.logger.skipped(&sentinel);
                self.enter(RunState::Succeeded);
                return Ok(self.finish(RunStatus::Skipped, SyncStats::default(), started, None));
            }
            fs::remove_file(&sentinel)
                .map_err(|e| MirrorError::io("cannot remove sentinel", &sentinel, e))?;
            self.logger
                .event(Level::Warn, &format!("removed sentinel {}", sentinel.display()));
        }

        self.enter(RunState::Rotating);
        rotate(&self.options.destination, self.options.retention, &*self.logger)?;

        self.enter(RunState::Connecting);
        let (stats, error) = match ConnectionManager::connect(
            &self.connector,
            self.endpoint.clone(),
            self.options.max_connect_attempts,
            self.options.retry_delay,
            self.logger.clone(),
        ) {
            Err((e, stats)) => (stats, Some(e)),
            Ok(mut conn) => {
                self.enter(RunState::Syncing);
                let outcome = self.sync_tree(&mut conn);
                (conn.into_stats(), outcome.err())
            }
        };

        match error {
            None => {
                self.enter(RunState::Succeeded);
                Ok(self.finish(RunStatus::Succeeded, stats, started, None))
            }
            Some(e) => {
                let msg = e.to_string();
                self.logger.incident("run", &self.endpoint.display_url(), &msg);
                self.enter(RunState::Failed);
                self.write_sentinel(&sentinel);
                Ok(self.finish(RunStatus::Failed, stats, started, Some(msg)))
            }
        }
    }

    fn sync_tree(&self, conn: &mut ConnectionManager<'_, C>) -> Result<(), MirrorError> {
        let engine = TransferEngine::new(
            &self.options.remote_root,
            &self.options.destination,
            self.options.max_download_retries,
            self.options.preserve_mtime,
            self.logger.clone(),
        );
        let mut walker = TreeWalker::new(&self.options.remote_root, self.logger.clone());
        let sentinel = self.options.sentinel_path();
        let result = drive(&engine, &mut walker, conn, &sentinel, &*self.logger);
        conn.stats_mut().listing_incidents = walker.listing_failures();
        result
    }

    fn write_sentinel(&self, sentinel: &Path) {
        let written = fs::create_dir_all(&self.options.destination)
            .and_then(|_| fs::File::create(sentinel).map(|_| ()));
        if let Err(e) = written {
            self.logger
                .incident("sentinel", &sentinel.display().to_string(), &e.to_string());
        }
    }

    fn finish(
        &self,
        status: RunStatus,
        stats: SyncStats,
        started: Instant,
        error: Option<String>,
    ) -> RunResult {
        let result = RunResult {
            status,
            stats,
            elapsed: started.elapsed(),
            error,
        };
        self.logger.done(&result);
        result
    }
}

/// Consume batches until the walk ends or a transfer fails for good.
/// A remote file that would land on the sentinel path is skipped.
fn drive<C: Connector>(
    engine: &TransferEngine,
    walker: &mut TreeWalker,
    conn: &mut ConnectionManager<'_, C>,
    sentinel: &Path,
    logger: &dyn Logger,
) -> Result<(), MirrorError> {
    while let Some(batch) = walker.next_batch(conn.session()) {
        let local_dir = engine.local_dir(&batch.path);
        if engine.ensure_local_dir(&local_dir)? {
            conn.stats_mut().directories_created += 1;
        }
        for file in &batch.files {
            let remote_path = format!("{}{}", batch.path, file.name);
            let local_path = local_dir.join(&file.name);
            if local_path == sentinel {
                logger.incident(
                    "download",
                    &remote_path,
                    "name collides with the failure sentinel; skipped",
                );
                continue;
            }
            engine.transfer(conn, &remote_path, &local_path, file)?;
        }
    }
    Ok(())
}
