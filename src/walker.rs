//! Depth-first, pre-order traversal of a remote tree
//!
//! The walker holds only a stack of directories still to visit. It borrows a
//! session per step instead of owning one, so the caller can swap sessions
//! between batches after a reconnect.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::MirrorError;
use crate::logger::Logger;
use crate::remote::{Remote, RemoteEntry};
use crate::url::dir_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Immediate children of one remote directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryBatch {
    /// Always ends with `/`
    pub path: String,
    pub subdirectories: Vec<String>,
    pub files: Vec<RemoteFile>,
}

pub struct TreeWalker {
    pending: Vec<String>,
    listing_failures: u64,
    logger: Arc<dyn Logger>,
}

impl TreeWalker {
    pub fn new(root: &str, logger: Arc<dyn Logger>) -> Self {
        Self {
            pending: vec![dir_path(root)],
            listing_failures: 0,
            logger,
        }
    }

    /// List the next directory. A failed listing is logged and yields an
    /// empty batch; its subtree is never discovered.
    pub fn next_batch<R: Remote + ?Sized>(&mut self, remote: &R) -> Option<DirectoryBatch> {
        let path = self.pending.pop()?;
        let batch = match remote.list(&path) {
            Ok(entries) => partition(&path, entries, &*self.logger),
            Err(source) => {
                self.listing_failures += 1;
                let err = MirrorError::ListingFailed {
                    path: path.clone(),
                    source,
                };
                self.logger.incident("list", &path, &err.to_string());
                DirectoryBatch {
                    path,
                    ..DirectoryBatch::default()
                }
            }
        };
        self.logger
            .listed(&batch.path, batch.subdirectories.len(), batch.files.len());
        // Reverse so the first listed subdirectory is visited next.
        for sub in batch.subdirectories.iter().rev() {
            self.pending.push(format!("{}{}/", batch.path, sub));
        }
        Some(batch)
    }

    pub fn listing_failures(&self) -> u64 {
        self.listing_failures
    }

    /// Iterator over the remaining batches using one fixed session.
    pub fn batches<'a, R: Remote + ?Sized>(&'a mut self, remote: &'a R) -> Batches<'a, R> {
        Batches {
            walker: self,
            remote,
        }
    }
}

pub struct Batches<'a, R: Remote + ?Sized> {
    walker: &'a mut TreeWalker,
    remote: &'a R,
}

impl<R: Remote + ?Sized> Iterator for Batches<'_, R> {
    type Item = DirectoryBatch;

    fn next(&mut self) -> Option<DirectoryBatch> {
        self.walker.next_batch(self.remote)
    }
}

fn partition(path: &str, entries: Vec<RemoteEntry>, logger: &dyn Logger) -> DirectoryBatch {
    let mut batch = DirectoryBatch {
        path: path.to_string(),
        ..DirectoryBatch::default()
    };
    let own = path.trim_end_matches('/');
    let own_last = last_segment(own);
    for entry in entries {
        let relative = match entry.name.strip_prefix(path) {
            Some(rest) => rest,
            None if entry.name.trim_end_matches('/') == own => continue,
            // Href outside the listed directory (rewriting proxy): keep only
            // its last segment, which names the directory itself when it
            // matches ours.
            None => {
                let last = last_segment(&entry.name);
                if entry.is_directory && last == own_last {
                    continue;
                }
                last
            }
        };
        let name = relative.trim_end_matches('/');
        if name.is_empty() {
            continue;
        }
        if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
            logger.incident("list", &entry.name, "unsafe entry name skipped");
            continue;
        }
        if entry.is_directory {
            batch.subdirectories.push(name.to_string());
        } else {
            batch.files.push(RemoteFile {
                name: name.to_string(),
                size: entry.size,
                modified: entry.modified,
            });
        }
    }
    batch
}

fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}
