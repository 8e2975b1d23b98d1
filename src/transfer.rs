//! Per-file download with bounded retry and reconnect

use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::connection::ConnectionManager;
use crate::error::MirrorError;
use crate::logger::{Level, Logger};
use crate::remote::{Connector, Remote};
use crate::walker::RemoteFile;

pub struct TransferEngine {
    remote_root: String,
    dest_root: PathBuf,
    /// Retries after the first attempt
    max_retries: u32,
    preserve_mtime: bool,
    logger: Arc<dyn Logger>,
}

impl TransferEngine {
    pub fn new(
        remote_root: &str,
        dest_root: &Path,
        max_retries: u32,
        preserve_mtime: bool,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            remote_root: remote_root.to_string(),
            dest_root: dest_root.to_path_buf(),
            max_retries,
            preserve_mtime,
            logger,
        }
    }

    /// Local directory mirroring a remote directory under the remote root.
    pub fn local_dir(&self, remote_dir: &str) -> PathBuf {
        let relative = remote_dir
            .strip_prefix(self.remote_root.as_str())
            .unwrap_or("");
        relative
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.dest_root.clone(), |acc, seg| acc.join(seg))
    }

    /// Create `path` unless it already is a directory. Returns whether it was created.
    pub fn ensure_local_dir(&self, path: &Path) -> Result<bool, MirrorError> {
        if path.is_dir() {
            return Ok(false);
        }
        match fs::create_dir_all(path) {
            Ok(()) => {
                self.logger.mkdir(path);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(false),
            Err(e) => Err(MirrorError::io("cannot create directory", path, e)),
        }
    }

    /// Download one file, reconnecting between failed attempts.
    pub fn transfer<C: Connector>(
        &self,
        conn: &mut ConnectionManager<'_, C>,
        remote_path: &str,
        local_path: &Path,
        file: &RemoteFile,
    ) -> Result<(), MirrorError> {
        let attempts = self.max_retries.saturating_add(1);
        let mut failures = 0u32;
        loop {
            self.logger.download_start(failures, remote_path, local_path);
            match conn.session().download(remote_path, local_path) {
                Ok(bytes) => {
                    conn.stats_mut().add_file(file.size);
                    self.logger.download_done(remote_path, bytes);
                    if self.preserve_mtime {
                        self.apply_mtime(local_path, file);
                    }
                    return Ok(());
                }
                Err(source) => {
                    failures += 1;
                    conn.stats_mut().download_incidents += 1;
                    self.logger.incident(
                        "download",
                        remote_path,
                        &format!("attempt {}/{}: {}", failures, attempts, source),
                    );
                    if failures >= attempts {
                        return Err(MirrorError::TransferExhausted {
                            remote: remote_path.to_string(),
                            local: local_path.to_path_buf(),
                            attempts,
                            source,
                        });
                    }
                    self.logger.event(Level::Warn, "RETRYING with new connection");
                    conn.reconnect()?;
                }
            }
        }
    }

    fn apply_mtime(&self, local_path: &Path, file: &RemoteFile) {
        let Some(modified) = file.modified else {
            return;
        };
        let mtime = FileTime::from_unix_time(modified.timestamp(), modified.timestamp_subsec_nanos());
        if let Err(e) = filetime::set_file_mtime(local_path, mtime) {
            self.logger.incident(
                "mtime",
                &local_path.display().to_string(),
                &e.to_string(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use crate::connection::Endpoint;
    use crate::logger::NoopLogger;
    use crate::remote::fake::FakeConnector;
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::TempDir;

    fn manager(fake: &FakeConnector) -> ConnectionManager<'_, FakeConnector> {
        let endpoint = Endpoint {
            protocol: Protocol::Https,
            server: "h".into(),
            username: "u".into(),
            password: "p".into(),
            root: "/dav/".into(),
        };
        match ConnectionManager::connect(
            fake,
            endpoint,
            3,
            Duration::ZERO,
            Arc::new(NoopLogger),
        ) {
            Ok(c) => c,
            Err((e, _)) => panic!("{e}"),
        }
    }

    fn file(name: &str, size: u64) -> RemoteFile {
        RemoteFile {
            name: name.into(),
            size,
            modified: None,
        }
    }

    #[test]
    fn local_dir_mirrors_remote_layout() {
        let engine = TransferEngine::new("/dav/", Path::new("/backup"), 3, false, Arc::new(NoopLogger));
        assert_eq!(engine.local_dir("/dav/"), PathBuf::from("/backup"));
        assert_eq!(engine.local_dir("/dav/a/b/"), PathBuf::from("/backup/a/b"));
    }

    #[test]
    fn ensure_local_dir_is_exists_ok() {
        let tmp = TempDir::new().unwrap();
        let engine = TransferEngine::new("/dav/", tmp.path(), 3, false, Arc::new(NoopLogger));
        let dir = tmp.path().join("a/b");
        assert!(engine.ensure_local_dir(&dir).unwrap());
        assert!(!engine.ensure_local_dir(&dir).unwrap());
        assert!(dir.is_dir());
    }

    #[test]
    fn retries_through_reconnects() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeConnector::with_tree("/dav/", &[], &[("x.txt", b"0123456789")])
            .fail_download("/dav/x.txt", 2);
        let mut conn = manager(&fake);
        let engine = TransferEngine::new("/dav/", tmp.path(), 3, false, Arc::new(NoopLogger));
        let local = tmp.path().join("x.txt");

        engine
            .transfer(&mut conn, "/dav/x.txt", &local, &file("x.txt", 10))
            .unwrap();

        assert_eq!(fs::read(&local).unwrap(), b"0123456789");
        assert_eq!(conn.stats().download_incidents, 2);
        assert_eq!(conn.stats().files_downloaded, 1);
        assert_eq!(conn.stats().total_bytes, 10);
        // initial connect plus one reconnect per failure
        assert_eq!(fake.state.borrow().connects, 3);
    }

    #[test]
    fn gives_up_after_initial_attempt_plus_retries() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeConnector::with_tree("/dav/", &[], &[("x.txt", b"data")])
            .fail_download("/dav/x.txt", u32::MAX);
        let mut conn = manager(&fake);
        let engine = TransferEngine::new("/dav/", tmp.path(), 3, false, Arc::new(NoopLogger));

        let err = engine
            .transfer(&mut conn, "/dav/x.txt", &tmp.path().join("x.txt"), &file("x.txt", 4))
            .unwrap_err();

        assert!(matches!(err, MirrorError::TransferExhausted { attempts: 4, .. }));
        assert_eq!(fake.state.borrow().downloaded.len(), 4);
        assert_eq!(conn.stats().download_incidents, 4);
        assert_eq!(conn.stats().files_downloaded, 0);
    }

    #[test]
    fn reconnect_failure_aborts_transfer() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeConnector::with_tree("/dav/", &[], &[("x.txt", b"data")])
            .fail_download("/dav/x.txt", 1);
        let mut conn = manager(&fake);
        fake.state.borrow_mut().connect_failures = 10;
        let engine = TransferEngine::new("/dav/", tmp.path(), 3, false, Arc::new(NoopLogger));

        let err = engine
            .transfer(&mut conn, "/dav/x.txt", &tmp.path().join("x.txt"), &file("x.txt", 4))
            .unwrap_err();
        assert!(matches!(err, MirrorError::ConnectionFailed { .. }));
        assert_eq!(conn.stats().connection_incidents, 3);
    }

    #[test]
    fn preserves_remote_mtime() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeConnector::with_tree("/dav/", &[], &[("x.txt", b"data")]);
        let mut conn = manager(&fake);
        let engine = TransferEngine::new("/dav/", tmp.path(), 0, true, Arc::new(NoopLogger));
        let local = tmp.path().join("x.txt");
        let remote = RemoteFile {
            modified: Some(chrono::Utc.with_ymd_and_hms(2020, 3, 4, 8, 30, 15).unwrap()),
            ..file("x.txt", 4)
        };

        engine.transfer(&mut conn, "/dav/x.txt", &local, &remote).unwrap();

        let meta = fs::metadata(&local).unwrap();
        let mtime = FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime.unix_seconds(), 1_583_310_615);
    }
}
