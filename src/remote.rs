//! Remote client seam: listing and downloading over a live session

use chrono::{DateTime, Utc};
use std::path::Path;

use crate::connection::Endpoint;
use crate::error::RemoteError;

pub const DIRECTORY_CONTENT_TYPE: &str = "httpd/unix-directory";

/// One item from a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Unescaped server path as reported by the listing
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub content_type: Option<String>,
    pub modified: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            size: 0,
            content_type: Some(DIRECTORY_CONTENT_TYPE.to_string()),
            modified: None,
        }
    }

    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
            size,
            content_type: None,
            modified: None,
        }
    }
}

/// Operations available on an established session.
pub trait Remote {
    fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Download `remote_path` into `local_path`, returning the bytes written.
    fn download(&self, remote_path: &str, local_path: &Path) -> Result<u64, RemoteError>;
}

/// Opens sessions; called once per connection attempt.
pub trait Connector {
    type Session: Remote;

    fn connect(&self, endpoint: &Endpoint) -> Result<Self::Session, RemoteError>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted in-memory remote for engine tests.

    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Default)]
    pub(crate) struct FakeState {
        pub listings: HashMap<String, Vec<RemoteEntry>>,
        pub contents: HashMap<String, Vec<u8>>,
        pub failing_listings: Vec<String>,
        /// Remaining scripted failures per remote file; `u32::MAX` never heals.
        pub download_failures: HashMap<String, u32>,
        pub connect_failures: u32,
        pub connects: u32,
        pub listed: Vec<String>,
        pub downloaded: Vec<String>,
    }

    #[derive(Clone, Default)]
    pub(crate) struct FakeConnector {
        pub state: Rc<RefCell<FakeState>>,
    }

    pub(crate) struct FakeSession {
        state: Rc<RefCell<FakeState>>,
        generation: u32,
    }

    impl FakeConnector {
        /// Build a tree under `root` (ends with `/`). Directories are relative
        /// paths without slashes at either end; files are `(relative path, content)`.
        pub fn with_tree(root: &str, dirs: &[&str], files: &[(&str, &[u8])]) -> Self {
            let fake = FakeConnector::default();
            {
                let mut st = fake.state.borrow_mut();
                st.listings
                    .insert(root.to_string(), vec![RemoteEntry::directory(root)]);
                for d in dirs {
                    let full = format!("{}{}/", root, d);
                    st.listings
                        .insert(full.clone(), vec![RemoteEntry::directory(full.clone())]);
                    let parent = parent_of(&full);
                    st.listings
                        .entry(parent)
                        .or_default()
                        .push(RemoteEntry::directory(full));
                }
                for (f, data) in files {
                    let full = format!("{}{}", root, f);
                    let parent = parent_of(&full);
                    st.listings
                        .entry(parent)
                        .or_default()
                        .push(RemoteEntry::file(full.clone(), data.len() as u64));
                    st.contents.insert(full, data.to_vec());
                }
            }
            fake
        }

        pub fn fail_listing(self, path: &str) -> Self {
            self.state.borrow_mut().failing_listings.push(path.to_string());
            self
        }

        pub fn fail_download(self, path: &str, times: u32) -> Self {
            self.state
                .borrow_mut()
                .download_failures
                .insert(path.to_string(), times);
            self
        }

        pub fn fail_connect(self, times: u32) -> Self {
            self.state.borrow_mut().connect_failures = times;
            self
        }
    }

    fn parent_of(path: &str) -> String {
        let trimmed = path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(i) => trimmed[..=i].to_string(),
            None => "/".to_string(),
        }
    }

    impl Connector for FakeConnector {
        type Session = FakeSession;

        fn connect(&self, _endpoint: &Endpoint) -> Result<FakeSession, RemoteError> {
            let mut st = self.state.borrow_mut();
            st.connects += 1;
            if st.connect_failures > 0 {
                st.connect_failures -= 1;
                return Err(RemoteError::Other("connection refused".into()));
            }
            Ok(FakeSession {
                state: self.state.clone(),
                generation: st.connects,
            })
        }
    }

    impl FakeSession {
        pub fn generation(&self) -> u32 {
            self.generation
        }
    }

    impl Remote for FakeSession {
        fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
            let mut st = self.state.borrow_mut();
            st.listed.push(path.to_string());
            if st.failing_listings.iter().any(|p| p == path) {
                return Err(RemoteError::Other(format!("PROPFIND {} refused", path)));
            }
            st.listings
                .get(path)
                .cloned()
                .ok_or_else(|| RemoteError::Other(format!("no such directory {}", path)))
        }

        fn download(&self, remote_path: &str, local_path: &Path) -> Result<u64, RemoteError> {
            let mut st = self.state.borrow_mut();
            st.downloaded.push(remote_path.to_string());
            if let Some(left) = st.download_failures.get_mut(remote_path) {
                if *left > 0 {
                    if *left != u32::MAX {
                        *left -= 1;
                    }
                    return Err(RemoteError::Other(format!("GET {} reset by peer", remote_path)));
                }
            }
            let data = st
                .contents
                .get(remote_path)
                .cloned()
                .ok_or_else(|| RemoteError::Other(format!("GET {} not found", remote_path)))?;
            std::fs::write(local_path, &data)?;
            Ok(data.len() as u64)
        }
    }
}
