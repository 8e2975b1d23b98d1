//! Blocking WebDAV client over reqwest

use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::connection::Endpoint;
use crate::error::RemoteError;
use crate::logger::Logger;
use crate::propfind::{parse_multistatus, PROPFIND_BODY};
use crate::remote::{Connector, Remote, RemoteEntry};
use crate::url::{base_url, url_for};

/// Opens [`DavSession`]s; each connect builds a fresh client (new pool, new TLS state).
#[derive(Clone)]
pub struct DavConnector {
    timeout: Option<Duration>,
    logger: Arc<dyn Logger>,
}

impl DavConnector {
    pub fn new(timeout: Option<Duration>, logger: Arc<dyn Logger>) -> Self {
        Self { timeout, logger }
    }
}

pub struct DavSession {
    client: Client,
    base: Url,
    username: String,
    password: String,
    logger: Arc<dyn Logger>,
}

impl Connector for DavConnector {
    type Session = DavSession;

    fn connect(&self, endpoint: &Endpoint) -> Result<DavSession, RemoteError> {
        let mut builder = Client::builder().user_agent(concat!("davmirror/", env!("CARGO_PKG_VERSION")));
        if let Some(t) = self.timeout {
            builder = builder.timeout(t);
        }
        let session = DavSession {
            client: builder.build()?,
            base: base_url(endpoint.protocol, &endpoint.server)?,
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            logger: self.logger.clone(),
        };
        session.probe(&endpoint.root)?;
        Ok(session)
    }
}

impl DavSession {
    fn request(&self, method: Method, url: Url) -> reqwest::blocking::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    /// OPTIONS on the DAV root; confirms reachability and credentials.
    fn probe(&self, root: &str) -> Result<(), RemoteError> {
        let url = url_for(&self.base, root)?;
        let resp = self.request(Method::OPTIONS, url.clone()).send()?;
        if !resp.status().is_success() {
            return Err(RemoteError::Status {
                method: "OPTIONS",
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}

impl Remote for DavSession {
    fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let url = url_for(&self.base, path)?;
        let method = Method::from_bytes(b"PROPFIND").map_err(|e| RemoteError::Other(e.to_string()))?;
        let resp = self
            .request(method, url.clone())
            .header("Depth", "1")
            .header(CONTENT_TYPE, HeaderValue::from_static("application/xml; charset=utf-8"))
            .body(PROPFIND_BODY)
            .send()?;
        if resp.status() != StatusCode::MULTI_STATUS {
            return Err(RemoteError::Status {
                method: "PROPFIND",
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        let body = resp.text()?;
        let listing = parse_multistatus(&body)?;
        for href in &listing.undecodable {
            self.logger
                .incident("list", href, "name is not valid UTF-8; skipped");
        }
        Ok(listing.entries)
    }

    fn download(&self, remote_path: &str, local_path: &Path) -> Result<u64, RemoteError> {
        let url = url_for(&self.base, remote_path)?;
        let mut resp = self.request(Method::GET, url.clone()).send()?;
        if !resp.status().is_success() {
            return Err(RemoteError::Status {
                method: "GET",
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        let dir = match local_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        // Stage next to the target so the final rename stays on one filesystem.
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        let mut writer = BufWriter::with_capacity(256 * 1024, tmp);
        let written = resp.copy_to(&mut writer)?;
        writer.flush()?;
        let tmp = writer
            .into_inner()
            .map_err(|e| RemoteError::Io(e.into_error()))?;
        tmp.persist(local_path).map_err(|e| RemoteError::Io(e.error))?;
        Ok(written)
    }
}
