//! Connection manager: owns the live session and the run's incident counters
//!
//! A session is never patched in place. Reconnecting builds a new one and
//! swaps it in, so every list/download call sees one consistent session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, Protocol};
use crate::error::MirrorError;
use crate::logger::Logger;
use crate::remote::Connector;

/// Where to connect and as whom. The password is held decoded.
#[derive(Clone)]
pub struct Endpoint {
    pub protocol: Protocol,
    pub server: String,
    pub username: String,
    pub password: String,
    /// Remote directory probed on connect
    pub root: String,
}

impl Endpoint {
    pub fn from_config(config: &Config, root: &str) -> Self {
        Self {
            protocol: config.protocol,
            server: config.server.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            root: root.to_string(),
        }
    }

    pub fn display_url(&self) -> String {
        format!("{}://{}{}", self.protocol, self.server, self.root)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("protocol", &self.protocol)
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("root", &self.root)
            .finish()
    }
}

/// Counters accumulated over a run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub connection_incidents: u64,
    pub download_incidents: u64,
    pub listing_incidents: u64,
    pub directories_created: u64,
    pub files_downloaded: u64,
    pub total_bytes: u64,
}

impl SyncStats {
    pub fn add_file(&mut self, bytes: u64) {
        self.files_downloaded += 1;
        self.total_bytes += bytes;
    }
}

pub struct ConnectionManager<'c, C: Connector> {
    connector: &'c C,
    endpoint: Endpoint,
    max_attempts: u32,
    retry_delay: Duration,
    session: C::Session,
    stats: SyncStats,
    logger: Arc<dyn Logger>,
}

impl<'c, C: Connector> ConnectionManager<'c, C> {
    /// Open the first session of a run. Counters start from zero.
    pub fn connect(
        connector: &'c C,
        endpoint: Endpoint,
        max_attempts: u32,
        retry_delay: Duration,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, (MirrorError, SyncStats)> {
        let mut stats = SyncStats::default();
        match establish(
            connector,
            &endpoint,
            max_attempts,
            retry_delay,
            &mut stats,
            &*logger,
        ) {
            Ok(session) => Ok(Self {
                connector,
                endpoint,
                max_attempts,
                retry_delay,
                session,
                stats,
                logger,
            }),
            Err(e) => Err((e, stats)),
        }
    }

    /// Replace the session after a transfer failure, pausing `retry_delay`
    /// first. Counters carry over; on failure the previous session is kept.
    pub fn reconnect(&mut self) -> Result<(), MirrorError> {
        if !self.retry_delay.is_zero() {
            std::thread::sleep(self.retry_delay);
        }
        let session = establish(
            self.connector,
            &self.endpoint,
            self.max_attempts,
            self.retry_delay,
            &mut self.stats,
            &*self.logger,
        )?;
        self.session = session;
        Ok(())
    }

    pub fn session(&self) -> &C::Session {
        &self.session
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut SyncStats {
        &mut self.stats
    }

    pub fn into_stats(self) -> SyncStats {
        self.stats
    }
}

fn establish<C: Connector>(
    connector: &C,
    endpoint: &Endpoint,
    max_attempts: u32,
    retry_delay: Duration,
    stats: &mut SyncStats,
    logger: &dyn Logger,
) -> Result<C::Session, MirrorError> {
    let attempts = max_attempts.max(1);
    let mut last = String::new();
    for attempt in 1..=attempts {
        match connector.connect(endpoint) {
            Ok(session) => {
                logger.connected(&endpoint.display_url(), attempt);
                return Ok(session);
            }
            Err(e) => {
                stats.connection_incidents += 1;
                last = e.to_string();
                logger.incident(
                    "connect",
                    &endpoint.display_url(),
                    &format!("attempt {}/{}: {}", attempt, attempts, e),
                );
                if attempt < attempts && !retry_delay.is_zero() {
                    std::thread::sleep(retry_delay);
                }
            }
        }
    }
    Err(MirrorError::ConnectionFailed {
        protocol: endpoint.protocol.to_string(),
        host: endpoint.server.clone(),
        username: endpoint.username.clone(),
        attempts,
        last,
    })
}
