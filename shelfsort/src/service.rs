//! ShelfService: state shared by every connection.
//!
//! This service owns:
//! - The collaborators handed to each new session (storage, oracle, exporter)
//! - A registry of open sessions for health reporting
//! - Shutdown coordination (the `/shutdown` endpoint and open connections)
//!
//! Session state itself is never shared; each connection owns its `Session`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::export::CsvEncoder;
use crate::oracle::{HttpOracle, OracleError};
use crate::session::{Collaborators, Outbox, Session, SessionId};
use crate::storage::{LocalStorage, Storage};
use crate::version::VersionInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    Ready,
    /// Shutdown requested; open connections are being closed.
    ShuttingDown,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub connected_at: DateTime<Utc>,
}

/// Snapshot of service health for transports to query.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub state: Health,
    pub sessions: usize,
    pub version: VersionInfo,
}

pub struct ShelfService {
    collaborators: Collaborators,
    sessions: DashMap<SessionId, SessionInfo>,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    connections: CancellationToken,

    version: VersionInfo,
}

impl ShelfService {
    pub fn new(collaborators: Collaborators) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            collaborators,
            sessions: DashMap::new(),
            shutdown_tx,
            shutdown_rx,
            connections: CancellationToken::new(),
            version: VersionInfo::new(),
        }
    }

    /// Wire up the production collaborators: local disk storage, the HTTP
    /// prediction service and CSV export.
    pub fn from_config(config: &Config) -> Result<Self, OracleError> {
        let oracle = HttpOracle::new(config.oracle())?;
        let version = VersionInfo::new().with_prediction_service(oracle.url().to_string());

        let collaborators = Collaborators {
            storage: Arc::new(LocalStorage::new(&config.upload_dir)),
            oracle: Arc::new(oracle),
            exporter: Arc::new(CsvEncoder),
            prediction_concurrency: config.prediction_concurrency,
        };

        Ok(Self::new(collaborators).with_version(version))
    }

    pub fn with_version(mut self, version: VersionInfo) -> Self {
        self.version = version;
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.collaborators.storage
    }

    /// Create a session for a new connection and register it.
    ///
    /// The registration lasts as long as the returned guard.
    pub fn open_session(
        self: &Arc<Self>,
        outbox: mpsc::Sender<crate::protocol::OutboundMessage>,
    ) -> (Session, SessionGuard) {
        let id = SessionId::new();
        self.sessions.insert(
            id,
            SessionInfo {
                id,
                connected_at: Utc::now(),
            },
        );
        tracing::info!(session = %id, active = self.sessions.len(), "Session opened");

        let session = Session::new(id, self.collaborators.clone(), Outbox::new(outbox));
        let guard = SessionGuard {
            id,
            service: Arc::clone(self),
        };
        (session, guard)
    }

    pub fn session_info(&self, id: &SessionId) -> Option<SessionInfo> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn close_session(&self, id: &SessionId) {
        if let Some((_, info)) = self.sessions.remove(id) {
            let duration = Utc::now() - info.connected_at;
            tracing::info!(
                session = %id,
                duration_ms = duration.num_milliseconds(),
                active = self.sessions.len(),
                "Session closed"
            );
        }
    }

    pub fn health(&self) -> HealthSnapshot {
        let state = if *self.shutdown_rx.borrow() {
            Health::ShuttingDown
        } else {
            Health::Ready
        };
        HealthSnapshot {
            state,
            sessions: self.active_sessions(),
            version: self.version.clone(),
        }
    }

    /// Token cancelled when the server closes open connections.
    pub fn connection_token(&self) -> CancellationToken {
        self.connections.child_token()
    }

    pub fn close_connections(&self) {
        self.connections.cancel();
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }
}

/// Removes a session from the registry when its connection ends.
pub struct SessionGuard {
    id: SessionId,
    service: Arc<ShelfService>,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.service.close_session(&self.id);
    }
}
