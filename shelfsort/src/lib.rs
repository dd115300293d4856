//! shelfsort: interactive product image classification over WebSocket.

mod version;

pub mod aggregate;
pub mod approval;
pub mod codec;
pub mod config;
pub mod export;
pub mod oracle;
pub mod policy;
pub mod protocol;
pub mod service;
pub mod session;
pub mod storage;
pub mod transport;

pub use aggregate::{ClassScores, PredictedClass, RankedPrediction, aggregate};
pub use approval::{ApprovalError, ApprovalQueue};
pub use codec::ProtocolError;
pub use config::{Config, ConfigError};
pub use export::{ApprovedAssignment, CsvEncoder, ExportEncoder, ExportError};
pub use oracle::{HttpOracle, HttpOracleConfig, Oracle, OracleError};
pub use policy::{Decision, ResolutionMode, resolve};
pub use protocol::{InboundMessage, OutboundMessage};
pub use service::{Health, HealthSnapshot, SessionGuard, ShelfService};
pub use session::{Collaborators, Session, SessionError, SessionId, SessionState};
pub use storage::{LocalStorage, Storage, StorageError};
pub use version::{SHELFSORT_VERSION, VersionInfo};
