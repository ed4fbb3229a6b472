//! pmsync-core - Offline-first sync engine for project and company records
//!
//! This crate holds the local store, the append-only change log, the
//! version-checked write path and the sync session that exchanges changes
//! with collaborators over a WebSocket or server-push channel.

pub mod applier;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod guard;
pub mod models;
pub mod recorder;
pub mod session;
pub mod state;
pub mod store;
pub mod transport;
pub mod util;

pub use applier::ChangeApplier;
pub use config::{SessionConfig, TransportConfig};
pub use engine::SyncEngine;
pub use error::{Error, Result};
pub use events::{ChangeNotice, EventBus, SyncEvent};
pub use guard::VersionGuard;
pub use models::{
    ChangeRecord, ChangeStatus, ChangeType, Entity, EntityKind, Fields, Snapshot, SyncWatermark,
};
pub use recorder::{Actor, ChangeRecorder};
pub use session::SyncSession;
pub use state::{SessionState, SessionStatus};
pub use store::LocalStore;
pub use transport::{ConnectParams, Transport, WireMessage};
