//! One-stop wiring of store, guard, applier and session.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Notify};

use crate::applier::ChangeApplier;
use crate::config::{SessionConfig, TransportConfig};
use crate::error::Result;
use crate::events::{EventBus, SyncEvent};
use crate::guard::VersionGuard;
use crate::models::{Entity, EntityKind, Fields, Snapshot};
use crate::recorder::{Actor, ChangeRecorder};
use crate::session::SyncSession;
use crate::state::SessionStatus;
use crate::store::LocalStore;
use crate::transport::{ConnectParams, Transport};

/// The surface UI handlers call: version-checked mutations, connection
/// control and change notifications.
pub struct SyncEngine {
    store: LocalStore,
    actor: Actor,
    guard: VersionGuard,
    events: EventBus,
    session: SyncSession,
}

impl SyncEngine {
    /// Wire an engine around `store`, spawning the session task.
    pub fn new(
        store: LocalStore,
        transport: Box<dyn Transport>,
        config: SessionConfig,
    ) -> Result<Self> {
        let actor = Actor::default();
        let wake = Arc::new(Notify::new());
        let events = EventBus::new();

        let recorder = ChangeRecorder::new(actor.clone(), wake.clone());
        let guard = VersionGuard::new(store.clone(), recorder);
        let applier = ChangeApplier::new(store.clone(), events.clone());
        let session = SyncSession::start(store.clone(), applier, transport, config, wake)?;

        Ok(Self {
            store,
            actor,
            guard,
            events,
            session,
        })
    }

    /// Open the database at `db_path` and build the configured transport.
    pub async fn open(
        db_path: impl Into<PathBuf>,
        transport: &TransportConfig,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        let transport = transport.build()?;
        let store = LocalStore::open_path(db_path).await?;
        Self::new(store, transport, config)
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn guard(&self) -> &VersionGuard {
        &self.guard
    }

    /// Set the user recorded as `createdBy`/`updatedBy` without connecting.
    pub fn set_user(&self, user_id: Option<String>) {
        self.actor.set(user_id);
    }

    pub async fn create_project(&self, data: Fields) -> Result<Entity> {
        self.guard.create_project(data).await
    }

    pub async fn update_project(&self, id: &str, patch: Fields, version: i64) -> Result<Entity> {
        self.guard.update_project(id, patch, version).await
    }

    pub async fn delete_project(&self, id: &str, version: i64) -> Result<()> {
        self.guard.delete_project(id, version).await
    }

    pub async fn create_company(&self, data: Fields) -> Result<Entity> {
        self.guard.create_company(data).await
    }

    pub async fn update_company(&self, id: &str, patch: Fields, version: i64) -> Result<Entity> {
        self.guard.update_company(id, patch, version).await
    }

    pub async fn delete_company(&self, id: &str, version: i64) -> Result<()> {
        self.guard.delete_company(id, version).await
    }

    pub async fn get(&self, kind: EntityKind, id: &str) -> Result<Entity> {
        self.guard.get(kind, id).await
    }

    pub async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        self.guard.list(kind).await
    }

    /// Connect as `user_id`, who also becomes the acting user for local writes.
    pub async fn connect(&self, user_id: &str, token: &str) -> Result<()> {
        self.actor.set(Some(user_id.to_string()));
        self.session
            .connect(ConnectParams::new(user_id, token))
            .await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.session.disconnect().await
    }

    pub async fn sync_now(&self) -> Result<usize> {
        self.session.sync_now().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.session.subscribe_status()
    }

    pub async fn export_snapshot(&self) -> Result<Snapshot> {
        self.store.export_snapshot().await
    }

    pub async fn import_snapshot(&self, snapshot: &Snapshot) -> Result<usize> {
        self.guard.import_snapshot(snapshot).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.session.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::{ChangeType, SYSTEM_ACTOR};
    use crate::state::SessionState;
    use crate::transport::{MemoryTransport, WireMessage};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn config() -> SessionConfig {
        SessionConfig::default()
            .with_sync_interval(Duration::from_secs(3600))
            .with_reconnect_delays(Duration::from_millis(10), Duration::from_millis(20))
            .with_heartbeat(None, Duration::from_secs(60))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_first_round_trip() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let (transport, peer) = MemoryTransport::pair();
        let engine = SyncEngine::new(store, Box::new(transport), config()).unwrap();

        let offline = engine
            .create_company(fields(json!({"id": "C1", "name": "Acme"})))
            .await
            .unwrap();
        assert_eq!(offline.created_by, SYSTEM_ACTOR);

        engine.connect("alice", "token").await.unwrap();
        assert_eq!(engine.status().state, SessionState::Connected);
        assert_eq!(peer.last_params().unwrap().user_id, "alice");

        let updated = engine
            .update_company("C1", fields(json!({"name": "Acme Ltd"})), 1)
            .await
            .unwrap();
        assert_eq!(updated.updated_by, "alice");
        assert_eq!(updated.created_by, SYSTEM_ACTOR);

        let pushed = peer
            .wait_for(Duration::from_secs(2), |message| {
                matches!(message, WireMessage::DataChange { change } if change.change_type == ChangeType::Update)
            })
            .await;
        assert!(pushed.is_some());

        engine.disconnect().await.unwrap();
        assert_eq!(engine.status().state, SessionState::Disconnected);
        engine.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_change_is_announced() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let (transport, peer) = MemoryTransport::pair();
        let engine = SyncEngine::new(store, Box::new(transport), config()).unwrap();
        let mut events = engine.subscribe();

        engine.connect("alice", "token").await.unwrap();
        engine
            .create_company(fields(json!({"id": "C1", "name": "Acme"})))
            .await
            .unwrap();

        let remote = crate::models::ChangeRecord {
            id: "remote-1".to_string(),
            change_type: ChangeType::Delete,
            entity: EntityKind::Company,
            entity_id: "C1".to_string(),
            data: None,
            timestamp: 5,
            user_id: "bob".to_string(),
            status: crate::models::ChangeStatus::Pending,
        };
        assert!(peer.inject(WireMessage::DataChange { change: remote }));

        let message = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let SyncEvent::RemoteChange(notice) = events.recv().await.unwrap() {
                    return notice.message();
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(message, "bob deleted company: C1");
        assert!(engine.get(EntityKind::Company, "C1").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_export_then_import_into_fresh_store() {
        let source = SyncEngine::new(
            LocalStore::open_in_memory().await.unwrap(),
            Box::new(MemoryTransport::pair().0),
            config(),
        )
        .unwrap();
        source
            .create_company(fields(json!({"id": "C1", "name": "Acme"})))
            .await
            .unwrap();
        source
            .create_project(fields(json!({"id": "P1", "companyId": "C1"})))
            .await
            .unwrap();
        let snapshot = source.export_snapshot().await.unwrap();

        let target = SyncEngine::new(
            LocalStore::open_in_memory().await.unwrap(),
            Box::new(MemoryTransport::pair().0),
            config(),
        )
        .unwrap();
        assert_eq!(target.import_snapshot(&snapshot).await.unwrap(), 2);
        assert_eq!(target.list(EntityKind::Project).await.unwrap(), snapshot.projects);
        assert_eq!(target.store().changes_since(0).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_new_rejects_zero_sync_interval() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let result = SyncEngine::new(
            store,
            Box::new(MemoryTransport::pair().0),
            config().with_sync_interval(Duration::ZERO),
        );
        assert!(matches!(result, Err(crate::error::Error::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_rejects_bad_transport_config() {
        let tmp = tempfile::tempdir().unwrap();
        let result = SyncEngine::open(
            tmp.path().join("pmsync.db"),
            &TransportConfig::Websocket {
                url: "not a url".to_string(),
            },
            SessionConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(crate::error::Error::InvalidInput(_))));
    }
}
