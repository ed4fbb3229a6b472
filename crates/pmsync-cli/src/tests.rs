use std::path::PathBuf;
use std::time::Duration;

use pmsync_core::transport::MemoryTransport;
use pmsync_core::{
    ChangeNotice, ChangeStatus, ChangeType, EntityKind, Error, LocalStore, SessionConfig,
    SyncEngine, SyncEvent, TransportConfig,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::commands::changes::list_changes;
use crate::commands::common::{
    format_timestamp, open_guard, parse_assignment, parse_fields, truncate,
};
use crate::commands::config::{config_init, describe_profile, ProfileUpdate};
use crate::commands::snapshot::{run_export, run_import};
use crate::commands::status::collect_status;
use crate::commands::sync::{collect_events, resolve_token, sync_with_engine, SyncSummary};
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;
use crate::resolve_db_path;

fn alice() -> CliProfile {
    CliProfile {
        user_id: Some("alice".to_string()),
        ..CliProfile::default()
    }
}

#[test]
fn parse_assignment_parses_json_values_and_keeps_plain_text() {
    assert_eq!(
        parse_assignment("name=Acme Ltd").unwrap(),
        ("name".to_string(), Value::String("Acme Ltd".to_string()))
    );
    assert_eq!(
        parse_assignment("budget=1200").unwrap(),
        ("budget".to_string(), json!(1200))
    );
    assert_eq!(
        parse_assignment("tags=[\"a\",\"b\"]").unwrap(),
        ("tags".to_string(), json!(["a", "b"]))
    );
    assert_eq!(
        parse_assignment("note=").unwrap(),
        ("note".to_string(), Value::String(String::new()))
    );
}

#[test]
fn parse_assignment_rejects_missing_key() {
    assert!(matches!(
        parse_assignment("no-equals-sign"),
        Err(CliError::InvalidField(_))
    ));
    assert!(matches!(
        parse_assignment(" =value"),
        Err(CliError::InvalidField(_))
    ));
}

#[test]
fn parse_fields_applies_assignments_over_json() {
    let fields = parse_fields(
        Some(r#"{"name": "Acme", "city": "Oslo"}"#),
        &["name=Acme Ltd".to_string()],
    )
    .unwrap();

    assert_eq!(fields.get("name"), Some(&json!("Acme Ltd")));
    assert_eq!(fields.get("city"), Some(&json!("Oslo")));
}

#[test]
fn parse_fields_rejects_non_object_json() {
    assert!(matches!(
        parse_fields(Some("[1, 2]"), &[]),
        Err(CliError::InvalidField(_))
    ));
}

#[test]
fn truncate_adds_ellipsis() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a rather long company name", 10), "a rathe...");
}

#[test]
fn format_timestamp_renders_rfc3339() {
    assert_eq!(format_timestamp(0), "1970-01-01T00:00:00+00:00");
}

#[test]
fn resolve_db_path_prefers_explicit_flag() {
    let explicit = PathBuf::from("/tmp/explicit.db");
    assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
}

#[test]
fn resolve_token_prefers_explicit_value() {
    assert_eq!(resolve_token(Some(" secret ".to_string())), "secret");
}

#[tokio::test(flavor = "multi_thread")]
async fn local_writes_are_logged_as_pending_changes() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("pmsync.db");

    {
        let guard = open_guard(&db_path, &alice()).await.unwrap();
        guard
            .create(
                EntityKind::Company,
                parse_fields(None, &["id=C1".to_string(), "name=Acme".to_string()]).unwrap(),
            )
            .await
            .unwrap();
        guard
            .update(
                EntityKind::Company,
                "C1",
                parse_fields(None, &["name=Acme Ltd".to_string()]).unwrap(),
                1,
            )
            .await
            .unwrap();
    }

    let pending = list_changes(10, true, &db_path).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].change_type, ChangeType::Create);
    assert_eq!(pending[1].change_type, ChangeType::Update);
    assert!(pending.iter().all(|change| change.user_id == "alice"));
    assert!(pending
        .iter()
        .all(|change| change.status == ChangeStatus::Pending));

    let limited = list_changes(1, true, &db_path).await.unwrap();
    assert_eq!(limited.len(), 1);

    let report = collect_status(&db_path).await.unwrap();
    assert_eq!(report.companies, 1);
    assert_eq!(report.projects, 0);
    assert_eq!(report.pending_changes, 2);
    assert_eq!(report.synced_changes, 0);
    assert_eq!(report.watermark.last_sync_time, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn export_then_import_restores_records() {
    let tmp = tempfile::tempdir().unwrap();
    let source_db = tmp.path().join("source.db");
    let target_db = tmp.path().join("target.db");
    let snapshot_path = tmp.path().join("snapshot.json");

    {
        let guard = open_guard(&source_db, &alice()).await.unwrap();
        guard
            .create_company(json!({"id": "C1", "name": "Acme"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        guard
            .create_project(
                json!({"id": "P1", "name": "Launch", "companyId": "C1"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();
    }

    run_export(Some(&snapshot_path), &source_db).await.unwrap();
    let exported = std::fs::read_to_string(&snapshot_path).unwrap();
    assert!(exported.contains("\"exportTime\""));
    assert!(exported.contains("\"companyId\": \"C1\""));

    run_import(&snapshot_path, None, &target_db).await.unwrap();

    let report = collect_status(&target_db).await.unwrap();
    assert_eq!(report.projects, 1);
    assert_eq!(report.companies, 1);
    assert_eq!(report.pending_changes, 2);
}

#[test]
fn config_init_sets_websocket_profile_and_activates_it() {
    let mut config = CliProfilesConfig::default();
    let name = config_init(
        &mut config,
        Some("work"),
        ProfileUpdate {
            user: Some("alice".to_string()),
            websocket_url: Some("wss://sync.example.com/ws".to_string()),
            ..ProfileUpdate::default()
        },
        false,
    )
    .unwrap();

    assert_eq!(name, "work");
    assert_eq!(config.active_profile.as_deref(), Some("work"));
    let profile = config.profile("work").unwrap();
    assert_eq!(profile.user_id().as_deref(), Some("alice"));
    assert_eq!(
        profile.transport_config(),
        Some(TransportConfig::Websocket {
            url: "wss://sync.example.com/ws".to_string()
        })
    );
}

#[test]
fn config_init_switching_to_push_clears_websocket_url() {
    let mut config = CliProfilesConfig::default();
    config_init(
        &mut config,
        Some("work"),
        ProfileUpdate {
            websocket_url: Some("ws://localhost:8080".to_string()),
            ..ProfileUpdate::default()
        },
        false,
    )
    .unwrap();
    config_init(
        &mut config,
        Some("work"),
        ProfileUpdate {
            events_url: Some("https://sync.example.com/events".to_string()),
            api_base_url: Some("https://sync.example.com/api".to_string()),
            ..ProfileUpdate::default()
        },
        false,
    )
    .unwrap();

    let profile = config.profile("work").unwrap();
    assert_eq!(profile.websocket_url, None);
    assert_eq!(
        profile.transport_config(),
        Some(TransportConfig::Push {
            events_url: "https://sync.example.com/events".to_string(),
            api_base_url: "https://sync.example.com/api".to_string(),
        })
    );
}

#[test]
fn config_init_rejects_wrong_url_scheme() {
    let mut config = CliProfilesConfig::default();
    let error = config_init(
        &mut config,
        Some("work"),
        ProfileUpdate {
            websocket_url: Some("https://sync.example.com".to_string()),
            ..ProfileUpdate::default()
        },
        false,
    )
    .unwrap_err();
    assert!(matches!(error, CliError::Config(_)));
    assert!(config.profiles.is_empty());
}

#[test]
fn config_init_no_activate_keeps_current_profile() {
    let mut config = CliProfilesConfig {
        active_profile: Some("home".to_string()),
        ..CliProfilesConfig::default()
    };
    config_init(
        &mut config,
        Some("work"),
        ProfileUpdate {
            user: Some("bob".to_string()),
            ..ProfileUpdate::default()
        },
        true,
    )
    .unwrap();

    assert_eq!(config.active_profile.as_deref(), Some("home"));
    assert!(config.profile("work").is_some());
}

#[test]
fn describe_profile_reports_missing_endpoint() {
    let lines = describe_profile(&CliProfile::default());
    assert!(lines[0].contains("(not set)"));
    assert!(lines[1].contains("(not configured)"));
}

#[tokio::test(flavor = "multi_thread")]
async fn collect_events_counts_pushed_and_remote_changes() {
    let (sender, mut receiver) = broadcast::channel(16);
    sender
        .send(SyncEvent::ChangesPushed { changes: 2 })
        .unwrap();
    sender
        .send(SyncEvent::RemoteChange(ChangeNotice {
            kind: EntityKind::Company,
            change_type: ChangeType::Delete,
            entity_id: "C1".to_string(),
            label: "C1".to_string(),
            user_id: "bob".to_string(),
        }))
        .unwrap();
    sender
        .send(SyncEvent::BatchApplied {
            changes: 1,
            watermark: 10,
        })
        .unwrap();

    let summary = collect_events(&mut receiver, Duration::from_millis(50)).await;
    assert_eq!(
        summary,
        SyncSummary {
            pushed: 2,
            applied: 1
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn collect_events_stops_when_offline() {
    let (sender, mut receiver) = broadcast::channel(16);
    sender.send(SyncEvent::Offline { attempts: 5 }).unwrap();
    sender
        .send(SyncEvent::ChangesPushed { changes: 3 })
        .unwrap();

    let summary = collect_events(&mut receiver, Duration::from_secs(5)).await;
    assert_eq!(summary, SyncSummary::default());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_sync_still_shuts_the_engine_down() {
    let (transport, peer) = MemoryTransport::pair();
    let store = LocalStore::open_in_memory().await.unwrap();
    let engine = SyncEngine::new(store, Box::new(transport), SessionConfig::default()).unwrap();
    peer.fail_next_sends(u32::MAX);

    let result = sync_with_engine(&engine, "alice", "token", Duration::from_millis(10)).await;
    assert!(result.is_err());

    assert!(!peer.is_connected());
    assert!(matches!(engine.sync_now().await, Err(Error::SessionClosed)));
}
