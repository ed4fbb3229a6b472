use std::env;
use std::path::Path;
use std::time::Duration;

use pmsync_core::util::normalize_text_option;
use pmsync_core::{ChangeStatus, SyncEngine, SyncEvent};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{timeout_at, Instant};

use crate::commands::common::load_profile;
use crate::error::CliError;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub pushed: usize,
    pub applied: usize,
}

pub async fn run_sync(
    token: Option<String>,
    wait_secs: u64,
    profile_name: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let (name, profile) = load_profile(profile_name)?;
    let Some(transport) = profile.transport_config() else {
        return Err(CliError::SyncNotConfigured);
    };
    let Some(user_id) = profile.user_id() else {
        return Err(CliError::Config(format!(
            "Profile '{name}' has no user id. Run `pmsync config init --user <id>`."
        )));
    };
    let token = resolve_token(token);

    let engine = SyncEngine::open(db_path, &transport, profile.session.clone()).await?;

    tracing::info!("Syncing profile '{name}' via {}", transport.endpoint());
    let window = Duration::from_secs(wait_secs);
    let summary = sync_with_engine(&engine, &user_id, &token, window).await?;
    let pending = engine.store().count_changes(ChangeStatus::Pending).await?;

    println!(
        "Sync completed: {} pushed, {} applied, {} pending",
        summary.pushed, summary.applied, pending
    );
    Ok(())
}

/// Connect, run one cycle and listen for `window`. The session is closed
/// afterwards whether or not the exchange succeeded.
pub async fn sync_with_engine(
    engine: &SyncEngine,
    user_id: &str,
    token: &str,
    window: Duration,
) -> Result<SyncSummary, CliError> {
    let mut events = engine.subscribe();
    let outcome = exchange(engine, &mut events, user_id, token, window).await;

    let disconnected = engine.disconnect().await;
    let stopped = engine.shutdown().await;

    let summary = outcome?;
    disconnected?;
    stopped?;
    Ok(summary)
}

async fn exchange(
    engine: &SyncEngine,
    events: &mut broadcast::Receiver<SyncEvent>,
    user_id: &str,
    token: &str,
    window: Duration,
) -> Result<SyncSummary, CliError> {
    engine.connect(user_id, token).await?;
    engine.sync_now().await?;
    Ok(collect_events(events, window).await)
}

/// Explicit flag first, then `PMSYNC_TOKEN`, else an empty credential.
pub fn resolve_token(explicit: Option<String>) -> String {
    normalize_text_option(explicit)
        .or_else(|| normalize_text_option(env::var("PMSYNC_TOKEN").ok()))
        .unwrap_or_default()
}

/// Drain session events until `window` elapses, printing remote change notices.
pub async fn collect_events(
    events: &mut broadcast::Receiver<SyncEvent>,
    window: Duration,
) -> SyncSummary {
    let deadline = Instant::now() + window;
    let mut summary = SyncSummary::default();

    loop {
        let event = match timeout_at(deadline, events.recv()).await {
            Err(_) | Ok(Err(RecvError::Closed)) => break,
            Ok(Err(RecvError::Lagged(skipped))) => {
                tracing::warn!("Missed {skipped} sync event(s)");
                continue;
            }
            Ok(Ok(event)) => event,
        };

        match event {
            SyncEvent::RemoteChange(notice) => {
                summary.applied += 1;
                println!("{}", notice.message());
            }
            SyncEvent::BatchApplied { changes, watermark } => {
                tracing::debug!("Applied batch of {changes}, watermark {watermark}");
            }
            SyncEvent::ChangesPushed { changes } => summary.pushed += changes,
            SyncEvent::StateChanged(state) => tracing::debug!("Session {state}"),
            SyncEvent::Offline { attempts } => {
                eprintln!("Peer unreachable after {attempts} attempt(s)");
                break;
            }
        }
    }

    summary
}
