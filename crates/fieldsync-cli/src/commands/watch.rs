use std::time::Duration;

use fieldsync_core::db::LocalStore;
use fieldsync_core::remote::RemoteStore;
use fieldsync_core::SyncSettings;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::commands::common::Session;
use crate::error::CliError;

const MAX_PROBE_INTERVAL: Duration = Duration::from_secs(15);

/// Settings for a long-running session that flushes every `interval_secs`.
pub fn watch_settings(interval_secs: u64) -> Result<SyncSettings, CliError> {
    if interval_secs == 0 {
        return Err(CliError::InvalidInterval);
    }
    Ok(SyncSettings::default().with_auto_sync_interval(Duration::from_secs(interval_secs)))
}

pub async fn run_watch<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
) -> Result<(), CliError> {
    let owner = session.owner.clone();
    let probe_every = session
        .sync
        .settings()
        .auto_sync_interval
        .map_or(MAX_PROBE_INTERVAL, |interval| interval.min(MAX_PROBE_INTERVAL));

    println!("Watching fields for {owner}. Press Ctrl-C to stop.");
    tokio::select! {
        () = session.sync.run_auto_sync(&owner) => {}
        () = track_connectivity(session, probe_every) => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Stopping watch");
        }
    }
    Ok(())
}

async fn track_connectivity<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        session.refresh_connectivity().await;
    }
}
