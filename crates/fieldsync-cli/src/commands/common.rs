use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fieldsync_core::db::{Database, LibSqlLocalStore, LocalStore};
use fieldsync_core::models::{FarmId, FieldCrop, HistoryEntry};
use fieldsync_core::remote::{RemoteStore, SupabaseRemoteStore};
use fieldsync_core::sync::{probe, Connectivity, Notice, NoticeLevel, Notifier};
use fieldsync_core::{
    Field, FlushReport, FlushStatus, OwnerId, SyncSettings, Synchronizer, WriteOutcome,
};

use crate::config_profiles::{CliProfilesConfig, EnvOverrides, ResolvedProfile};
use crate::error::CliError;

const DATA_DIR_NAME: &str = "fieldsync";
const DB_FILE_NAME: &str = "fieldsync.db";
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// A synchronizer bound to one user, plus the connectivity source feeding it
pub struct Session<R, L> {
    pub sync: Synchronizer<R, L>,
    pub owner: OwnerId,
    pub default_farm: Option<FarmId>,
    pub connectivity: Connectivity,
    /// Endpoint probed to decide whether the backend is reachable; `None` keeps the session offline
    pub probe_url: Option<String>,
}

pub type LiveSession = Session<SupabaseRemoteStore, LibSqlLocalStore>;

/// What `open_session` needs besides the stored profiles
pub struct SessionOptions {
    pub db_path: Option<PathBuf>,
    pub profile: Option<String>,
    pub offline: bool,
    pub settings: SyncSettings,
}

impl<R: RemoteStore, L: LocalStore> Session<R, L> {
    pub fn new(
        remote: R,
        store: L,
        owner: OwnerId,
        online: bool,
        settings: SyncSettings,
    ) -> Self {
        let connectivity = Connectivity::new(online);
        let sync = Synchronizer::new(
            remote,
            store,
            connectivity.signal(),
            Arc::new(ConsoleNotifier),
            settings,
        );
        Self {
            sync,
            owner,
            default_farm: None,
            connectivity,
            probe_url: None,
        }
    }

    #[must_use]
    pub fn with_default_farm(mut self, farm: Option<FarmId>) -> Self {
        self.default_farm = farm;
        self
    }

    /// Probe the backend and publish the result. Sessions without a probe URL stay as they are.
    pub async fn refresh_connectivity(&self) -> bool {
        if let Some(url) = &self.probe_url {
            self.connectivity.set_online(probe(url, PROBE_TIMEOUT).await);
        }
        self.connectivity.is_online()
    }
}

pub async fn open_session(options: SessionOptions) -> Result<LiveSession, CliError> {
    let config = CliProfilesConfig::load()?;
    let profile = config.resolve(options.profile.as_deref(), &EnvOverrides::from_env())?;
    let db_path = resolve_db_path(options.db_path)?;
    open_session_with(&profile, &db_path, options.offline, options.settings).await
}

pub async fn open_session_with(
    profile: &ResolvedProfile,
    db_path: &Path,
    offline: bool,
    settings: SyncSettings,
) -> Result<LiveSession, CliError> {
    let database = Database::open(db_path).await?;
    let store = LibSqlLocalStore::new(database).with_quota(settings.local_quota_bytes);
    let remote = SupabaseRemoteStore::new(&profile.remote)?;

    let mut session = Session::new(remote, store, profile.owner.clone(), false, settings)
        .with_default_farm(profile.default_farm.clone());
    if !offline {
        session.probe_url = Some(profile.remote.rest_url());
        session.refresh_connectivity().await;
    }
    tracing::debug!(
        profile = %profile.name,
        online = session.connectivity.is_online(),
        "Session opened"
    );
    Ok(session)
}

/// Prints notices to stderr so they never mix with JSON output
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        eprintln!("{}", format_notice(&notice));
    }
}

pub fn format_notice(notice: &Notice) -> String {
    let marker = match notice.level {
        NoticeLevel::Success => "ok",
        NoticeLevel::Info => "info",
        NoticeLevel::Warning => "warn",
        NoticeLevel::Error => "error",
    };
    notice.description.as_deref().map_or_else(
        || format!("[{marker}] {}", notice.title),
        |description| format!("[{marker}] {}: {description}", notice.title),
    )
}

/// Turn a write outcome into the value or a CLI error, printing why a change was queued.
pub fn settle<T>(outcome: WriteOutcome<T>) -> Result<T, CliError> {
    match outcome {
        WriteOutcome::Synced(value) => Ok(value),
        WriteOutcome::QueuedLocally { value, reason } => {
            eprintln!("Saved on this device ({reason}). It will sync when the backend is reachable.");
            Ok(value)
        }
        WriteOutcome::Failed(reason) => Err(CliError::WriteFailed(reason)),
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Remote id when known, otherwise the local id
pub fn field_ref(field: &Field) -> String {
    field
        .id
        .as_ref()
        .map_or_else(|| field.local_id.to_string(), ToString::to_string)
}

pub const fn field_status(field: &Field) -> &'static str {
    if field.is_deleted {
        "deleting"
    } else if field.is_synced {
        "synced"
    } else {
        "pending"
    }
}

pub fn format_size(field: &Field) -> String {
    if field.details.size > 0.0 {
        format!("{} {}", field.details.size, field.details.size_unit)
    } else {
        "-".to_string()
    }
}

pub fn format_field_line(field: &Field, now_ms: i64) -> String {
    format!(
        "{:<36}  {:<7}  {:<24}  {:<14}  {}",
        field_ref(field),
        field_status(field),
        field.name(),
        format_size(field),
        format_relative_time(field.updated_at, now_ms)
    )
}

pub fn format_field_details(field: &Field, now_ms: i64) -> Vec<String> {
    let mut lines = vec![
        format!("Name:       {}", field.name()),
        format!("ID:         {}", field_ref(field)),
        format!("Local ID:   {}", field.local_id),
        format!("Status:     {}", field_status(field)),
        format!("Size:       {}", format_size(field)),
    ];
    if let Some(farm) = &field.farm_id {
        lines.push(format!("Farm:       {farm}"));
    }
    if let Some(soil) = &field.details.soil_type {
        lines.push(format!("Soil:       {soil}"));
    }
    if let Some(irrigation) = &field.details.irrigation_type {
        lines.push(format!("Irrigation: {irrigation}"));
    }
    if let Some(location) = &field.details.location_description {
        lines.push(format!("Location:   {location}"));
    }
    if let Some(boundary) = &field.details.boundary {
        lines.push(format!("Boundary:   {} points", boundary.coordinates.len()));
    }
    if !field.details.shared_with.is_empty() {
        lines.push(format!(
            "Shared:     {}",
            field.details.shared_with.join(", ")
        ));
    }
    lines.push(format!(
        "Updated:    {}",
        format_relative_time(field.updated_at, now_ms)
    ));
    lines
}

pub fn format_crop_line(crop: &FieldCrop) -> String {
    let name = crop.variety.as_deref().map_or_else(
        || crop.crop_name.clone(),
        |variety| format!("{} ({variety})", crop.crop_name),
    );
    let planted = crop
        .planting_date
        .map_or_else(|| "-".to_string(), |date| date.to_string());
    let harvest = crop
        .expected_harvest_date
        .map_or_else(|| "-".to_string(), |date| date.to_string());
    let state = if crop.is_synced { "synced" } else { "pending" };
    format!(
        "{:<28}  {:<8}  {:<7}  planted {planted}  harvest {harvest}",
        name, crop.status, state
    )
}

pub fn format_history_line(entry: &HistoryEntry) -> String {
    let local_id = entry
        .local_id
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    let detail = entry.detail.as_deref().unwrap_or_default();
    format!(
        "{}  {:<8}  {local_id}  {detail}",
        format_timestamp(entry.at),
        entry.kind
    )
    .trim_end()
    .to_string()
}

pub fn format_flush_report(report: &FlushReport) -> String {
    match report.status {
        FlushStatus::Offline => format!(
            "Offline. {} change(s) waiting to sync.",
            report.remaining
        ),
        FlushStatus::AlreadyRunning => "A sync is already running.".to_string(),
        FlushStatus::Completed if report.is_clean() && report.synced + report.removed == 0 => {
            "Everything is up to date.".to_string()
        }
        FlushStatus::Completed => format!(
            "Synced {}, removed {}, conflicts {}, failed {}. {} change(s) pending.",
            report.synced, report.removed, report.conflicts, report.failed, report.remaining
        ),
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn normalize_field_name(parts: &[String]) -> Result<String, CliError> {
    let joined = parts.join(" ");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyFieldName)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_field_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyFieldId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_user_identifier(user: &str) -> Result<String, CliError> {
    let trimmed = user.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyUserId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("FIELDSYNC_DB_PATH").map(PathBuf::from))
    {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join(DATA_DIR_NAME).join(DB_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}
