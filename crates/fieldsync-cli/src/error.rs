use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fieldsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No field name provided")]
    EmptyFieldName,
    #[error("Field ID cannot be empty")]
    EmptyFieldId,
    #[error("Crop name cannot be empty")]
    EmptyCropName,
    #[error("User ID cannot be empty")]
    EmptyUserId,
    #[error("Nothing to change. Pass at least one of --name, --size, --unit, --soil, --irrigation, --location")]
    NothingToEdit,
    #[error("Sync interval must be at least one second")]
    InvalidInterval,
    #[error("Change was not saved: {0}")]
    WriteFailed(String),
    #[error("{failed} change(s) failed to sync, {remaining} still pending")]
    SyncIncomplete { failed: usize, remaining: usize },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Profile '{0}' does not exist. Run `fieldsync config init --profile {0}`.")]
    UnknownProfile(String),
    #[error(
        "Profile '{profile}' is missing {missing}. Run `fieldsync config init` or set FIELDSYNC_SUPABASE_URL, FIELDSYNC_SUPABASE_ANON_KEY and FIELDSYNC_OWNER_ID."
    )]
    NotConfigured { profile: String, missing: String },
}
