//! Runtime configuration for the synchronizer and the remote store.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_AUTO_SYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Tuning for the synchronizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Upper bound for any single remote call; a timeout counts as a network failure
    pub request_timeout: Duration,
    /// Periodic flush interval while online (default: 60 seconds)
    pub auto_sync_interval: Option<Duration>,
    /// Cap on local storage usage in bytes (`None` means unbounded)
    pub local_quota_bytes: Option<u64>,
    /// Maximum number of journal entries kept per owner
    pub history_limit: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            auto_sync_interval: Some(Duration::from_secs(DEFAULT_AUTO_SYNC_INTERVAL_SECS)),
            local_quota_bytes: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl SyncSettings {
    /// Set the per-request timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the periodic flush interval
    #[must_use]
    pub const fn with_auto_sync_interval(mut self, interval: Duration) -> Self {
        self.auto_sync_interval = Some(interval);
        self
    }

    /// Flush only on reconnect or on demand
    #[must_use]
    pub const fn without_auto_sync(mut self) -> Self {
        self.auto_sync_interval = None;
        self
    }

    /// Set the local storage cap
    #[must_use]
    pub const fn with_local_quota(mut self, bytes: u64) -> Self {
        self.local_quota_bytes = Some(bytes);
        self
    }

    /// Set the journal length
    #[must_use]
    pub const fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}

/// Connection details for the Supabase backend.
///
/// The anon key is a public value; the access token is the signed-in user's
/// JWT and is redacted from debug output.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    pub supabase_url: String,
    pub anon_key: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("supabase_url", &self.supabase_url)
            .field("anon_key", &self.anon_key)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl RemoteConfig {
    /// Build a validated config, trimming values and the URL's trailing slash.
    pub fn new(
        supabase_url: impl Into<String>,
        anon_key: impl Into<String>,
        access_token: Option<String>,
    ) -> Result<Self> {
        let supabase_url = normalize_text_option(Some(supabase_url.into()))
            .ok_or_else(|| Error::Config("Supabase URL must not be empty".to_string()))?;
        if !is_http_url(&supabase_url) {
            return Err(Error::Config(
                "Supabase URL must include http:// or https://".to_string(),
            ));
        }
        let anon_key = normalize_text_option(Some(anon_key.into()))
            .ok_or_else(|| Error::Config("Supabase anon key must not be empty".to_string()))?;

        Ok(Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            anon_key,
            access_token: normalize_text_option(access_token),
        })
    }

    /// PostgREST base URL
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }
}
