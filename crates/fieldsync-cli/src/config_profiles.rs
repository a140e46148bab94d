//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use fieldsync_core::models::FarmId;
use fieldsync_core::{OwnerId, RemoteConfig};
use serde::{Deserialize, Serialize};

use crate::error::CliError;

const CONFIG_DIR_NAME: &str = "fieldsync";
const CONFIG_FILE_NAME: &str = "cli-config.json";
const DEFAULT_PROFILE_NAME: &str = "default";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub default_farm_id: Option<String>,
}

/// Values taken from `FIELDSYNC_*` environment variables, read once at startup
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub profile: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub access_token: Option<String>,
    pub owner_id: Option<String>,
}

impl std::fmt::Debug for EnvOverrides {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EnvOverrides")
            .field("profile", &self.profile)
            .field("supabase_url", &self.supabase_url)
            .field("supabase_anon_key", &self.supabase_anon_key)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("owner_id", &self.owner_id)
            .finish()
    }
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let read = |name: &str| normalize_text_option(env::var(name).ok());
        Self {
            profile: read("FIELDSYNC_PROFILE"),
            supabase_url: read("FIELDSYNC_SUPABASE_URL"),
            supabase_anon_key: read("FIELDSYNC_SUPABASE_ANON_KEY"),
            access_token: read("FIELDSYNC_ACCESS_TOKEN"),
            owner_id: read("FIELDSYNC_OWNER_ID"),
        }
    }

    const fn is_complete(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_anon_key.is_some() && self.owner_id.is_some()
    }
}

/// Everything a command needs to reach the backend as one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub name: String,
    pub remote: RemoteConfig,
    pub owner: OwnerId,
    pub default_farm: Option<FarmId>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI config directory".to_string()))
}

pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    fieldsync_core::util::normalize_text_option(value)
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn is_http_url(value: &str) -> bool {
    fieldsync_core::util::is_http_url(value)
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, CliError> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!(
                "Failed to read config at {}: {}",
                path.display(),
                error
            ))
        })?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            CliError::Config(format!(
                "Failed to parse config at {}: {}",
                path.display(),
                error
            ))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), CliError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                CliError::Config(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                ))
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(path, serialized).map_err(|error| {
            CliError::Config(format!(
                "Failed to write config at {}: {}",
                path.display(),
                error
            ))
        })
    }

    /// Explicit name, then `FIELDSYNC_PROFILE`, then the active profile, then `default`.
    pub fn resolve_profile_name(&self, explicit: Option<&str>, env: &EnvOverrides) -> String {
        if let Some(profile) = normalize_profile_name(explicit) {
            return profile;
        }
        if let Some(profile) = normalize_profile_name(env.profile.as_deref()) {
            return profile;
        }
        if let Some(profile) = normalize_profile_name(self.active_profile.as_deref()) {
            return profile;
        }
        DEFAULT_PROFILE_NAME.to_string()
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    /// Merge the named profile with environment overrides into a usable backend config.
    pub fn resolve(
        &self,
        explicit: Option<&str>,
        env: &EnvOverrides,
    ) -> Result<ResolvedProfile, CliError> {
        let name = self.resolve_profile_name(explicit, env);
        let profile = match self.profile(&name) {
            Some(profile) => profile.clone(),
            // A named profile must exist unless the environment supplies everything.
            None if explicit.is_some() && !env.is_complete() => {
                return Err(CliError::UnknownProfile(name));
            }
            None => CliProfile::default(),
        };

        let supabase_url = env.supabase_url.clone().or_else(|| profile.supabase_url());
        let anon_key = env
            .supabase_anon_key
            .clone()
            .or_else(|| profile.supabase_anon_key());
        let owner = env.owner_id.clone().or_else(|| profile.owner_id());

        let mut missing = Vec::new();
        if supabase_url.is_none() {
            missing.push("supabase_url");
        }
        if anon_key.is_none() {
            missing.push("supabase_anon_key");
        }
        if owner.is_none() {
            missing.push("owner_id");
        }
        let (Some(supabase_url), Some(anon_key), Some(owner)) = (supabase_url, anon_key, owner)
        else {
            return Err(CliError::NotConfigured {
                profile: name,
                missing: missing.join(", "),
            });
        };

        let remote = RemoteConfig::new(supabase_url, anon_key, env.access_token.clone())?;
        Ok(ResolvedProfile {
            name,
            remote,
            owner: OwnerId::new(owner),
            default_farm: profile.default_farm_id().map(FarmId::new),
        })
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    pub fn supabase_url(&self) -> Option<String> {
        normalize_text_option(self.supabase_url.clone())
    }

    pub fn supabase_anon_key(&self) -> Option<String> {
        normalize_text_option(self.supabase_anon_key.clone())
    }

    pub fn owner_id(&self) -> Option<String> {
        normalize_text_option(self.owner_id.clone())
    }

    pub fn default_farm_id(&self) -> Option<String> {
        normalize_text_option(self.default_farm_id.clone())
    }

    fn normalize(&mut self) {
        self.supabase_url = normalize_text_option(self.supabase_url.clone())
            .map(|url| url.trim_end_matches('/').to_string());
        self.supabase_anon_key = normalize_text_option(self.supabase_anon_key.clone());
        self.owner_id = normalize_text_option(self.owner_id.clone());
        self.default_farm_id = normalize_text_option(self.default_farm_id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn configured_profile() -> CliProfile {
        CliProfile {
            supabase_url: Some("https://project.supabase.co".to_string()),
            supabase_anon_key: Some("anon-key".to_string()),
            owner_id: Some("farmer-1".to_string()),
            default_farm_id: Some("farm-1".to_string()),
        }
    }

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_profile_name_rejects_empty() {
        assert_eq!(normalize_profile_name(None), None);
        assert_eq!(normalize_profile_name(Some(" ")), None);
    }

    #[test]
    fn config_roundtrip_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some(" default ".to_string()),
            profiles: BTreeMap::new(),
        };
        config.profiles.insert(
            "default".to_string(),
            CliProfile {
                supabase_url: Some(" https://project.supabase.co/ ".to_string()),
                supabase_anon_key: Some(" anon-key ".to_string()),
                owner_id: Some(" farmer-1 ".to_string()),
                default_farm_id: Some("   ".to_string()),
            },
        );

        config.save_to_path(&path).unwrap();
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.active_profile.as_deref(), Some("default"));
        let profile = loaded.profiles.get("default").unwrap();
        assert_eq!(
            profile.supabase_url.as_deref(),
            Some("https://project.supabase.co")
        );
        assert_eq!(profile.supabase_anon_key.as_deref(), Some("anon-key"));
        assert_eq!(profile.owner_id.as_deref(), Some("farmer-1"));
        assert_eq!(profile.default_farm_id, None);
    }

    #[test]
    fn missing_config_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliProfilesConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, CliProfilesConfig::default());
    }

    #[test]
    fn malformed_config_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        let error = CliProfilesConfig::load_from_path(&path).unwrap_err();
        assert!(matches!(error, CliError::Config(message) if message.contains("Failed to parse")));
    }

    #[test]
    fn resolve_profile_name_prefers_explicit_then_env_then_active() {
        let config = CliProfilesConfig {
            version: 1,
            active_profile: Some("work".to_string()),
            profiles: BTreeMap::new(),
        };
        let env = EnvOverrides {
            profile: Some("ci".to_string()),
            ..EnvOverrides::default()
        };
        assert_eq!(config.resolve_profile_name(Some("mobile"), &env), "mobile");
        assert_eq!(config.resolve_profile_name(None, &env), "ci");
        assert_eq!(
            config.resolve_profile_name(None, &EnvOverrides::default()),
            "work"
        );
        assert_eq!(
            CliProfilesConfig::default().resolve_profile_name(None, &EnvOverrides::default()),
            "default"
        );
    }

    #[test]
    fn resolve_merges_env_over_profile() {
        let mut config = CliProfilesConfig::default();
        config
            .profiles
            .insert("default".to_string(), configured_profile());
        let env = EnvOverrides {
            owner_id: Some("farmer-2".to_string()),
            access_token: Some("jwt".to_string()),
            ..EnvOverrides::default()
        };

        let resolved = config.resolve(None, &env).unwrap();
        assert_eq!(resolved.name, "default");
        assert_eq!(resolved.owner, OwnerId::from("farmer-2"));
        assert_eq!(resolved.default_farm, Some(FarmId::from("farm-1")));
        assert_eq!(resolved.remote.access_token.as_deref(), Some("jwt"));
        assert_eq!(
            resolved.remote.rest_url(),
            "https://project.supabase.co/rest/v1"
        );
    }

    #[test]
    fn resolve_reports_missing_values() {
        let mut config = CliProfilesConfig::default();
        config.profiles.insert(
            "default".to_string(),
            CliProfile {
                supabase_url: Some("https://project.supabase.co".to_string()),
                ..CliProfile::default()
            },
        );

        let error = config.resolve(None, &EnvOverrides::default()).unwrap_err();
        match error {
            CliError::NotConfigured { profile, missing } => {
                assert_eq!(profile, "default");
                assert_eq!(missing, "supabase_anon_key, owner_id");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolve_rejects_unknown_explicit_profile() {
        let error = CliProfilesConfig::default()
            .resolve(Some("field-team"), &EnvOverrides::default())
            .unwrap_err();
        assert!(matches!(error, CliError::UnknownProfile(name) if name == "field-team"));
    }

    #[test]
    fn resolve_rejects_non_http_url() {
        let mut config = CliProfilesConfig::default();
        let mut profile = configured_profile();
        profile.supabase_url = Some("project.supabase.co".to_string());
        config.profiles.insert("default".to_string(), profile);

        let error = config.resolve(None, &EnvOverrides::default()).unwrap_err();
        assert!(matches!(error, CliError::Core(fieldsync_core::Error::Config(_))));
    }

    #[test]
    fn env_overrides_debug_redacts_token() {
        let env = EnvOverrides {
            access_token: Some("secret-jwt".to_string()),
            ..EnvOverrides::default()
        };
        let debug = format!("{env:?}");
        assert!(!debug.contains("secret-jwt"));
        assert!(debug.contains("[REDACTED]"));
    }
}
