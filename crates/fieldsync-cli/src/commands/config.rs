use std::path::Path;

use crate::cli::ConfigCommands;
use crate::config_profiles::{
    default_config_path, is_http_url, normalize_profile_name, normalize_text_option, CliProfile,
    CliProfilesConfig, EnvOverrides,
};
use crate::error::CliError;

/// Explicit values for `config init`; unset ones fall back to the environment, then the stored profile
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProfileInput {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub owner_id: Option<String>,
    pub default_farm_id: Option<String>,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let path = default_config_path()?;
    let env = EnvOverrides::from_env();
    match command {
        ConfigCommands::Init {
            supabase_url,
            supabase_anon_key,
            owner_id,
            default_farm_id,
            no_activate,
        } => {
            let input = ProfileInput {
                supabase_url,
                supabase_anon_key,
                owner_id,
                default_farm_id,
            };
            run_config_init(&path, global_profile, input, &env, no_activate)
        }
        ConfigCommands::Show => run_config_show(&path, global_profile, &env),
        ConfigCommands::Use { name } => run_config_use(&path, &name),
    }
}

pub fn run_config_init(
    path: &Path,
    profile_name: Option<&str>,
    input: ProfileInput,
    env: &EnvOverrides,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load_from_path(path)?;
    let profile_name = config.resolve_profile_name(profile_name, env);
    let existing_profile = config.profile(&profile_name).cloned().unwrap_or_default();

    let merged = CliProfile {
        supabase_url: normalize_text_option(input.supabase_url)
            .or_else(|| env.supabase_url.clone())
            .or_else(|| existing_profile.supabase_url()),
        supabase_anon_key: normalize_text_option(input.supabase_anon_key)
            .or_else(|| env.supabase_anon_key.clone())
            .or_else(|| existing_profile.supabase_anon_key()),
        owner_id: normalize_text_option(input.owner_id)
            .or_else(|| env.owner_id.clone())
            .or_else(|| existing_profile.owner_id()),
        default_farm_id: normalize_text_option(input.default_farm_id)
            .or_else(|| existing_profile.default_farm_id()),
    };
    validate_profile_urls(&merged)?;
    *config.profile_mut_or_default(&profile_name) = merged;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    config.save_to_path(path)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let profile = config
        .profiles
        .get(&profile_name)
        .ok_or_else(|| CliError::Config("Failed to persist profile".to_string()))?;
    let missing_fields = missing_fields(profile);
    if missing_fields.is_empty() {
        println!("Profile '{profile_name}' is ready. Run `fieldsync sync` to push queued changes.");
    } else {
        println!(
            "Profile '{}' is missing: {}",
            profile_name,
            missing_fields.join(", ")
        );
    }

    Ok(())
}

pub fn run_config_show(
    path: &Path,
    profile_name: Option<&str>,
    env: &EnvOverrides,
) -> Result<(), CliError> {
    let config = CliProfilesConfig::load_from_path(path)?;
    let profile_name = config.resolve_profile_name(profile_name, env);
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();

    println!("Config:   {}", path.display());
    println!("Profile:  {profile_name}");
    println!("{}", serde_json::to_string_pretty(&profile)?);
    let missing = missing_fields(&profile);
    if !missing.is_empty() {
        println!("Missing:  {}", missing.join(", "));
    }
    Ok(())
}

pub fn run_config_use(path: &Path, name: &str) -> Result<(), CliError> {
    let name = normalize_profile_name(Some(name))
        .ok_or_else(|| CliError::Config("Profile name cannot be empty".to_string()))?;
    let mut config = CliProfilesConfig::load_from_path(path)?;
    if config.profile(&name).is_none() {
        return Err(CliError::UnknownProfile(name));
    }

    config.active_profile = Some(name.clone());
    config.save_to_path(path)?;
    println!("Active profile is now '{name}'");
    Ok(())
}

fn missing_fields(profile: &CliProfile) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if profile.supabase_url().is_none() {
        missing.push("supabase_url");
    }
    if profile.supabase_anon_key().is_none() {
        missing.push("supabase_anon_key");
    }
    if profile.owner_id().is_none() {
        missing.push("owner_id");
    }
    missing
}

fn validate_profile_urls(profile: &CliProfile) -> Result<(), CliError> {
    if let Some(url) = profile.supabase_url() {
        if !is_http_url(&url) {
            return Err(CliError::Config(
                "supabase_url must include http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}
