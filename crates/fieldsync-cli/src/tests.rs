use chrono::NaiveDate;
use clap::Parser;
use fieldsync_core::db::{Database, LibSqlLocalStore};
use fieldsync_core::models::{CropDraft, Farm, FieldCrop, HistoryEntry, HistoryKind};
use fieldsync_core::remote::{MemoryRemoteStore, RemoteError, RemoteOp};
use fieldsync_core::sync::Notice;
use fieldsync_core::{
    Field, FieldDetails, FieldDraft, FlushReport, FlushStatus, OwnerId, SyncSettings,
};
use pretty_assertions::assert_eq;

use crate::cli::{Cli, Commands, CompletionShell, ConfigCommands, CropCommands, FieldArgs};
use crate::commands::add::{details_from_args, run_add};
use crate::commands::common::{
    field_status, format_crop_line, format_field_line, format_flush_report, format_history_line,
    format_notice, format_relative_time, format_timestamp, normalize_field_identifier,
    normalize_field_name, normalize_user_identifier, Session,
};
use crate::commands::completions::run_completions;
use crate::commands::config::{run_config_init, run_config_use, ProfileInput};
use crate::commands::crop::run_crop_add;
use crate::commands::delete::run_delete;
use crate::commands::edit::{apply_edits, run_edit};
use crate::commands::share::run_share;
use crate::commands::sync::run_sync;
use crate::commands::watch::watch_settings;
use crate::config_profiles::{CliProfilesConfig, EnvOverrides};
use crate::error::CliError;

struct Fixture {
    session: Session<MemoryRemoteStore, LibSqlLocalStore>,
    remote: MemoryRemoteStore,
    farm: Farm,
}

async fn fixture(online: bool) -> Fixture {
    let remote = MemoryRemoteStore::new();
    let owner = OwnerId::from("farmer-1");
    let farm = remote.seed_farm(&owner, "Home Farm");
    let store = LibSqlLocalStore::open_in_memory().await.unwrap();
    let session = Session::new(
        remote.clone(),
        store,
        owner,
        online,
        SyncSettings::default().without_auto_sync(),
    )
    .with_default_farm(Some(farm.id.clone()));

    Fixture {
        session,
        remote,
        farm,
    }
}

fn words(text: &str) -> Vec<String> {
    text.split_whitespace().map(ToString::to_string).collect()
}

#[test]
fn normalize_field_name_joins_words_and_rejects_empty() {
    assert_eq!(
        normalize_field_name(&words("North   Field")).unwrap(),
        "North Field"
    );
    assert!(matches!(
        normalize_field_name(&[" ".to_string()]),
        Err(CliError::EmptyFieldName)
    ));
    assert!(matches!(
        normalize_field_name(&[]),
        Err(CliError::EmptyFieldName)
    ));
}

#[test]
fn identifiers_are_trimmed_and_required() {
    assert_eq!(normalize_field_identifier("  abc  ").unwrap(), "abc");
    assert!(matches!(
        normalize_field_identifier(" "),
        Err(CliError::EmptyFieldId)
    ));
    assert_eq!(normalize_user_identifier(" user-2 ").unwrap(), "user-2");
    assert!(matches!(
        normalize_user_identifier(""),
        Err(CliError::EmptyUserId)
    ));
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
}

#[test]
fn format_timestamp_returns_utc_label() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn format_notice_includes_description_when_present() {
    assert_eq!(format_notice(&Notice::success("Field created")), "[ok] Field created");
    assert_eq!(
        format_notice(&Notice::warning("You're offline").with_description("Changes kept locally")),
        "[warn] You're offline: Changes kept locally"
    );
}

#[test]
fn format_flush_report_by_status() {
    assert_eq!(
        format_flush_report(&FlushReport {
            status: FlushStatus::Offline,
            remaining: 3,
            ..FlushReport::default()
        }),
        "Offline. 3 change(s) waiting to sync."
    );
    assert_eq!(
        format_flush_report(&FlushReport::default()),
        "Everything is up to date."
    );
    assert_eq!(
        format_flush_report(&FlushReport {
            synced: 2,
            failed: 1,
            remaining: 1,
            ..FlushReport::default()
        }),
        "Synced 2, removed 0, conflicts 0, failed 1. 1 change(s) pending."
    );
}

#[test]
fn field_line_shows_local_id_until_synced() {
    let mut field = FieldDraft::new(OwnerId::from("farmer-1"), FieldDetails::named("North Field"))
        .into_field();
    field.details.size = 2.5;

    let line = format_field_line(&field, field.updated_at);
    assert!(line.starts_with(&field.local_id.to_string()));
    assert!(line.contains("pending"));
    assert!(line.contains("North Field"));
    assert!(line.contains("2.5 hectares"));
    assert!(line.ends_with("just now"));

    field.mark_deleted();
    assert_eq!(field_status(&field), "deleting");
}

#[test]
fn crop_line_includes_variety_and_dates() {
    let draft = CropDraft {
        variety: Some("Hybrid 614".to_string()),
        planting_date: NaiveDate::from_ymd_opt(2024, 3, 1),
        ..CropDraft::named("Maize")
    };
    let crop = FieldCrop::from_draft(OwnerId::from("farmer-1"), None, None, draft);

    let line = format_crop_line(&crop);
    assert!(line.starts_with("Maize (Hybrid 614)"));
    assert!(line.contains("planted 2024-03-01"));
    assert!(line.contains("harvest -"));
}

#[test]
fn history_line_has_kind_and_detail() {
    let mut entry = HistoryEntry::new(HistoryKind::Conflict, None, Some("remote newer".to_string()));
    entry.at = 0;
    assert_eq!(
        format_history_line(&entry),
        "1970-01-01 00:00:00 UTC  conflict  -  remote newer"
    );
}

#[test]
fn parses_add_with_details_and_global_flags() {
    let cli = Cli::try_parse_from([
        "fieldsync",
        "add",
        "North",
        "Field",
        "--size",
        "2.5",
        "--unit",
        "acres",
        "--offline",
    ])
    .unwrap();
    assert!(cli.offline);

    let Some(Commands::Add {
        name,
        farm,
        details,
    }) = cli.command
    else {
        panic!("expected add command");
    };
    assert_eq!(name, words("North Field"));
    assert_eq!(farm, None);
    assert_eq!(details.size, Some(2.5));
    assert_eq!(details.unit.as_deref(), Some("acres"));
}

#[test]
fn parses_crop_add_dates() {
    let cli = Cli::try_parse_from([
        "fieldsync",
        "crop",
        "add",
        "field-1",
        "Maize",
        "--planted",
        "2024-03-01",
    ])
    .unwrap();

    let Some(Commands::Crop {
        command: CropCommands::Add {
            field,
            crop,
            planted,
            harvest,
            ..
        },
    }) = cli.command
    else {
        panic!("expected crop add command");
    };
    assert_eq!(field, "field-1");
    assert_eq!(crop, "Maize");
    assert_eq!(planted, NaiveDate::from_ymd_opt(2024, 3, 1));
    assert_eq!(harvest, None);
}

#[test]
fn rejects_malformed_crop_date() {
    let result = Cli::try_parse_from([
        "fieldsync",
        "crop",
        "add",
        "field-1",
        "Maize",
        "--planted",
        "March 1st",
    ]);
    assert!(result.is_err());
}

#[test]
fn parses_config_use_and_profile_flag() {
    let cli = Cli::try_parse_from(["fieldsync", "--profile", "work", "config", "use", "mobile"])
        .unwrap();
    assert_eq!(cli.profile.as_deref(), Some("work"));
    assert!(matches!(
        cli.command,
        Some(Commands::Config {
            command: ConfigCommands::Use { ref name }
        }) if name == "mobile"
    ));
}

#[test]
fn details_from_args_copies_optional_attributes() {
    let args = FieldArgs {
        size: Some(4.0),
        unit: Some("acres".to_string()),
        soil: Some("loam".to_string()),
        irrigation: None,
        location: Some("By the river".to_string()),
    };
    let details = details_from_args("River Plot".to_string(), &args);
    assert_eq!(details.name, "River Plot");
    assert_eq!(details.size, 4.0);
    assert_eq!(details.size_unit, "acres");
    assert_eq!(details.soil_type.as_deref(), Some("loam"));
    assert_eq!(details.irrigation_type, None);
    assert_eq!(details.location_description.as_deref(), Some("By the river"));
}

#[test]
fn apply_edits_only_touches_given_values() {
    let mut field: Field = FieldDraft::new(
        OwnerId::from("farmer-1"),
        FieldDetails {
            soil_type: Some("clay".to_string()),
            ..FieldDetails::named("Old")
        },
    )
    .into_field();
    let args = FieldArgs {
        irrigation: Some("drip".to_string()),
        ..FieldArgs::default()
    };

    apply_edits(&mut field, Some(" New ".to_string()), &args).unwrap();
    assert_eq!(field.name(), "New");
    assert_eq!(field.details.soil_type.as_deref(), Some("clay"));
    assert_eq!(field.details.irrigation_type.as_deref(), Some("drip"));

    assert!(matches!(
        apply_edits(&mut field, Some("  ".to_string()), &FieldArgs::default()),
        Err(CliError::EmptyFieldName)
    ));
}

#[test]
fn watch_settings_require_positive_interval() {
    assert!(matches!(watch_settings(0), Err(CliError::InvalidInterval)));
    let settings = watch_settings(30).unwrap();
    assert_eq!(
        settings.auto_sync_interval,
        Some(std::time::Duration::from_secs(30))
    );
}

#[test]
fn run_completions_writes_bash_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fieldsync.bash");

    run_completions(CompletionShell::Bash, Some(&path)).unwrap();

    let script = std::fs::read_to_string(&path).unwrap();
    assert!(script.contains("fieldsync"));
}

#[test]
fn config_init_merges_and_activates_profile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cli-config.json");
    let env = EnvOverrides {
        owner_id: Some("farmer-env".to_string()),
        ..EnvOverrides::default()
    };

    run_config_init(
        &path,
        Some("field-team"),
        ProfileInput {
            supabase_url: Some("https://project.supabase.co/".to_string()),
            supabase_anon_key: Some("anon".to_string()),
            ..ProfileInput::default()
        },
        &env,
        false,
    )
    .unwrap();

    let config = CliProfilesConfig::load_from_path(&path).unwrap();
    assert_eq!(config.active_profile.as_deref(), Some("field-team"));
    let profile = config.profile("field-team").unwrap();
    assert_eq!(
        profile.supabase_url.as_deref(),
        Some("https://project.supabase.co")
    );
    assert_eq!(profile.owner_id.as_deref(), Some("farmer-env"));

    // A second init keeps stored values the caller does not override.
    run_config_init(
        &path,
        Some("field-team"),
        ProfileInput {
            default_farm_id: Some("farm-9".to_string()),
            ..ProfileInput::default()
        },
        &EnvOverrides::default(),
        true,
    )
    .unwrap();
    let config = CliProfilesConfig::load_from_path(&path).unwrap();
    let profile = config.profile("field-team").unwrap();
    assert_eq!(profile.supabase_anon_key.as_deref(), Some("anon"));
    assert_eq!(profile.owner_id.as_deref(), Some("farmer-env"));
    assert_eq!(profile.default_farm_id.as_deref(), Some("farm-9"));
}

#[test]
fn config_init_rejects_non_http_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cli-config.json");

    let error = run_config_init(
        &path,
        None,
        ProfileInput {
            supabase_url: Some("project.supabase.co".to_string()),
            ..ProfileInput::default()
        },
        &EnvOverrides::default(),
        false,
    )
    .unwrap_err();
    assert!(matches!(error, CliError::Config(_)));
    assert!(!path.exists());
}

#[test]
fn config_use_requires_existing_profile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cli-config.json");

    assert!(matches!(
        run_config_use(&path, "missing"),
        Err(CliError::UnknownProfile(name)) if name == "missing"
    ));

    run_config_init(
        &path,
        Some("work"),
        ProfileInput::default(),
        &EnvOverrides::default(),
        true,
    )
    .unwrap();
    run_config_use(&path, " work ").unwrap();
    let config = CliProfilesConfig::load_from_path(&path).unwrap();
    assert_eq!(config.active_profile.as_deref(), Some("work"));
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_add_then_sync_pushes_exactly_one_field() {
    let Fixture {
        session,
        remote,
        farm,
    } = fixture(false).await;

    run_add(
        &session,
        &words("North Field"),
        None,
        &FieldArgs::default(),
    )
    .await
    .unwrap();
    assert_eq!(remote.call_count(RemoteOp::InsertField), 0);
    assert_eq!(session.sync.pending_count(&session.owner).await.unwrap(), 1);

    session.connectivity.set_online(true);
    run_sync(&session).await.unwrap();

    let fields = remote.fields();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name(), "North Field");
    assert_eq!(fields[0].farm_id.as_ref(), Some(&farm.id));
    assert_eq!(session.sync.pending_count(&session.owner).await.unwrap(), 0);

    run_sync(&session).await.unwrap();
    assert_eq!(remote.fields().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn add_with_blank_name_is_rejected() {
    let Fixture { session, .. } = fixture(true).await;
    let result = run_add(&session, &words("   "), None, &FieldArgs::default()).await;
    assert!(matches!(result, Err(CliError::EmptyFieldName)));
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_of_offline_field_leaves_no_trace() {
    let Fixture {
        session, remote, ..
    } = fixture(false).await;

    run_add(&session, &words("Temp"), None, &FieldArgs::default())
        .await
        .unwrap();
    let field = session.sync.list(&session.owner).await.remove(0);
    run_delete(&session, &field.local_id.to_string())
        .await
        .unwrap();

    assert!(session.sync.list(&session.owner).await.is_empty());
    session.connectivity.set_online(true);
    run_sync(&session).await.unwrap();
    assert_eq!(remote.call_count(RemoteOp::InsertField), 0);
    assert_eq!(remote.call_count(RemoteOp::DeleteField), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn edit_requires_a_change_and_updates_queued_field() {
    let Fixture { session, .. } = fixture(false).await;

    run_add(&session, &words("Old Name"), None, &FieldArgs::default())
        .await
        .unwrap();
    let field = session.sync.list(&session.owner).await.remove(0);
    let reference = field.local_id.to_string();

    let result = run_edit(&session, &reference, None, &FieldArgs::default()).await;
    assert!(matches!(result, Err(CliError::NothingToEdit)));

    let args = FieldArgs {
        size: Some(3.0),
        ..FieldArgs::default()
    };
    run_edit(&session, &reference, Some("New Name".to_string()), &args)
        .await
        .unwrap();

    let fields = session.sync.list(&session.owner).await;
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name(), "New Name");
    assert_eq!(fields[0].details.size, 3.0);
    assert!(!fields[0].is_synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn share_needs_a_connection() {
    let Fixture { session, .. } = fixture(false).await;

    run_add(&session, &words("Shared"), None, &FieldArgs::default())
        .await
        .unwrap();
    let field = session.sync.list(&session.owner).await.remove(0);

    let result = run_share(&session, &field.local_id.to_string(), "user-2").await;
    assert!(matches!(result, Err(CliError::WriteFailed(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_reports_failures_as_error() {
    let Fixture {
        session, remote, ..
    } = fixture(false).await;

    run_add(&session, &words("Stuck"), None, &FieldArgs::default())
        .await
        .unwrap();
    remote.fail_always(RemoteOp::InsertField, RemoteError::network("connection reset"));
    session.connectivity.set_online(true);

    let result = run_sync(&session).await;
    assert!(matches!(
        result,
        Err(CliError::SyncIncomplete {
            failed: 1,
            remaining: 1
        })
    ));
    assert!(remote.fields().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn crop_on_offline_field_syncs_after_parent() {
    let Fixture {
        session, remote, ..
    } = fixture(false).await;

    run_add(&session, &words("Maize Plot"), None, &FieldArgs::default())
        .await
        .unwrap();
    let field = session.sync.list(&session.owner).await.remove(0);
    run_crop_add(
        &session,
        &field.local_id.to_string(),
        CropDraft::named("Maize"),
    )
    .await
    .unwrap();

    let result = run_crop_add(&session, &field.local_id.to_string(), CropDraft::named(" ")).await;
    assert!(matches!(result, Err(CliError::EmptyCropName)));

    session.connectivity.set_online(true);
    run_sync(&session).await.unwrap();

    let remote_field = remote.fields().remove(0);
    let crops = remote.crops();
    assert_eq!(crops.len(), 1);
    assert_eq!(crops[0].crop_name, "Maize");
    assert_eq!(crops[0].field_id, remote_field.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn session_without_probe_keeps_connectivity() {
    let Fixture { session, .. } = fixture(true).await;
    assert!(session.refresh_connectivity().await);
    session.connectivity.set_online(false);
    assert!(!session.refresh_connectivity().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_fields_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("fieldsync.db");
    let owner = OwnerId::from("farmer-1");

    {
        let store = LibSqlLocalStore::new(Database::open(&db_path).await.unwrap());
        let session = Session::new(
            MemoryRemoteStore::new(),
            store,
            owner.clone(),
            false,
            SyncSettings::default().without_auto_sync(),
        );
        run_add(&session, &words("Persistent"), None, &FieldArgs::default())
            .await
            .unwrap();
    }

    let store = LibSqlLocalStore::new(Database::open(&db_path).await.unwrap());
    let session = Session::new(
        MemoryRemoteStore::new(),
        store,
        owner,
        false,
        SyncSettings::default().without_auto_sync(),
    );
    let fields = session.sync.list(&session.owner).await;
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name(), "Persistent");
}
