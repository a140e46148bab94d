use fieldsync_core::db::LocalStore;
use fieldsync_core::models::CropDraft;
use fieldsync_core::remote::RemoteStore;

use crate::cli::CropCommands;
use crate::commands::common::{format_crop_line, normalize_field_identifier, settle, Session};
use crate::error::CliError;

pub async fn run_crop<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
    command: CropCommands,
) -> Result<(), CliError> {
    match command {
        CropCommands::Add {
            field,
            crop,
            variety,
            planted,
            harvest,
            notes,
        } => {
            let draft = CropDraft {
                crop_name: crop,
                variety,
                planting_date: planted,
                expected_harvest_date: harvest,
                notes,
            };
            run_crop_add(session, &field, draft).await
        }
        CropCommands::List { field, json } => run_crop_list(session, &field, json).await,
    }
}

pub async fn run_crop_add<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
    field: &str,
    draft: CropDraft,
) -> Result<(), CliError> {
    let reference = normalize_field_identifier(field)?;
    if draft.crop_name.trim().is_empty() {
        return Err(CliError::EmptyCropName);
    }

    let crop = settle(session.sync.add_crop(&session.owner, &reference, draft).await)?;
    println!(
        "{}",
        crop.id
            .as_ref()
            .map_or_else(|| crop.local_id.to_string(), ToString::to_string)
    );
    Ok(())
}

pub async fn run_crop_list<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
    field: &str,
    as_json: bool,
) -> Result<(), CliError> {
    let reference = normalize_field_identifier(field)?;
    let crops = session.sync.list_crops(&session.owner, &reference).await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&crops)?);
    } else if crops.is_empty() {
        println!("No crops recorded on {reference}.");
    } else {
        for crop in &crops {
            println!("{}", format_crop_line(crop));
        }
    }
    Ok(())
}
