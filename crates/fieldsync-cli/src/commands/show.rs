use fieldsync_core::db::LocalStore;
use fieldsync_core::remote::RemoteStore;
use serde::Serialize;

use crate::commands::common::{
    format_crop_line, format_field_details, normalize_field_identifier, now_ms, Session,
};
use crate::error::CliError;

#[derive(Serialize)]
struct FieldWithCrops<'a> {
    #[serde(flatten)]
    field: &'a fieldsync_core::Field,
    crops: &'a [fieldsync_core::models::FieldCrop],
}

pub async fn run_show<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
    id: &str,
    as_json: bool,
) -> Result<(), CliError> {
    let reference = normalize_field_identifier(id)?;
    let field = session.sync.get(&session.owner, &reference).await?;
    let crops = session.sync.list_crops(&session.owner, &reference).await;

    if as_json {
        let view = FieldWithCrops {
            field: &field,
            crops: &crops,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    for line in format_field_details(&field, now_ms()) {
        println!("{line}");
    }
    if !crops.is_empty() {
        println!("Crops:");
        for crop in &crops {
            println!("  {}", format_crop_line(crop));
        }
    }
    Ok(())
}
