use fieldsync_core::db::LocalStore;
use fieldsync_core::models::FarmId;
use fieldsync_core::remote::RemoteStore;
use fieldsync_core::{FieldDetails, FieldDraft};

use crate::cli::FieldArgs;
use crate::commands::common::{field_ref, normalize_field_name, settle, Session};
use crate::error::CliError;

pub async fn run_add<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
    name_parts: &[String],
    farm: Option<&str>,
    args: &FieldArgs,
) -> Result<(), CliError> {
    let name = normalize_field_name(name_parts)?;

    let mut draft = FieldDraft::new(session.owner.clone(), details_from_args(name, args));
    let farm = farm
        .map(str::trim)
        .filter(|farm| !farm.is_empty())
        .map(FarmId::from)
        .or_else(|| session.default_farm.clone());
    if let Some(farm) = farm {
        draft = draft.with_farm(farm);
    }

    let field = settle(session.sync.create(draft).await)?;
    println!("{}", field_ref(&field));
    Ok(())
}

pub fn details_from_args(name: String, args: &FieldArgs) -> FieldDetails {
    let mut details = FieldDetails::named(name);
    if let Some(size) = args.size {
        details.size = size;
    }
    if let Some(unit) = &args.unit {
        details.size_unit.clone_from(unit);
    }
    details.soil_type.clone_from(&args.soil);
    details.irrigation_type.clone_from(&args.irrigation);
    details.location_description.clone_from(&args.location);
    details
}
