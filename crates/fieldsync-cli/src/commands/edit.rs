use fieldsync_core::db::LocalStore;
use fieldsync_core::remote::RemoteStore;
use fieldsync_core::Field;

use crate::cli::FieldArgs;
use crate::commands::common::{field_ref, normalize_field_identifier, settle, Session};
use crate::error::CliError;

pub async fn run_edit<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
    id: &str,
    name: Option<String>,
    args: &FieldArgs,
) -> Result<(), CliError> {
    let reference = normalize_field_identifier(id)?;
    if name.is_none() && args == &FieldArgs::default() {
        return Err(CliError::NothingToEdit);
    }

    let mut field = session.sync.get(&session.owner, &reference).await?;
    apply_edits(&mut field, name, args)?;

    let field = settle(session.sync.update(field).await)?;
    println!("{}", field_ref(&field));
    Ok(())
}

pub fn apply_edits(field: &mut Field, name: Option<String>, args: &FieldArgs) -> Result<(), CliError> {
    if let Some(name) = name {
        let name = name.trim();
        if name.is_empty() {
            return Err(CliError::EmptyFieldName);
        }
        field.details.name = name.to_string();
    }
    if let Some(size) = args.size {
        field.details.size = size;
    }
    if let Some(unit) = &args.unit {
        field.details.size_unit.clone_from(unit);
    }
    if args.soil.is_some() {
        field.details.soil_type.clone_from(&args.soil);
    }
    if args.irrigation.is_some() {
        field.details.irrigation_type.clone_from(&args.irrigation);
    }
    if args.location.is_some() {
        field.details.location_description.clone_from(&args.location);
    }
    Ok(())
}
