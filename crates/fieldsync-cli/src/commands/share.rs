use fieldsync_core::db::LocalStore;
use fieldsync_core::remote::RemoteStore;

use crate::commands::common::{
    field_ref, normalize_field_identifier, normalize_user_identifier, settle, Session,
};
use crate::error::CliError;

pub async fn run_share<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
    id: &str,
    user: &str,
) -> Result<(), CliError> {
    let reference = normalize_field_identifier(id)?;
    let user = normalize_user_identifier(user)?;

    let field = settle(session.sync.share(&session.owner, &reference, &user).await)?;
    println!(
        "{} shared with {}",
        field_ref(&field),
        field.details.shared_with.join(", ")
    );
    Ok(())
}
