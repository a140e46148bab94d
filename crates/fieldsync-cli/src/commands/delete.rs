use fieldsync_core::db::LocalStore;
use fieldsync_core::remote::RemoteStore;

use crate::commands::common::{normalize_field_identifier, settle, Session};
use crate::error::CliError;

pub async fn run_delete<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
    id: &str,
) -> Result<(), CliError> {
    let reference = normalize_field_identifier(id)?;
    settle(session.sync.delete(&session.owner, &reference).await)?;
    println!("{reference}");
    Ok(())
}
