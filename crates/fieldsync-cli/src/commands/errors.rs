use fieldsync_core::db::LocalStore;
use fieldsync_core::remote::RemoteStore;

use crate::commands::common::Session;
use crate::error::CliError;

pub async fn run_errors<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
) -> Result<(), CliError> {
    let counts = session.sync.error_statistics(&session.owner).await?;

    if counts.is_empty() {
        println!("No sync errors recorded.");
        return Ok(());
    }
    for (kind, count) in counts {
        println!("{:<20}  {count}", kind.as_str());
    }
    Ok(())
}
