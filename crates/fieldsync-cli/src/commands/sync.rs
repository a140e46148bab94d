use fieldsync_core::db::LocalStore;
use fieldsync_core::remote::RemoteStore;

use crate::commands::common::{format_flush_report, Session};
use crate::error::CliError;

pub async fn run_sync<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
) -> Result<(), CliError> {
    let report = session.sync.flush(&session.owner).await;
    println!("{}", format_flush_report(&report));

    if report.failed > 0 {
        return Err(CliError::SyncIncomplete {
            failed: report.failed,
            remaining: report.remaining,
        });
    }
    Ok(())
}
