use fieldsync_core::db::LocalStore;
use fieldsync_core::remote::RemoteStore;

use crate::commands::common::{format_history_line, Session};
use crate::error::CliError;

pub async fn run_history<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let history = session.sync.history(&session.owner).await?;
    let recent = &history[history.len().saturating_sub(limit)..];

    if as_json {
        println!("{}", serde_json::to_string_pretty(recent)?);
    } else if recent.is_empty() {
        println!("No sync history yet.");
    } else {
        for entry in recent {
            println!("{}", format_history_line(entry));
        }
    }
    Ok(())
}
