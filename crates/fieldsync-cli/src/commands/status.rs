use fieldsync_core::db::LocalStore;
use fieldsync_core::remote::RemoteStore;

use crate::commands::common::{format_history_line, Session};
use crate::error::CliError;

pub async fn run_status<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
) -> Result<(), CliError> {
    let pending = session.sync.pending_count(&session.owner).await?;
    let farms = session.sync.cached_farms(&session.owner).await?;
    let history = session.sync.history(&session.owner).await?;

    println!("Owner:    {}", session.owner);
    println!("State:    {}", session.sync.state().label());
    println!("Pending:  {pending} change(s)");
    if let Some(farm) = &session.default_farm {
        println!("Farm:     {farm}");
    }
    if !farms.is_empty() {
        let names: Vec<&str> = farms.iter().map(|farm| farm.name.as_str()).collect();
        println!("Farms:    {}", names.join(", "));
    }
    if let Some(last) = history.last() {
        println!("Last:     {}", format_history_line(last));
    }
    Ok(())
}
