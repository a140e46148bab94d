use fieldsync_core::db::LocalStore;
use fieldsync_core::remote::RemoteStore;

use crate::commands::common::{format_field_line, now_ms, Session};
use crate::error::CliError;

pub async fn run_list<R: RemoteStore, L: LocalStore>(
    session: &Session<R, L>,
    as_json: bool,
) -> Result<(), CliError> {
    let fields = session.sync.list(&session.owner).await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&fields)?);
    } else if fields.is_empty() {
        println!("No fields yet. Add one with `fieldsync add <name>`.");
    } else {
        let now = now_ms();
        for field in &fields {
            println!("{}", format_field_line(field, now));
        }
    }

    Ok(())
}
