pub mod add;
pub mod common;
pub mod completions;
pub mod config;
pub mod crop;
pub mod delete;
pub mod edit;
pub mod errors;
pub mod history;
pub mod list;
pub mod share;
pub mod show;
pub mod status;
pub mod sync;
pub mod watch;
