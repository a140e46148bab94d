use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(about = "Capture farm fields offline and sync them when a connection is back")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for backend configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Do not contact the backend; queue every change locally
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new field
    #[command(alias = "new")]
    Add {
        /// Field name
        name: Vec<String>,
        /// Farm the field belongs to (defaults to the profile's farm)
        #[arg(long, value_name = "ID")]
        farm: Option<String>,
        #[command(flatten)]
        details: FieldArgs,
    },
    /// List fields, including changes not yet synced
    #[command(alias = "ls")]
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one field and its crops
    Show {
        /// Remote or local field ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing field
    Edit {
        /// Remote or local field ID
        id: String,
        /// New field name
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        details: FieldArgs,
    },
    /// Delete a field
    #[command(alias = "rm")]
    Delete {
        /// Remote or local field ID
        id: String,
    },
    /// Share a field with another user
    Share {
        /// Remote or local field ID
        id: String,
        /// User ID to share with
        user: String,
    },
    /// Record and list crops on a field
    Crop {
        #[command(subcommand)]
        command: CropCommands,
    },
    /// Push queued changes to the backend
    Sync,
    /// Stay running and sync on reconnect and on an interval
    Watch {
        /// Seconds between periodic syncs
        #[arg(short, long, default_value = "60", value_name = "SECONDS")]
        interval: u64,
    },
    /// Show connection state and pending changes
    Status,
    /// Show the local sync journal
    History {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Count recorded sync errors by kind
    Errors,
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Optional field attributes shared by `add` and `edit`
#[derive(Args, Debug, Default, Clone, PartialEq)]
pub struct FieldArgs {
    /// Area of the field
    #[arg(long)]
    pub size: Option<f64>,
    /// Area unit (hectares, acres, ...)
    #[arg(long, value_name = "UNIT")]
    pub unit: Option<String>,
    /// Soil type
    #[arg(long)]
    pub soil: Option<String>,
    /// Irrigation type
    #[arg(long)]
    pub irrigation: Option<String>,
    /// Free-text location description
    #[arg(long)]
    pub location: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum CropCommands {
    /// Record a crop on a field
    Add {
        /// Remote or local field ID
        field: String,
        /// Crop name
        crop: String,
        /// Crop variety
        #[arg(long)]
        variety: Option<String>,
        /// Planting date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        planted: Option<NaiveDate>,
        /// Expected harvest date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        harvest: Option<NaiveDate>,
        /// Notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// List crops on a field
    List {
        /// Remote or local field ID
        field: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// User ID that owns the fields
        #[arg(long, value_name = "ID")]
        owner_id: Option<String>,
        /// Farm new fields are filed under
        #[arg(long, value_name = "ID")]
        default_farm_id: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show,
    /// Make a profile the active one
    Use {
        /// Profile name
        name: String,
    },
}
