use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pmsync")]
#[command(about = "Offline-first project and company records with peer sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for user and sync endpoint configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: EntityCommands,
    },
    /// Manage companies
    Company {
        #[command(subcommand)]
        command: EntityCommands,
    },
    /// Show the local change log
    Changes {
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only show records not yet delivered
        #[arg(long)]
        pending: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export all records as a JSON snapshot
    Export {
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Import a JSON snapshot, recording every record as a local change
    Import {
        /// Snapshot file produced by `export`
        path: PathBuf,
    },
    /// Show pending change counts and the sync watermark
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Connect to the configured peer, push pending changes and pull remote ones
    Sync {
        /// Credential presented to the peer (falls back to PMSYNC_TOKEN)
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
        /// Seconds to keep listening for remote changes after pushing
        #[arg(long, default_value = "2", value_name = "SECS")]
        wait: u64,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum EntityCommands {
    /// Create a record
    #[command(alias = "new")]
    Create {
        /// Record id
        id: String,
        /// Field assignment as key=value (JSON values are parsed)
        #[arg(short, long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,
        /// Fields as a JSON object, applied before --field assignments
        #[arg(long, value_name = "JSON")]
        json: Option<String>,
    },
    /// Update a record at a known version
    Update {
        /// Record id
        id: String,
        /// Version the update is based on
        #[arg(long)]
        version: i64,
        /// Field assignment as key=value (JSON values are parsed)
        #[arg(short, long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,
        /// Fields as a JSON object, applied before --field assignments
        #[arg(long, value_name = "JSON")]
        json: Option<String>,
    },
    /// Delete a record at a known version
    Delete {
        /// Record id
        id: String,
        /// Version the delete is based on
        #[arg(long)]
        version: i64,
    },
    /// Show one record
    Show {
        /// Record id
        id: String,
    },
    /// List records
    List {
        /// Filter by lookup field (company id for projects, name for companies)
        #[arg(long, value_name = "VALUE")]
        lookup: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// User id recorded on local changes and presented to the peer
        #[arg(long, value_name = "ID")]
        user: Option<String>,
        /// WebSocket endpoint (ws:// or wss://)
        #[arg(long, value_name = "URL", conflicts_with_all = ["events_url", "api_base_url"])]
        websocket_url: Option<String>,
        /// Server-sent events endpoint for push sync
        #[arg(long, value_name = "URL", requires = "api_base_url")]
        events_url: Option<String>,
        /// HTTP base URL receiving outbound push sync messages
        #[arg(long, value_name = "URL", requires = "events_url")]
        api_base_url: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show,
}
