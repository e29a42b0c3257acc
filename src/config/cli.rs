use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the `vellum` binary.
#[derive(Debug, Parser)]
#[command(
    name = "vellum",
    version,
    about = "Settings store, schema migrations and render cache maintenance"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VELLUM_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingOverride,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Create or upgrade the schema to the version this build declares.
    Migrate(MigrateArgs),
    /// Show the stored schema version and whether every table exists.
    Status(StatusArgs),
    /// Drop every table and the version marker.
    Uninstall(UninstallArgs),
    /// Read and write individual settings.
    Settings(SettingsArgs),
    /// Write all settings to a JSON export file.
    Export(ExportArgs),
    /// Load settings from a JSON export file.
    Import(ImportArgs),
    /// Render cache maintenance.
    Cache(CacheArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverride {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the table name prefix.
    #[arg(long = "table-prefix", value_name = "PREFIX")]
    pub table_prefix: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Re-run every DDL statement even if the stored version is current.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub force: bool,
}

#[derive(Debug, Args, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Clone)]
pub struct UninstallArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Required; uninstall refuses to run without it.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub confirm: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SettingsArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(subcommand)]
    pub command: SettingsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum SettingsCommand {
    /// Print the stored value of a setting as JSON.
    Get {
        #[arg(value_name = "KEY")]
        key: String,
    },
    /// Store a JSON value under a key.
    Set {
        #[arg(value_name = "KEY")]
        key: String,
        /// JSON document; bare words that are not valid JSON are stored as strings.
        #[arg(value_name = "JSON")]
        value: String,
    },
    /// Remove a setting.
    Delete {
        #[arg(value_name = "KEY")]
        key: String,
    },
    /// Print every setting.
    List,
}

#[derive(Debug, Args, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Path to the export file to write.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct ImportArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Path to the export file to read.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Delete every existing setting before importing.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub replace: bool,
}

#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CacheCommand {
    /// Bump an entity's generation so its cached renders stop matching.
    Invalidate {
        #[arg(value_name = "ENTITY_ID")]
        entity_id: i64,
    },
    /// Delete durable entries whose TTL has elapsed.
    Purge,
}

impl Command {
    pub fn database(&self) -> &DatabaseOverride {
        match self {
            Command::Migrate(args) => &args.database,
            Command::Status(args) => &args.database,
            Command::Uninstall(args) => &args.database,
            Command::Settings(args) => &args.database,
            Command::Export(args) => &args.database,
            Command::Import(args) => &args.database,
            Command::Cache(args) => &args.database,
        }
    }
}
