use std::{process, sync::Arc};

use serde_json::Value;
use tracing::{
    Level,
    dispatcher::{self, Dispatch},
    error, info, warn,
};
use tracing_subscriber::fmt as tracing_fmt;
use vellum::{
    application::{
        error::AppError,
        migration::{MigrationManager, SchemaStatus},
        settings::SettingsStore,
    },
    cache::{CacheConfig, RenderCache},
    config,
    domain::render::EntityId,
    infra::{db::PostgresRepositories, error::InfraError, telemetry},
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.chain().join(": ");
    if dispatcher::has_been_set() {
        error!(error = %chain, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        config::Command::Migrate(args) => run_migrate(settings, args).await,
        config::Command::Status(_) => run_status(settings).await,
        config::Command::Uninstall(args) => run_uninstall(settings, args).await,
        config::Command::Settings(args) => run_settings(settings, args.command).await,
        config::Command::Export(args) => run_export(settings, args).await,
        config::Command::Import(args) => run_import(settings, args).await,
        config::Command::Cache(args) => run_cache(settings, args.command).await,
    }
}

async fn run_migrate(settings: config::Settings, args: config::MigrateArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let manager = MigrationManager::new(repositories);

    match manager.ensure_schema(args.force).await? {
        SchemaStatus::UpToDate { version } => {
            println!("schema already at version {version}");
        }
        SchemaStatus::Applied { from, to } => {
            println!("schema migrated from version {from} to {to}");
        }
    }
    Ok(())
}

async fn run_status(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let manager = MigrationManager::new(repositories);

    let stored = manager.schema_version().await?;
    let tables_exist = manager.tables_exist().await?;

    println!("table prefix:    {}", settings.database.tables.prefix());
    println!("schema version:  {stored}");
    println!("code version:    {}", manager.declared_version());
    println!("tables exist:    {tables_exist}");
    Ok(())
}

async fn run_uninstall(
    settings: config::Settings,
    args: config::UninstallArgs,
) -> Result<(), AppError> {
    if !args.confirm {
        return Err(AppError::validation(
            "uninstall drops every table; pass --confirm to proceed",
        ));
    }

    let repositories = init_repositories(&settings).await?;
    MigrationManager::new(repositories).drop_all().await?;

    warn!(
        target = "vellum::schema",
        prefix = settings.database.tables.prefix(),
        "Schema dropped"
    );
    Ok(())
}

async fn run_settings(
    settings: config::Settings,
    command: config::SettingsCommand,
) -> Result<(), AppError> {
    let store = init_settings_store(&settings).await?;

    match command {
        config::SettingsCommand::Get { key } => match store.get_value(&key).await? {
            Some(value) => println!("{}", to_pretty_json(&value)?),
            None => return Err(AppError::validation(format!("setting `{key}` is not set"))),
        },
        config::SettingsCommand::Set { key, value } => {
            let value = parse_cli_value(&value);
            store.set(&key, &value).await?;
            info!(target = "vellum::settings", key = %key, "Setting stored");
        }
        config::SettingsCommand::Delete { key } => {
            if store.delete(&key).await? {
                info!(target = "vellum::settings", key = %key, "Setting deleted");
            } else {
                println!("setting `{key}` was not set");
            }
        }
        config::SettingsCommand::List => {
            let all = store.get_all().await?;
            println!("{}", to_pretty_json(&all)?);
        }
    }
    Ok(())
}

async fn run_export(settings: config::Settings, args: config::ExportArgs) -> Result<(), AppError> {
    let store = init_settings_store(&settings).await?;
    let path = args.file;

    info!(
        target = "vellum::export",
        path = %path.display(),
        "Starting export"
    );

    let document = store.export().await?;
    tokio::fs::write(&path, document)
        .await
        .map_err(InfraError::from)?;

    info!(target = "vellum::export", "Export completed");
    Ok(())
}

async fn run_import(settings: config::Settings, args: config::ImportArgs) -> Result<(), AppError> {
    let store = init_settings_store(&settings).await?;
    let path = args.file;

    info!(
        target = "vellum::import",
        path = %path.display(),
        replace = args.replace,
        "Starting import"
    );

    let blob = tokio::fs::read_to_string(&path)
        .await
        .map_err(InfraError::from)?;
    let report = store.import(&blob, args.replace).await?;

    info!(
        target = "vellum::import",
        written = report.written,
        replaced = report.replaced,
        "Import completed"
    );
    Ok(())
}

async fn run_cache(
    settings: config::Settings,
    command: config::CacheCommand,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let cache = RenderCache::new(
        CacheConfig::from(&settings.cache),
        repositories.clone(),
        repositories,
    );

    match command {
        config::CacheCommand::Invalidate { entity_id } => {
            let entity = EntityId::new(entity_id)?;
            let generation = cache.invalidate(entity).await?;
            println!("entity {entity} now at generation {generation}");
        }
        config::CacheCommand::Purge => {
            let removed = cache.purge_expired().await?;
            println!("removed {removed} expired render entries");
        }
    }
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(
        pool,
        settings.database.tables.clone(),
    )))
}

async fn init_settings_store(settings: &config::Settings) -> Result<SettingsStore, AppError> {
    let repositories = init_repositories(settings).await?;
    let migrations = MigrationManager::new(repositories.clone());
    Ok(SettingsStore::new(repositories, migrations))
}

/// Interpret a command-line value as JSON, falling back to a plain string.
fn parse_cli_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn to_pretty_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render JSON: {err}")))
}
