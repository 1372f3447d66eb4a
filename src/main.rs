use std::sync::Arc;

use archiver::{
    config::AppConfig,
    engine::Archiver,
    persistence::{EventStore, SqliteEventStore},
    publisher::RabbitMqEventPublisher,
    supervisor::{Supervisor, SupervisorError},
};
use clap::{Parser, Subcommand};
use lapin::{Connection, ConnectionProperties};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consumes events from the bus and archives them.
    Run {
        /// Directory holding `app.yaml`.
        #[arg(long, default_value = "configs")]
        config_dir: String,
    },
    /// Removes every current-state record and history entry.
    Purge {
        /// Directory holding `app.yaml`.
        #[arg(long, default_value = "configs")]
        config_dir: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber =
        FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env()).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config_dir } => run_supervisor(&config_dir).await?,
        Commands::Purge { config_dir } => purge(&config_dir).await?,
    }

    Ok(())
}

async fn open_store(config: &AppConfig) -> Result<Arc<SqliteEventStore>, SupervisorError> {
    tracing::debug!(database_url = %config.database_url, "Initializing event store...");
    let store = Arc::new(SqliteEventStore::new(&config.database_url).await?);
    store.run_migrations().await?;
    Ok(store)
}

async fn run_supervisor(config_dir: &str) -> Result<(), SupervisorError> {
    tracing::debug!(config_dir, "Loading application configuration...");
    let config = AppConfig::new(Some(config_dir))?;
    tracing::debug!(
        database_url = %config.database_url,
        exchange = %config.amqp.exchange,
        queue = %config.amqp.queue,
        "Configuration loaded."
    );

    let store = open_store(&config).await?;

    tracing::debug!("Connecting to the message bus...");
    let connection = Connection::connect(&config.amqp.uri, ConnectionProperties::default()).await?;
    let publish_channel = connection.create_channel().await?;
    let publisher =
        RabbitMqEventPublisher::from_channel(publish_channel, &config.amqp.exchange).await?;
    let consumer_channel = connection.create_channel().await?;
    tracing::info!(exchange = %config.amqp.exchange, "Connected to the message bus.");

    let archiver = Archiver::builder()
        .store(Arc::clone(&store))
        .publisher(Arc::new(publisher))
        .settings(config.archiver.clone())
        .status_config(config.status)
        .exchange(config.amqp.exchange.clone())
        .build()?;

    let supervisor =
        Supervisor::builder().config(config).archiver(archiver).channel(consumer_channel).build()?;

    tracing::info!("Supervisor initialized, starting archiver...");
    supervisor.run().await?;

    if let Err(e) = connection.close(200, "shutdown").await {
        tracing::warn!(error = %e, "Failed to close the message bus connection.");
    }
    store.close().await;
    Ok(())
}

async fn purge(config_dir: &str) -> Result<(), SupervisorError> {
    let config = AppConfig::new(Some(config_dir))?;
    let store = open_store(&config).await?;
    store.drop_all().await?;
    tracing::info!("Removed all archived events.");
    store.close().await;
    Ok(())
}
