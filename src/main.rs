use std::net::IpAddr;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lexcase::config::{Config, LogFormat};
use lexcase::db::{Database, connect_libsql};
use lexcase::legal::timesheet::TimerRegistry;
use lexcase::notifications::NotificationService;
use lexcase::notifications::libsql_table::LibSqlTable;
use lexcase::web::{AppState, start_server};

/// Case-management service for law firms.
#[derive(Parser, Debug)]
#[command(name = "lexcase", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen address (overrides LEXCASE_HOST)
        #[arg(long)]
        host: Option<IpAddr>,

        /// Listen port (overrides LEXCASE_PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Apply schema migrations and exit
    Migrate,

    /// Remove expired notification items and exit
    PurgeExpired,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lexcase=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env().context("failed to load configuration")?;
    init_tracing(config.log_format);

    // Migrations run on every connect.
    let backend = connect_libsql(&config.database)
        .await
        .context("failed to open database")?;

    match cli.command {
        Commands::Migrate => {
            tracing::info!("database schema is up to date");
        }
        Commands::PurgeExpired => {
            let service = NotificationService::new(
                Arc::new(LibSqlTable::new(backend)),
                &config.notifications,
            );
            let purged = service.purge_expired().await?;
            println!("purged {purged} expired notification items");
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let table = Arc::new(LibSqlTable::new(backend.clone()));
            if config.notifications.purge_on_start {
                let service = NotificationService::new(table.clone(), &config.notifications);
                let purged = service.purge_expired().await?;
                tracing::info!(purged, "purged expired notification items");
            }
            let db: Arc<dyn Database> = Arc::new(backend);
            let state = Arc::new(AppState::new(
                db,
                table,
                Arc::new(TimerRegistry::new()),
                &config,
            ));

            let addr = start_server(config.server.socket_addr(), Arc::clone(&state)).await?;
            println!("lexcase listening on http://{addr}");

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            state.shutdown().await;
        }
    }

    Ok(())
}
