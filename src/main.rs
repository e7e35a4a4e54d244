use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use rivulet::api::{AppState, create_router};
use rivulet::auth::AuthState;
use rivulet::chat::DEFAULT_PACING;
use rivulet::config::AppConfig;
use rivulet::db::Database;
use rivulet::provider::ProviderRegistry;

const DEFAULT_CONFIG_FILE: &str = "rivulet.toml";

#[derive(Debug, Parser)]
#[command(author, version, about = "Streaming AI chat backend", propagate_version = true)]
struct Cli {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve(ServeCommand),
    /// Write a default config file and exit
    Init,
}

#[derive(Debug, Args)]
struct ServeCommand {
    /// Override the bind host from config
    #[arg(long)]
    host: Option<String>,
    /// Override the bind port from config
    #[arg(long)]
    port: Option<u16>,
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config_file = cli
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    match cli.command {
        Command::Serve(cmd) => serve(&config_file, cmd).await,
        Command::Init => init_config(&config_file),
    }
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rivulet=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();
}

fn init_config(config_file: &Path) -> Result<()> {
    if config_file.exists() {
        bail!("config file already exists: {}", config_file.display());
    }
    AppConfig::write_default(config_file)?;
    println!("Wrote {}", config_file.display());
    Ok(())
}

async fn serve(config_file: &Path, cmd: ServeCommand) -> Result<()> {
    let config = AppConfig::load(config_file)?;

    if config.auth.jwt_secret.is_empty() {
        bail!(
            "auth.jwt_secret is not set (configure it in {} or via RIVULET__AUTH__JWT_SECRET)",
            config_file.display()
        );
    }

    let database = Database::new(Path::new(&config.database.path)).await?;

    let auth_state = AuthState::new(&config.auth.jwt_secret, config.auth.token_ttl_minutes);
    let registry = Arc::new(ProviderRegistry::from_config(&config.providers));
    info!(providers = ?registry.known_providers(), "provider registry ready");

    let state = AppState::new(database, auth_state, registry, DEFAULT_PACING);
    let app = create_router(state);

    let host = cmd.host.unwrap_or(config.server.host);
    let port = cmd.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{host}:{port}").parse().context("invalid address")?;

    info!("Listening on http://{}", addr);
    let listener = TcpListener::bind(addr).await.context("binding to address")?;

    let shutdown_signal = async {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to install Ctrl+C handler");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(err) => tracing::error!(error = %err, "failed to install signal handler"),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        info!("Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("running server")?;

    Ok(())
}
