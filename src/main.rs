//! Tailgate HTTP server
//!
//! Loads configuration, starts the background health monitor and serves the
//! gateway API until Ctrl-C.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tailgate::cli::{Cli, Command, generate_config_template};
use tailgate::{config::Config, handlers::AppState, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                eprintln!("Configuration template written to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    let config_path = PathBuf::from(&cli.config);
    let config = Config::from_file(&config_path)?;

    telemetry::init(&config.observability.log_level);

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        config = %config_path.display(),
        "Starting Tailgate"
    );

    let client = reqwest::Client::builder().build()?;
    let state = AppState::from_config_default(&config, client, Some(config_path))?;

    let monitor = if config.health.enabled {
        Some(Arc::clone(state.monitor()).spawn())
    } else {
        tracing::warn!("Background health monitoring disabled by configuration");
        None
    };

    let app = tailgate::app(state);

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));

    tracing::info!("Listening on {}", addr);
    tracing::info!("Chat endpoint available at http://{}/chat", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(monitor) = monitor {
        monitor.stop().await;
    }
    tracing::info!("Tailgate stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
