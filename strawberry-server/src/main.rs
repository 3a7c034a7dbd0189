// Strawberry control plane server

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use strawberry_core::{ClusterInfo, FamilyConfig, LogFormat, ServerConfig};
use strawberry_server::{build_app, factories_from_config, Authenticator, TokenManager};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "strawberry-server")]
#[command(about = "HTTP control plane for strawberry operation controllers", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(long, short)]
    config: Option<String>,

    /// Listen address, overrides the configuration
    #[arg(long)]
    endpoint: Option<String>,

    /// Skip authentication. Never use in production.
    #[arg(long)]
    disable_auth: bool,

    /// Print a token for the given user and exit
    #[arg(long, value_name = "USER")]
    issue_token: Option<String>,
}

/// Single local `sleep` cluster, used when no configuration file is given.
fn default_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.families.insert(
        "sleep".to_string(),
        FamilyConfig {
            controller: "sleep".to_string(),
            config: serde_json::Value::Null,
        },
    );
    config
        .clusters
        .push(ClusterInfo::new("sleep", "localhost", "//sys/strawberry/sleep").with_stage("local"));
    config
}

fn load_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        None => default_config(),
    };
    config.apply_env();
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if args.disable_auth {
        config.disable_auth = true;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn init_tracing(config: &ServerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("🛑 Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&config);

    let secret = config.jwt_secret.clone().unwrap_or_default();
    let tokens = Arc::new(TokenManager::new(&secret));

    if let Some(user) = &args.issue_token {
        let token = tokens.generate_token(user, Vec::new())?;
        println!("{}", token);
        return Ok(());
    }

    info!("🍓 Starting strawberry control plane...");
    info!(
        "📋 {} families, {} clusters",
        config.families.len(),
        config.clusters.len()
    );

    let factories = factories_from_config(&config)?;
    let authenticator: Arc<dyn Authenticator> = tokens;
    let app = build_app(&config, &factories, authenticator)?;
    info!("✅ Routing table ready");

    let listener = tokio::net::TcpListener::bind(&config.endpoint)
        .await
        .with_context(|| format!("failed to bind {}", config.endpoint))?;
    info!("🚀 Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server stopped");
    Ok(())
}
