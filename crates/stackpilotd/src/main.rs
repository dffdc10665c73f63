//! stackpilotd — the Stackpilot daemon.
//!
//! Single binary that assembles the Stackpilot services:
//! - Metadata store (JSON records under the work root)
//! - Keypair manager (AWS CLI key registry)
//! - Terraform driver
//! - Metrics client
//! - Recommendation engine + autoscaler
//! - REST API
//!
//! # Usage
//!
//! ```text
//! stackpilotd serve --config /etc/stackpilot/stackpilot.toml --port 8008
//! stackpilotd check-config --config /etc/stackpilot/stackpilot.toml
//! ```

mod services;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use stackpilot_core::StackpilotConfig;

use crate::services::Services;

const DEFAULT_FILTER: &str = "info,stackpilotd=debug,stackpilot=debug";

#[derive(Parser)]
#[command(name = "stackpilotd", about = "Stackpilot daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the API and run the autoscaler.
    Serve {
        #[command(flatten)]
        opts: ConfigOpts,
    },
    /// Print the effective configuration with secrets masked.
    CheckConfig {
        #[command(flatten)]
        opts: ConfigOpts,
    },
}

#[derive(clap::Args, Debug, Default)]
struct ConfigOpts {
    /// Path to stackpilot.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding one namespace per stack.
    #[arg(long)]
    work_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve { opts } => {
            let config = load_config(&opts, |key| std::env::var(key).ok())?;
            serve(config).await
        }
        Command::CheckConfig { opts } => {
            let config = load_config(&opts, |key| std::env::var(key).ok())?;
            print!("{}", config.redacted().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// File, then environment, then command-line flags.
fn load_config<F>(opts: &ConfigOpts, lookup: F) -> anyhow::Result<StackpilotConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match &opts.config {
        Some(path) => StackpilotConfig::from_file(path)?,
        None => StackpilotConfig::default(),
    };
    config.apply_env_from(lookup)?;
    if let Some(port) = opts.port {
        config.server.port = port;
    }
    if let Some(work_root) = &opts.work_root {
        config.provisioning.work_root = work_root.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn serve(config: StackpilotConfig) -> anyhow::Result<()> {
    info!("Stackpilot daemon starting");

    let services = Services::build(&config)?;
    if services.autoscale.start() {
        info!(
            interval_secs = config.autoscale.interval_secs,
            threshold = config.autoscale.confidence_threshold,
            "autoscaler running"
        );
    }

    let router = stackpilot_api::build_router(services.api_state());
    let addr = (config.server.host.as_str(), config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}:{}", config.server.host, config.server.port))?;
    info!(addr = %listener.local_addr()?, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    services.autoscale.stop().await;
    info!("Stackpilot daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
