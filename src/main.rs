//! dualserve
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                        DUALSERVE                          │
//!                 │                                                           │
//!   HTTP client   │  ┌──────────┐   ┌──────────┐   ┌──────────────────────┐   │
//!   ──────────────┼─▶│   net    │──▶│   http   │──▶│ rpc client (gateway) │─┐ │
//!                 │  │ listener │   │ gateway  │   └──────────────────────┘ │ │
//!                 │  └──────────┘   └──────────┘                            │ │
//!                 │                                                         ▼ │
//!   RPC client    │  ┌──────────┐   ┌──────────┐   ┌─────────────┐  ┌──────┐  │
//!   ──────────────┼─▶│   net    │──▶│   rpc    │──▶│ interceptor │─▶│ user │  │
//!                 │  │ listener │   │ dispatch │   │  pipeline   │  │ rpcs │  │
//!                 │  └──────────┘   └──────────┘   └─────────────┘  └──────┘  │
//!                 │                                                           │
//!                 │  ┌─────────────────────────────────────────────────────┐  │
//!                 │  │ lifecycle (state cell, services) · events (reload)  │  │
//!                 │  │ config · auth · i18n · observability                │  │
//!                 │  └─────────────────────────────────────────────────────┘  │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use axum::{routing::get, Router};
use clap::{Args, Parser, Subcommand};

use dualserve::config::{AppConfig, ConfigStore};
use dualserve::lifecycle::Application;
use dualserve::observability::{logging, metrics};
use dualserve::server::ServerOptions;

#[derive(Parser)]
#[command(name = "dualserve", version)]
#[command(about = "RPC server with an HTTP gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Start(StartArgs),
}

#[derive(Args)]
struct StartArgs {
    /// Config file (TOML)
    #[arg(short = 'f', long = "config")]
    config: Option<PathBuf>,

    /// Change to this directory first
    #[arg(long)]
    cd: Option<PathBuf>,

    /// Debug mode: payload logging, panic backtraces, permissive CORS
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Start(args) => start(args).await,
    }
}

async fn start(args: StartArgs) -> ExitCode {
    if let Some(dir) = &args.cd {
        if let Err(e) = std::env::set_current_dir(dir) {
            eprintln!("cannot change directory to {}: {e}", dir.display());
            return ExitCode::FAILURE;
        }
    }

    let store = match ConfigStore::load(args.config.as_deref()) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if args.debug {
        let mut config = AppConfig::clone(&store.get());
        config.runtime.debug = true;
        store.store(config);
    }
    let config = store.get();

    if let Err(e) = logging::init_logging(&config.observability, config.runtime.debug) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?store.path(),
        debug = config.runtime.debug,
        "dualserve starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let options = match ServerOptions::from_config(&config.server) {
        Ok(options) => options.routing(|gateway| {
            Router::new()
                .route("/healthz", get(|| async { "ok" }))
                .fallback_service(gateway)
        }),
        Err(e) => {
            tracing::error!(error = %e, "Invalid server options");
            return ExitCode::FAILURE;
        }
    };

    let app = Application::new(Arc::new(store));
    let running = match app.start(options).await {
        Ok(running) => running,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    match running.run_until_signal().await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            tracing::error!(error = %e, "Shutdown failed");
            ExitCode::FAILURE
        }
    }
}
