// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! corrald: the Corral control-plane daemon.

use clap::Parser;
use corral_daemon::{app, lifecycle, Config};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "corrald", version, about = "Corral compute-node control plane")]
struct Args {
    /// HTTP listen address (overrides CORRAL_HTTP_ADDR)
    #[arg(long)]
    http_addr: Option<String>,

    /// Broker address to dial (overrides CORRAL_BUS_ADDR)
    #[arg(long)]
    bus_addr: Option<String>,

    /// Run the bundled broker in-process on the bus address
    #[arg(long)]
    embedded_broker: bool,

    /// Workflow engine base URL (overrides CORRAL_WORKFLOW_URL)
    #[arg(long)]
    workflow_url: Option<String>,

    /// Log to stderr instead of the state-dir log file
    #[arg(long)]
    foreground: bool,
}

fn init_tracing(config: &Config, foreground: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if foreground {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::never(
        config.log_path().parent().unwrap_or(&config.state_dir),
        "corrald.log",
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
    Some(guard)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("corrald: {e}");
            std::process::exit(1);
        }
    };
    if let Some(addr) = args.http_addr {
        config.http_addr = addr;
    }
    if let Some(addr) = args.bus_addr {
        config.bus_addr = addr;
    }
    if args.embedded_broker {
        config.embedded_broker = true;
    }
    if let Some(url) = args.workflow_url {
        config.workflow_url = Some(url);
    }

    if std::fs::create_dir_all(&config.state_dir).is_err() {
        eprintln!("corrald: cannot create state dir {}", config.state_dir.display());
        std::process::exit(1);
    }
    let _log_guard = init_tracing(&config, args.foreground);

    let daemon = match lifecycle::startup(config).await {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("corrald: {e}");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(&daemon.config.http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %daemon.config.http_addr, error = %e, "cannot bind HTTP listener");
            std::process::exit(1);
        }
    };
    info!(addr = %daemon.config.http_addr, "HTTP listening");

    let router = app::router(daemon.state.clone());
    let shutdown = daemon.cancel.clone();
    let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            () = shutdown.cancelled() => {}
        }
    });

    if let Err(e) = serve.await {
        error!(error = %e, "HTTP server error");
    }
    if let Err(e) = daemon.shutdown().await {
        error!(error = %e, "shutdown error");
    }
}
