// Main

mod amf;
mod chain;
mod flv;
mod http;
mod log;
mod rtc;
mod rtmp;
mod server;
mod session;
mod source;
mod utils;

use std::sync::Arc;

use log::{LogConfig, Logger};
use rtc::RtcSessionManager;
use server::{run_server, ServerConfiguration, ServerContext};
use source::SourceRegistry;

fn main() {
    // Load .env
    let _ = dotenvy::dotenv();

    // Initialize logger

    let logger = Logger::new(LogConfig::load_from_env());

    // Print version

    const VERSION: &str = env!("CARGO_PKG_VERSION");

    logger.log_info(&format!("LiveHub media server ({})", VERSION));

    // Load configuration

    let config = match ServerConfiguration::load_from_env(&logger) {
        Ok(c) => Arc::new(c),
        Err(()) => {
            std::process::exit(1);
        }
    };

    // Build the runtime; 0 workers means the core count

    let mut builder = tokio::runtime::Builder::new_multi_thread();

    builder.enable_all();

    if config.live.workers > 0 {
        builder.worker_threads(config.live.workers);
    }

    let runtime = match builder.build() {
        Ok(r) => r,
        Err(e) => {
            logger.log_error(&format!("Could not build the async runtime: {}", e));
            std::process::exit(1);
        }
    };

    runtime.block_on(run(logger, config));
}

async fn run(logger: Logger, config: Arc<ServerConfiguration>) {
    // Global state: the stream registry and the RTC session table

    let registry = Arc::new(SourceRegistry::new(config.live.source_config()));
    let rtc_sessions = Arc::new(RtcSessionManager::new());

    let server_context = ServerContext {
        config,
        registry,
        rtc_sessions,
    };

    tokio::select! {
        _ = run_server(&logger, server_context) => {
            logger.log_error("A listener terminated, shutting down");
        }
        _ = shutdown_signal() => {
            logger.log_info("Shutdown signal received, closing");
        }
    }
}

/// Resolves when a termination signal arrives
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigusr1 =
            signal(SignalKind::user_defined1()).expect("failed to install SIGUSR1 handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
            _ = sigusr1.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
