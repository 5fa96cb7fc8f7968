// Server module

mod config;
mod connection_handle;
mod context;
mod session_id_generator;
mod tcp;

pub use config::*;
pub use connection_handle::*;
pub use context::*;
pub use session_id_generator::*;
pub use tcp::*;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{http::http_server, log::Logger};

/// Runs the RTMP and HTTP listeners
///
/// Returns when a listener fails or shuts down.
pub async fn run_server(logger: &Logger, server_context: ServerContext) {
    let session_id_generator = Arc::new(Mutex::new(SessionIdGenerator::new()));

    let (end_notifier_rtmp, mut end_receiver_rtmp) = tokio::sync::mpsc::channel::<()>(1);

    tcp_server(
        Arc::new(logger.make_child_logger("[SERVER:RTMP] ")),
        server_context.clone(),
        session_id_generator.clone(),
        end_notifier_rtmp,
    );

    let (end_notifier_http, mut end_receiver_http) = tokio::sync::mpsc::channel::<()>(1);

    http_server(
        Arc::new(logger.make_child_logger("[SERVER:HTTP] ")),
        server_context,
        session_id_generator,
        end_notifier_http,
    );

    tokio::select! {
        _ = end_receiver_rtmp.recv() => {}
        _ = end_receiver_http.recv() => {}
    }
}
