// Periodic ping requests

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{mpsc::Receiver, Mutex},
};

use crate::{
    log::Logger,
    rtmp::{rtmp_make_ping_request, RTMP_PING_INTERVAL_SECONDS},
    server::ServerConfiguration,
};

use super::SessionContext;

/// Creates a task to periodically send ping requests to the client
pub fn spawn_task_to_send_pings<TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin + 'static>(
    write_stream: Arc<Mutex<TW>>,
    config: Arc<ServerConfiguration>,
    session_context: SessionContext,
    mut cancel_pings_receiver: Receiver<()>,
    logger: Arc<Logger>,
) {
    tokio::spawn(async move {
        let mut finished = false;

        while !finished {
            // Wait
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(RTMP_PING_INTERVAL_SECONDS)) => {}
                _ = cancel_pings_receiver.recv() => {
                    finished = true;
                    continue;
                }
            }

            // Check status

            let status = session_context.status.lock().await;

            if status.request.is_none() {
                drop(status);
                continue; // Not connected, can't send ping yet
            }

            let connect_time = status.connect_time;
            drop(status);

            let now = Utc::now().timestamp();
            let current_timestamp = now.wrapping_sub(connect_time) as u32;

            let ping_bytes = rtmp_make_ping_request(current_timestamp);

            let mut write_stream_v = write_stream.lock().await;
            let write_result = write_stream_v.write_all(&ping_bytes).await;
            drop(write_stream_v);

            match write_result {
                Ok(_) => {
                    if config.log_requests && logger.config.debug_enabled {
                        logger.log_debug("Sent ping request to client");
                    }
                }
                Err(e) => {
                    if config.log_requests && logger.config.debug_enabled {
                        logger.log_debug(&format!("Could not send ping request: {}", e));
                    }

                    finished = true;
                }
            }
        }
    });
}
