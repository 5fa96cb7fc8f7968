// Connection handling logic

use std::{net::IpAddr, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::{
    log::Logger,
    session::{handle_rtmp_session, SessionContext},
};

use super::{ServerContext, SessionIdGenerator};

/// Handles incoming RTMP connection (after accepting it)
///
/// # Arguments
///
/// * `logger` - The server logger
/// * `server_context` - The server context
/// * `session_id_generator` - The session id generator
/// * `read_stream` - The stream to read from the client
/// * `write_stream` - The stream to write to the client
/// * `ip` - The client IP address
pub async fn handle_connection<
    TR: AsyncRead + AsyncReadExt + Send + Sync + Unpin,
    TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin + 'static,
>(
    logger: Arc<Logger>,
    server_context: ServerContext,
    session_id_generator: Arc<Mutex<SessionIdGenerator>>,
    read_stream: TR,
    write_stream: Arc<Mutex<TW>>,
    ip: IpAddr,
) {
    // Generate an unique ID for the session

    let mut session_id_generator_v = session_id_generator.lock().await;
    let session_id = session_id_generator_v.generate_id();
    drop(session_id_generator_v);

    // Create a logger for the session

    let session_logger = Arc::new(logger.make_child_logger(&format!("[#{}] ", session_id)));

    if server_context.config.log_requests {
        session_logger.log_info(&format!("Connection accepted from {}", ip));
    }

    // Handle session

    handle_rtmp_session(
        session_logger,
        server_context,
        SessionContext::new(session_id, ip),
        read_stream,
        write_stream,
    )
    .await;
}
