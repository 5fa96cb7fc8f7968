// createStream command handling

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::{
    log::Logger,
    rtmp::{rtmp_make_create_stream_response, RtmpCommand, RTMP_MAX_STREAMS_PER_CONNECTION},
    server::ServerContext,
    session::{session_write_bytes, RtmpSessionState, SessionReadContext},
};

/// Handles the createStream command
///
/// # Return value
///
/// Returns true to continue the session main loop, false to end it
pub async fn handle_rtmp_command_create_stream<
    TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin,
>(
    cmd: &RtmpCommand,
    write_stream: &Mutex<TW>,
    server_context: &ServerContext,
    read_context: &mut SessionReadContext,
    logger: &Logger,
) -> bool {
    let config = &server_context.config;

    let mut status = read_context.session.status.lock().await;

    if status.state == RtmpSessionState::HandshakeDone {
        drop(status);

        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug("Protocol error: createStream before connect");
        }

        return false;
    }

    if status.created_streams >= RTMP_MAX_STREAMS_PER_CONNECTION {
        drop(status);

        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug("Protocol error: Too many streams created");
        }

        return false;
    }

    status.created_streams += 1;
    let stream_index = status.created_streams;
    drop(status);

    let response = rtmp_make_create_stream_response(
        cmd.get_trans_id(),
        stream_index,
        config.rtmp.chunk_size,
    );

    if let Err(e) = session_write_bytes(write_stream, &response).await {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug(&format!(
                "Send error: Could not send createStream response: {}",
                e
            ));
        }
        return false;
    }

    true
}
