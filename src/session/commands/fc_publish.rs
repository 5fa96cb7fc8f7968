// FCPublish command handling

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::{
    log::Logger,
    rtmp::{rtmp_make_result_undefined, RtmpCommand},
    server::ServerContext,
    session::{session_write_bytes, RtmpSessionState, SessionReadContext},
};

/// Handles the FCPublish command
///
/// Marks the session as a pending publisher and answers with an empty
/// _result, the way FMLE-style encoders expect.
///
/// # Return value
///
/// Returns true to continue the session main loop, false to end it
pub async fn handle_rtmp_command_fc_publish<
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

    if status.state == RtmpSessionState::ConnectDone {
        status.state = RtmpSessionState::PublishingPending;
    }

    drop(status);

    let response = rtmp_make_result_undefined(cmd.get_trans_id(), config.rtmp.chunk_size);

    if let Err(e) = session_write_bytes(write_stream, &response).await {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug(&format!(
                "Send error: Could not send FCPublish response: {}",
                e
            ));
        }
        return false;
    }

    true
}
