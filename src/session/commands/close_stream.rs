// FCUnpublish / closeStream / deleteStream command handling

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::{
    log::Logger,
    rtmp::{
        rtmp_make_on_fc_unpublish, rtmp_make_result_undefined, rtmp_make_status_message,
        RtmpCommand,
    },
    server::ServerContext,
    session::{session_write_bytes, RtmpSessionState, SessionReadContext},
};

/// Handles the commands that end publishing or playing
///
/// A publisher receives onFCUnpublish, the command _result and the
/// unpublish status, then returns to the connected state. A player is
/// detached from its source.
///
/// # Return value
///
/// Returns true to continue the session main loop, false to end it
pub async fn handle_rtmp_command_close_stream<
    TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin,
>(
    cmd: &RtmpCommand,
    write_stream: &Mutex<TW>,
    server_context: &ServerContext,
    read_context: &mut SessionReadContext,
    logger: &Logger,
) -> bool {
    let config = &server_context.config;
    let session_id = read_context.session.id;

    let mut status = read_context.session.status.lock().await;

    let state = status.state;
    let stream_url = status.stream_url.clone();
    let publish_stream_id = status.publish_stream_id;

    match state {
        RtmpSessionState::Publishing => {
            status.state = RtmpSessionState::ConnectDone;
            status.stream_url = None;

            let stream = match &status.request {
                Some(r) => r.stream.clone(),
                None => "".to_string(),
            };

            drop(status);

            // Detach from the source

            if let Some(url) = &stream_url {
                server_context.registry.detach_publisher(url, session_id).await;

                if config.log_requests {
                    logger.log_info(&format!("UNPUBLISH: {}", url));
                }
            }

            read_context.read_status.source = None;
            read_context.read_status.mix_queue = None;

            if let Some(mut recorder) = read_context.read_status.recorder.take() {
                let _ = recorder.flush().await;
            }

            // Respond

            let fc_unpublish = rtmp_make_on_fc_unpublish(&stream, config.rtmp.chunk_size);

            if let Err(e) = session_write_bytes(write_stream, &fc_unpublish).await {
                if config.log_requests && logger.config.debug_enabled {
                    logger.log_debug(&format!("Send error: Could not send onFCUnpublish: {}", e));
                }
                return false;
            }

            let result = rtmp_make_result_undefined(cmd.get_trans_id(), config.rtmp.chunk_size);

            if let Err(e) = session_write_bytes(write_stream, &result).await {
                if config.log_requests && logger.config.debug_enabled {
                    logger.log_debug(&format!("Send error: Could not send result: {}", e));
                }
                return false;
            }

            let unpublish_status = rtmp_make_status_message(
                publish_stream_id,
                "status",
                "NetStream.Unpublish.Success",
                Some("Stream is now unpublished."),
                config.rtmp.chunk_size,
            );

            if let Err(e) = session_write_bytes(write_stream, &unpublish_status).await {
                if config.log_requests && logger.config.debug_enabled {
                    logger.log_debug(&format!(
                        "Send error: Could not send unpublish status: {}",
                        e
                    ));
                }
                return false;
            }

            true
        }
        RtmpSessionState::Playing => {
            status.state = RtmpSessionState::ConnectDone;
            status.stream_url = None;
            drop(status);

            if let Some(url) = &stream_url {
                server_context
                    .registry
                    .detach_subscriber(url, session_id)
                    .await;

                if config.log_requests {
                    logger.log_info(&format!("STOP PLAY: {}", url));
                }
            }

            let result = rtmp_make_result_undefined(cmd.get_trans_id(), config.rtmp.chunk_size);

            if let Err(e) = session_write_bytes(write_stream, &result).await {
                if config.log_requests && logger.config.debug_enabled {
                    logger.log_debug(&format!("Send error: Could not send result: {}", e));
                }
                return false;
            }

            true
        }
        _ => {
            drop(status);

            let result = rtmp_make_result_undefined(cmd.get_trans_id(), config.rtmp.chunk_size);

            session_write_bytes(write_stream, &result).await.is_ok()
        }
    }
}
