// Invoke message handling

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::{
    log::Logger,
    rtmp::{
        rtmp_make_result_number, rtmp_make_result_undefined, MediaMessage, RtmpCommand,
        RTMP_TYPE_FLEX_MESSAGE,
    },
    server::ServerContext,
};

use super::{
    handle_rtmp_command_close_stream, handle_rtmp_command_connect,
    handle_rtmp_command_create_stream, handle_rtmp_command_fc_publish,
    handle_rtmp_command_pause, handle_rtmp_command_play, handle_rtmp_command_publish,
    handle_rtmp_command_receive, session_write_bytes, RtmpSessionState, SessionReadContext,
};

/// Handles an RTMP command message
///
/// # Return value
///
/// Returns true to continue the session main loop, false to end it
pub async fn handle_rtmp_invoke<TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin>(
    msg: MediaMessage,
    write_stream: &Mutex<TW>,
    server_context: &ServerContext,
    read_context: &mut SessionReadContext,
    logger: &Logger,
) -> bool {
    let config = &server_context.config;

    let payload = msg.payload.flatten();

    // AMF3 command messages carry a leading format byte
    let offset: usize = if msg.header.message_type == RTMP_TYPE_FLEX_MESSAGE {
        1
    } else {
        0
    };

    if payload.len() <= offset {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug("Packet error: Command message too short");
        }
        return false;
    }

    let cmd = match RtmpCommand::decode(&payload[offset..]) {
        Ok(c) => c,
        Err(_) => {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug("Packet error: Could not decode RTMP command");
            }
            return false;
        }
    };

    if config.log_requests && logger.config.trace_enabled {
        logger.log_trace(&format!("COMMAND: {}", cmd.to_debug_string()));
    }

    match cmd.cmd.as_str() {
        "connect" => {
            handle_rtmp_command_connect(&cmd, write_stream, server_context, read_context, logger)
                .await
        }
        "createStream" => {
            handle_rtmp_command_create_stream(&cmd, write_stream, server_context, read_context, logger)
                .await
        }
        "publish" => {
            handle_rtmp_command_publish(
                &msg,
                &cmd,
                write_stream,
                server_context,
                read_context,
                logger,
            )
            .await
        }
        "play" => {
            handle_rtmp_command_play(
                &msg,
                &cmd,
                write_stream,
                server_context,
                read_context,
                logger,
            )
            .await
        }
        "pause" => {
            handle_rtmp_command_pause(&cmd, write_stream, server_context, read_context, logger)
                .await
        }
        "releaseStream" => {
            let response =
                rtmp_make_result_undefined(cmd.get_trans_id(), config.rtmp.chunk_size);

            session_write_bytes(write_stream, &response).await.is_ok()
        }
        "FCPublish" => {
            handle_rtmp_command_fc_publish(&cmd, write_stream, server_context, read_context, logger)
                .await
        }
        "FCUnpublish" | "closeStream" | "deleteStream" => {
            handle_rtmp_command_close_stream(&cmd, write_stream, server_context, read_context, logger)
                .await
        }
        "receiveAudio" | "receiveVideo" => {
            handle_rtmp_command_receive(&cmd, server_context, read_context, logger).await
        }
        "getStreamLength" => {
            // Live streams have no length
            let response = rtmp_make_result_number(cmd.get_trans_id(), 0.0, config.rtmp.chunk_size);

            session_write_bytes(write_stream, &response).await.is_ok()
        }
        "_error" => {
            // The only _error the server waits for is the redirect ack
            let state = read_context.session.state().await;

            if state == RtmpSessionState::Redirecting {
                if config.log_requests && logger.config.debug_enabled {
                    logger.log_debug("Redirect acknowledged by client, closing");
                }
                return false;
            }

            true
        }
        _ => {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug(&format!("Unrecognized command: {}", cmd.cmd));
            }

            true
        }
    }
}
