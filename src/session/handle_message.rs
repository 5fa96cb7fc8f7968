// Decoded message dispatch

use byteorder::{BigEndian, ByteOrder};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::{
    log::Logger,
    rtmp::{
        rtmp_make_ping_response, MediaMessage, PING_REQUEST, RTMP_TYPE_ABORT,
        RTMP_TYPE_ACKNOWLEDGEMENT, RTMP_TYPE_AUDIO, RTMP_TYPE_DATA, RTMP_TYPE_EVENT,
        RTMP_TYPE_FLEX_MESSAGE, RTMP_TYPE_FLEX_STREAM, RTMP_TYPE_INVOKE,
        RTMP_TYPE_SET_CHUNK_SIZE, RTMP_TYPE_SET_PEER_BANDWIDTH,
        RTMP_TYPE_WINDOW_ACKNOWLEDGEMENT_SIZE, RTMP_TYPE_VIDEO,
    },
    server::ServerContext,
};

use super::{
    handle_rtmp_data, handle_rtmp_invoke, handle_rtmp_media, session_write_bytes,
    SessionReadContext,
};

/// Handles one decoded RTMP message
///
/// Control messages take effect inline, before any later message on the
/// connection is decoded. A/V, data and command messages are dispatched
/// to their handlers.
///
/// # Return value
///
/// Returns true to continue the session main loop, false to end it
pub async fn handle_rtmp_message<TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin>(
    msg: MediaMessage,
    write_stream: &Mutex<TW>,
    server_context: &ServerContext,
    read_context: &mut SessionReadContext,
    logger: &Logger,
) -> bool {
    let config = &server_context.config;

    match msg.header.message_type {
        RTMP_TYPE_SET_CHUNK_SIZE => {
            let payload = msg.payload.flatten();

            if payload.len() < 4 {
                if config.log_requests {
                    logger.log_error("Protocol error: Malformed SetChunkSize");
                }
                return false;
            }

            let size = BigEndian::read_u32(&payload[0..4]) as usize;

            match read_context.read_status.decoder.set_in_chunk_size(size) {
                Ok(()) => {
                    if config.log_requests && logger.config.debug_enabled {
                        logger.log_debug(&format!("Peer chunk size: {}", size));
                    }
                    true
                }
                Err(e) => {
                    if config.log_requests {
                        logger.log_error(&format!("Protocol error: {}", e));
                    }
                    false
                }
            }
        }
        RTMP_TYPE_ABORT => {
            // No partial message tracking across aborts is required;
            // the peer abandoning a message mid-chunk ends the session
            // at the next malformed header anyway
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug("Abort message received");
            }
            true
        }
        RTMP_TYPE_ACKNOWLEDGEMENT => true,
        RTMP_TYPE_WINDOW_ACKNOWLEDGEMENT_SIZE => {
            let payload = msg.payload.flatten();

            if payload.len() < 4 {
                if config.log_requests {
                    logger.log_error("Protocol error: Malformed WindowAckSize");
                }
                return false;
            }

            let window = BigEndian::read_u32(&payload[0..4]);
            read_context.read_status.ack_window.window = window;

            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug(&format!("Peer window ack size: {}", window));
            }

            true
        }
        RTMP_TYPE_SET_PEER_BANDWIDTH => true,
        RTMP_TYPE_EVENT => {
            let payload = msg.payload.flatten();

            if payload.len() < 2 {
                if config.log_requests {
                    logger.log_error("Protocol error: Malformed user control message");
                }
                return false;
            }

            let event_type = BigEndian::read_u16(&payload[0..2]);

            if event_type == PING_REQUEST {
                if payload.len() < 6 {
                    if config.log_requests {
                        logger.log_error("Protocol error: Malformed ping request");
                    }
                    return false;
                }

                let echo = BigEndian::read_u32(&payload[2..6]);
                let pong = rtmp_make_ping_response(echo);

                if let Err(e) = session_write_bytes(write_stream, &pong).await {
                    if config.log_requests && logger.config.debug_enabled {
                        logger.log_debug(&format!("Could not send ping response: {}", e));
                    }
                    return false;
                }
            }

            true
        }
        RTMP_TYPE_AUDIO | RTMP_TYPE_VIDEO => {
            handle_rtmp_media(msg, server_context, read_context, logger).await
        }
        RTMP_TYPE_DATA | RTMP_TYPE_FLEX_STREAM => {
            handle_rtmp_data(msg, server_context, read_context, logger).await
        }
        RTMP_TYPE_INVOKE | RTMP_TYPE_FLEX_MESSAGE => {
            handle_rtmp_invoke(msg, write_stream, server_context, read_context, logger).await
        }
        other => {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug(&format!("Ignored message of type {}", other));
            }
            true
        }
    }
}
