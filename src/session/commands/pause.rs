// pause command handling

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::{
    log::Logger,
    rtmp::{
        rtmp_make_status_message, rtmp_make_stream_status_message, RtmpCommand, STREAM_BEGIN,
        STREAM_EOF,
    },
    server::ServerContext,
    session::{session_write_bytes, RtmpSessionState, SessionReadContext},
};

/// Handles the pause command
///
/// # Return value
///
/// Returns true to continue the session main loop, false to end it
pub async fn handle_rtmp_command_pause<TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin>(
    cmd: &RtmpCommand,
    write_stream: &Mutex<TW>,
    server_context: &ServerContext,
    read_context: &mut SessionReadContext,
    logger: &Logger,
) -> bool {
    let config = &server_context.config;
    let session_id = read_context.session.id;

    let pause = match cmd.get_argument("pause") {
        Some(p) => p.get_bool(),
        None => {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug("Command error: pause flag not provided");
            }
            return true;
        }
    };

    let status = read_context.session.status.lock().await;

    if status.state != RtmpSessionState::Playing {
        drop(status);

        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug("Protocol error: pause while not playing");
        }

        return true;
    }

    let play_stream_id = status.play_stream_id;
    let stream_url = status.stream_url.clone();
    drop(status);

    // Update the source-side pause flag

    if let Some(url) = &stream_url {
        if let Some(source) = server_context.registry.get(url).await {
            let mut source_v = source.lock().await;
            source_v.set_subscriber_paused(session_id, pause);
        }
    }

    if pause {
        let notify = rtmp_make_status_message(
            play_stream_id,
            "status",
            "NetStream.Pause.Notify",
            Some("Paused live"),
            config.rtmp.chunk_size,
        );

        if let Err(e) = session_write_bytes(write_stream, &notify).await {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug(&format!("Send error: Could not send pause notify: {}", e));
            }
            return false;
        }

        let stream_eof = rtmp_make_stream_status_message(STREAM_EOF, play_stream_id);

        if let Err(e) = session_write_bytes(write_stream, &stream_eof).await {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug(&format!("Send error: Could not send stream eof: {}", e));
            }
            return false;
        }
    } else {
        let notify = rtmp_make_status_message(
            play_stream_id,
            "status",
            "NetStream.Unpause.Notify",
            Some("Unpaused live"),
            config.rtmp.chunk_size,
        );

        if let Err(e) = session_write_bytes(write_stream, &notify).await {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug(&format!("Send error: Could not send unpause notify: {}", e));
            }
            return false;
        }

        let stream_begin = rtmp_make_stream_status_message(STREAM_BEGIN, play_stream_id);

        if let Err(e) = session_write_bytes(write_stream, &stream_begin).await {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug(&format!("Send error: Could not send stream begin: {}", e));
            }
            return false;
        }

        // Resuming: replay the sequence headers, after the statuses are
        // on the wire, so the decoder can restart cleanly
        if let Some(url) = &stream_url {
            if let Some(source) = server_context.registry.get(url).await {
                let source_v = source.lock().await;
                source_v.replay_start(session_id);
            }
        }
    }

    true
}
