// play command handling

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::{
    log::Logger,
    rtmp::{
        rtmp_make_data_start_message, rtmp_make_sample_access_message,
        rtmp_make_status_message, rtmp_make_stream_status_message, MediaMessage, RtmpCommand,
        STREAM_BEGIN,
    },
    server::ServerContext,
    session::{session_write_bytes, RtmpSessionState, SessionReadContext},
    source::SourceSubscriber,
};

/// Handles the play command
///
/// Attaches the session as a subscriber of the named stream and sends
/// the playback start sequence. The stream state (metadata, sequence
/// headers, GOP cache) arrives through the subscriber queue.
///
/// # Return value
///
/// Returns true to continue the session main loop, false to end it
pub async fn handle_rtmp_command_play<TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin>(
    msg: &MediaMessage,
    cmd: &RtmpCommand,
    write_stream: &Mutex<TW>,
    server_context: &ServerContext,
    read_context: &mut SessionReadContext,
    logger: &Logger,
) -> bool {
    let config = &server_context.config;
    let session_id = read_context.session.id;

    // Load and validate parameters

    let stream_name = match cmd.get_argument("streamName") {
        Some(s) => {
            let name = s.get_string();
            name.split('?').next().unwrap_or("").to_string()
        }
        None => {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug("Command error: streamName not provided");
            }
            return false;
        }
    };

    let mut status = read_context.session.status.lock().await;

    if status.state != RtmpSessionState::ConnectDone {
        drop(status);

        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug("Protocol error: play in an unexpected state");
        }

        return false;
    }

    let mut request = match status.request.clone() {
        Some(r) => r,
        None => {
            drop(status);
            return false;
        }
    };

    request.set_stream(&stream_name);

    if request.stream.is_empty() {
        drop(status);

        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug("Command error: Empty stream name");
        }

        return false;
    }

    let stream_url = request.stream_url();
    let play_stream_id = msg.header.stream_id;

    status.state = RtmpSessionState::Playing;
    status.play_stream_id = play_stream_id;
    status.stream_url = Some(stream_url.clone());
    status.request = Some(request);
    drop(status);

    // Playback start sequence; the subscriber attaches only after these
    // are on the wire, so the primed stream state cannot overtake them

    let stream_begin = rtmp_make_stream_status_message(STREAM_BEGIN, play_stream_id);

    if let Err(e) = session_write_bytes(write_stream, &stream_begin).await {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug(&format!("Send error: Could not send stream begin: {}", e));
        }
        return false;
    }

    for (code, description) in [
        ("NetStream.Play.Reset", "Playing and resetting stream."),
        ("NetStream.Play.Start", "Started playing stream."),
    ] {
        let status_msg = rtmp_make_status_message(
            play_stream_id,
            "status",
            code,
            Some(description),
            config.rtmp.chunk_size,
        );

        if let Err(e) = session_write_bytes(write_stream, &status_msg).await {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug(&format!("Send error: Could not send status message: {}", e));
            }
            return false;
        }
    }

    let sample_access = rtmp_make_sample_access_message(play_stream_id, config.rtmp.chunk_size);

    if let Err(e) = session_write_bytes(write_stream, &sample_access).await {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug(&format!("Send error: Could not send sample access: {}", e));
        }
        return false;
    }

    let data_start = rtmp_make_data_start_message(play_stream_id, config.rtmp.chunk_size);

    if let Err(e) = session_write_bytes(write_stream, &data_start).await {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug(&format!("Send error: Could not send data start: {}", e));
        }
        return false;
    }

    // Attach as subscriber; priming messages arrive on the queue

    server_context
        .registry
        .attach_subscriber(
            &stream_url,
            SourceSubscriber::new(session_id, read_context.msg_sender.clone()),
        )
        .await;

    if config.log_requests {
        logger.log_info(&format!("PLAY: {}", stream_url));
    }

    true
}
