// connect command handling

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::{
    log::Logger,
    rtmp::{
        rtmp_make_chunk_size_set_message, rtmp_make_connect_rejected_redirect,
        rtmp_make_connect_response, rtmp_make_on_bw_done, rtmp_make_peer_bandwidth_set_message,
        rtmp_make_window_ack, RtmpCommand, RtmpRequest, RTMP_PEER_BANDWIDTH,
        RTMP_PEER_BANDWIDTH_DYNAMIC, RTMP_REDIRECT_ACK_TIMEOUT_SECONDS, RTMP_WINDOW_ACK_SIZE,
    },
    server::ServerContext,
    session::{session_write_bytes, RtmpSessionState, SessionReadContext},
};

/// Handles the connect command
///
/// Replies with the flow-control preamble (window ack size, peer
/// bandwidth, chunk size), the _result and onBWDone. When a redirect is
/// configured, replies with the rejection carrying the redirect target
/// and waits for the client's acknowledgement.
///
/// # Return value
///
/// Returns true to continue the session main loop, false to end it
pub async fn handle_rtmp_command_connect<TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin>(
    cmd: &RtmpCommand,
    write_stream: &Mutex<TW>,
    server_context: &ServerContext,
    read_context: &mut SessionReadContext,
    logger: &Logger,
) -> bool {
    let config = &server_context.config;

    // Validate state

    let mut status = read_context.session.status.lock().await;

    if status.state != RtmpSessionState::HandshakeDone {
        drop(status);

        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug("Protocol error: Connect received, but already connected");
        }

        return false;
    }

    // Parse the request

    let request = match RtmpRequest::from_connect_command(cmd) {
        Ok(r) => r,
        Err(()) => {
            drop(status);

            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug("Command error: Invalid connect command");
            }

            return false;
        }
    };

    if config.log_requests {
        logger.log_info(&format!(
            "CONNECT: app={}, vhost={}, tcUrl={}",
            request.app, request.vhost, request.tc_url
        ));
    }

    let object_encoding = request.object_encoding;
    let trans_id = cmd.get_trans_id();

    // Redirect configured: reject and wait for the acknowledgement

    if let Some(redirect_tc_url) = &config.rtmp.redirect_tc_url {
        status.state = RtmpSessionState::Redirecting;
        status.request = Some(request.clone());
        drop(status);

        let full_url = format!("{}/{}", redirect_tc_url, request.stream);

        let rejection = rtmp_make_connect_rejected_redirect(
            redirect_tc_url,
            &full_url,
            config.rtmp.chunk_size,
        );

        if let Err(e) = session_write_bytes(write_stream, &rejection).await {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug(&format!("Send error: Could not send redirect: {}", e));
            }
            return false;
        }

        read_context.read_status.redirect_deadline =
            Some(Instant::now() + Duration::from_secs(RTMP_REDIRECT_ACK_TIMEOUT_SECONDS));

        if config.log_requests {
            logger.log_info(&format!("REDIRECT: {}", redirect_tc_url));
        }

        return true;
    }

    // Accept the connection

    status.state = RtmpSessionState::ConnectDone;
    status.request = Some(request);
    status.connect_time = Utc::now().timestamp();
    drop(status);

    // Flow-control preamble

    let window_ack = rtmp_make_window_ack(RTMP_WINDOW_ACK_SIZE);

    if let Err(e) = session_write_bytes(write_stream, &window_ack).await {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug(&format!("Send error: Could not send window ack: {}", e));
        }
        return false;
    }

    let peer_bw =
        rtmp_make_peer_bandwidth_set_message(RTMP_PEER_BANDWIDTH, RTMP_PEER_BANDWIDTH_DYNAMIC);

    if let Err(e) = session_write_bytes(write_stream, &peer_bw).await {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug(&format!("Send error: Could not send peer bandwidth: {}", e));
        }
        return false;
    }

    let chunk_size = rtmp_make_chunk_size_set_message(config.rtmp.chunk_size as u32);

    if let Err(e) = session_write_bytes(write_stream, &chunk_size).await {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug(&format!("Send error: Could not send chunk size: {}", e));
        }
        return false;
    }

    // Connect response

    let response = rtmp_make_connect_response(
        trans_id,
        object_encoding,
        &config.version,
        config.rtmp.chunk_size,
    );

    if let Err(e) = session_write_bytes(write_stream, &response).await {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug(&format!("Send error: Could not send connect response: {}", e));
        }
        return false;
    }

    let bw_done = rtmp_make_on_bw_done(config.rtmp.chunk_size);

    if let Err(e) = session_write_bytes(write_stream, &bw_done).await {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug(&format!("Send error: Could not send onBWDone: {}", e));
        }
        return false;
    }

    true
}
