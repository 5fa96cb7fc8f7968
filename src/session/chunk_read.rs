// Session read loop body

use std::time::{Duration, Instant};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::{mpsc::Receiver, Mutex},
    time::timeout,
};

use crate::{
    log::Logger,
    rtmp::{rtmp_make_ack, RTMP_PING_TIMEOUT_SECONDS},
    server::ServerContext,
};

use super::{handle_rtmp_message, session_write_bytes, SessionReadContext};

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Reads from the socket once and handles every complete message
///
/// # Return value
///
/// Returns true to continue the session main loop, false to end it
pub async fn session_read_cycle<
    TR: AsyncRead + AsyncReadExt + Send + Sync + Unpin,
    TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin,
>(
    read_stream: &mut TR,
    write_stream: &Mutex<TW>,
    server_context: &ServerContext,
    read_context: &mut SessionReadContext,
    kill_receiver: &mut Receiver<()>,
    logger: &Logger,
) -> bool {
    let config = &server_context.config;

    // A pending redirect shortens the read deadline to its acknowledgement
    // window; otherwise the ping timeout applies
    let read_timeout = match read_context.read_status.redirect_deadline {
        Some(deadline) => {
            let now = Instant::now();

            if deadline <= now {
                if config.log_requests && logger.config.debug_enabled {
                    logger.log_debug("Redirect not acknowledged in time, closing");
                }
                return false;
            }

            deadline - now
        }
        None => Duration::from_secs(RTMP_PING_TIMEOUT_SECONDS),
    };

    let mut buf = [0u8; READ_BUFFER_SIZE];

    let bytes_read = tokio::select! {
        r = timeout(read_timeout, read_stream.read(&mut buf)) => {
            match r {
                Ok(Ok(0)) => {
                    if config.log_requests && logger.config.debug_enabled {
                        logger.log_debug("Connection closed by peer");
                    }
                    return false;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    if config.log_requests && logger.config.debug_enabled {
                        logger.log_debug(&format!("Read error: {}", e));
                    }
                    return false;
                }
                Err(_) => {
                    if config.log_requests && logger.config.debug_enabled {
                        match read_context.read_status.redirect_deadline {
                            Some(_) => logger.log_debug("Redirect not acknowledged in time, closing"),
                            None => logger.log_debug("Read timed out, closing"),
                        }
                    }
                    return false;
                }
            }
        }
        _ = kill_receiver.recv() => {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug("Session killed");
            }
            return false;
        }
    };

    // Acknowledge received bytes when the window requires it

    if let Some(sequence_number) = read_context
        .read_status
        .ack_window
        .on_bytes_received(bytes_read as u64)
    {
        let ack = rtmp_make_ack(sequence_number);

        if session_write_bytes(write_stream, &ack).await.is_err() {
            return false;
        }
    }

    // Decode and handle every message completed by this read

    read_context.read_status.decoder.push_bytes(&buf[..bytes_read]);

    loop {
        let msg = match read_context.read_status.decoder.poll_message() {
            Ok(Some(m)) => m,
            Ok(None) => break,
            Err(e) => {
                if config.log_requests {
                    logger.log_error(&format!("Protocol error: {}", e));
                }
                return false;
            }
        };

        if !handle_rtmp_message(msg, write_stream, server_context, read_context, logger).await {
            return false;
        }
    }

    true
}
