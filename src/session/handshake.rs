// Session handshake driver

use std::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::Mutex,
    time::timeout,
};

use crate::{
    log::Logger,
    rtmp::{
        generate_s0_s1_s2, parse_proxy_prefix, HandshakeError, PROXY_PROTOCOL_MAGIC,
        RTMP_PING_TIMEOUT_SECONDS, RTMP_SIG_SIZE, RTMP_VERSION,
    },
    server::ServerContext,
};

use super::session_write_bytes;

/// Reads exactly buf.len() bytes with the session read timeout
async fn read_exact_with_timeout<TR: AsyncRead + AsyncReadExt + Send + Sync + Unpin>(
    read_stream: &mut TR,
    buf: &mut [u8],
) -> Result<(), ()> {
    match timeout(
        Duration::from_secs(RTMP_PING_TIMEOUT_SECONDS),
        read_stream.read_exact(buf),
    )
    .await
    {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) => Err(()),
        Err(_) => Err(()),
    }
}

/// Performs the server side of the RTMP handshake
///
/// Handles the optional proxy-protocol prefix, answers C0C1 with S0S1S2
/// (complex when the C1 digest validates, simple otherwise) and accepts
/// C2 without digest validation.
///
/// # Return value
///
/// Returns true when the handshake completed, false when the session
/// must be closed
pub async fn session_handshake<
    TR: AsyncRead + AsyncReadExt + Send + Sync + Unpin,
    TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin,
>(
    read_stream: &mut TR,
    write_stream: &Mutex<TW>,
    server_context: &ServerContext,
    logger: &Logger,
) -> bool {
    let config = &server_context.config;

    // C0, possibly preceded by a proxy-protocol prefix

    let mut version = [0u8; 1];

    if read_exact_with_timeout(read_stream, &mut version).await.is_err() {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug("BAD HANDSHAKE: Could not read C0");
        }
        return false;
    }

    if version[0] == PROXY_PROTOCOL_MAGIC {
        let mut len_bytes = [0u8; 2];

        if read_exact_with_timeout(read_stream, &mut len_bytes).await.is_err() {
            return false;
        }

        let mut prefix = vec![PROXY_PROTOCOL_MAGIC, len_bytes[0], len_bytes[1]];
        let payload_len = ((len_bytes[0] as usize) << 8) | (len_bytes[1] as usize);

        let mut payload = vec![0u8; payload_len];

        if payload_len > 0 {
            if read_exact_with_timeout(read_stream, &mut payload).await.is_err() {
                return false;
            }
        }

        prefix.extend_from_slice(&payload);

        match parse_proxy_prefix(&prefix) {
            Ok(parsed) => {
                if let Some(real_ip) = parsed.real_ip {
                    if config.log_requests {
                        logger.log_info(&format!("Proxied connection, real client: {}", real_ip));
                    }
                }
            }
            Err(_) => {
                if config.log_requests {
                    logger.log_error("BAD HANDSHAKE: Invalid proxy prefix");
                }
                return false;
            }
        }

        // The actual C0 follows the prefix
        if read_exact_with_timeout(read_stream, &mut version).await.is_err() {
            return false;
        }
    }

    if version[0] != RTMP_VERSION {
        if config.log_requests {
            logger.log_error(&format!(
                "BAD HANDSHAKE: Unsupported RTMP version: {}",
                version[0]
            ));
        }
        return false;
    }

    // C1

    let mut c1 = vec![0u8; RTMP_SIG_SIZE];

    if read_exact_with_timeout(read_stream, &mut c1).await.is_err() {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug("BAD HANDSHAKE: Could not read C1");
        }
        return false;
    }

    // S0 S1 S2

    let response = match generate_s0_s1_s2(&c1, logger) {
        Ok(r) => r,
        Err(HandshakeError::TryOthers) => {
            // generate_s0_s1_s2 already falls back internally; any
            // TryOthers reaching here is a bug turned disconnect
            return false;
        }
        Err(e) => {
            if config.log_requests {
                logger.log_error(&format!("BAD HANDSHAKE: {}", e));
            }
            return false;
        }
    };

    if let Err(e) = session_write_bytes(write_stream, &response).await {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug(&format!("BAD HANDSHAKE: Could not send S0S1S2: {}", e));
        }
        return false;
    }

    // C2, accepted without digest validation for interop

    let mut c2 = vec![0u8; RTMP_SIG_SIZE];

    if read_exact_with_timeout(read_stream, &mut c2).await.is_err() {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug("BAD HANDSHAKE: Could not read C2");
        }
        return false;
    }

    if config.log_requests && logger.config.debug_enabled {
        logger.log_debug("Handshake completed");
    }

    true
}
