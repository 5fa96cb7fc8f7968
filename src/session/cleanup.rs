// Session cleanup logic

use crate::{log::Logger, server::ServerContext};

use super::{RtmpSessionState, SessionReadContext};

/// Performs session cleanup after the read loop ends
///
/// A publisher releases its source slot (notifying subscribers), a
/// player detaches from its source. Outstanding buffers tied to the
/// connection are released when the contexts drop.
///
/// # Arguments
///
/// * `logger` - The session logger
/// * `server_context` - The server context
/// * `read_context` - The session read context
pub async fn do_session_cleanup(
    logger: &Logger,
    server_context: &ServerContext,
    read_context: &mut SessionReadContext,
) {
    let config = &server_context.config;

    let status = read_context.session.status.lock().await;

    let state = status.state;
    let stream_url = status.stream_url.clone();
    let session_id = read_context.session.id;

    drop(status);

    let url = match stream_url {
        Some(u) => u,
        None => {
            return; // Never bound to a stream, nothing to do
        }
    };

    match state {
        RtmpSessionState::Publishing => {
            server_context.registry.detach_publisher(&url, session_id).await;

            read_context.read_status.source = None;

            if let Some(mut recorder) = read_context.read_status.recorder.take() {
                let _ = recorder.flush().await;
            }

            if config.log_requests {
                logger.log_info(&format!("DISCONNECTED PUBLISHER: {}", url));
            }
        }
        RtmpSessionState::Playing => {
            server_context.registry.detach_subscriber(&url, session_id).await;

            if config.log_requests {
                logger.log_info(&format!("DISCONNECTED PLAYER: {}", url));
            }
        }
        _ => {}
    }
}
