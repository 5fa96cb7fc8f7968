// Publisher A/V message handling

use std::sync::Arc;

use crate::{log::Logger, rtmp::MediaMessage, server::ServerContext};

use super::SessionReadContext;

/// Handles an audio or video message from a publishing session
///
/// The payload is frozen so the routed message can be shared with every
/// subscriber. When mix correction is on, messages pass through the
/// reorder queue before reaching the source.
///
/// # Return value
///
/// Returns true to continue the session main loop, false to end it
pub async fn handle_rtmp_media(
    mut msg: MediaMessage,
    server_context: &ServerContext,
    read_context: &mut SessionReadContext,
    logger: &Logger,
) -> bool {
    let config = &server_context.config;

    let source = match &read_context.read_status.source {
        Some(s) => s.clone(),
        None => {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug("Ignored A/V message from a non-publishing session");
            }
            return true;
        }
    };

    msg.freeze();
    let msg = Arc::new(msg);

    let ordered: Vec<Arc<MediaMessage>> = match &mut read_context.read_status.mix_queue {
        Some(queue) => queue.push(msg).into_iter().collect(),
        None => vec![msg],
    };

    for m in ordered {
        let mut record_failed = false;

        if let Some(recorder) = &mut read_context.read_status.recorder {
            if let Err(e) = recorder.write_message(&m).await {
                if config.log_requests {
                    logger.log_error(&format!("FLV record write failed: {}", e));
                }
                record_failed = true;
            }
        }

        if record_failed {
            read_context.read_status.recorder = None;
        }

        let mut source_v = source.lock().await;
        source_v.on_media_message(read_context.session.id, m);
    }

    true
}
