// Publisher data message handling

use std::sync::Arc;

use crate::{
    log::Logger,
    rtmp::{rtmp_build_metadata, MediaMessage, MessageHeader, RtmpData},
    server::ServerContext,
};

use super::SessionReadContext;

/// Handles an AMF0 data message from a publishing session
///
/// @setDataFrame / onMetaData payloads are rebuilt as onMetaData and
/// stored on the source as the stream metadata.
///
/// # Return value
///
/// Returns true to continue the session main loop, false to end it
pub async fn handle_rtmp_data(
    msg: MediaMessage,
    server_context: &ServerContext,
    read_context: &mut SessionReadContext,
    logger: &Logger,
) -> bool {
    let config = &server_context.config;

    let payload = msg.payload.flatten();

    let data = match RtmpData::decode(payload.as_ref()) {
        Ok(d) => d,
        Err(_) => {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug("Could not decode data message");
            }
            return true;
        }
    };

    if config.log_requests && logger.config.trace_enabled {
        logger.log_trace(&format!("DATA RECEIVED: {}", data.to_debug_string()));
    }

    match data.tag.as_str() {
        "@setDataFrame" | "onMetaData" => {
            let source = match &read_context.read_status.source {
                Some(s) => s.clone(),
                None => {
                    if config.log_requests && logger.config.debug_enabled {
                        logger.log_debug("Ignored metadata from a non-publishing session");
                    }
                    return true;
                }
            };

            let metadata_bytes = rtmp_build_metadata(&data);

            let mut metadata_msg = MediaMessage::from_slice(
                MessageHeader::new_data(0, msg.header.timestamp, msg.header.stream_id),
                &metadata_bytes,
            );
            metadata_msg.freeze();

            let metadata_msg = Arc::new(metadata_msg);

            let mut record_failed = false;

            if let Some(recorder) = &mut read_context.read_status.recorder {
                if let Err(e) = recorder.write_message(&metadata_msg).await {
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
            source_v.on_metadata(read_context.session.id, metadata_msg);
        }
        _ => {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug(&format!("Ignored data message: {}", data.tag));
            }
        }
    }

    true
}
