// publish command handling

use std::path::PathBuf;

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::{
    flv::FlvFileWriter,
    log::Logger,
    rtmp::{
        rtmp_make_on_fc_publish, rtmp_make_status_message, MediaMessage, RtmpCommand,
    },
    server::ServerContext,
    session::{session_write_bytes, RtmpSessionState, SessionReadContext},
    source::MixQueue,
};

/// Handles the publish command
///
/// Takes the publisher slot of the named stream; a second publisher for
/// an already-published stream is rejected with a status error.
///
/// # Return value
///
/// Returns true to continue the session main loop, false to end it
pub async fn handle_rtmp_command_publish<
    TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin,
>(
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
            // Anything after '?' would be auth parameters, which this
            // server does not implement
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

    if status.state != RtmpSessionState::ConnectDone
        && status.state != RtmpSessionState::PublishingPending
    {
        drop(status);

        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug("Protocol error: publish in an unexpected state");
        }

        return false;
    }

    if status.created_streams == 0 {
        drop(status);

        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug("Protocol error: publish before createStream");
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
    let publish_stream_id = msg.header.stream_id;

    // Take the publisher slot

    let source = match server_context
        .registry
        .attach_publisher(&stream_url, session_id)
        .await
    {
        Ok(s) => s,
        Err(e) => {
            drop(status);

            if config.log_requests {
                logger.log_info(&format!("PUBLISH REJECTED: {}: {}", stream_url, e));
            }

            let rejection = rtmp_make_status_message(
                publish_stream_id,
                "error",
                "NetStream.Publish.BadName",
                Some("Stream already publishing"),
                config.rtmp.chunk_size,
            );

            let _ = session_write_bytes(write_stream, &rejection).await;

            return false;
        }
    };

    status.state = RtmpSessionState::Publishing;
    status.publish_stream_id = publish_stream_id;
    status.stream_url = Some(stream_url.clone());
    status.request = Some(request.clone());
    drop(status);

    read_context.read_status.source = Some(source);

    if config.live.mix_correct {
        read_context.read_status.mix_queue = Some(MixQueue::new());
    }

    // Stream recording

    if config.live.flv_record {
        let _ = tokio::fs::create_dir_all(&config.live.flv_record_dir).await;

        let mut path = PathBuf::from(&config.live.flv_record_dir);
        path.push(format!("{}.flv", stream_url.replace('/', "_")));

        match FlvFileWriter::create(&path).await {
            Ok(w) => {
                read_context.read_status.recorder = Some(w);

                if config.log_requests {
                    logger.log_info(&format!("RECORDING: {}", path.display()));
                }
            }
            Err(e) => {
                logger.log_error(&format!("Could not create FLV record file: {}", e));
            }
        }
    }

    // Respond

    let fc_publish = rtmp_make_on_fc_publish(&request.stream, config.rtmp.chunk_size);

    if let Err(e) = session_write_bytes(write_stream, &fc_publish).await {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug(&format!("Send error: Could not send onFCPublish: {}", e));
        }
        return false;
    }

    let publish_start = rtmp_make_status_message(
        publish_stream_id,
        "status",
        "NetStream.Publish.Start",
        Some(&format!("Publishing {}.", request.stream)),
        config.rtmp.chunk_size,
    );

    if let Err(e) = session_write_bytes(write_stream, &publish_start).await {
        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug(&format!(
                "Send error: Could not send publish status: {}",
                e
            ));
        }
        return false;
    }

    if config.log_requests {
        logger.log_info(&format!("PUBLISH: {}", stream_url));
    }

    true
}
