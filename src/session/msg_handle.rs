// Subscriber message handling

use std::sync::Arc;

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{
        mpsc::{Receiver, Sender},
        Mutex,
    },
};

use crate::{
    log::Logger,
    rtmp::{
        rtmp_make_status_message, rtmp_make_stream_status_message, MediaMessage, STREAM_EOF,
    },
    server::ServerConfiguration,
    source::{SourceMessage, TimestampJitter},
};

use super::{session_write_chain, session_write_bytes, SessionContext};

/// Writes one shared media message to the subscriber
async fn write_shared_message<TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin>(
    msg: &MediaMessage,
    play_stream_id: u32,
    timestamp: i64,
    write_stream: &Mutex<TW>,
    config: &ServerConfiguration,
) -> Result<(), std::io::Error> {
    let mut chunks = msg.encode_chunks_for_stream(play_stream_id, timestamp, config.rtmp.chunk_size);
    session_write_chain(write_stream, &mut chunks).await
}

/// Handles one message from the source
///
/// # Return value
///
/// Returns true to keep handling messages, false to end the task
pub async fn handle_source_message<TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin>(
    msg: SourceMessage,
    write_stream: &Mutex<TW>,
    config: &ServerConfiguration,
    session_context: &SessionContext,
    jitter: &mut TimestampJitter,
    kill_sender: &Sender<()>,
    logger: &Logger,
) -> bool {
    match msg {
        SourceMessage::PlayStart {
            metadata,
            audio_sh,
            video_sh,
            gop_cache,
        } => {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug("SourceMessage::PlayStart");
            }

            let (is_player, play_stream_id) = session_context.play_info().await;

            if !is_player {
                return true;
            }

            // Delivery order: metadata, audio sequence header, video
            // sequence header, then the GOP cache oldest first

            if let Some(m) = metadata {
                if let Err(e) =
                    write_shared_message(&m, play_stream_id, 0, write_stream, config).await
                {
                    if config.log_requests && logger.config.debug_enabled {
                        logger.log_debug(&format!("Send error: Could not send metadata: {}", e));
                    }
                    return true;
                }
            }

            if let Some(m) = audio_sh {
                if let Err(e) =
                    write_shared_message(&m, play_stream_id, 0, write_stream, config).await
                {
                    if config.log_requests && logger.config.debug_enabled {
                        logger.log_debug(&format!(
                            "Send error: Could not send audio sequence header: {}",
                            e
                        ));
                    }
                    return true;
                }
            }

            if let Some(m) = video_sh {
                if let Err(e) =
                    write_shared_message(&m, play_stream_id, 0, write_stream, config).await
                {
                    if config.log_requests && logger.config.debug_enabled {
                        logger.log_debug(&format!(
                            "Send error: Could not send video sequence header: {}",
                            e
                        ));
                    }
                    return true;
                }
            }

            for packet in gop_cache {
                let ts = jitter.correct(packet.header.timestamp);

                if let Err(e) =
                    write_shared_message(&packet, play_stream_id, ts, write_stream, config).await
                {
                    if config.log_requests && logger.config.debug_enabled {
                        logger.log_debug(&format!(
                            "Send error: Could not send GOP cached packet: {}",
                            e
                        ));
                    }
                    return true;
                }
            }

            true
        }
        SourceMessage::PlayPacket { message } => {
            if config.log_requests && logger.config.trace_enabled {
                logger.log_trace("SourceMessage::PlayPacket");
            }

            let (is_player, play_stream_id) = session_context.play_info().await;

            if !is_player {
                return true;
            }

            let ts = jitter.correct(message.header.timestamp);

            if let Err(e) =
                write_shared_message(&message, play_stream_id, ts, write_stream, config).await
            {
                if config.log_requests && logger.config.debug_enabled {
                    logger.log_debug(&format!("Send error: Could not send packet: {}", e));
                }
            }

            true
        }
        SourceMessage::PlayMetadata { metadata } => {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug("SourceMessage::PlayMetadata");
            }

            let (is_player, play_stream_id) = session_context.play_info().await;

            if !is_player {
                return true;
            }

            if let Err(e) =
                write_shared_message(&metadata, play_stream_id, 0, write_stream, config).await
            {
                if config.log_requests && logger.config.debug_enabled {
                    logger.log_debug(&format!("Send error: Could not send metadata: {}", e));
                }
            }

            true
        }
        SourceMessage::PlayStop { republish_possible } => {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug("SourceMessage::PlayStop");
            }

            let (is_player, play_stream_id) = session_context.play_info().await;

            if !is_player {
                return true;
            }

            let notify = rtmp_make_status_message(
                play_stream_id,
                "status",
                "NetStream.Play.UnpublishNotify",
                Some("stream is now unpublished."),
                config.rtmp.chunk_size,
            );

            let _ = session_write_bytes(write_stream, &notify).await;

            let stream_eof = rtmp_make_stream_status_message(STREAM_EOF, play_stream_id);
            let _ = session_write_bytes(write_stream, &stream_eof).await;

            if republish_possible {
                // Stay attached waiting for the publisher to come back
                true
            } else {
                let _ = kill_sender.try_send(());
                false
            }
        }
    }
}

/// Creates a task to handle the subscriber message queue
///
/// The task ends when the source drops the sender, when a terminal
/// message arrives or when the session is killed.
pub fn spawn_task_session_messages<
    TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin + 'static,
>(
    write_stream: Arc<Mutex<TW>>,
    config: Arc<ServerConfiguration>,
    session_context: SessionContext,
    mut msg_receiver: Receiver<SourceMessage>,
    kill_sender: Sender<()>,
    logger: Arc<Logger>,
) {
    let mut jitter = TimestampJitter::new(config.live.jitter_algorithm);

    tokio::spawn(async move {
        let mut continue_loop = true;

        while continue_loop {
            match msg_receiver.recv().await {
                Some(msg) => {
                    continue_loop = handle_source_message(
                        msg,
                        &write_stream,
                        &config,
                        &session_context,
                        &mut jitter,
                        &kill_sender,
                        &logger,
                    )
                    .await;
                }
                None => {
                    continue_loop = false;
                }
            }
        }

        // Drain the queue so the source never blocks on this subscriber
        while msg_receiver.try_recv().is_ok() {}

        if config.log_requests && logger.config.debug_enabled {
            logger.log_debug("Completed session messages handling task");
        }
    });
}
