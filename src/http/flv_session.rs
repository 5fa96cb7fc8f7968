// HTTP-FLV subscriber session

use std::sync::Arc;

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::{mpsc::channel, Mutex},
};

use crate::{
    flv::{encode_flv_tag, flv_file_header, FLV_TAG_AUDIO, FLV_TAG_SCRIPT, FLV_TAG_VIDEO},
    log::Logger,
    rtmp::{MediaMessage, RTMP_TYPE_AUDIO, RTMP_TYPE_VIDEO},
    server::ServerContext,
    source::{SourceMessage, SourceSubscriber, TimestampJitter},
    utils::trim_url_component,
};

/// Extracts the stream URL from an .flv request path
///
/// /app/stream.flv maps to app/stream
pub fn flv_path_to_stream_url(path: &str) -> Option<String> {
    let trimmed = trim_url_component(path);

    let without_ext = trimmed.strip_suffix(".flv")?;

    let mut parts = without_ext.rsplitn(2, '/');
    let stream = parts.next()?;
    let app = parts.next()?;

    if app.is_empty() || stream.is_empty() {
        return None;
    }

    Some(format!("{}/{}", app, stream))
}

/// Gets the FLV tag type for a routed message
fn flv_tag_type(msg: &MediaMessage) -> u8 {
    match msg.header.message_type {
        RTMP_TYPE_AUDIO => FLV_TAG_AUDIO,
        RTMP_TYPE_VIDEO => FLV_TAG_VIDEO,
        _ => FLV_TAG_SCRIPT,
    }
}

/// Serves one HTTP-FLV subscriber
///
/// Attaches to the source like any RTMP subscriber and wraps the same
/// message payloads in FLV tags over a progressive HTTP response.
pub async fn handle_flv_subscriber<
    TR: AsyncRead + AsyncReadExt + Send + Sync + Unpin,
    TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin,
>(
    logger: Arc<Logger>,
    server_context: ServerContext,
    session_id: u64,
    stream_url: String,
    read_stream: &mut TR,
    write_stream: &Mutex<TW>,
) {
    let config = &server_context.config;

    // Response head and FLV file header

    let response_head = b"HTTP/1.1 200 OK\r\n\
Content-Type: video/x-flv\r\n\
Connection: close\r\n\
Cache-Control: no-cache\r\n\
\r\n";

    {
        let mut write_stream_v = write_stream.lock().await;

        if write_stream_v.write_all(response_head).await.is_err() {
            return;
        }

        if write_stream_v
            .write_all(&flv_file_header(true, true))
            .await
            .is_err()
        {
            return;
        }
    }

    // Attach as subscriber

    let (msg_sender, mut msg_receiver) = channel(config.live.queue_length.max(1));

    server_context
        .registry
        .attach_subscriber(&stream_url, SourceSubscriber::new(session_id, msg_sender))
        .await;

    if config.log_requests {
        logger.log_info(&format!("PLAY (HTTP-FLV): {}", stream_url));
    }

    let mut jitter = TimestampJitter::new(config.live.jitter_algorithm);

    // Drain messages until the stream or the client goes away

    let mut client_probe = [0u8; 1024];

    loop {
        tokio::select! {
            msg = msg_receiver.recv() => {
                let msg = match msg {
                    Some(m) => m,
                    None => break,
                };

                let tags: Vec<Vec<u8>> = match msg {
                    SourceMessage::PlayStart {
                        metadata,
                        audio_sh,
                        video_sh,
                        gop_cache,
                    } => {
                        let mut tags = Vec::new();

                        if let Some(m) = metadata {
                            tags.push(encode_flv_tag(FLV_TAG_SCRIPT, 0, m.payload.flatten().as_ref()));
                        }

                        if let Some(m) = audio_sh {
                            tags.push(encode_flv_tag(FLV_TAG_AUDIO, 0, m.payload.flatten().as_ref()));
                        }

                        if let Some(m) = video_sh {
                            tags.push(encode_flv_tag(FLV_TAG_VIDEO, 0, m.payload.flatten().as_ref()));
                        }

                        for m in gop_cache {
                            let ts = jitter.correct(m.header.timestamp) as u32;
                            tags.push(encode_flv_tag(flv_tag_type(&m), ts, m.payload.flatten().as_ref()));
                        }

                        tags
                    }
                    SourceMessage::PlayPacket { message } => {
                        let ts = jitter.correct(message.header.timestamp) as u32;
                        vec![encode_flv_tag(
                            flv_tag_type(&message),
                            ts,
                            message.payload.flatten().as_ref(),
                        )]
                    }
                    SourceMessage::PlayMetadata { metadata } => {
                        vec![encode_flv_tag(
                            FLV_TAG_SCRIPT,
                            0,
                            metadata.payload.flatten().as_ref(),
                        )]
                    }
                    SourceMessage::PlayStop { republish_possible } => {
                        if republish_possible {
                            continue;
                        }

                        break;
                    }
                };

                let mut write_stream_v = write_stream.lock().await;
                let mut failed = false;

                for tag in tags {
                    if write_stream_v.write_all(&tag).await.is_err() {
                        failed = true;
                        break;
                    }
                }

                drop(write_stream_v);

                if failed {
                    break;
                }
            }
            r = read_stream.read(&mut client_probe) => {
                // The client never sends anything else; data or EOF both
                // end the session
                match r {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        }
    }

    // Detach

    server_context
        .registry
        .detach_subscriber(&stream_url, session_id)
        .await;

    if config.log_requests {
        logger.log_info(&format!("STOP PLAY (HTTP-FLV): {}", stream_url));
    }
}

// Tests
