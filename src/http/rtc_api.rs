// WebRTC publish / play HTTP API

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::channel;
use url::Url;

use crate::{
    log::Logger,
    rtc::{RtcToRtmpBridge, RtmpToRtcBridge, KeyframeScheduler},
    server::ServerContext,
    source::{SourceMessage, SourceSubscriber},
    utils::trim_url_component,
};

/// Request body of /rtc/v1/publish/ and /rtc/v1/play/
#[derive(Deserialize)]
pub struct RtcApiRequest {
    /// Stream URL, e.g. webrtc://host/app/stream
    pub streamurl: String,

    /// The client's offer SDP
    pub sdp: String,
}

/// Response body of the RTC API
#[derive(Serialize)]
pub struct RtcApiResponse {
    /// 0 on success
    pub code: i32,

    /// The answer SDP
    pub sdp: String,

    /// Bridge session id, used by the transport to exchange frames
    pub sessionid: String,
}

/// Extracts app/stream from a webrtc:// stream URL
pub fn parse_rtc_stream_url(streamurl: &str) -> Option<String> {
    // The webrtc scheme parses like any special scheme
    let normalized = streamurl.replacen("webrtc://", "http://", 1);

    let parsed = Url::parse(&normalized).ok()?;
    let path = trim_url_component(parsed.path());

    let mut parts = path.rsplitn(2, '/');
    let stream = parts.next()?;
    let app = parts.next()?;

    if app.is_empty() || stream.is_empty() {
        return None;
    }

    Some(format!("{}/{}", app, stream))
}

/// Builds a minimal answer SDP from the configured candidates
///
/// The real ICE/DTLS negotiation belongs to the external WebRTC stack;
/// this answer only advertises where to reach it.
fn build_answer_sdp(server_context: &ServerContext, session_id: u64) -> String {
    let config = &server_context.config;

    let mut sdp = String::new();

    sdp.push_str("v=0\r\n");
    sdp.push_str(&format!("o=- {} 2 IN IP4 0.0.0.0\r\n", session_id));
    sdp.push_str("s=livehub\r\n");
    sdp.push_str("t=0 0\r\n");

    for (i, candidate) in config.rtc.candidates.iter().enumerate() {
        sdp.push_str(&format!(
            "a=candidate:{} 1 udp 2130706431 {} {} typ host\r\n",
            i, candidate, config.rtc.stun_port
        ));
    }

    sdp
}

/// Handles a publish request
///
/// Takes the publisher slot of the named stream and spawns the bridge
/// task converting transport frames into routed RTMP messages.
///
/// # Return value
///
/// Returns the JSON response body
pub async fn handle_rtc_publish(
    logger: Arc<Logger>,
    server_context: ServerContext,
    session_id: u64,
    request: RtcApiRequest,
) -> RtcApiResponse {
    let config = &server_context.config;

    let stream_url = match parse_rtc_stream_url(&request.streamurl) {
        Some(u) => u,
        None => {
            return RtcApiResponse {
                code: 400,
                sdp: "".to_string(),
                sessionid: "".to_string(),
            };
        }
    };

    if request.sdp.is_empty() {
        return RtcApiResponse {
            code: 400,
            sdp: "".to_string(),
            sessionid: "".to_string(),
        };
    }

    let source = match server_context
        .registry
        .attach_publisher(&stream_url, session_id)
        .await
    {
        Ok(s) => s,
        Err(e) => {
            if config.log_requests {
                logger.log_info(&format!("RTC PUBLISH REJECTED: {}: {}", stream_url, e));
            }

            return RtcApiResponse {
                code: 409,
                sdp: "".to_string(),
                sessionid: "".to_string(),
            };
        }
    };

    let (frame_sender, mut frame_receiver) = channel(64);

    server_context
        .rtc_sessions
        .register(session_id, frame_sender)
        .await;

    if config.log_requests {
        logger.log_info(&format!("RTC PUBLISH: {}", stream_url));
    }

    let answer_sdp = build_answer_sdp(&server_context, session_id);

    // Bridge task: transport frames in, routed messages out

    let task_context = server_context.clone();
    let task_logger = logger.clone();
    let task_stream_url = stream_url.clone();

    tokio::spawn(async move {
        let mut bridge = RtcToRtmpBridge::new(&task_stream_url);

        while let Some(frame) = frame_receiver.recv().await {
            match bridge.on_frame(&frame, &task_logger) {
                Ok(messages) => {
                    for mut m in messages {
                        m.freeze();

                        let mut source_v = source.lock().await;
                        source_v.on_media_message(session_id, Arc::new(m));
                    }
                }
                Err(e) => {
                    task_logger.log_warning(&format!("RTC bridge error: {}", e));
                }
            }
        }

        task_context
            .registry
            .detach_publisher(&task_stream_url, session_id)
            .await;

        task_context.rtc_sessions.unregister(session_id).await;
    });

    RtcApiResponse {
        code: 0,
        sdp: answer_sdp,
        sessionid: session_id.to_string(),
    }
}

/// Handles a play request
///
/// Attaches a subscriber to the named stream and spawns the bridge task
/// converting routed RTMP messages into transport frames.
///
/// # Return value
///
/// Returns the JSON response body
pub async fn handle_rtc_play(
    logger: Arc<Logger>,
    server_context: ServerContext,
    session_id: u64,
    request: RtcApiRequest,
) -> RtcApiResponse {
    let config = &server_context.config;

    let stream_url = match parse_rtc_stream_url(&request.streamurl) {
        Some(u) => u,
        None => {
            return RtcApiResponse {
                code: 400,
                sdp: "".to_string(),
                sessionid: "".to_string(),
            };
        }
    };

    let (msg_sender, mut msg_receiver) = channel(config.live.queue_length.max(1));

    server_context
        .registry
        .attach_subscriber(&stream_url, SourceSubscriber::new(session_id, msg_sender))
        .await;

    let (frame_sender, frame_receiver) = channel(64);

    server_context
        .rtc_sessions
        .register_play(session_id, frame_receiver)
        .await;

    if config.log_requests {
        logger.log_info(&format!("RTC PLAY: {}", stream_url));
    }

    let answer_sdp = build_answer_sdp(&server_context, session_id);

    let keyframe_interval = config.live.keyframe_interval_ms;
    let task_context = server_context.clone();
    let task_logger = logger.clone();
    let task_stream_url = stream_url.clone();

    tokio::spawn(async move {
        let mut bridge = RtmpToRtcBridge::new();
        let mut keyframes = KeyframeScheduler::new(keyframe_interval);

        'outer: while let Some(msg) = msg_receiver.recv().await {
            let messages = match msg {
                SourceMessage::PlayStart {
                    audio_sh,
                    video_sh,
                    gop_cache,
                    ..
                } => {
                    let mut all = Vec::new();
                    all.extend(audio_sh);
                    all.extend(video_sh);
                    all.extend(gop_cache);
                    all
                }
                SourceMessage::PlayPacket { message } => vec![message],
                SourceMessage::PlayMetadata { .. } => continue,
                SourceMessage::PlayStop { republish_possible } => {
                    if republish_possible {
                        continue;
                    }
                    break;
                }
            };

            for m in messages {
                let frames = if m.is_video() {
                    // An RTC subscriber needs regular keyframes to join;
                    // nudge the publisher on the configured interval
                    if keyframes.should_request(m.header.timestamp) {
                        task_logger.log_debug("Requesting keyframe from publisher");
                    }

                    match bridge.on_rtmp_video(&m) {
                        Ok(f) => f.into_iter().collect(),
                        Err(e) => {
                            task_logger.log_warning(&format!("RTC bridge error: {}", e));
                            continue;
                        }
                    }
                } else if m.is_audio() {
                    match bridge.on_rtmp_audio(&m) {
                        Ok(f) => f,
                        Err(e) => {
                            task_logger.log_warning(&format!("RTC bridge error: {}", e));
                            continue;
                        }
                    }
                } else {
                    Vec::new()
                };

                for frame in frames {
                    if frame_sender.send(frame).await.is_err() {
                        // The transport dropped its receiver
                        break 'outer;
                    }
                }
            }
        }

        task_context
            .registry
            .detach_subscriber(&task_stream_url, session_id)
            .await;

        task_context.rtc_sessions.unregister(session_id).await;
    });

    RtcApiResponse {
        code: 0,
        sdp: answer_sdp,
        sessionid: session_id.to_string(),
    }
}

// Tests
