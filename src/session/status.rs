// RTMP session status model

use crate::rtmp::RtmpRequest;

/// Connection state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RtmpSessionState {
    /// Handshake completed, connect not received yet
    HandshakeDone,

    /// connect accepted
    ConnectDone,

    /// releaseStream / FCPublish received, publish expected
    PublishingPending,

    /// Actively publishing
    Publishing,

    /// Actively playing
    Playing,

    /// A redirect was sent, waiting for the client acknowledgement
    Redirecting,
}

/// RTMP session status, shared between the session tasks
pub struct RtmpSessionStatus {
    /// Current connection state
    pub state: RtmpSessionState,

    /// The parsed connect request
    pub request: Option<RtmpRequest>,

    /// Number of streams allocated by createStream
    pub created_streams: u32,

    /// ID of the internal RTMP stream used for publishing
    pub publish_stream_id: u32,

    /// ID of the internal RTMP stream used for playing
    pub play_stream_id: u32,

    /// Registry key this session publishes or plays
    pub stream_url: Option<String>,

    /// Unix timestamp of the connect, for ping timestamps
    pub connect_time: i64,
}

impl RtmpSessionStatus {
    /// Creates the status for a fresh connection
    pub fn new() -> RtmpSessionStatus {
        RtmpSessionStatus {
            state: RtmpSessionState::HandshakeDone,
            request: None,
            created_streams: 0,
            publish_stream_id: 0,
            play_stream_id: 0,
            stream_url: None,
            connect_time: 0,
        }
    }
}

impl Default for RtmpSessionStatus {
    fn default() -> Self {
        RtmpSessionStatus::new()
    }
}
