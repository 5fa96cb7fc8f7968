// Context types to group session parameters

use std::{net::IpAddr, sync::Arc, time::Instant};

use tokio::sync::{mpsc::Sender, Mutex};

use crate::{
    flv::FlvFileWriter,
    rtmp::{AckWindow, ChunkDecoder},
    source::{MediaSource, MixQueue, SourceMessage},
};

use super::{RtmpSessionState, RtmpSessionStatus};

/// Session context shared between the session's tasks
#[derive(Clone)]
pub struct SessionContext {
    /// Session ID
    pub id: u64,

    /// Client IP address
    pub ip: IpAddr,

    /// Session status
    pub status: Arc<Mutex<RtmpSessionStatus>>,
}

impl SessionContext {
    /// Creates the context for a fresh connection
    pub fn new(id: u64, ip: IpAddr) -> SessionContext {
        SessionContext {
            id,
            ip,
            status: Arc::new(Mutex::new(RtmpSessionStatus::new())),
        }
    }

    /// Gets the current state
    pub async fn state(&self) -> RtmpSessionState {
        let status = self.status.lock().await;
        status.state
    }

    /// Gets the stream URL bound by publish / play, if any
    pub async fn stream_url(&self) -> Option<String> {
        let status = self.status.lock().await;
        status.stream_url.clone()
    }

    /// Gets the play stream id, when the session is a player
    pub async fn play_info(&self) -> (bool, u32) {
        let status = self.status.lock().await;
        (
            status.state == RtmpSessionState::Playing,
            status.play_stream_id,
        )
    }
}

/// State owned by the session read task
pub struct RtmpSessionReadStatus {
    /// Inbound chunk decoder
    pub decoder: ChunkDecoder,

    /// Inbound acknowledgement window
    pub ack_window: AckWindow,

    /// Deadline for the client to acknowledge a redirect
    pub redirect_deadline: Option<Instant>,

    /// The source this session publishes to
    pub source: Option<Arc<Mutex<MediaSource>>>,

    /// Reorder buffer for interleaved A/V, when mix correction is on
    pub mix_queue: Option<MixQueue>,

    /// FLV recorder, when stream recording is on
    pub recorder: Option<FlvFileWriter>,
}

impl RtmpSessionReadStatus {
    /// Creates the read status for a fresh connection
    pub fn new() -> RtmpSessionReadStatus {
        RtmpSessionReadStatus {
            decoder: ChunkDecoder::new(),
            ack_window: AckWindow::new(),
            redirect_deadline: None,
            source: None,
            mix_queue: None,
            recorder: None,
        }
    }
}

impl Default for RtmpSessionReadStatus {
    fn default() -> Self {
        RtmpSessionReadStatus::new()
    }
}

/// Full context of the session read task
pub struct SessionReadContext {
    /// Shared session context
    pub session: SessionContext,

    /// Sender for the subscriber message queue
    pub msg_sender: Sender<SourceMessage>,

    /// Signals the read loop to terminate
    pub kill_sender: Sender<()>,

    /// Read task state
    pub read_status: RtmpSessionReadStatus,
}
