// RTC frame model

use bytes::Bytes;

/// Kind of an RTC frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RtcFrameKind {
    Audio,
    Video,
}

/// A media frame handed over by the WebRTC transport
///
/// Video frames carry H.264 Annex-B payloads; audio frames carry the
/// full RTP packet with an Opus payload. ntp_time_ms is zero or negative
/// until the transport has received a sender report.
#[derive(Clone)]
pub struct RtcFrame {
    /// Audio or video
    pub kind: RtcFrameKind,

    /// Wall-clock-aligned timestamp in milliseconds
    pub ntp_time_ms: i64,

    /// True for video keyframes
    pub key_frame: bool,

    /// Audio sample rate in Hz
    pub sample_rate: u32,

    /// Audio channel count
    pub channels: u8,

    /// Frame payload
    pub payload: Bytes,
}

impl RtcFrame {
    /// Creates a video frame
    pub fn video(ntp_time_ms: i64, key_frame: bool, payload: Bytes) -> RtcFrame {
        RtcFrame {
            kind: RtcFrameKind::Video,
            ntp_time_ms,
            key_frame,
            sample_rate: 0,
            channels: 0,
            payload,
        }
    }

    /// Creates an audio frame from an RTP packet
    pub fn audio(ntp_time_ms: i64, sample_rate: u32, channels: u8, payload: Bytes) -> RtcFrame {
        RtcFrame {
            kind: RtcFrameKind::Audio,
            ntp_time_ms,
            key_frame: false,
            sample_rate,
            channels,
            payload,
        }
    }
}
