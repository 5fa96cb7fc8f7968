// WebRTC bridge module

mod bridge;
mod frame;
mod nalu;
mod rtp;
mod session;
mod transcoder;

pub use bridge::*;
pub use frame::*;
pub use nalu::*;
pub use rtp::*;
pub use session::*;
pub use transcoder::*;

use thiserror::Error;

/// Errors produced by the RTC bridge
#[derive(Debug, Error)]
pub enum RtcError {
    /// An RTP packet could not be parsed
    #[error("malformed RTP packet")]
    MalformedRtp,

    /// The audio transcoder failed
    #[error("audio transcode failed: {0}")]
    Transcode(String),
}
