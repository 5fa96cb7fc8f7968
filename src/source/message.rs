// Messages sent from a media source to its subscribers

use std::sync::Arc;

use crate::rtmp::MediaMessage;

/// Message delivered to a subscriber's queue
///
/// Media payloads are reference counted; a broadcast shares the same
/// message with every subscriber instead of copying it.
#[derive(Clone)]
pub enum SourceMessage {
    /// Sent once when the subscriber attaches to an active stream.
    /// Carries, in delivery order: metadata, the audio sequence header,
    /// the video sequence header, then the retained GOP cache.
    PlayStart {
        metadata: Option<Arc<MediaMessage>>,
        audio_sh: Option<Arc<MediaMessage>>,
        video_sh: Option<Arc<MediaMessage>>,
        gop_cache: Vec<Arc<MediaMessage>>,
    },

    /// A live A/V message
    PlayPacket { message: Arc<MediaMessage> },

    /// The publisher replaced the stream metadata
    PlayMetadata { metadata: Arc<MediaMessage> },

    /// The publisher went away
    PlayStop {
        /// True when the subscriber should keep waiting for a republish
        republish_possible: bool,
    },
}
