// Media source: one named stream with a publisher and its subscribers

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::Sender;

use crate::flv::{is_audio_sequence_header, is_video_keyframe, is_video_sequence_header};
use crate::rtmp::MediaMessage;

use super::SourceMessage;

/// Errors surfaced by source operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    /// A second publisher tried to take an already-published stream
    #[error("the stream already has an active publisher")]
    PublisherConflict,
}

/// Behavior knobs for every source, taken from the live configuration
#[derive(Clone)]
pub struct SourceConfig {
    /// Retain a GOP cache for late joiners
    pub gop_enabled: bool,

    /// Byte cap for the GOP cache
    pub gop_cache_max_bytes: usize,

    /// Capacity of each subscriber's message queue
    pub queue_length: usize,

    /// Terminate subscribers when the publisher goes away
    /// (false keeps them waiting for a republish)
    pub terminate_subscribers_on_unpublish: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            gop_enabled: true,
            gop_cache_max_bytes: 256 * 1024 * 1024,
            queue_length: 8,
            terminate_subscribers_on_unpublish: true,
        }
    }
}

/// A subscriber attached to a source
pub struct SourceSubscriber {
    /// Owning session id
    pub id: u64,

    /// The subscriber's message queue
    pub sender: Sender<SourceMessage>,

    /// Deliver audio messages
    pub receive_audio: bool,

    /// Deliver video messages
    pub receive_video: bool,

    /// Playback is paused
    pub paused: bool,

    /// The queue overflowed; messages are shed until the next keyframe
    dropping: bool,
}

impl SourceSubscriber {
    /// Creates a subscriber handle
    pub fn new(id: u64, sender: Sender<SourceMessage>) -> SourceSubscriber {
        SourceSubscriber {
            id,
            sender,
            receive_audio: true,
            receive_video: true,
            paused: false,
            dropping: false,
        }
    }
}

/// Named fan-out hub for one published stream
///
/// At most one publisher is active at any instant. Subscribers joining
/// mid-stream are primed with the metadata, sequence headers and the GOP
/// cache before live messages.
pub struct MediaSource {
    /// Registry key (vhost/app/stream)
    pub stream_url: String,

    config: SourceConfig,

    publisher_id: Option<u64>,

    subscribers: HashMap<u64, SourceSubscriber>,

    metadata: Option<Arc<MediaMessage>>,
    audio_sh: Option<Arc<MediaMessage>>,
    video_sh: Option<Arc<MediaMessage>>,

    gop_cache: VecDeque<Arc<MediaMessage>>,
    gop_cache_bytes: usize,
}

impl MediaSource {
    /// Creates an empty source
    pub fn new(stream_url: &str, config: SourceConfig) -> MediaSource {
        MediaSource {
            stream_url: stream_url.to_string(),
            config,
            publisher_id: None,
            subscribers: HashMap::new(),
            metadata: None,
            audio_sh: None,
            video_sh: None,
            gop_cache: VecDeque::new(),
            gop_cache_bytes: 0,
        }
    }

    /// True when neither a publisher nor subscribers remain
    pub fn is_idle(&self) -> bool {
        self.publisher_id.is_none() && self.subscribers.is_empty()
    }

    /// True when a publisher is active
    pub fn is_publishing(&self) -> bool {
        self.publisher_id.is_some()
    }

    /// Number of attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Takes the publisher slot
    pub fn attach_publisher(&mut self, publisher_id: u64) -> Result<(), SourceError> {
        if self.publisher_id.is_some() {
            return Err(SourceError::PublisherConflict);
        }

        self.publisher_id = Some(publisher_id);

        Ok(())
    }

    /// Releases the publisher slot and notifies subscribers
    ///
    /// Depending on configuration, subscribers either terminate or stay
    /// attached waiting for a republish. Cached stream state is dropped
    /// either way.
    pub fn detach_publisher(&mut self, publisher_id: u64) {
        if self.publisher_id != Some(publisher_id) {
            return;
        }

        self.publisher_id = None;
        self.metadata = None;
        self.audio_sh = None;
        self.video_sh = None;
        self.clear_gop();

        let republish_possible = !self.config.terminate_subscribers_on_unpublish;

        for sub in self.subscribers.values_mut() {
            let _ = sub.sender.try_send(SourceMessage::PlayStop { republish_possible });
        }
    }

    /// Attaches a subscriber and primes it with the current stream state
    pub fn attach_subscriber(&mut self, subscriber: SourceSubscriber) {
        if self.is_publishing() {
            let start = SourceMessage::PlayStart {
                metadata: self.metadata.clone(),
                audio_sh: self.audio_sh.clone(),
                video_sh: self.video_sh.clone(),
                gop_cache: if self.config.gop_enabled {
                    self.gop_cache.iter().cloned().collect()
                } else {
                    Vec::new()
                },
            };

            let _ = subscriber.sender.try_send(start);
        }

        self.subscribers.insert(subscriber.id, subscriber);
    }

    /// Detaches a subscriber
    pub fn detach_subscriber(&mut self, subscriber_id: u64) {
        self.subscribers.remove(&subscriber_id);
    }

    /// Updates a subscriber's pause state
    pub fn set_subscriber_paused(&mut self, subscriber_id: u64, paused: bool) {
        if let Some(sub) = self.subscribers.get_mut(&subscriber_id) {
            sub.paused = paused;
        }
    }

    /// Updates a subscriber's audio / video delivery flags
    pub fn set_subscriber_receive(
        &mut self,
        subscriber_id: u64,
        receive_audio: Option<bool>,
        receive_video: Option<bool>,
    ) {
        if let Some(sub) = self.subscribers.get_mut(&subscriber_id) {
            if let Some(a) = receive_audio {
                sub.receive_audio = a;
            }

            if let Some(v) = receive_video {
                sub.receive_video = v;
            }
        }
    }

    /// Replays the current stream state to one subscriber
    /// Used when a paused subscriber resumes
    pub fn replay_start(&self, subscriber_id: u64) {
        if let Some(sub) = self.subscribers.get(&subscriber_id) {
            if self.is_publishing() {
                let start = SourceMessage::PlayStart {
                    metadata: self.metadata.clone(),
                    audio_sh: self.audio_sh.clone(),
                    video_sh: self.video_sh.clone(),
                    gop_cache: Vec::new(),
                };

                let _ = sub.sender.try_send(start);
            }
        }
    }

    /// Stores new stream metadata and broadcasts it
    pub fn on_metadata(&mut self, publisher_id: u64, metadata: Arc<MediaMessage>) {
        if self.publisher_id != Some(publisher_id) {
            return;
        }

        self.metadata = Some(metadata.clone());

        for sub in self.subscribers.values_mut() {
            if sub.paused {
                continue;
            }

            let _ = sub
                .sender
                .try_send(SourceMessage::PlayMetadata { metadata: metadata.clone() });
        }
    }

    /// Routes one A/V message from the publisher
    ///
    /// Sequence headers are retained and replace the previous ones. A new
    /// video sequence header resets the GOP cache. Everything is broadcast
    /// to the attached subscribers.
    pub fn on_media_message(&mut self, publisher_id: u64, msg: Arc<MediaMessage>) {
        if self.publisher_id != Some(publisher_id) {
            return;
        }

        let payload = msg.payload.flatten();

        if msg.is_video() && is_video_sequence_header(payload.as_ref()) {
            self.video_sh = Some(msg.clone());
            self.clear_gop();
        } else if msg.is_audio() && is_audio_sequence_header(payload.as_ref()) {
            self.audio_sh = Some(msg.clone());
        } else if self.config.gop_enabled {
            // The cache holds the messages since the last video keyframe
            if msg.is_video() && is_video_keyframe(payload.as_ref()) {
                self.clear_gop();
            }

            self.gop_cache_bytes += msg.payload.len();
            self.gop_cache.push_back(msg.clone());

            while self.gop_cache_bytes > self.config.gop_cache_max_bytes {
                match self.gop_cache.pop_front() {
                    Some(dropped) => {
                        self.gop_cache_bytes -= dropped.payload.len();
                    }
                    None => break,
                }
            }
        }

        let is_keyframe = msg.is_video() && is_video_keyframe(payload.as_ref());

        self.broadcast(msg, is_keyframe);
    }

    /// Fans one message out to every subscriber
    ///
    /// A subscriber whose queue is full stops receiving until the next
    /// video keyframe, so a slow consumer loses whole GOPs instead of
    /// arbitrary mid-GOP messages.
    fn broadcast(&mut self, msg: Arc<MediaMessage>, is_keyframe: bool) {
        let is_audio = msg.is_audio();
        let is_video = msg.is_video();

        for sub in self.subscribers.values_mut() {
            if sub.paused {
                continue;
            }

            if is_audio && !sub.receive_audio {
                continue;
            }

            if is_video && !sub.receive_video {
                continue;
            }

            if sub.dropping && !is_keyframe {
                continue;
            }

            match sub
                .sender
                .try_send(SourceMessage::PlayPacket { message: msg.clone() })
            {
                Ok(()) => {
                    sub.dropping = false;
                }
                Err(_) => {
                    sub.dropping = true;
                }
            }
        }
    }

    /// Drops the GOP cache
    pub fn clear_gop(&mut self) {
        self.gop_cache.clear();
        self.gop_cache_bytes = 0;
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtmp::MessageHeader;
    use tokio::sync::mpsc::{channel, Receiver};

    fn audio_sh() -> Arc<MediaMessage> {
        Arc::new(MediaMessage::from_slice(
            MessageHeader::new_audio(0, 0, 1),
            &[0xAF, 0x00, 0x12, 0x10],
        ))
    }

    fn video_sh() -> Arc<MediaMessage> {
        Arc::new(MediaMessage::from_slice(
            MessageHeader::new_video(0, 0, 1),
            &[0x17, 0x00, 0x00, 0x00, 0x00, 0x01],
        ))
    }

    fn keyframe(ts: i64) -> Arc<MediaMessage> {
        Arc::new(MediaMessage::from_slice(
            MessageHeader::new_video(0, ts, 1),
            &[0x17, 0x01, 0x00, 0x00, 0x00, 0xAB],
        ))
    }

    fn interframe(ts: i64) -> Arc<MediaMessage> {
        Arc::new(MediaMessage::from_slice(
            MessageHeader::new_video(0, ts, 1),
            &[0x27, 0x01, 0x00, 0x00, 0x00, 0xCD],
        ))
    }

    fn metadata_msg() -> Arc<MediaMessage> {
        Arc::new(MediaMessage::from_slice(
            MessageHeader::new_data(0, 0, 1),
            &[0x02, 0x00, 0x0A, 0x6F, 0x6E, 0x4D, 0x65, 0x74, 0x61, 0x44, 0x61, 0x74, 0x61],
        ))
    }

    fn subscriber(id: u64, cap: usize) -> (SourceSubscriber, Receiver<SourceMessage>) {
        let (tx, rx) = channel(cap);
        (SourceSubscriber::new(id, tx), rx)
    }

    #[test]
    fn test_single_publisher_invariant() {
        let mut source = MediaSource::new("live/demo", SourceConfig::default());

        assert!(source.attach_publisher(1).is_ok());
        assert_eq!(source.attach_publisher(2), Err(SourceError::PublisherConflict));

        source.detach_publisher(1);
        assert!(source.attach_publisher(2).is_ok());
    }

    #[test]
    fn test_subscriber_priming_order() {
        let mut source = MediaSource::new("live/demo", SourceConfig::default());
        source.attach_publisher(1).unwrap();

        source.on_metadata(1, metadata_msg());
        source.on_media_message(1, audio_sh());
        source.on_media_message(1, video_sh());
        source.on_media_message(1, keyframe(0));
        source.on_media_message(1, interframe(40));
        source.on_media_message(1, interframe(80));

        let (sub, mut rx) = subscriber(10, 16);
        source.attach_subscriber(sub);

        match rx.try_recv().unwrap() {
            SourceMessage::PlayStart {
                metadata,
                audio_sh,
                video_sh,
                gop_cache,
            } => {
                assert!(metadata.is_some());
                assert!(audio_sh.is_some());
                assert!(video_sh.is_some());

                // GOP: keyframe first, then the inter frames in order
                assert_eq!(gop_cache.len(), 3);
                assert_eq!(gop_cache[0].header.timestamp, 0);
                assert_eq!(gop_cache[1].header.timestamp, 40);
                assert_eq!(gop_cache[2].header.timestamp, 80);
            }
            _ => panic!("expected PlayStart"),
        }

        // Live messages follow in broadcast order
        source.on_media_message(1, interframe(120));

        match rx.try_recv().unwrap() {
            SourceMessage::PlayPacket { message } => {
                assert_eq!(message.header.timestamp, 120);
            }
            _ => panic!("expected PlayPacket"),
        }
    }

    #[test]
    fn test_gop_cache_resets_on_keyframe() {
        let mut source = MediaSource::new("live/demo", SourceConfig::default());
        source.attach_publisher(1).unwrap();

        source.on_media_message(1, keyframe(0));
        source.on_media_message(1, interframe(40));
        source.on_media_message(1, keyframe(1000));
        source.on_media_message(1, interframe(1040));

        let (sub, mut rx) = subscriber(10, 16);
        source.attach_subscriber(sub);

        match rx.try_recv().unwrap() {
            SourceMessage::PlayStart { gop_cache, .. } => {
                assert_eq!(gop_cache.len(), 2);
                assert_eq!(gop_cache[0].header.timestamp, 1000);
                assert_eq!(gop_cache[1].header.timestamp, 1040);
            }
            _ => panic!("expected PlayStart"),
        }
    }

    #[test]
    fn test_gop_cache_resets_on_sequence_header() {
        let mut source = MediaSource::new("live/demo", SourceConfig::default());
        source.attach_publisher(1).unwrap();

        source.on_media_message(1, keyframe(0));
        source.on_media_message(1, interframe(40));

        // A new sequence header (encoder reconfiguration) clears the cache
        source.on_media_message(1, video_sh());

        let (sub, mut rx) = subscriber(10, 16);
        source.attach_subscriber(sub);

        match rx.try_recv().unwrap() {
            SourceMessage::PlayStart { gop_cache, video_sh, .. } => {
                assert!(gop_cache.is_empty());
                assert!(video_sh.is_some());
            }
            _ => panic!("expected PlayStart"),
        }
    }

    #[test]
    fn test_sequence_headers_track_latest() {
        let mut source = MediaSource::new("live/demo", SourceConfig::default());
        source.attach_publisher(1).unwrap();

        source.on_media_message(1, audio_sh());

        let second_sh = Arc::new(MediaMessage::from_slice(
            MessageHeader::new_audio(0, 500, 1),
            &[0xAF, 0x00, 0x11, 0x90],
        ));
        source.on_media_message(1, second_sh);

        let (sub, mut rx) = subscriber(10, 16);
        source.attach_subscriber(sub);

        match rx.try_recv().unwrap() {
            SourceMessage::PlayStart { audio_sh, .. } => {
                let sh = audio_sh.unwrap();
                assert_eq!(sh.payload.flatten().as_ref(), &[0xAF, 0x00, 0x11, 0x90]);
            }
            _ => panic!("expected PlayStart"),
        }
    }

    #[test]
    fn test_saturated_subscriber_drops_until_keyframe() {
        let config = SourceConfig {
            queue_length: 1,
            ..SourceConfig::default()
        };

        let mut source = MediaSource::new("live/demo", config);

        // Attach before the publisher so no PlayStart occupies the queue
        let (sub, mut rx) = subscriber(10, 1);
        source.attach_subscriber(sub);

        source.attach_publisher(1).unwrap();

        // Fills the single-slot queue
        source.on_media_message(1, interframe(0));
        // Overflows: subscriber enters dropping state
        source.on_media_message(1, interframe(40));
        // Still dropping: non-keyframes are shed without a send attempt
        source.on_media_message(1, interframe(80));

        // Drain the queue
        match rx.try_recv().unwrap() {
            SourceMessage::PlayPacket { message } => {
                assert_eq!(message.header.timestamp, 0);
            }
            _ => panic!("expected PlayPacket"),
        }
        assert!(rx.try_recv().is_err());

        // A non-keyframe is still shed
        source.on_media_message(1, interframe(120));
        assert!(rx.try_recv().is_err());

        // The next keyframe resumes delivery
        source.on_media_message(1, keyframe(160));

        match rx.try_recv().unwrap() {
            SourceMessage::PlayPacket { message } => {
                assert_eq!(message.header.timestamp, 160);
            }
            _ => panic!("expected PlayPacket"),
        }
    }

    #[test]
    fn test_publisher_gone_notifies_subscribers() {
        let mut source = MediaSource::new("live/demo", SourceConfig::default());
        source.attach_publisher(1).unwrap();
        source.on_media_message(1, keyframe(0));

        let (sub, mut rx) = subscriber(10, 16);
        source.attach_subscriber(sub);
        let _ = rx.try_recv(); // PlayStart

        source.detach_publisher(1);

        match rx.try_recv().unwrap() {
            SourceMessage::PlayStop { republish_possible } => {
                assert!(!republish_possible);
            }
            _ => panic!("expected PlayStop"),
        }

        // Cached state is gone
        assert!(!source.is_publishing());
        assert!(!source.is_idle()); // subscriber still attached

        source.detach_subscriber(10);
        assert!(source.is_idle());
    }

    #[test]
    fn test_receive_flags_filter_media() {
        let mut source = MediaSource::new("live/demo", SourceConfig::default());

        // Attach before the publisher so no PlayStart occupies the queue
        let (sub, mut rx) = subscriber(10, 16);
        source.attach_subscriber(sub);
        source.set_subscriber_receive(10, Some(true), Some(false));

        source.attach_publisher(1).unwrap();

        source.on_media_message(1, interframe(0));
        assert!(rx.try_recv().is_err());

        let audio = Arc::new(MediaMessage::from_slice(
            MessageHeader::new_audio(0, 0, 1),
            &[0xAF, 0x01, 0x21],
        ));
        source.on_media_message(1, audio);
        assert!(rx.try_recv().is_ok());
    }
}
