// Interleaved A/V timestamp reordering

use std::collections::VecDeque;
use std::sync::Arc;

use crate::rtmp::MediaMessage;

/// Number of messages held back for reordering
const MIX_QUEUE_DEPTH: usize = 5;

/// Small reorder buffer that releases interleaved audio and video
/// messages in timestamp order
///
/// Encoders that mux audio and video on separate clocks can interleave
/// messages slightly out of order; holding a handful of messages and
/// releasing the earliest one smooths the sequence.
pub struct MixQueue {
    queue: VecDeque<Arc<MediaMessage>>,
}

impl MixQueue {
    /// Creates an empty queue
    pub fn new() -> MixQueue {
        MixQueue {
            queue: VecDeque::new(),
        }
    }

    /// Inserts a message, keeping the queue sorted by timestamp
    ///
    /// # Return value
    ///
    /// Returns the earliest message once the queue is over depth
    pub fn push(&mut self, msg: Arc<MediaMessage>) -> Option<Arc<MediaMessage>> {
        let pos = self
            .queue
            .iter()
            .rposition(|m| m.header.timestamp <= msg.header.timestamp)
            .map(|p| p + 1)
            .unwrap_or(0);

        self.queue.insert(pos, msg);

        if self.queue.len() > MIX_QUEUE_DEPTH {
            self.queue.pop_front()
        } else {
            None
        }
    }

    /// Drains the remaining messages in timestamp order
    pub fn drain(&mut self) -> Vec<Arc<MediaMessage>> {
        self.queue.drain(..).collect()
    }
}

impl Default for MixQueue {
    fn default() -> Self {
        MixQueue::new()
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtmp::{MediaMessage, MessageHeader};

    fn msg(ts: i64) -> Arc<MediaMessage> {
        Arc::new(MediaMessage::from_slice(
            MessageHeader::new_audio(0, ts, 1),
            &[0u8; 1],
        ))
    }

    #[test]
    fn test_reorders_interleaved_timestamps() {
        let mut queue = MixQueue::new();
        let mut released = Vec::new();

        for ts in [0, 40, 20, 80, 60, 120, 100, 160, 140, 200] {
            if let Some(m) = queue.push(msg(ts)) {
                released.push(m.header.timestamp);
            }
        }

        released.extend(queue.drain().iter().map(|m| m.header.timestamp));

        assert_eq!(released, vec![0, 20, 40, 60, 80, 100, 120, 140, 160, 200]);
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let mut queue = MixQueue::new();

        // Audio and video at the same timestamp
        let audio = Arc::new(MediaMessage::from_slice(
            MessageHeader::new_audio(0, 40, 1),
            &[1u8],
        ));
        let video = Arc::new(MediaMessage::from_slice(
            MessageHeader::new_video(0, 40, 1),
            &[2u8],
        ));

        queue.push(audio);
        queue.push(video);

        let drained = queue.drain();
        assert!(drained[0].is_audio());
        assert!(drained[1].is_video());
    }
}
