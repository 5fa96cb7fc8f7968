// RTMP message model and outbound chunk encoding

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::chain::ByteChain;

use super::{
    RTMP_CHANNEL_AUDIO, RTMP_CHANNEL_DATA, RTMP_CHANNEL_INVOKE, RTMP_CHANNEL_VIDEO,
    RTMP_CHUNK_TYPE_0, RTMP_CHUNK_TYPE_3, RTMP_EXTENDED_TIMESTAMP, RTMP_TYPE_AUDIO,
    RTMP_TYPE_DATA, RTMP_TYPE_INVOKE, RTMP_TYPE_VIDEO,
};

/// Header of an RTMP message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message type
    pub message_type: u8,

    /// Payload length in bytes
    pub payload_length: u32,

    /// Timestamp in milliseconds
    pub timestamp: i64,

    /// Message stream ID
    pub stream_id: u32,

    /// Chunk stream the message prefers for its chunks
    pub prefer_chunk_id: u32,
}

impl MessageHeader {
    /// Creates a blank header
    pub fn new_blank() -> MessageHeader {
        MessageHeader {
            message_type: 0,
            payload_length: 0,
            timestamp: 0,
            stream_id: 0,
            prefer_chunk_id: 0,
        }
    }

    /// Creates a header for an audio message
    pub fn new_audio(payload_length: u32, timestamp: i64, stream_id: u32) -> MessageHeader {
        MessageHeader {
            message_type: RTMP_TYPE_AUDIO,
            payload_length,
            timestamp,
            stream_id,
            prefer_chunk_id: RTMP_CHANNEL_AUDIO,
        }
    }

    /// Creates a header for a video message
    pub fn new_video(payload_length: u32, timestamp: i64, stream_id: u32) -> MessageHeader {
        MessageHeader {
            message_type: RTMP_TYPE_VIDEO,
            payload_length,
            timestamp,
            stream_id,
            prefer_chunk_id: RTMP_CHANNEL_VIDEO,
        }
    }

    /// Creates a header for an AMF0 data message
    pub fn new_data(payload_length: u32, timestamp: i64, stream_id: u32) -> MessageHeader {
        MessageHeader {
            message_type: RTMP_TYPE_DATA,
            payload_length,
            timestamp,
            stream_id,
            prefer_chunk_id: RTMP_CHANNEL_DATA,
        }
    }

    /// Creates a header for an AMF0 command message
    pub fn new_invoke(payload_length: u32, stream_id: u32) -> MessageHeader {
        MessageHeader {
            message_type: RTMP_TYPE_INVOKE,
            payload_length,
            timestamp: 0,
            stream_id,
            prefer_chunk_id: RTMP_CHANNEL_INVOKE,
        }
    }
}

/// An assembled RTMP message with its payload chain
///
/// While assembling, the payload is exclusively owned. Freezing it allows
/// the message to be shared with every subscriber without copying.
#[derive(Debug, PartialEq)]
pub struct MediaMessage {
    /// Message header
    pub header: MessageHeader,

    /// Message payload
    pub payload: ByteChain,
}

impl MediaMessage {
    /// Creates a message from a header and payload chain
    pub fn new(header: MessageHeader, payload: ByteChain) -> MediaMessage {
        MediaMessage { header, payload }
    }

    /// Creates a message copying the payload bytes
    pub fn from_slice(mut header: MessageHeader, payload: &[u8]) -> MediaMessage {
        header.payload_length = payload.len() as u32;

        MediaMessage {
            header,
            payload: ByteChain::from_slice(payload),
        }
    }

    /// True for audio messages
    pub fn is_audio(&self) -> bool {
        self.header.message_type == RTMP_TYPE_AUDIO
    }

    /// True for video messages
    pub fn is_video(&self) -> bool {
        self.header.message_type == RTMP_TYPE_VIDEO
    }

    /// True for AMF0 data messages
    pub fn is_data(&self) -> bool {
        self.header.message_type == RTMP_TYPE_DATA
    }

    /// True for AMF0 command messages
    pub fn is_invoke(&self) -> bool {
        self.header.message_type == RTMP_TYPE_INVOKE
    }

    /// Promotes the payload to shared storage so the message can be
    /// handed to several subscribers
    pub fn freeze(&mut self) {
        self.payload.freeze();
    }

    /// Returns a shallow copy sharing the payload blocks
    pub fn share(&self) -> MediaMessage {
        MediaMessage {
            header: self.header.clone(),
            payload: self.payload.share(),
        }
    }

    /// Encodes the message into wire chunks for a specific message stream
    ///
    /// Subscribers play on their own stream id and with their own
    /// (jitter-corrected) timestamps; the shared payload is not copied,
    /// only the header is rebuilt.
    pub fn encode_chunks_for_stream(
        &self,
        stream_id: u32,
        timestamp: i64,
        out_chunk_size: usize,
    ) -> ByteChain {
        let mut header = self.header.clone();
        header.stream_id = stream_id;
        header.timestamp = timestamp;

        let reheaded = MediaMessage {
            header,
            payload: self.payload.share(),
        };

        reheaded.encode_chunks(out_chunk_size)
    }

    /// Serializes a basic header
    ///
    /// # Arguments
    ///
    /// * `fmt` - Chunk format (0..=3)
    /// * `cid` - Chunk stream ID
    pub fn serialize_basic_header(fmt: u8, cid: u32) -> Vec<u8> {
        if cid >= 64 + 256 {
            vec![
                (fmt << 6) | 1,
                ((cid - 64) & 0xff) as u8,
                (((cid - 64) >> 8) & 0xff) as u8,
            ]
        } else if cid >= 64 {
            vec![fmt << 6, (cid - 64) as u8]
        } else {
            vec![(fmt << 6) | (cid as u8)]
        }
    }

    /// Serializes the fmt-0 message header (11 bytes)
    fn serialize_message_header(&self) -> Vec<u8> {
        let mut out = vec![0u8; 11];

        let ts_field: u32 = if self.header.timestamp >= RTMP_EXTENDED_TIMESTAMP as i64 {
            RTMP_EXTENDED_TIMESTAMP
        } else {
            self.header.timestamp as u32
        };

        let mut b = [0u8; 4];
        BigEndian::write_u32(&mut b, ts_field);
        out[0..3].copy_from_slice(&b[1..]);

        BigEndian::write_u32(&mut b, self.header.payload_length);
        out[3..6].copy_from_slice(&b[1..]);

        out[6] = self.header.message_type;

        LittleEndian::write_u32(&mut out[7..11], self.header.stream_id);

        out
    }

    /// Encodes the message into wire chunks
    ///
    /// Emits one fmt-0 chunk with the full header followed by fmt-3
    /// continuation chunks until the payload is exhausted. The payload
    /// blocks are shared into the output, not copied.
    pub fn encode_chunks(&self, out_chunk_size: usize) -> ByteChain {
        let cid = self.header.prefer_chunk_id;

        let basic_header_0 = Self::serialize_basic_header(RTMP_CHUNK_TYPE_0, cid);
        let basic_header_3 = Self::serialize_basic_header(RTMP_CHUNK_TYPE_3, cid);
        let message_header = self.serialize_message_header();

        let use_extended_timestamp = self.header.timestamp >= RTMP_EXTENDED_TIMESTAMP as i64;

        let mut ext_ts = [0u8; 4];
        BigEndian::write_u32(&mut ext_ts, self.header.timestamp as u32);

        let mut head: Vec<u8> =
            Vec::with_capacity(basic_header_0.len() + message_header.len() + 4);
        head.extend_from_slice(&basic_header_0);
        head.extend_from_slice(&message_header);

        if use_extended_timestamp {
            head.extend_from_slice(&ext_ts);
        }

        let mut out = ByteChain::from_slice(&head);

        let mut payload = self.payload.share();
        let mut first_chunk = true;

        while !payload.is_empty() {
            if !first_chunk {
                let mut continuation = basic_header_3.clone();

                if use_extended_timestamp {
                    continuation.extend_from_slice(&ext_ts);
                }

                out.append(ByteChain::from_slice(&continuation));
            }

            first_chunk = false;

            let take = out_chunk_size.min(payload.len());

            // disjoint leaves [0, take) in place and returns the rest
            let rest = payload
                .disjoint(take)
                .expect("take never exceeds the payload length");

            out.append(std::mem::replace(&mut payload, rest));
        }

        out
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_header_forms() {
        assert_eq!(MediaMessage::serialize_basic_header(0, 3), vec![0x03]);
        assert_eq!(MediaMessage::serialize_basic_header(3, 3), vec![0xC3]);
        assert_eq!(MediaMessage::serialize_basic_header(0, 64), vec![0x00, 0x00]);
        assert_eq!(MediaMessage::serialize_basic_header(0, 100), vec![0x00, 36]);
        assert_eq!(
            MediaMessage::serialize_basic_header(0, 320),
            vec![0x01, 0x00, 0x01]
        );
    }

    #[test]
    fn test_encode_single_chunk() {
        let msg = MediaMessage::from_slice(MessageHeader::new_video(0, 1000, 1), &[0xAA; 10]);

        let encoded = msg.encode_chunks(128).flatten();

        // basic(1) + message header(11) + payload(10)
        assert_eq!(encoded.len(), 22);
        assert_eq!(encoded[0], 0x05); // fmt 0, cid 5
        assert_eq!(&encoded[1..4], &[0x00, 0x03, 0xE8]); // timestamp 1000
        assert_eq!(&encoded[4..7], &[0x00, 0x00, 0x0A]); // length 10
        assert_eq!(encoded[7], RTMP_TYPE_VIDEO);
        assert_eq!(&encoded[8..12], &[1, 0, 0, 0]); // stream id LE
        assert_eq!(&encoded[12..], &[0xAA; 10]);
    }

    #[test]
    fn test_encode_multiple_chunks() {
        let payload = vec![0x55u8; 300];
        let msg = MediaMessage::from_slice(MessageHeader::new_audio(0, 0, 1), &payload);

        let encoded = msg.encode_chunks(128).flatten();

        // basic(1) + header(11) + 128 + basic3(1) + 128 + basic3(1) + 44
        assert_eq!(encoded.len(), 1 + 11 + 128 + 1 + 128 + 1 + 44);

        // Continuation chunk markers
        assert_eq!(encoded[12 + 128], 0xC4); // fmt 3, cid 4
        assert_eq!(encoded[12 + 128 + 1 + 128], 0xC4);
    }

    #[test]
    fn test_extended_timestamp_boundary() {
        // One below the threshold: 3-byte encoding
        let msg = MediaMessage::from_slice(
            MessageHeader::new_video(0, 0x00FF_FFFE, 1),
            &[0x01; 4],
        );
        let encoded = msg.encode_chunks(128).flatten();

        assert_eq!(&encoded[1..4], &[0xFF, 0xFF, 0xFE]);
        assert_eq!(encoded.len(), 1 + 11 + 4);

        // At the threshold: extended 4-byte encoding
        let msg = MediaMessage::from_slice(
            MessageHeader::new_video(0, 0x00FF_FFFF, 1),
            &[0x01; 4],
        );
        let encoded = msg.encode_chunks(128).flatten();

        assert_eq!(&encoded[1..4], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(&encoded[12..16], &[0x00, 0xFF, 0xFF, 0xFF]);
        assert_eq!(encoded.len(), 1 + 11 + 4 + 4);
    }

    #[test]
    fn test_extended_timestamp_on_continuations() {
        let payload = vec![0x00u8; 200];
        let msg = MediaMessage::from_slice(
            MessageHeader::new_video(0, 0x0100_0000, 1),
            &payload,
        );

        let encoded = msg.encode_chunks(128).flatten();

        // basic(1) + header(11) + ext(4) + 128 + basic3(1) + ext(4) + 72
        assert_eq!(encoded.len(), 1 + 11 + 4 + 128 + 1 + 4 + 72);

        let cont = 1 + 11 + 4 + 128;
        assert_eq!(encoded[cont], 0xC5);
        assert_eq!(&encoded[cont + 1..cont + 5], &[0x01, 0x00, 0x00, 0x00]);
    }
}
