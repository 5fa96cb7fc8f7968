// Inbound chunk stream decoding

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

use crate::chain::ByteChain;

use super::{
    MediaMessage, MessageHeader, CHUNK_STREAM_CACHE, RTMP_ACK_SEQUENCE_OVERFLOW,
    RTMP_CHUNK_SIZE_INITIAL, RTMP_EXTENDED_TIMESTAMP, RTMP_MAX_CHUNK_SIZE, RTMP_MIN_CHUNK_SIZE,
};

/// Wire protocol violations. All of them are fatal to the connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A fresh chunk stream began with a continuation chunk
    #[error("chunk stream {cid} started with fmt {fmt}")]
    FreshStreamContinuation { cid: u32, fmt: u8 },

    /// A new-message chunk arrived while another message was assembling
    #[error("chunk stream {cid} received fmt {fmt} while a message is partially assembled")]
    UnexpectedNewMessage { cid: u32, fmt: u8 },

    /// A peer announced a chunk size outside 128..=65536
    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(usize),
}

/// Per chunk stream decode state
struct ChunkStream {
    /// Header of the last message seen on this chunk stream
    last_header: MessageHeader,

    /// Timestamp delta carried by the last fmt-1/2 header
    last_timestamp_delta: u32,

    /// True when the current message's first chunk used the extended field
    extended_ts_used: bool,

    /// Message being reassembled, if any
    partial: Option<PartialMessage>,

    /// Number of complete messages decoded on this chunk stream
    msg_count: u64,
}

impl ChunkStream {
    fn new() -> ChunkStream {
        ChunkStream {
            last_header: MessageHeader::new_blank(),
            last_timestamp_delta: 0,
            extended_ts_used: false,
            partial: None,
            msg_count: 0,
        }
    }

    /// A stream is fresh until it has decoded or started any message
    fn is_fresh(&self) -> bool {
        self.msg_count == 0 && self.partial.is_none()
    }
}

/// A message in the middle of reassembly
struct PartialMessage {
    header: MessageHeader,

    payload: ByteChain,

    received: usize,

    /// Inbound chunk size captured when the message started.
    /// A SetChunkSize arriving mid-message applies only to later messages.
    chunk_size: usize,
}

/// Incremental decoder for the inbound chunk stream
///
/// Bytes are pushed as they arrive; complete messages are polled out.
/// Decode state for chunk stream ids below the cache limit lives in a
/// fixed array, the rest in a map.
pub struct ChunkDecoder {
    buffer: ByteChain,

    cached_streams: [Option<ChunkStream>; CHUNK_STREAM_CACHE],
    extra_streams: HashMap<u32, ChunkStream>,

    in_chunk_size: usize,
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        ChunkDecoder::new()
    }
}

impl ChunkDecoder {
    /// Creates a decoder with the initial 128-byte chunk size
    pub fn new() -> ChunkDecoder {
        ChunkDecoder {
            buffer: ByteChain::empty(),
            cached_streams: Default::default(),
            extra_streams: HashMap::new(),
            in_chunk_size: RTMP_CHUNK_SIZE_INITIAL,
        }
    }

    /// Applies a SetChunkSize announced by the peer
    pub fn set_in_chunk_size(&mut self, size: usize) -> Result<(), ProtocolError> {
        if !(RTMP_MIN_CHUNK_SIZE..=RTMP_MAX_CHUNK_SIZE).contains(&size) {
            return Err(ProtocolError::InvalidChunkSize(size));
        }

        self.in_chunk_size = size;

        Ok(())
    }

    /// Appends received bytes to the decode buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.append(ByteChain::from_slice(data));
    }

    fn stream_state(&mut self, cid: u32) -> &mut ChunkStream {
        if (cid as usize) < CHUNK_STREAM_CACHE {
            self.cached_streams[cid as usize].get_or_insert_with(ChunkStream::new)
        } else {
            self.extra_streams.entry(cid).or_insert_with(ChunkStream::new)
        }
    }

    /// Attempts to decode the next complete message
    ///
    /// # Return value
    ///
    /// Returns Ok(None) when more bytes are needed; decoding resumes from
    /// the same position once they are pushed.
    pub fn poll_message(&mut self) -> Result<Option<MediaMessage>, ProtocolError> {
        loop {
            match self.decode_one_chunk()? {
                ChunkOutcome::NeedMoreData => return Ok(None),
                ChunkOutcome::ChunkConsumed => continue,
                ChunkOutcome::MessageComplete(msg) => return Ok(Some(msg)),
            }
        }
    }

    fn decode_one_chunk(&mut self) -> Result<ChunkOutcome, ProtocolError> {
        // Basic header: 1 to 3 bytes
        let mut first = [0u8; 1];

        if self.buffer.peek(&mut first, 0).is_err() {
            return Ok(ChunkOutcome::NeedMoreData);
        }

        let fmt = first[0] >> 6;
        let cid_low = (first[0] & 0x3F) as u32;

        let (cid, basic_len) = match cid_low {
            0 => {
                let mut b = [0u8; 1];
                if self.buffer.peek(&mut b, 1).is_err() {
                    return Ok(ChunkOutcome::NeedMoreData);
                }
                (64 + b[0] as u32, 2)
            }
            1 => {
                let mut b = [0u8; 2];
                if self.buffer.peek(&mut b, 1).is_err() {
                    return Ok(ChunkOutcome::NeedMoreData);
                }
                (64 + b[0] as u32 + ((b[1] as u32) << 8), 3)
            }
            _ => (cid_low, 1),
        };

        let message_header_len = super::get_rtmp_header_size(fmt);

        let mut header_bytes = [0u8; 11];

        if message_header_len > 0 {
            if self
                .buffer
                .peek(&mut header_bytes[..message_header_len], basic_len)
                .is_err()
            {
                return Ok(ChunkOutcome::NeedMoreData);
            }
        }

        let in_chunk_size = self.in_chunk_size;

        // Snapshot the chunk stream state; the buffer may still report
        // NeedMoreData below, so mutations are deferred until the chunk
        // is fully consumed
        let (is_fresh, has_partial, last_header, last_delta, was_extended, partial_info) = {
            let state = self.stream_state(cid);

            (
                state.is_fresh(),
                state.partial.is_some(),
                state.last_header.clone(),
                state.last_timestamp_delta,
                state.extended_ts_used,
                state
                    .partial
                    .as_ref()
                    .map(|p| (p.header.timestamp, p.header.payload_length as usize - p.received, p.chunk_size)),
            )
        };

        // A fresh chunk stream must begin with a full header. A fmt-1 first
        // chunk is tolerated (some encoders do this), fmt-2/3 is not.
        if is_fresh && fmt >= 2 {
            return Err(ProtocolError::FreshStreamContinuation { cid, fmt });
        }

        if has_partial && fmt != 3 {
            return Err(ProtocolError::UnexpectedNewMessage { cid, fmt });
        }

        // Build the effective message header for this chunk
        let mut header = last_header.clone();
        header.prefer_chunk_id = cid;

        let mut ts_field: u32 = 0;

        match fmt {
            0 => {
                ts_field = BigEndian::read_u24(&header_bytes[0..3]);
                header.payload_length = BigEndian::read_u24(&header_bytes[3..6]);
                header.message_type = header_bytes[6];
                header.stream_id = LittleEndian::read_u32(&header_bytes[7..11]);
            }
            1 => {
                ts_field = BigEndian::read_u24(&header_bytes[0..3]);
                header.payload_length = BigEndian::read_u24(&header_bytes[3..6]);
                header.message_type = header_bytes[6];
            }
            2 => {
                ts_field = BigEndian::read_u24(&header_bytes[0..3]);
            }
            _ => {}
        }

        // Extended timestamp handling
        let mut extended_len = 0;
        let mut extended_now = was_extended;
        let mut new_delta = None;

        if fmt <= 2 {
            if ts_field == RTMP_EXTENDED_TIMESTAMP {
                let mut ext = [0u8; 4];
                if self
                    .buffer
                    .peek(&mut ext, basic_len + message_header_len)
                    .is_err()
                {
                    return Ok(ChunkOutcome::NeedMoreData);
                }

                extended_len = 4;
                extended_now = true;
                header.timestamp = BigEndian::read_u32(&ext) as i64;
            } else {
                extended_now = false;

                header.timestamp = match fmt {
                    0 => ts_field as i64,
                    _ => last_header.timestamp + ts_field as i64,
                };

                if fmt == 1 || fmt == 2 {
                    new_delta = Some(ts_field);
                }
            }
        } else if was_extended {
            let mut ext = [0u8; 4];
            if self
                .buffer
                .peek(&mut ext, basic_len + message_header_len)
                .is_err()
            {
                return Ok(ChunkOutcome::NeedMoreData);
            }

            match &partial_info {
                Some((current_ts, _, _)) => {
                    // Mid-message continuation: the 4 bytes are only the
                    // extended field when they repeat the message
                    // timestamp; otherwise they are payload and the
                    // decoder rewinds.
                    if BigEndian::read_u32(&ext) as i64 == *current_ts {
                        extended_len = 4;
                    }
                }
                None => {
                    // First chunk of a new message: the field carries the
                    // message timestamp
                    extended_len = 4;
                    header.timestamp = BigEndian::read_u32(&ext) as i64;
                }
            }
        }

        // fmt-3 starting a new message advances the timestamp by the last delta
        if fmt == 3 && !has_partial && !was_extended {
            header.timestamp = last_header.timestamp + last_delta as i64;
        }

        let total_header_len = basic_len + message_header_len + extended_len;

        // Determine how much payload this chunk carries
        let (chunk_size, remaining) = match &partial_info {
            Some((_, remaining, chunk_size)) => (*chunk_size, *remaining),
            None => (in_chunk_size, header.payload_length as usize),
        };

        let take = chunk_size.min(remaining);

        if self.buffer.len() < total_header_len + take {
            return Ok(ChunkOutcome::NeedMoreData);
        }

        // The chunk is fully buffered: consume it
        self.buffer
            .advance_read(total_header_len)
            .expect("header length was peeked");

        let mut chunk_payload = vec![0u8; take];
        self.buffer
            .read_bytes(&mut chunk_payload)
            .expect("payload length was checked");
        self.buffer.reclaim();

        let state = self.stream_state(cid);

        state.extended_ts_used = extended_now;

        if let Some(delta) = new_delta {
            state.last_timestamp_delta = delta;
        }

        let mut partial = match state.partial.take() {
            Some(p) => p,
            None => PartialMessage {
                payload: ByteChain::new(header.payload_length as usize),
                header,
                received: 0,
                chunk_size,
            },
        };

        partial
            .payload
            .write_bytes(&chunk_payload)
            .expect("partial payload chain was sized for the full message");
        partial.received += take;

        if partial.received >= partial.header.payload_length as usize {
            // Message complete
            state.last_header = partial.header.clone();
            state.msg_count += 1;

            return Ok(ChunkOutcome::MessageComplete(MediaMessage::new(
                partial.header,
                partial.payload,
            )));
        }

        state.last_header = partial.header.clone();
        state.partial = Some(partial);

        Ok(ChunkOutcome::ChunkConsumed)
    }
}

enum ChunkOutcome {
    NeedMoreData,
    ChunkConsumed,
    MessageComplete(MediaMessage),
}

/// Inbound acknowledgement window state
///
/// An Acknowledgement is due every window/2 received bytes. The running
/// counter wraps back to the current delta once it crosses the overflow
/// threshold, so the 32-bit sequence number never skips an ack.
pub struct AckWindow {
    /// Window size advertised by the peer (0 disables acks)
    pub window: u32,

    /// Total bytes received since the last wrap
    pub received: u64,

    /// Byte counter value of the last acknowledgement sent
    pub acked: u64,
}

impl AckWindow {
    /// Creates a window with acknowledgements disabled
    pub fn new() -> AckWindow {
        AckWindow {
            window: 0,
            received: 0,
            acked: 0,
        }
    }

    /// Accounts received bytes
    ///
    /// # Return value
    ///
    /// Returns the sequence number to acknowledge, when one is due
    pub fn on_bytes_received(&mut self, count: u64) -> Option<u32> {
        self.received += count;

        if self.received > RTMP_ACK_SEQUENCE_OVERFLOW {
            self.received = count;
            self.acked = 0;
        }

        if self.window > 0 && self.received - self.acked >= (self.window as u64) / 2 {
            self.acked = self.received;
            return Some(self.received as u32);
        }

        None
    }
}

impl Default for AckWindow {
    fn default() -> Self {
        AckWindow::new()
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtmp::{RTMP_TYPE_AUDIO, RTMP_TYPE_VIDEO};

    /// Encodes a message and feeds it back through a decoder
    fn round_trip_message(payload_len: usize, timestamp: i64, chunk_size: usize) {
        let payload: Vec<u8> = (0..payload_len).map(|i| (i % 251) as u8).collect();

        let msg = MediaMessage::from_slice(
            MessageHeader::new_video(0, timestamp, 1),
            &payload,
        );

        let wire = msg.encode_chunks(chunk_size).flatten();

        let mut decoder = ChunkDecoder::new();
        decoder.set_in_chunk_size(chunk_size).unwrap();
        decoder.push_bytes(&wire);

        let decoded = decoder.poll_message().unwrap().expect("message expected");

        assert_eq!(decoded.header.message_type, RTMP_TYPE_VIDEO);
        assert_eq!(decoded.header.timestamp, timestamp);
        assert_eq!(decoded.header.payload_length as usize, payload_len);
        assert_eq!(decoded.payload.flatten().as_ref(), &payload[..]);
    }

    #[test]
    fn test_round_trip_chunk_sizes() {
        for chunk_size in [128, 512, 4096, 65536] {
            round_trip_message(1000, 5000, chunk_size);
            round_trip_message(chunk_size, 0, chunk_size);
            round_trip_message(1, 42, chunk_size);
        }
    }

    #[test]
    fn test_round_trip_extended_timestamp() {
        round_trip_message(300, 0x00FF_FFFF, 128);
        round_trip_message(300, 0x0100_0000, 128);
        round_trip_message(10, 0x00FF_FFFE, 128);
    }

    #[test]
    fn test_partial_delivery() {
        let payload = vec![0x42u8; 500];
        let msg = MediaMessage::from_slice(MessageHeader::new_audio(0, 10, 1), &payload);
        let wire = msg.encode_chunks(128).flatten();

        let mut decoder = ChunkDecoder::new();

        // Feed one byte at a time; the decoder must never lose its place
        for b in wire.iter() {
            decoder.push_bytes(&[*b]);
        }

        let decoded = decoder.poll_message().unwrap().expect("message expected");
        assert_eq!(decoded.payload.flatten().as_ref(), &payload[..]);
    }

    #[test]
    fn test_interleaved_chunk_streams() {
        let audio = MediaMessage::from_slice(
            MessageHeader::new_audio(0, 100, 1),
            &[0xAAu8; 200],
        );
        let video = MediaMessage::from_slice(
            MessageHeader::new_video(0, 100, 1),
            &[0xBBu8; 200],
        );

        let audio_wire = audio.encode_chunks(128).flatten();
        let video_wire = video.encode_chunks(128).flatten();

        // First chunk of each: basic(1) + header(11) + 128 payload
        let mut decoder = ChunkDecoder::new();

        decoder.push_bytes(&audio_wire[..140]);
        decoder.push_bytes(&video_wire[..140]);
        assert!(decoder.poll_message().unwrap().is_none());

        decoder.push_bytes(&audio_wire[140..]);
        decoder.push_bytes(&video_wire[140..]);

        let first = decoder.poll_message().unwrap().expect("audio expected");
        assert_eq!(first.header.message_type, RTMP_TYPE_AUDIO);
        assert_eq!(first.payload.flatten().as_ref(), &[0xAAu8; 200][..]);

        let second = decoder.poll_message().unwrap().expect("video expected");
        assert_eq!(second.header.message_type, RTMP_TYPE_VIDEO);
        assert_eq!(second.payload.flatten().as_ref(), &[0xBBu8; 200][..]);
    }

    #[test]
    fn test_fmt3_new_message_reuses_header() {
        let payload = [0x11u8; 50];

        let msg = MediaMessage::from_slice(MessageHeader::new_video(0, 1000, 1), &payload);
        let mut wire = msg.encode_chunks(128).flatten().to_vec();

        // A second message on the same chunk stream, all-defaults header
        wire.push(0xC5); // fmt 3, cid 5
        wire.extend_from_slice(&payload);

        let mut decoder = ChunkDecoder::new();
        decoder.push_bytes(&wire);

        let first = decoder.poll_message().unwrap().expect("first expected");
        assert_eq!(first.header.timestamp, 1000);

        let second = decoder.poll_message().unwrap().expect("second expected");
        assert_eq!(second.header.payload_length, 50);
        assert_eq!(second.header.message_type, RTMP_TYPE_VIDEO);
        assert_eq!(second.payload.flatten().as_ref(), &payload[..]);
    }

    #[test]
    fn test_fmt3_new_messages_on_extended_timestamp_stream() {
        let payload = [0x33u8; 10];

        let msg = MediaMessage::from_slice(
            MessageHeader::new_video(0, 0x0100_0000, 1),
            &payload,
        );
        let mut wire = msg.encode_chunks(128).flatten().to_vec();

        // Two more messages on the same chunk stream, each a single fmt-3
        // chunk whose extended timestamp field carries the new timestamp
        for ts in [0x0100_0028u32, 0x0100_0050] {
            wire.push(0xC5); // fmt 3, cid 5
            wire.extend_from_slice(&ts.to_be_bytes());
            wire.extend_from_slice(&payload);
        }

        let mut decoder = ChunkDecoder::new();
        decoder.push_bytes(&wire);

        let first = decoder.poll_message().unwrap().expect("first expected");
        assert_eq!(first.header.timestamp, 0x0100_0000);

        let second = decoder.poll_message().unwrap().expect("second expected");
        assert_eq!(second.header.timestamp, 0x0100_0028);
        assert_eq!(second.payload.flatten().as_ref(), &payload[..]);

        let third = decoder.poll_message().unwrap().expect("third expected");
        assert_eq!(third.header.timestamp, 0x0100_0050);
        assert_eq!(third.payload.flatten().as_ref(), &payload[..]);
    }

    #[test]
    fn test_chunk_size_change_applies_to_next_message() {
        let payload: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();

        let msg = MediaMessage::from_slice(MessageHeader::new_video(0, 0, 1), &payload);
        let wire = msg.encode_chunks(128).flatten();

        let mut decoder = ChunkDecoder::new();

        // First chunk arrives, message is partially assembled
        decoder.push_bytes(&wire[..140]);
        assert!(decoder.poll_message().unwrap().is_none());

        // The peer announces a larger chunk size mid-message; the in-flight
        // message keeps its 128-byte chunking
        decoder.set_in_chunk_size(4096).unwrap();

        decoder.push_bytes(&wire[140..]);
        let decoded = decoder.poll_message().unwrap().expect("message expected");
        assert_eq!(decoded.payload.flatten().as_ref(), &payload[..]);

        // The next message decodes with the new chunk size
        let msg2 = MediaMessage::from_slice(MessageHeader::new_video(0, 40, 1), &payload);
        let wire2 = msg2.encode_chunks(4096).flatten();

        decoder.push_bytes(&wire2);
        let decoded2 = decoder.poll_message().unwrap().expect("message expected");
        assert_eq!(decoded2.payload.flatten().as_ref(), &payload[..]);
    }

    #[test]
    fn test_fresh_stream_fmt3_is_protocol_error() {
        let mut decoder = ChunkDecoder::new();
        decoder.push_bytes(&[0xC5]);

        assert_eq!(
            decoder.poll_message(),
            Err(ProtocolError::FreshStreamContinuation { cid: 5, fmt: 3 })
        );
    }

    #[test]
    fn test_fmt0_while_partial_is_protocol_error() {
        let payload = vec![0u8; 300];
        let msg = MediaMessage::from_slice(MessageHeader::new_video(0, 0, 1), &payload);
        let wire = msg.encode_chunks(128).flatten();

        let mut decoder = ChunkDecoder::new();

        // First chunk only
        decoder.push_bytes(&wire[..140]);
        assert!(decoder.poll_message().unwrap().is_none());

        // A fmt-0 header on the same chunk stream before the message is done
        let other = MediaMessage::from_slice(MessageHeader::new_video(0, 0, 1), &[0u8; 4]);
        decoder.push_bytes(&other.encode_chunks(128).flatten());

        assert_eq!(
            decoder.poll_message(),
            Err(ProtocolError::UnexpectedNewMessage { cid: 5, fmt: 0 })
        );
    }

    #[test]
    fn test_invalid_chunk_size_rejected() {
        let mut decoder = ChunkDecoder::new();

        assert_eq!(
            decoder.set_in_chunk_size(127),
            Err(ProtocolError::InvalidChunkSize(127))
        );
        assert_eq!(
            decoder.set_in_chunk_size(65537),
            Err(ProtocolError::InvalidChunkSize(65537))
        );
        assert!(decoder.set_in_chunk_size(128).is_ok());
        assert!(decoder.set_in_chunk_size(65536).is_ok());
    }

    #[test]
    fn test_ack_window() {
        let mut win = AckWindow::new();
        win.window = 1000;

        assert_eq!(win.on_bytes_received(400), None);
        assert_eq!(win.on_bytes_received(200), Some(600));
        assert_eq!(win.on_bytes_received(400), None);
        assert_eq!(win.on_bytes_received(200), Some(1200));
    }

    #[test]
    fn test_ack_window_overflow_wraps() {
        let mut win = AckWindow::new();
        win.window = 1000;

        win.received = RTMP_ACK_SEQUENCE_OVERFLOW;
        win.acked = RTMP_ACK_SEQUENCE_OVERFLOW;

        // One more byte wraps the counter back to the delta
        assert_eq!(win.on_bytes_received(1), None);
        assert_eq!(win.received, 1);
        assert_eq!(win.acked, 0);

        // Acks keep flowing after the wrap
        assert_eq!(win.on_bytes_received(499), Some(500));
    }
}
