// RTMP constants

// Wire version

/// RTMP protocol version byte (C0 / S0)
pub const RTMP_VERSION: u8 = 3;

/// Size of the C1/S1/C2/S2 handshake signatures
pub const RTMP_SIG_SIZE: usize = 1536;

/// Size of a SHA-256 digest
pub const SHA256_DIGEST_SIZE: usize = 32;

/// First byte of a proxy-protocol prefixed handshake
pub const PROXY_PROTOCOL_MAGIC: u8 = 0xF3;

/// Maximum length accepted for the proxy-protocol payload
pub const PROXY_PROTOCOL_MAX_LENGTH: usize = 1024;

// Chunk types
pub const RTMP_CHUNK_TYPE_0: u8 = 0; // 11-bytes: timestamp(3) + length(3) + message type(1) + stream id(4)
pub const RTMP_CHUNK_TYPE_1: u8 = 1; // 7-bytes: delta(3) + length(3) + message type(1)
pub const RTMP_CHUNK_TYPE_2: u8 = 2; // 3-bytes: delta(3)
pub const RTMP_CHUNK_TYPE_3: u8 = 3; // 0-byte

// RTMP channel (chunk stream) ids for outbound messages
pub const RTMP_CHANNEL_PROTOCOL: u32 = 2;
pub const RTMP_CHANNEL_INVOKE: u32 = 3;
pub const RTMP_CHANNEL_AUDIO: u32 = 4;
pub const RTMP_CHANNEL_VIDEO: u32 = 5;
pub const RTMP_CHANNEL_DATA: u32 = 6;

/// Number of chunk stream decode slots kept in a fixed array;
/// higher chunk stream ids fall back to a map
pub const CHUNK_STREAM_CACHE: usize = 16;

/// Gets RTMP message header size from the chunk format
pub fn get_rtmp_header_size(fmt: u8) -> usize {
    match fmt {
        0 => 11,
        1 => 7,
        2 => 3,
        _ => 0,
    }
}

// Message types

/* Protocol Control Messages */
pub const RTMP_TYPE_SET_CHUNK_SIZE: u8 = 1;
pub const RTMP_TYPE_ABORT: u8 = 2;
pub const RTMP_TYPE_ACKNOWLEDGEMENT: u8 = 3; // bytes read report
pub const RTMP_TYPE_WINDOW_ACKNOWLEDGEMENT_SIZE: u8 = 5; // server bandwidth
pub const RTMP_TYPE_SET_PEER_BANDWIDTH: u8 = 6; // client bandwidth

/* User Control Messages Event (4) */
pub const RTMP_TYPE_EVENT: u8 = 4;

pub const RTMP_TYPE_AUDIO: u8 = 8;
pub const RTMP_TYPE_VIDEO: u8 = 9;

/* Data Message */
pub const RTMP_TYPE_FLEX_STREAM: u8 = 15; // AMF3
pub const RTMP_TYPE_DATA: u8 = 18; // AMF0

/* Command Message */
pub const RTMP_TYPE_FLEX_MESSAGE: u8 = 17; // AMF3
pub const RTMP_TYPE_INVOKE: u8 = 20; // AMF0

// User control event types

pub const STREAM_BEGIN: u16 = 0x00;
pub const STREAM_EOF: u16 = 0x01;
pub const STREAM_DRY: u16 = 0x02;
pub const SET_BUFFER_LENGTH: u16 = 0x03;
pub const STREAM_IS_RECORDED: u16 = 0x04;
pub const PING_REQUEST: u16 = 0x06;
pub const PING_RESPONSE: u16 = 0x07;

// Chunk sizes

/// Chunk size both peers start with
pub const RTMP_CHUNK_SIZE_INITIAL: usize = 128;

/// Minimum chunk size a peer may set
pub const RTMP_MIN_CHUNK_SIZE: usize = 128;

/// Maximum chunk size a peer may set
pub const RTMP_MAX_CHUNK_SIZE: usize = 65536;

/// Default outbound chunk size announced by the server
pub const RTMP_OUT_CHUNK_SIZE_DEFAULT: usize = 60000;

// Flow control

/// Window acknowledgement size announced by the server
pub const RTMP_WINDOW_ACK_SIZE: u32 = 2_500_000;

/// Peer bandwidth announced by the server
pub const RTMP_PEER_BANDWIDTH: u32 = 2_500_000;

/// Peer bandwidth limit type: dynamic
pub const RTMP_PEER_BANDWIDTH_DYNAMIC: u8 = 2;

/// The inbound byte sequence wraps back once it exceeds this value
pub const RTMP_ACK_SEQUENCE_OVERFLOW: u64 = 0xF000_0000;

// Timers

/// Seconds without inbound bytes before the session is considered dead
pub const RTMP_PING_TIMEOUT_SECONDS: u64 = 90;

/// Seconds between server ping requests
pub const RTMP_PING_INTERVAL_SECONDS: u64 = 45;

/// Seconds the server waits for the client to acknowledge a redirect
pub const RTMP_REDIRECT_ACK_TIMEOUT_SECONDS: u64 = 3;

// Extended timestamp

/// Timestamps at or above this value use the 4-byte extended field
pub const RTMP_EXTENDED_TIMESTAMP: u32 = 0xFFFFFF;

// Limits

/// Maximum number of streams createStream may allocate per connection
pub const RTMP_MAX_STREAMS_PER_CONNECTION: u32 = 3;

/// Server version announced in the connect response
pub const RTMP_SERVER_FMS_VERSION: &str = "FMS/3,5,3,888";

/// Capabilities announced in the connect response
pub const RTMP_SERVER_CAPABILITIES: f64 = 127.0;

/// Mode announced in the connect response
pub const RTMP_SERVER_MODE: f64 = 1.0;
