// RTMP handshake logic

use hmac::{Hmac, Mac};
use sha2::Sha256;

use rand::{rngs::StdRng, RngCore, SeedableRng};

use std::sync::LazyLock;

use thiserror::Error;

use crate::{log::Logger, log_debug};

use super::{DhKeyExchange, DH_KEY_SIZE, RTMP_SIG_SIZE, RTMP_VERSION, SHA256_DIGEST_SIZE};

// Consts for handshake

/// Signs the server packets (first 36 bytes of the full FMS key)
pub const GENUINE_FMS: &str = "Genuine Adobe Flash Media Server 001";

/// Signs the client packets (first 30 bytes of the full FP key)
pub const GENUINE_FP: &str = "Genuine Adobe Flash Player 001";

/// Trailing bytes of the full 68-byte FMS / 62-byte FP keys
pub const RANDOM_CRUD: &[u8] = &[
    0xf0, 0xee, 0xc2, 0x4a, 0x80, 0x68, 0xbe, 0xe8, 0x2e, 0x00, 0xd0, 0xd1, 0x02, 0x9e, 0x7e,
    0x57, 0x6e, 0xec, 0x5d, 0x2d, 0x29, 0x80, 0x6f, 0xab, 0x93, 0xb8, 0xe6, 0x36, 0xcf, 0xeb,
    0x31, 0xae,
];

/// Version field the server writes into S1
const S1_VERSION: [u8; 4] = [0x04, 0x05, 0x00, 0x01];

static GENUINE_FMS_FULL: LazyLock<Vec<u8>> = LazyLock::new(|| {
    let mut v: Vec<u8> = GENUINE_FMS.bytes().collect();
    v.extend_from_slice(RANDOM_CRUD);
    v
});

/// Errors produced by the handshake engine
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// The complex digest did not validate under any schema;
    /// the caller should fall back to the simple handshake
    #[error("complex handshake digest did not validate")]
    TryOthers,

    /// The client requested an RTMP version the server does not speak
    #[error("unsupported RTMP version: {0}")]
    UnsupportedVersion(u8),

    /// The handshake packet is shorter than the protocol requires
    #[error("handshake packet too short")]
    ShortPacket,
}

/// C1/S1 key-and-digest layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeSchema {
    /// time(4) | version(4) | key(764) | digest(764)
    Schema0,

    /// time(4) | version(4) | digest(764) | key(764)
    Schema1,
}

impl HandshakeSchema {
    /// Byte offset of the digest block within C1/S1
    fn digest_block_base(&self) -> usize {
        match self {
            HandshakeSchema::Schema0 => 8 + 764,
            HandshakeSchema::Schema1 => 8,
        }
    }

    /// Byte offset of the key block within C1/S1
    fn key_block_base(&self) -> usize {
        match self {
            HandshakeSchema::Schema0 => 8,
            HandshakeSchema::Schema1 => 8 + 764,
        }
    }
}

/// Calculates HMAC-SHA256
fn calc_hmac(message: &[u8], key: &[u8]) -> Vec<u8> {
    let mut mac: Hmac<Sha256> = Hmac::new_from_slice(key).expect("HMAC can take key of any size");

    mac.update(message);

    mac.finalize().into_bytes().to_vec()
}

/// Compares 2 signatures without short-circuiting
fn compare_signatures(sig1: &[u8], sig2: &[u8]) -> bool {
    if sig1.len() != sig2.len() {
        return false;
    }

    let mut result = true;

    for i in 0..sig1.len() {
        result = result && (sig1[i] == sig2[i]);
    }

    result
}

/// Absolute offset of the 32-byte digest within a 1536-byte C1/S1
///
/// The first 4 bytes of the digest block are summed modulo 728; the digest
/// sits after those 4 bytes at the computed offset.
fn digest_offset(c1s1: &[u8], schema: HandshakeSchema) -> usize {
    let base = schema.digest_block_base();
    let b = &c1s1[base..base + 4];

    let valid =
        ((b[0] as usize) + (b[1] as usize) + (b[2] as usize) + (b[3] as usize)) % (764 - 32 - 4);

    base + 4 + valid
}

/// Absolute offset of the 128-byte DH key within a 1536-byte C1/S1
///
/// The last 4 bytes of the key block are summed modulo 632; the key sits at
/// the computed offset from the start of the block.
fn key_offset(c1s1: &[u8], schema: HandshakeSchema) -> usize {
    let base = schema.key_block_base();
    let b = &c1s1[base + 760..base + 764];

    let valid =
        ((b[0] as usize) + (b[1] as usize) + (b[2] as usize) + (b[3] as usize)) % (764 - 128 - 4);

    base + valid
}

/// Computes the digest over a C1/S1 with its digest field removed
fn calc_c1s1_digest(c1s1: &[u8], offset: usize, key: &[u8]) -> Vec<u8> {
    let mut joined: Vec<u8> = Vec::with_capacity(RTMP_SIG_SIZE - SHA256_DIGEST_SIZE);

    joined.extend_from_slice(&c1s1[0..offset]);
    joined.extend_from_slice(&c1s1[offset + SHA256_DIGEST_SIZE..]);

    calc_hmac(&joined, key)
}

/// Validates the C1 digest under the given schema with the client key
fn validate_c1_schema(c1: &[u8], schema: HandshakeSchema) -> bool {
    let offset = digest_offset(c1, schema);

    let computed = calc_c1s1_digest(c1, offset, GENUINE_FP.as_bytes());
    let provided = &c1[offset..offset + SHA256_DIGEST_SIZE];

    compare_signatures(&computed, provided)
}

/// Detects the schema of a complex C1, trying schema0 then schema1
///
/// # Return value
///
/// Returns the detected schema, or TryOthers when neither digest
/// validates (the client is speaking the simple handshake)
pub fn detect_c1_schema(c1: &[u8]) -> Result<HandshakeSchema, HandshakeError> {
    if c1.len() != RTMP_SIG_SIZE {
        return Err(HandshakeError::ShortPacket);
    }

    if validate_c1_schema(c1, HandshakeSchema::Schema0) {
        return Ok(HandshakeSchema::Schema0);
    }

    if validate_c1_schema(c1, HandshakeSchema::Schema1) {
        return Ok(HandshakeSchema::Schema1);
    }

    Err(HandshakeError::TryOthers)
}

/// Extracts the 32-byte digest field from a validated C1
pub fn extract_c1_digest(c1: &[u8], schema: HandshakeSchema) -> Vec<u8> {
    let offset = digest_offset(c1, schema);
    c1[offset..offset + SHA256_DIGEST_SIZE].to_vec()
}

/// Generates S1 for the complex handshake
///
/// The key block carries the DH secret shared with the client's public
/// component; the digest is signed with the 36-byte server key. The layout
/// mirrors the schema C1 validated under.
///
/// # Arguments
///
/// * `schema` - The schema detected from C1
/// * `c1` - The client C1 packet
/// * `logger` - Logger of the RTMP session
pub fn generate_s1(
    schema: HandshakeSchema,
    c1: &[u8],
    logger: &Logger,
) -> Result<Vec<u8>, HandshakeError> {
    if c1.len() != RTMP_SIG_SIZE {
        return Err(HandshakeError::ShortPacket);
    }

    let mut s1 = vec![0u8; RTMP_SIG_SIZE];

    let mut rng = StdRng::from_os_rng();
    rng.fill_bytes(&mut s1);

    // time(4) is kept from C1, version(4) identifies the server
    s1[0..4].copy_from_slice(&c1[0..4]);
    s1[4..8].copy_from_slice(&S1_VERSION);

    // Compute the shared secret from the client's public key and place it
    // in our own key slot
    let client_key_offset = key_offset(c1, schema);
    let client_public = &c1[client_key_offset..client_key_offset + DH_KEY_SIZE];

    let dh = DhKeyExchange::new();
    let shared_key = dh.shared_secret(client_public);

    let own_key_offset = key_offset(&s1, schema);
    s1[own_key_offset..own_key_offset + DH_KEY_SIZE].copy_from_slice(&shared_key);

    // Sign the packet
    let own_digest_offset = digest_offset(&s1, schema);
    let digest = calc_c1s1_digest(&s1, own_digest_offset, GENUINE_FMS.as_bytes());

    if digest.len() != SHA256_DIGEST_SIZE {
        log_debug!(
            logger,
            format!(
                "HMAC size invalid. Expected {}, but found {}",
                SHA256_DIGEST_SIZE,
                digest.len()
            )
        );
        return Err(HandshakeError::TryOthers);
    }

    s1[own_digest_offset..own_digest_offset + SHA256_DIGEST_SIZE].copy_from_slice(&digest);

    Ok(s1)
}

/// Generates S2 for the complex handshake
///
/// S2 is 1504 random bytes followed by
/// HMAC-SHA256(HMAC-SHA256(fms_key_68, c1_digest), random)
pub fn generate_s2(c1_digest: &[u8]) -> Vec<u8> {
    let mut random_bytes = vec![0u8; RTMP_SIG_SIZE - SHA256_DIGEST_SIZE];

    let mut rng = StdRng::from_os_rng();
    rng.fill_bytes(&mut random_bytes);

    let temp_key = calc_hmac(c1_digest, &GENUINE_FMS_FULL);
    let signature = calc_hmac(&random_bytes, &temp_key);

    let mut s2 = random_bytes;
    s2.extend_from_slice(&signature);

    s2
}

/// Generates S1 for the simple handshake: time(4) | zero(4) | random(1528)
pub fn generate_simple_s1() -> Vec<u8> {
    let mut s1 = vec![0u8; RTMP_SIG_SIZE];

    let mut rng = StdRng::from_os_rng();
    rng.fill_bytes(&mut s1[8..]);

    s1[0..8].copy_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);

    s1
}

/// Generates the full S0 S1 S2 response for a C1
///
/// Tries the complex handshake first; if neither schema validates, falls
/// back to the simple handshake where S2 echoes C1.
///
/// # Arguments
///
/// * `c1` - Client signature (C1)
/// * `logger` - Logger of the RTMP session
pub fn generate_s0_s1_s2(c1: &[u8], logger: &Logger) -> Result<Vec<u8>, HandshakeError> {
    if c1.len() != RTMP_SIG_SIZE {
        return Err(HandshakeError::ShortPacket);
    }

    let mut all_bytes: Vec<u8> = Vec::with_capacity(1 + RTMP_SIG_SIZE * 2);

    match detect_c1_schema(c1) {
        Ok(schema) => {
            log_debug!(logger, "Using complex handshake");

            let s1 = generate_s1(schema, c1, logger)?;
            let s2 = generate_s2(&extract_c1_digest(c1, schema));

            all_bytes.push(RTMP_VERSION);
            all_bytes.extend(s1);
            all_bytes.extend(s2);
        }
        Err(HandshakeError::TryOthers) => {
            log_debug!(logger, "Using simple handshake");

            all_bytes.push(RTMP_VERSION);
            all_bytes.extend(generate_simple_s1());
            all_bytes.extend(c1);
        }
        Err(e) => {
            return Err(e);
        }
    }

    Ok(all_bytes)
}

/// Parsed proxy-protocol prefix
pub struct ProxyPrefix {
    /// Real client address, present when the payload carries 4 bytes
    pub real_ip: Option<std::net::Ipv4Addr>,

    /// Total number of prefix bytes to discard, including the magic byte
    pub consumed: usize,
}

/// Parses the proxy-protocol prefix placed before C0
///
/// Layout: 0xF3 | length(2, big endian) | payload(length), where the first
/// 4 payload bytes (when present) are the real client IPv4 address.
pub fn parse_proxy_prefix(buf: &[u8]) -> Result<ProxyPrefix, HandshakeError> {
    if buf.len() < 3 {
        return Err(HandshakeError::ShortPacket);
    }

    let length = ((buf[1] as usize) << 8) | (buf[2] as usize);

    if length > super::PROXY_PROTOCOL_MAX_LENGTH {
        return Err(HandshakeError::ShortPacket);
    }

    if buf.len() < 3 + length {
        return Err(HandshakeError::ShortPacket);
    }

    let real_ip = if length >= 4 {
        Some(std::net::Ipv4Addr::new(buf[3], buf[4], buf[5], buf[6]))
    } else {
        None
    };

    Ok(ProxyPrefix {
        real_ip,
        consumed: 3 + length,
    })
}

// Tests
