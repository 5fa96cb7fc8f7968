// FLV tag serialization

use byteorder::{BigEndian, ByteOrder};

/// FLV tag type: audio
pub const FLV_TAG_AUDIO: u8 = 8;

/// FLV tag type: video
pub const FLV_TAG_VIDEO: u8 = 9;

/// FLV tag type: script data (metadata)
pub const FLV_TAG_SCRIPT: u8 = 18;

/// Builds the 9-byte FLV file header plus the first previous-tag-size
pub fn flv_file_header(has_audio: bool, has_video: bool) -> Vec<u8> {
    let mut flags = 0u8;

    if has_audio {
        flags |= 0x04;
    }

    if has_video {
        flags |= 0x01;
    }

    vec![
        b'F', b'L', b'V', // signature
        0x01, // version
        flags,
        0x00, 0x00, 0x00, 0x09, // header size
        0x00, 0x00, 0x00, 0x00, // previous tag size 0
    ]
}

/// Encodes one FLV tag followed by its previous-tag-size field
///
/// Tag layout: type(1) | data size(3) | timestamp(3) | timestamp-ext(1) |
/// stream id(3, always 0) | payload | previous-tag-size(4)
pub fn encode_flv_tag(tag_type: u8, timestamp: u32, payload: &[u8]) -> Vec<u8> {
    let mut tag = vec![0u8; 11 + payload.len() + 4];

    tag[0] = tag_type;

    let mut b = [0u8; 4];
    BigEndian::write_u32(&mut b, payload.len() as u32);
    tag[1..4].copy_from_slice(&b[1..]);

    BigEndian::write_u32(&mut b, timestamp);
    tag[4..7].copy_from_slice(&b[1..]);
    tag[7] = b[0]; // extended timestamp byte

    // stream id stays zero

    tag[11..11 + payload.len()].copy_from_slice(payload);

    let prev_size = (11 + payload.len()) as u32;
    BigEndian::write_u32(&mut tag[11 + payload.len()..], prev_size);

    tag
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_header() {
        let header = flv_file_header(true, true);

        assert_eq!(&header[0..3], b"FLV");
        assert_eq!(header[3], 1);
        assert_eq!(header[4], 0x05);
        assert_eq!(&header[5..9], &[0, 0, 0, 9]);
        assert_eq!(&header[9..13], &[0, 0, 0, 0]);

        let audio_only = flv_file_header(true, false);
        assert_eq!(audio_only[4], 0x04);
    }

    #[test]
    fn test_encode_tag() {
        let payload = [0xAF, 0x01, 0x21, 0x10];
        let tag = encode_flv_tag(FLV_TAG_AUDIO, 0x01020304, &payload);

        assert_eq!(tag.len(), 11 + 4 + 4);
        assert_eq!(tag[0], 8);
        assert_eq!(&tag[1..4], &[0, 0, 4]); // data size
        assert_eq!(&tag[4..7], &[2, 3, 4]); // timestamp low
        assert_eq!(tag[7], 1); // timestamp extension
        assert_eq!(&tag[8..11], &[0, 0, 0]); // stream id
        assert_eq!(&tag[11..15], &payload);
        assert_eq!(&tag[15..19], &[0, 0, 0, 15]); // previous tag size
    }
}
