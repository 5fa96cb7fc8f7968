// FLV A/V payload flag helpers

/// Audio codec id: AAC
pub const AUDIO_CODEC_AAC: u8 = 10;

/// Video codec id: AVC / H.264
pub const VIDEO_CODEC_AVC: u8 = 7;

/// Video frame type: keyframe
pub const VIDEO_FRAME_KEY: u8 = 1;

/// AAC packet type: sequence header (AudioSpecificConfig)
pub const AAC_PACKET_TYPE_SEQUENCE_HEADER: u8 = 0;

/// AVC packet type: sequence header (SPS/PPS)
pub const AVC_PACKET_TYPE_SEQUENCE_HEADER: u8 = 0;

/// AVC packet type: NALU
pub const AVC_PACKET_TYPE_NALU: u8 = 1;

/// Gets the audio codec id from the first payload byte
pub fn audio_codec_id(payload: &[u8]) -> u8 {
    match payload.first() {
        Some(b) => b >> 4,
        None => 0,
    }
}

/// True when the audio payload is an AAC sequence header
pub fn is_audio_sequence_header(payload: &[u8]) -> bool {
    payload.len() >= 2
        && audio_codec_id(payload) == AUDIO_CODEC_AAC
        && payload[1] == AAC_PACKET_TYPE_SEQUENCE_HEADER
}

/// Gets the video frame type from the first payload byte
pub fn video_frame_type(payload: &[u8]) -> u8 {
    match payload.first() {
        Some(b) => b >> 4,
        None => 0,
    }
}

/// Gets the video codec id from the first payload byte
pub fn video_codec_id(payload: &[u8]) -> u8 {
    match payload.first() {
        Some(b) => b & 0x0F,
        None => 0,
    }
}

/// True when the video payload is a keyframe (of any packet type)
pub fn is_video_keyframe(payload: &[u8]) -> bool {
    video_frame_type(payload) == VIDEO_FRAME_KEY
}

/// True when the video payload is an AVC sequence header
pub fn is_video_sequence_header(payload: &[u8]) -> bool {
    payload.len() >= 2
        && is_video_keyframe(payload)
        && video_codec_id(payload) == VIDEO_CODEC_AVC
        && payload[1] == AVC_PACKET_TYPE_SEQUENCE_HEADER
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_flags() {
        // AAC, 44.1 kHz, 16-bit, stereo, sequence header
        assert!(is_audio_sequence_header(&[0xAF, 0x00, 0x12, 0x10]));
        // Raw AAC frame
        assert!(!is_audio_sequence_header(&[0xAF, 0x01, 0x21]));
        // Not AAC
        assert!(!is_audio_sequence_header(&[0x2F, 0x00]));
        assert_eq!(audio_codec_id(&[0xAF, 0x00]), AUDIO_CODEC_AAC);
    }

    #[test]
    fn test_video_flags() {
        // Keyframe AVC sequence header
        assert!(is_video_sequence_header(&[0x17, 0x00, 0x00, 0x00, 0x00]));
        assert!(is_video_keyframe(&[0x17, 0x01]));
        // Inter frame
        assert!(!is_video_keyframe(&[0x27, 0x01]));
        assert!(!is_video_sequence_header(&[0x27, 0x00]));
        // Keyframe NALU is not a sequence header
        assert!(!is_video_sequence_header(&[0x17, 0x01]));
    }

    #[test]
    fn test_empty_payloads() {
        assert!(!is_audio_sequence_header(&[]));
        assert!(!is_video_sequence_header(&[]));
        assert!(!is_video_keyframe(&[]));
    }
}
