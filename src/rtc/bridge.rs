// RTC <-> RTMP media bridging

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

use crate::{
    log::Logger,
    rtmp::{MediaMessage, MessageHeader},
};

use super::{
    nalu_type, scan_annex_b, AacToOpusTranscoder, OpusToAacTranscoder, RtcError, RtcFrame,
    RtcFrameKind, RtpPacket, NALU_TYPE_PPS, NALU_TYPE_SPS,
};

/// Audio tag flags: AAC, 44.1 kHz, 16-bit samples, stereo
const AAC_AUDIO_FLAGS: u8 = 0xAF;

/// Converts an RTC frame stream into RTMP messages
///
/// Video frames (H.264 Annex-B) become AVCC video messages; the first
/// keyframe primes the AVC sequence header from its SPS/PPS. Audio
/// frames (Opus over RTP) are transcoded to AAC; the AAC sequence header
/// is emitted before the first frame.
pub struct RtcToRtmpBridge {
    stream_url: String,

    /// Cached SPS, reused when a keyframe carries only a PPS
    sps: Option<Vec<u8>>,

    /// No video is forwarded until the first keyframe
    seen_keyframe: bool,

    transcoder: Option<OpusToAacTranscoder>,

    audio_header_sent: bool,

    last_audio_ts: i64,
}

impl RtcToRtmpBridge {
    /// Creates the bridge for one published stream
    pub fn new(stream_url: &str) -> RtcToRtmpBridge {
        RtcToRtmpBridge {
            stream_url: stream_url.to_string(),
            sps: None,
            seen_keyframe: false,
            transcoder: None,
            audio_header_sent: false,
            last_audio_ts: 0,
        }
    }

    /// The stream this bridge publishes
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// Handles one frame from the RTC transport
    ///
    /// # Return value
    ///
    /// Returns the RTMP messages to publish, in order
    pub fn on_frame(&mut self, frame: &RtcFrame, logger: &Logger) -> Result<Vec<MediaMessage>, RtcError> {
        // No sender report received yet, the timestamp is meaningless
        if frame.ntp_time_ms <= 0 {
            return Ok(Vec::new());
        }

        match frame.kind {
            RtcFrameKind::Video => self.on_video_frame(frame),
            RtcFrameKind::Audio => self.on_audio_frame(frame, logger),
        }
    }

    fn on_video_frame(&mut self, frame: &RtcFrame) -> Result<Vec<MediaMessage>, RtcError> {
        if frame.key_frame {
            self.seen_keyframe = true;
        }

        if !self.seen_keyframe {
            return Ok(Vec::new());
        }

        let nalus = scan_annex_b(&frame.payload);

        if nalus.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();

        if frame.key_frame {
            let frame_sps = nalus
                .iter()
                .find(|n| nalu_type(n) == NALU_TYPE_SPS)
                .map(|n| n.to_vec());
            let frame_pps = nalus
                .iter()
                .find(|n| nalu_type(n) == NALU_TYPE_PPS)
                .map(|n| n.to_vec());

            // An SPS change replaces the cached one; a PPS-only keyframe
            // reuses the cached SPS
            if let Some(sps) = frame_sps {
                self.sps = Some(sps);
            }

            if let (Some(sps), Some(pps)) = (self.sps.clone(), frame_pps) {
                out.push(make_avc_sequence_header(
                    &sps,
                    &pps,
                    frame.ntp_time_ms,
                ));
            }
        }

        out.push(make_avcc_frame(&nalus, frame.key_frame, frame.ntp_time_ms));

        Ok(out)
    }

    fn on_audio_frame(
        &mut self,
        frame: &RtcFrame,
        logger: &Logger,
    ) -> Result<Vec<MediaMessage>, RtcError> {
        let ts = frame.ntp_time_ms;

        if self.transcoder.is_none() {
            self.transcoder = Some(OpusToAacTranscoder::new(frame.channels)?);
        }

        let mut out = Vec::new();

        if !self.audio_header_sent {
            let header = self
                .transcoder
                .as_ref()
                .map(|t| t.codec_header().to_vec())
                .unwrap_or_default();

            out.push(make_aac_message(&header, true, ts));
            self.audio_header_sent = true;
        }

        // Out-of-order audio is forwarded as-is
        if self.last_audio_ts > ts {
            logger.log_warning("audio ts not monotonically increasing");
        } else {
            self.last_audio_ts = ts;
        }

        let rtp = RtpPacket::parse(&frame.payload)?;

        let transcoder = self
            .transcoder
            .as_mut()
            .expect("transcoder was created above");

        for aac_frame in transcoder.transcode(rtp.payload)? {
            out.push(make_aac_message(&aac_frame, false, ts));
        }

        Ok(out)
    }
}

/// Builds the AVC sequence header message:
/// 17 00 00 00 00 | 01 sps[1] sps[2] sps[3] FF | E1 len sps | 01 len pps
fn make_avc_sequence_header(sps: &[u8], pps: &[u8], timestamp: i64) -> MediaMessage {
    let mut payload = Vec::with_capacity(16 + sps.len() + pps.len());

    payload.push(0x17); // keyframe, AVC
    payload.push(0x00); // sequence header
    payload.extend_from_slice(&[0x00, 0x00, 0x00]); // composition time

    payload.push(0x01); // configuration version
    payload.push(sps.get(1).copied().unwrap_or(0));
    payload.push(sps.get(2).copied().unwrap_or(0));
    payload.push(sps.get(3).copied().unwrap_or(0));
    payload.push(0xFF); // 4-byte NALU lengths
    payload.push(0xE1); // one SPS

    let mut len = [0u8; 2];
    BigEndian::write_u16(&mut len, sps.len() as u16);
    payload.extend_from_slice(&len);
    payload.extend_from_slice(sps);

    payload.push(0x01); // one PPS
    BigEndian::write_u16(&mut len, pps.len() as u16);
    payload.extend_from_slice(&len);
    payload.extend_from_slice(pps);

    MediaMessage::from_slice(MessageHeader::new_video(0, timestamp, 1), &payload)
}

/// Builds an AVCC video message: 17|27 01 00 00 00 then len32-prefixed NALUs
fn make_avcc_frame(nalus: &[&[u8]], key_frame: bool, timestamp: i64) -> MediaMessage {
    let body: usize = nalus.iter().map(|n| 4 + n.len()).sum();
    let mut payload = Vec::with_capacity(5 + body);

    payload.push(if key_frame { 0x17 } else { 0x27 });
    payload.push(0x01); // NALU packet
    payload.extend_from_slice(&[0x00, 0x00, 0x00]); // composition time

    for nalu in nalus {
        let mut len = [0u8; 4];
        BigEndian::write_u32(&mut len, nalu.len() as u32);
        payload.extend_from_slice(&len);
        payload.extend_from_slice(nalu);
    }

    MediaMessage::from_slice(MessageHeader::new_video(0, timestamp, 1), &payload)
}

/// Builds an AAC audio message
fn make_aac_message(data: &[u8], is_header: bool, timestamp: i64) -> MediaMessage {
    let mut payload = Vec::with_capacity(2 + data.len());

    payload.push(AAC_AUDIO_FLAGS);
    payload.push(if is_header { 0x00 } else { 0x01 });
    payload.extend_from_slice(data);

    MediaMessage::from_slice(MessageHeader::new_audio(0, timestamp, 1), &payload)
}

/// Converts RTMP messages into RTC frames (the outbound direction)
///
/// AVCC video becomes Annex-B; AAC audio is transcoded back to Opus.
/// Frames are emitted as they convert; pacing is the transport's concern.
pub struct RtmpToRtcBridge {
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    transcoder: Option<AacToOpusTranscoder>,
}

impl RtmpToRtcBridge {
    /// Creates the outbound bridge
    pub fn new() -> RtmpToRtcBridge {
        RtmpToRtcBridge {
            sps: None,
            pps: None,
            transcoder: None,
        }
    }

    /// Handles an RTMP video message
    ///
    /// # Return value
    ///
    /// Returns the Annex-B frame to hand to the transport, when the
    /// message carries one
    pub fn on_rtmp_video(&mut self, msg: &MediaMessage) -> Result<Option<RtcFrame>, RtcError> {
        let payload = msg.payload.flatten();

        if payload.len() < 5 {
            return Ok(None);
        }

        let key_frame = payload[0] >> 4 == 1;

        if payload[1] == 0x00 {
            // Sequence header: remember SPS/PPS for keyframe prefixing
            self.parse_avc_config(&payload[5..]);
            return Ok(None);
        }

        let mut annex_b = Vec::with_capacity(payload.len() + 16);

        if key_frame {
            if let Some(sps) = &self.sps {
                annex_b.extend_from_slice(&[0, 0, 0, 1]);
                annex_b.extend_from_slice(sps);
            }

            if let Some(pps) = &self.pps {
                annex_b.extend_from_slice(&[0, 0, 0, 1]);
                annex_b.extend_from_slice(pps);
            }
        }

        // AVCC: 4-byte length-prefixed NALUs after the 5-byte tag header
        let mut pos = 5;

        while pos + 4 <= payload.len() {
            let len = BigEndian::read_u32(&payload[pos..pos + 4]) as usize;
            pos += 4;

            if pos + len > payload.len() {
                break;
            }

            annex_b.extend_from_slice(&[0, 0, 0, 1]);
            annex_b.extend_from_slice(&payload[pos..pos + len]);
            pos += len;
        }

        if annex_b.is_empty() {
            return Ok(None);
        }

        Ok(Some(RtcFrame::video(
            msg.header.timestamp,
            key_frame,
            Bytes::from(annex_b),
        )))
    }

    /// Handles an RTMP audio message
    ///
    /// # Return value
    ///
    /// Returns zero or more Opus frames
    pub fn on_rtmp_audio(&mut self, msg: &MediaMessage) -> Result<Vec<RtcFrame>, RtcError> {
        let payload = msg.payload.flatten();

        if payload.len() < 2 {
            return Ok(Vec::new());
        }

        if payload[1] == 0x00 {
            // AAC sequence header configures the transcoder
            self.transcoder = Some(AacToOpusTranscoder::new(&payload[2..])?);
            return Ok(Vec::new());
        }

        let transcoder = match &mut self.transcoder {
            Some(t) => t,
            None => {
                return Ok(Vec::new());
            }
        };

        let packets = transcoder.transcode(&payload[2..])?;

        Ok(packets
            .into_iter()
            .map(|p| RtcFrame::audio(msg.header.timestamp, 48000, 2, Bytes::from(p)))
            .collect())
    }

    fn parse_avc_config(&mut self, config: &[u8]) {
        // AVCDecoderConfigurationRecord
        if config.len() < 7 {
            return;
        }

        let num_sps = (config[5] & 0x1F) as usize;
        let mut pos = 6;

        for _ in 0..num_sps {
            if pos + 2 > config.len() {
                return;
            }

            let len = BigEndian::read_u16(&config[pos..pos + 2]) as usize;
            pos += 2;

            if pos + len > config.len() {
                return;
            }

            self.sps = Some(config[pos..pos + len].to_vec());
            pos += len;
        }

        if pos >= config.len() {
            return;
        }

        let num_pps = config[pos] as usize;
        pos += 1;

        for _ in 0..num_pps {
            if pos + 2 > config.len() {
                return;
            }

            let len = BigEndian::read_u16(&config[pos..pos + 2]) as usize;
            pos += 2;

            if pos + len > config.len() {
                return;
            }

            self.pps = Some(config[pos..pos + len].to_vec());
            pos += len;
        }
    }
}

impl Default for RtmpToRtcBridge {
    fn default() -> Self {
        RtmpToRtcBridge::new()
    }
}

/// Schedules keyframe requests toward the publisher while an RTC
/// subscriber is attached
pub struct KeyframeScheduler {
    interval_ms: u64,
    last_request_ms: i64,
}

impl KeyframeScheduler {
    /// Creates a scheduler with the configured interval
    pub fn new(interval_ms: u64) -> KeyframeScheduler {
        KeyframeScheduler {
            interval_ms,
            last_request_ms: 0,
        }
    }

    /// True when a keyframe should be requested at the given time
    pub fn should_request(&mut self, now_ms: i64) -> bool {
        if now_ms - self.last_request_ms >= self.interval_ms as i64 {
            self.last_request_ms = now_ms;
            return true;
        }

        false
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds an Annex-B payload from NALUs
    fn annex_b(nalus: &[&[u8]]) -> Bytes {
        let mut data = Vec::new();

        for nalu in nalus {
            data.extend_from_slice(&[0, 0, 0, 1]);
            data.extend_from_slice(nalu);
        }

        Bytes::from(data)
    }

    const SPS: &[u8] = &[0x67, 0x42, 0xC0, 0x1E, 0xAA];
    const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];
    const IDR: &[u8] = &[0x65, 0x88, 0x84, 0x00];
    const NON_IDR: &[u8] = &[0x41, 0x9A, 0x02];

    #[test]
    fn test_keyframe_priming_sequence() {
        let logger = Logger::new_disabled();
        let mut bridge = RtcToRtmpBridge::new("live/rtc");

        // Timestamps 0 and -1 are dropped (no sender report yet)
        let out = bridge
            .on_frame(&RtcFrame::video(0, false, annex_b(&[NON_IDR])), &logger)
            .unwrap();
        assert!(out.is_empty());

        let out = bridge
            .on_frame(&RtcFrame::video(-1, false, annex_b(&[NON_IDR])), &logger)
            .unwrap();
        assert!(out.is_empty());

        // A non-keyframe before the first keyframe produces nothing
        let out = bridge
            .on_frame(&RtcFrame::video(120, false, annex_b(&[NON_IDR])), &logger)
            .unwrap();
        assert!(out.is_empty());

        // The first keyframe (SPS+PPS+IDR) emits the sequence header
        // followed by the AVCC keyframe, both at its timestamp
        let out = bridge
            .on_frame(
                &RtcFrame::video(160, true, annex_b(&[SPS, PPS, IDR])),
                &logger,
            )
            .unwrap();

        assert_eq!(out.len(), 2);

        let sh = out[0].payload.flatten();
        assert_eq!(out[0].header.timestamp, 160);
        assert_eq!(&sh[0..2], &[0x17, 0x00]);
        assert_eq!(sh[5], 0x01); // configuration version
        assert_eq!(&sh[6..9], &SPS[1..4]);

        let kf = out[1].payload.flatten();
        assert_eq!(out[1].header.timestamp, 160);
        assert_eq!(&kf[0..2], &[0x17, 0x01]);

        // First NALU length prefix covers the SPS
        assert_eq!(BigEndian::read_u32(&kf[5..9]) as usize, SPS.len());

        // Later inter frames emit plain AVCC messages
        for ts in [200, 240] {
            let out = bridge
                .on_frame(&RtcFrame::video(ts, false, annex_b(&[NON_IDR])), &logger)
                .unwrap();

            assert_eq!(out.len(), 1);
            assert_eq!(out[0].header.timestamp, ts);

            let frame = out[0].payload.flatten();
            assert_eq!(&frame[0..2], &[0x27, 0x01]);
        }
    }

    #[test]
    fn test_pps_only_keyframe_reuses_cached_sps() {
        let logger = Logger::new_disabled();
        let mut bridge = RtcToRtmpBridge::new("live/rtc");

        // Prime with a full keyframe
        bridge
            .on_frame(
                &RtcFrame::video(100, true, annex_b(&[SPS, PPS, IDR])),
                &logger,
            )
            .unwrap();

        // A later keyframe carrying only PPS+IDR still produces a
        // sequence header, built from the cached SPS
        let out = bridge
            .on_frame(&RtcFrame::video(1100, true, annex_b(&[PPS, IDR])), &logger)
            .unwrap();

        assert_eq!(out.len(), 2);

        let sh = out[0].payload.flatten();
        assert_eq!(&sh[0..2], &[0x17, 0x00]);
        assert_eq!(&sh[6..9], &SPS[1..4]);
    }

    #[test]
    fn test_sequence_header_layout() {
        let msg = make_avc_sequence_header(SPS, PPS, 0);
        let payload = msg.payload.flatten();

        // 17 00 | comp(3) | 01 sps1 sps2 sps3 FF | E1 | len sps | 01 | len pps
        assert_eq!(payload[0], 0x17);
        assert_eq!(payload[1], 0x00);
        assert_eq!(payload[9], 0xFF);
        assert_eq!(payload[10], 0xE1);
        assert_eq!(BigEndian::read_u16(&payload[11..13]) as usize, SPS.len());

        let pps_pos = 13 + SPS.len();
        assert_eq!(payload[pps_pos], 0x01);
        assert_eq!(
            BigEndian::read_u16(&payload[pps_pos + 1..pps_pos + 3]) as usize,
            PPS.len()
        );
    }

    #[test]
    fn test_outbound_avcc_to_annex_b() {
        let mut bridge = RtmpToRtcBridge::new();

        // Feed the sequence header
        let sh = make_avc_sequence_header(SPS, PPS, 0);
        assert!(bridge.on_rtmp_video(&sh).unwrap().is_none());

        // Feed a keyframe: SPS/PPS are prefixed in Annex-B form
        let kf = make_avcc_frame(&[IDR], true, 500);
        let frame = bridge.on_rtmp_video(&kf).unwrap().unwrap();

        assert!(frame.key_frame);
        assert_eq!(frame.ntp_time_ms, 500);

        let nalus = scan_annex_b(&frame.payload);
        assert_eq!(nalus.len(), 3);
        assert_eq!(nalus[0], SPS);
        assert_eq!(nalus[1], PPS);
        assert_eq!(nalus[2], IDR);

        // An inter frame converts without the parameter sets
        let p = make_avcc_frame(&[NON_IDR], false, 540);
        let frame = bridge.on_rtmp_video(&p).unwrap().unwrap();

        let nalus = scan_annex_b(&frame.payload);
        assert_eq!(nalus.len(), 1);
        assert_eq!(nalus[0], NON_IDR);
    }

    #[test]
    fn test_keyframe_scheduler() {
        let mut scheduler = KeyframeScheduler::new(5000);

        assert!(scheduler.should_request(5000));
        assert!(!scheduler.should_request(7000));
        assert!(scheduler.should_request(10_000));
    }
}
