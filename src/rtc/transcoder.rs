// Opus <-> AAC audio transcoding

use std::os::raw::{c_int, c_void};
use std::{mem, ptr};

use fdk_aac_sys as fdk;
use rubato::{FftFixedOut, Resampler};

use super::RtcError;

/// AAC output sample rate
const AAC_SAMPLE_RATE: u32 = 44100;

/// AAC output channel count
const AAC_CHANNELS: usize = 2;

/// AAC output bitrate in bits per second
const AAC_BITRATE: u32 = 48000;

/// Opus always decodes at 48 kHz
const OPUS_SAMPLE_RATE: u32 = 48000;

/// Samples per channel in one 20 ms Opus frame at 48 kHz
const OPUS_FRAME_SAMPLES: usize = 960;

/// Largest Opus frame: 120 ms at 48 kHz
const OPUS_MAX_FRAME_SAMPLES: usize = 5760;

/// Resampler output batch, per channel
const RESAMPLE_BATCH: usize = 1024;

fn check_enc(result: fdk::AACENC_ERROR) -> Result<(), RtcError> {
    if result == fdk::AACENC_ERROR_AACENC_OK {
        Ok(())
    } else {
        Err(RtcError::Transcode(format!("fdk-aac encoder error {}", result)))
    }
}

/// Raw AAC-LC encoder over the fdk library
struct AacEncoder {
    handle: *mut fdk::AACENCODER,
    input_buffer: Vec<i16>,
    output_buffer: Vec<u8>,
    samples_per_frame: usize,
    codec_header: Vec<u8>,
}

// The fdk handle is not tied to a thread
unsafe impl Send for AacEncoder {}

impl AacEncoder {
    /// Opens an AAC-LC encoder producing raw (headerless) frames
    fn new(sample_rate: u32, channels: usize, bitrate: u32) -> Result<AacEncoder, RtcError> {
        let mut handle = ptr::null_mut();

        let channel_mode = match channels {
            1 => fdk::CHANNEL_MODE_MODE_1 as u32,
            _ => fdk::CHANNEL_MODE_MODE_2 as u32,
        };

        let mut maybe_info = mem::MaybeUninit::uninit();
        let info;

        unsafe {
            check_enc(fdk::aacEncOpen(&mut handle as *mut _, 0, channels as u32))?;

            check_enc(fdk::aacEncoder_SetParam(
                handle,
                fdk::AACENC_PARAM_AACENC_AOT,
                fdk::AUDIO_OBJECT_TYPE_AOT_AAC_LC as u32,
            ))?;
            check_enc(fdk::aacEncoder_SetParam(
                handle,
                fdk::AACENC_PARAM_AACENC_SAMPLERATE,
                sample_rate,
            ))?;
            check_enc(fdk::aacEncoder_SetParam(
                handle,
                fdk::AACENC_PARAM_AACENC_CHANNELMODE,
                channel_mode,
            ))?;
            check_enc(fdk::aacEncoder_SetParam(
                handle,
                fdk::AACENC_PARAM_AACENC_BITRATE,
                bitrate,
            ))?;
            // Raw bitstream, the RTMP payload carries no ADTS framing
            check_enc(fdk::aacEncoder_SetParam(
                handle,
                fdk::AACENC_PARAM_AACENC_TRANSMUX,
                0,
            ))?;
            check_enc(fdk::aacEncoder_SetParam(
                handle,
                fdk::AACENC_PARAM_AACENC_AFTERBURNER,
                1,
            ))?;

            // A NULL call initializes the encoder with the parameter set
            check_enc(fdk::aacEncEncode(
                handle,
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null_mut(),
            ))?;

            check_enc(fdk::aacEncInfo(handle, maybe_info.as_mut_ptr()))?;
            info = maybe_info.assume_init();
        }

        Ok(AacEncoder {
            handle,
            input_buffer: Vec::new(),
            output_buffer: vec![0; info.maxOutBufBytes as usize],
            samples_per_frame: info.frameLength as usize,
            codec_header: info.confBuf[..info.confSize as usize].to_vec(),
        })
    }

    /// The AudioSpecificConfig for the configured stream
    fn codec_header(&self) -> &[u8] {
        &self.codec_header
    }

    /// Queues interleaved samples for encoding
    fn push_samples(&mut self, samples: &[i16]) {
        self.input_buffer.extend_from_slice(samples);
    }

    /// Encodes every complete frame queued so far
    fn encode_pending(&mut self) -> Result<Vec<Vec<u8>>, RtcError> {
        let mut frames = Vec::new();

        while self.input_buffer.len() >= self.samples_per_frame * AAC_CHANNELS {
            let in_args = fdk::AACENC_InArgs {
                numInSamples: self.input_buffer.len() as c_int,
                numAncBytes: 0,
            };

            let mut in_buf = self.input_buffer.as_ptr();
            let mut in_buf_ident: c_int = fdk::AACENC_BufferIdentifier_IN_AUDIO_DATA as c_int;
            let mut in_buf_size: c_int = self.input_buffer.len() as c_int;
            let mut in_buf_el_size: c_int = mem::size_of::<i16>() as c_int;

            let in_desc = fdk::AACENC_BufDesc {
                numBufs: 1,
                bufs: &mut in_buf as *mut _ as *mut *mut c_void,
                bufferIdentifiers: &mut in_buf_ident as *mut _,
                bufSizes: &mut in_buf_size as *mut _,
                bufElSizes: &mut in_buf_el_size as *mut _,
            };

            let mut out_buf = self.output_buffer.as_mut_ptr();
            let mut out_buf_ident: c_int =
                fdk::AACENC_BufferIdentifier_OUT_BITSTREAM_DATA as c_int;
            let mut out_buf_size: c_int = self.output_buffer.len() as c_int;
            let mut out_buf_el_size: c_int = 1;

            let out_desc = fdk::AACENC_BufDesc {
                numBufs: 1,
                bufs: &mut out_buf as *mut _ as *mut *mut c_void,
                bufferIdentifiers: &mut out_buf_ident as *mut _,
                bufSizes: &mut out_buf_size as *mut _,
                bufElSizes: &mut out_buf_el_size as *mut _,
            };

            let mut out_args;

            unsafe {
                out_args = mem::zeroed();

                check_enc(fdk::aacEncEncode(
                    self.handle,
                    &in_desc,
                    &out_desc,
                    &in_args,
                    &mut out_args,
                ))?;
            }

            let consumed = out_args.numInSamples as usize;

            if consumed == 0 {
                break;
            }

            self.input_buffer.drain(..consumed);

            if out_args.numOutBytes > 0 {
                frames.push(self.output_buffer[..out_args.numOutBytes as usize].to_vec());
            }
        }

        Ok(frames)
    }
}

impl Drop for AacEncoder {
    fn drop(&mut self) {
        unsafe {
            fdk::aacEncClose(&mut self.handle as *mut _);
        }
    }
}

/// Raw AAC-LC decoder over the fdk library
struct AacDecoder {
    handle: *mut fdk::AAC_DECODER_INSTANCE,
    pcm_buffer: Vec<fdk::INT_PCM>,
}

unsafe impl Send for AacDecoder {}

impl AacDecoder {
    /// Opens a raw AAC decoder configured from an AudioSpecificConfig
    fn new(codec_header: &[u8]) -> Result<AacDecoder, RtcError> {
        let handle = unsafe { fdk::aacDecoder_Open(fdk::TRANSPORT_TYPE_TT_MP4_RAW, 1) };

        if handle.is_null() {
            return Err(RtcError::Transcode("fdk-aac decoder open failed".to_string()));
        }

        let result = unsafe {
            fdk::aacDecoder_ConfigRaw(
                handle,
                &mut codec_header.to_vec().as_mut_ptr(),
                &(codec_header.len() as u32),
            )
        };

        if result != fdk::AAC_DECODER_ERROR_AAC_DEC_OK {
            return Err(RtcError::Transcode(format!(
                "fdk-aac decoder config error {}",
                result
            )));
        }

        Ok(AacDecoder {
            handle,
            pcm_buffer: vec![0; 8192],
        })
    }

    /// Decodes one raw AAC frame into interleaved samples
    fn decode(&mut self, frame: &[u8]) -> Result<Vec<i16>, RtcError> {
        let buffer_size = frame.len() as u32;
        let mut bytes_valid = buffer_size;
        let mut buffer = frame.to_vec();

        let mut samples = Vec::new();

        while bytes_valid > 0 {
            let result = unsafe {
                fdk::aacDecoder_Fill(
                    self.handle,
                    &mut buffer.as_mut_ptr(),
                    &buffer_size,
                    &mut bytes_valid,
                )
            };

            if result != fdk::AAC_DECODER_ERROR_AAC_DEC_OK {
                return Err(RtcError::Transcode(format!(
                    "fdk-aac decoder fill error {}",
                    result
                )));
            }

            loop {
                let result = unsafe {
                    fdk::aacDecoder_DecodeFrame(
                        self.handle,
                        self.pcm_buffer.as_mut_ptr(),
                        self.pcm_buffer.len() as i32,
                        0,
                    )
                };

                if result == fdk::AAC_DECODER_ERROR_AAC_DEC_NOT_ENOUGH_BITS {
                    break;
                }

                if result != fdk::AAC_DECODER_ERROR_AAC_DEC_OK {
                    return Err(RtcError::Transcode(format!(
                        "fdk-aac decode error {}",
                        result
                    )));
                }

                let info = unsafe { *fdk::aacDecoder_GetStreamInfo(self.handle) };
                let frame_samples = (info.aacSamplesPerFrame * info.channelConfig) as usize;

                samples.extend_from_slice(&self.pcm_buffer[..frame_samples]);
            }
        }

        Ok(samples)
    }
}

impl Drop for AacDecoder {
    fn drop(&mut self) {
        unsafe {
            fdk::aacDecoder_Close(self.handle);
        }
    }
}

/// Converts interleaved i16 samples into per-channel f64 buffers
fn deinterleave(samples: &[i16], channels: usize, out: &mut [Vec<f64>; 2]) {
    if channels == 1 {
        for s in samples {
            let v = *s as f64 / i16::MAX as f64;
            out[0].push(v);
            out[1].push(v);
        }
    } else {
        for pair in samples.chunks_exact(2) {
            out[0].push(pair[0] as f64 / i16::MAX as f64);
            out[1].push(pair[1] as f64 / i16::MAX as f64);
        }
    }
}

/// Interleaves per-channel f64 buffers into i16 samples
fn interleave(channels: &[Vec<f64>]) -> Vec<i16> {
    let mut out = Vec::with_capacity(channels[0].len() * 2);

    for i in 0..channels[0].len() {
        for ch in channels {
            out.push((ch[i].clamp(-1.0, 1.0) * i16::MAX as f64) as i16);
        }
    }

    out
}

/// Transcodes an Opus stream into AAC (44.1 kHz, 16-bit, stereo, 48 kbps)
pub struct OpusToAacTranscoder {
    opus_decoder: opus::Decoder,
    input_channels: usize,
    resampler: FftFixedOut<f64>,
    resampler_input: [Vec<f64>; 2],
    aac: AacEncoder,
}

impl OpusToAacTranscoder {
    /// Creates the transcoder for an incoming Opus stream
    pub fn new(input_channels: u8) -> Result<OpusToAacTranscoder, RtcError> {
        let channels = match input_channels {
            1 => opus::Channels::Mono,
            _ => opus::Channels::Stereo,
        };

        let opus_decoder = opus::Decoder::new(OPUS_SAMPLE_RATE, channels)
            .map_err(|e| RtcError::Transcode(e.to_string()))?;

        let resampler = FftFixedOut::<f64>::new(
            OPUS_SAMPLE_RATE as usize,
            AAC_SAMPLE_RATE as usize,
            RESAMPLE_BATCH,
            2,
            AAC_CHANNELS,
        )
        .map_err(|e| RtcError::Transcode(e.to_string()))?;

        let aac = AacEncoder::new(AAC_SAMPLE_RATE, AAC_CHANNELS, AAC_BITRATE)?;

        Ok(OpusToAacTranscoder {
            opus_decoder,
            input_channels: input_channels.max(1) as usize,
            resampler,
            resampler_input: [Vec::new(), Vec::new()],
            aac,
        })
    }

    /// The AudioSpecificConfig of the produced AAC stream
    pub fn codec_header(&self) -> &[u8] {
        self.aac.codec_header()
    }

    /// Transcodes one Opus payload
    ///
    /// # Return value
    ///
    /// Returns zero or more complete raw AAC frames
    pub fn transcode(&mut self, opus_payload: &[u8]) -> Result<Vec<Vec<u8>>, RtcError> {
        // Decode

        let mut pcm = vec![0i16; OPUS_MAX_FRAME_SAMPLES * self.input_channels];

        let decoded = self
            .opus_decoder
            .decode(opus_payload, &mut pcm, false)
            .map_err(|e| RtcError::Transcode(e.to_string()))?;

        pcm.truncate(decoded * self.input_channels);

        // Resample 48 kHz -> 44.1 kHz

        deinterleave(&pcm, self.input_channels, &mut self.resampler_input);

        while self.resampler_input[0].len() >= self.resampler.input_frames_next() {
            let needed = self.resampler.input_frames_next();

            let chunk: Vec<Vec<f64>> = self
                .resampler_input
                .iter_mut()
                .map(|ch| ch.drain(..needed).collect())
                .collect();

            let resampled = self
                .resampler
                .process(&chunk, None)
                .map_err(|e| RtcError::Transcode(e.to_string()))?;

            self.aac.push_samples(&interleave(&resampled));
        }

        // Encode

        self.aac.encode_pending()
    }
}

/// Transcodes an AAC stream back into Opus (48 kHz stereo)
pub struct AacToOpusTranscoder {
    aac: AacDecoder,
    aac_channels: usize,
    resampler: FftFixedOut<f64>,
    resampler_input: [Vec<f64>; 2],
    opus_encoder: opus::Encoder,
    pcm_48k: Vec<i16>,
}

impl AacToOpusTranscoder {
    /// Creates the transcoder from the publisher's AudioSpecificConfig
    pub fn new(codec_header: &[u8]) -> Result<AacToOpusTranscoder, RtcError> {
        let aac = AacDecoder::new(codec_header)?;

        let resampler = FftFixedOut::<f64>::new(
            AAC_SAMPLE_RATE as usize,
            OPUS_SAMPLE_RATE as usize,
            OPUS_FRAME_SAMPLES,
            2,
            AAC_CHANNELS,
        )
        .map_err(|e| RtcError::Transcode(e.to_string()))?;

        let opus_encoder = opus::Encoder::new(
            OPUS_SAMPLE_RATE,
            opus::Channels::Stereo,
            opus::Application::Audio,
        )
        .map_err(|e| RtcError::Transcode(e.to_string()))?;

        Ok(AacToOpusTranscoder {
            aac,
            aac_channels: AAC_CHANNELS,
            resampler,
            resampler_input: [Vec::new(), Vec::new()],
            opus_encoder,
            pcm_48k: Vec::new(),
        })
    }

    /// Transcodes one raw AAC frame
    ///
    /// # Return value
    ///
    /// Returns zero or more Opus packets (20 ms each)
    pub fn transcode(&mut self, aac_frame: &[u8]) -> Result<Vec<Vec<u8>>, RtcError> {
        let samples = self.aac.decode(aac_frame)?;

        deinterleave(&samples, self.aac_channels, &mut self.resampler_input);

        while self.resampler_input[0].len() >= self.resampler.input_frames_next() {
            let needed = self.resampler.input_frames_next();

            let chunk: Vec<Vec<f64>> = self
                .resampler_input
                .iter_mut()
                .map(|ch| ch.drain(..needed).collect())
                .collect();

            let resampled = self
                .resampler
                .process(&chunk, None)
                .map_err(|e| RtcError::Transcode(e.to_string()))?;

            self.pcm_48k.extend(interleave(&resampled));
        }

        let mut packets = Vec::new();
        let frame_len = OPUS_FRAME_SAMPLES * AAC_CHANNELS;

        while self.pcm_48k.len() >= frame_len {
            let frame: Vec<i16> = self.pcm_48k.drain(..frame_len).collect();

            let mut out = vec![0u8; 4000];
            let written = self
                .opus_encoder
                .encode(&frame, &mut out)
                .map_err(|e| RtcError::Transcode(e.to_string()))?;

            out.truncate(written);
            packets.push(out);
        }

        Ok(packets)
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_header_present() {
        let transcoder = OpusToAacTranscoder::new(2).unwrap();

        // A 44.1 kHz stereo AAC-LC AudioSpecificConfig is 2 bytes
        let header = transcoder.codec_header();
        assert!(!header.is_empty());

        // AOT AAC-LC is object type 2 (first 5 bits)
        assert_eq!(header[0] >> 3, 2);
    }

    #[test]
    fn test_opus_silence_produces_aac_frames() {
        let mut transcoder = OpusToAacTranscoder::new(2).unwrap();

        // Build real Opus packets from silence
        let mut encoder = opus::Encoder::new(
            OPUS_SAMPLE_RATE,
            opus::Channels::Stereo,
            opus::Application::Audio,
        )
        .unwrap();

        let silence = vec![0i16; OPUS_FRAME_SAMPLES * 2];

        let mut total_frames = 0;

        for _ in 0..20 {
            let mut packet = vec![0u8; 4000];
            let written = encoder.encode(&silence, &mut packet).unwrap();
            packet.truncate(written);

            let frames = transcoder.transcode(&packet).unwrap();
            total_frames += frames.len();
        }

        // 20 x 20ms of audio comfortably produces AAC frames
        assert!(total_frames > 0);
    }

    #[test]
    fn test_aac_round_trip_to_opus() {
        let mut to_aac = OpusToAacTranscoder::new(2).unwrap();

        let mut encoder = opus::Encoder::new(
            OPUS_SAMPLE_RATE,
            opus::Channels::Stereo,
            opus::Application::Audio,
        )
        .unwrap();

        let silence = vec![0i16; OPUS_FRAME_SAMPLES * 2];

        let mut aac_frames = Vec::new();

        for _ in 0..20 {
            let mut packet = vec![0u8; 4000];
            let written = encoder.encode(&silence, &mut packet).unwrap();
            packet.truncate(written);

            aac_frames.extend(to_aac.transcode(&packet).unwrap());
        }

        assert!(!aac_frames.is_empty());

        let mut to_opus = AacToOpusTranscoder::new(to_aac.codec_header()).unwrap();

        let mut opus_packets = Vec::new();

        for frame in &aac_frames {
            opus_packets.extend(to_opus.transcode(frame).unwrap());
        }

        assert!(!opus_packets.is_empty());
    }
}
