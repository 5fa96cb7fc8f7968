// Minimal RTP packet parsing

use byteorder::{BigEndian, ByteOrder};

use super::RtcError;

const RTP_VERSION: u8 = 2;
const RTP_FIXED_HEADER_SIZE: usize = 12;

/// A parsed RTP packet view
pub struct RtpPacket<'a> {
    /// Payload type
    pub payload_type: u8,

    /// Marker bit
    pub marker: bool,

    /// Sequence number
    pub sequence_number: u16,

    /// Media timestamp
    pub timestamp: u32,

    /// Synchronization source
    pub ssrc: u32,

    /// Payload bytes, with header extension and padding removed
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Parses an RTP packet
    pub fn parse(data: &'a [u8]) -> Result<RtpPacket<'a>, RtcError> {
        if data.len() < RTP_FIXED_HEADER_SIZE {
            return Err(RtcError::MalformedRtp);
        }

        let version = data[0] >> 6;

        if version != RTP_VERSION {
            return Err(RtcError::MalformedRtp);
        }

        let has_padding = data[0] & 0x20 != 0;
        let has_extension = data[0] & 0x10 != 0;
        let csrc_count = (data[0] & 0x0F) as usize;

        let marker = data[1] & 0x80 != 0;
        let payload_type = data[1] & 0x7F;

        let sequence_number = BigEndian::read_u16(&data[2..4]);
        let timestamp = BigEndian::read_u32(&data[4..8]);
        let ssrc = BigEndian::read_u32(&data[8..12]);

        let mut offset = RTP_FIXED_HEADER_SIZE + csrc_count * 4;

        if data.len() < offset {
            return Err(RtcError::MalformedRtp);
        }

        if has_extension {
            if data.len() < offset + 4 {
                return Err(RtcError::MalformedRtp);
            }

            let ext_words = BigEndian::read_u16(&data[offset + 2..offset + 4]) as usize;
            offset += 4 + ext_words * 4;

            if data.len() < offset {
                return Err(RtcError::MalformedRtp);
            }
        }

        let mut end = data.len();

        if has_padding {
            let padding = data[end - 1] as usize;

            if padding == 0 || offset + padding > end {
                return Err(RtcError::MalformedRtp);
            }

            end -= padding;
        }

        Ok(RtpPacket {
            payload_type,
            marker,
            sequence_number,
            timestamp,
            ssrc,
            payload: &data[offset..end],
        })
    }
}

// Tests
