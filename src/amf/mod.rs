// AMF module

mod amf0;
mod decode;

pub use amf0::*;
pub use decode::*;

use thiserror::Error;

/// Errors produced when decoding AMF values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmfError {
    /// The buffer ended before the value was complete
    #[error("need more data to decode the AMF value")]
    NeedMoreData,

    /// An unknown or unsupported marker byte was found
    #[error("unknown AMF0 marker: 0x{0:02x}")]
    UnknownMarker(u8),

    /// A string was not valid UTF-8
    #[error("AMF string is not valid UTF-8")]
    InvalidString,
}
