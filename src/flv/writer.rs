// FLV file writer for stream recording

use std::io::Error;
use std::path::Path;

use tokio::{fs::File, io::AsyncWriteExt};

use crate::rtmp::{MediaMessage, RTMP_TYPE_AUDIO, RTMP_TYPE_DATA, RTMP_TYPE_VIDEO};

use super::{encode_flv_tag, flv_file_header, FLV_TAG_AUDIO, FLV_TAG_SCRIPT, FLV_TAG_VIDEO};

/// Writes a published stream into an FLV file
pub struct FlvFileWriter {
    file: File,
}

impl FlvFileWriter {
    /// Creates the file and writes the FLV header
    pub async fn create(path: &Path) -> Result<FlvFileWriter, Error> {
        let mut file = File::create(path).await?;

        file.write_all(&flv_file_header(true, true)).await?;

        Ok(FlvFileWriter { file })
    }

    /// Appends one message as an FLV tag
    pub async fn write_message(&mut self, msg: &MediaMessage) -> Result<(), Error> {
        let tag_type = match msg.header.message_type {
            RTMP_TYPE_AUDIO => FLV_TAG_AUDIO,
            RTMP_TYPE_VIDEO => FLV_TAG_VIDEO,
            RTMP_TYPE_DATA => FLV_TAG_SCRIPT,
            _ => {
                return Ok(());
            }
        };

        let payload = msg.payload.flatten();
        let tag = encode_flv_tag(tag_type, msg.header.timestamp as u32, payload.as_ref());

        self.file.write_all(&tag).await
    }

    /// Flushes pending bytes to disk
    pub async fn flush(&mut self) -> Result<(), Error> {
        self.file.flush().await
    }
}
