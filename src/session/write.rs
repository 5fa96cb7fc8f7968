// Session write path

use std::io::Error;

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::chain::ByteChain;

/// Writes bytes to the session write stream
pub async fn session_write_bytes<TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin>(
    write_stream: &Mutex<TW>,
    bytes: &[u8],
) -> Result<(), Error> {
    let mut write_stream_v = write_stream.lock().await;
    write_stream_v.write_all(bytes).await
}

/// Writes a byte chain with vectored writes, consuming it
///
/// Partial writes advance the chain's read cursor; fully drained
/// segments are reclaimed as the write progresses.
pub async fn session_write_chain<TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin>(
    write_stream: &Mutex<TW>,
    chain: &mut ByteChain,
) -> Result<(), Error> {
    let mut write_stream_v = write_stream.lock().await;

    while !chain.is_empty() {
        let written = {
            let slices = chain.io_slices();
            write_stream_v.write_vectored(&slices).await?
        };

        if written == 0 {
            return Err(Error::from(std::io::ErrorKind::WriteZero));
        }

        chain
            .advance_read(written)
            .map_err(|_| Error::from(std::io::ErrorKind::InvalidData))?;
        chain.reclaim();
    }

    Ok(())
}
