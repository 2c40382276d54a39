//! DNS over TCP frames every message with a 2-byte big-endian length prefix
//! (RFC 1035 §4.2.2).

use crate::MAX_MESSAGE_SIZE;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read one framed DNS message. An announced length beyond
/// [`MAX_MESSAGE_SIZE`] is truncated to the cap; the connection only ever
/// carries one message, so the excess is left unread.
pub async fn read_message<S>(stream: &mut S) -> std::io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 2];
    stream.read_exact(&mut prefix).await?;
    let announced = u16::from_be_bytes(prefix) as usize;
    let size = announced.min(MAX_MESSAGE_SIZE);
    let mut message = vec![0u8; size];
    stream.read_exact(&mut message).await?;
    Ok(message)
}

/// Write one framed DNS message.
pub async fn write_message<S>(stream: &mut S, message: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let size = u16::try_from(message.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "message too large to frame",
        )
    })?;
    stream.write_all(&size.to_be_bytes()).await?;
    stream.write_all(message).await?;
    stream.flush().await
}
