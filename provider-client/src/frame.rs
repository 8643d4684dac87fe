//! Frame codec for the provider wire protocol.
//!
//! Every message on the connection is an 8 byte header followed by an XML
//! payload:
//!
//! ```text
//! | 1 | 2 | 3 | 4 | 5 | 6 | 7 | 8 |
//! |VERSION|LENGTH |   INVOKE ID   |   XML PAYLOAD ...
//! ```
//!
//! `VERSION` is always 0, `LENGTH` is the big-endian total frame length
//! (payload + 8) and `INVOKE ID` is four ASCII digits.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProviderError, Result};
use crate::invoke_id::InvokeId;

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 8;

/// Protocol version written in every frame.
pub const PROTOCOL_VERSION: u16 = 0;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u16,
    pub invoke_id: InvokeId,
    pub payload: String,
}

/// Encode a frame into a single buffer so it can be written in one call.
pub fn encode_frame(invoke_id: InvokeId, payload: &str) -> Result<Bytes> {
    let total = payload.len() + HEADER_LEN;
    let length = u16::try_from(total).map_err(|_| ProviderError::FrameTooLarge(payload.len()))?;

    let mut buf = BytesMut::with_capacity(total);
    buf.put_u16(PROTOCOL_VERSION);
    buf.put_u16(length);
    buf.put_slice(&invoke_id.to_header_bytes());
    buf.put_slice(payload.as_bytes());
    Ok(buf.freeze())
}

/// Read exactly one frame from the stream.
///
/// A short read or end of stream yields [`ProviderError::ConnectionClosed`].
/// Invoke-id and UTF-8 problems are reported only after the whole frame has
/// been consumed so the caller can keep reading.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    read_exact(reader, &mut header).await?;

    let version = u16::from_be_bytes([header[0], header[1]]);
    let length = u16::from_be_bytes([header[2], header[3]]);
    if usize::from(length) < HEADER_LEN {
        return Err(ProviderError::InvalidLength(length));
    }

    let mut payload = vec![0u8; usize::from(length) - HEADER_LEN];
    read_exact(reader, &mut payload).await?;

    if version != PROTOCOL_VERSION {
        tracing::warn!("Received frame with unexpected protocol version {}", version);
    }

    let invoke_id = InvokeId::from_header_bytes(&header[4..8])?;
    let payload =
        String::from_utf8(payload).map_err(|e| ProviderError::InvalidPayload(e.to_string()))?;

    Ok(Frame {
        version,
        invoke_id,
        payload,
    })
}

async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProviderError::ConnectionClosed)
        }
        Err(e) => Err(ProviderError::Io(e)),
    }
}
