//! Wire protocol primitives: handshake and framing.
//!
//! The handshake is a fixed byte sequence sent as one write:
//!
//! ```text
//! [4: version magic LE][4: auth key length LE][auth key][4: JSON magic LE]
//! ```
//!
//! answered by a NUL-terminated ASCII string, `"SUCCESS"` on acceptance.
//! After the handshake both directions exchange frames of
//! `[8: token LE][4: payload length LE][payload bytes]` carrying UTF-8 JSON.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Protocol version magic (V0_4).
pub const VERSION_MAGIC: u32 = 0x400c2d20;
/// JSON wire protocol magic.
pub const JSON_MAGIC: u32 = 0x7e6970c7;

/// Upper bound on a single response payload.
pub const MAX_RESPONSE_SIZE: u32 = 64 * 1024 * 1024;

/// Upper bound on the handshake response, per the protocol.
const MAX_HANDSHAKE_RESPONSE: usize = 1024;

/// Perform the client side of the handshake. The whole greeting goes out as
/// a single buffered write.
pub(crate) async fn client_handshake<S>(stream: &mut S, auth_key: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut greeting = Vec::with_capacity(12 + auth_key.len());
    greeting.extend_from_slice(&VERSION_MAGIC.to_le_bytes());
    greeting.extend_from_slice(&(auth_key.len() as u32).to_le_bytes());
    greeting.extend_from_slice(auth_key.as_bytes());
    greeting.extend_from_slice(&JSON_MAGIC.to_le_bytes());
    stream.write_all(&greeting).await?;
    stream.flush().await?;

    let mut response = Vec::new();
    loop {
        let byte = stream.read_u8().await?;
        if byte == 0 {
            break;
        }
        response.push(byte);
        if response.len() >= MAX_HANDSHAKE_RESPONSE {
            return Err(Error::Auth(String::from_utf8_lossy(&response).into_owned()));
        }
    }

    if response == b"SUCCESS" {
        tracing::debug!("handshake complete");
        Ok(())
    } else {
        Err(Error::Auth(String::from_utf8_lossy(&response).into_owned()))
    }
}

/// Assemble a frame into one contiguous buffer so concurrent writers can
/// never interleave header and payload on the wire.
pub(crate) fn encode_frame(token: u64, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(12 + payload.len());
    frame.extend_from_slice(&token.to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Read one framed response: token, length, payload.
pub(crate) async fn read_frame<R>(stream: &mut R) -> Result<(u64, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let token = stream.read_u64_le().await?;
    let length = stream.read_u32_le().await?;
    if length > MAX_RESPONSE_SIZE {
        return Err(Error::Protocol(format!(
            "response too large: {length} bytes (max: {MAX_RESPONSE_SIZE})"
        )));
    }
    let mut payload = vec![0u8; length as usize];
    stream.read_exact(&mut payload).await?;
    Ok((token, payload))
}
