use crate::core::{CloneError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// One newline-delimited JSON message with its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame<T> {
    pub id: u64,
    pub body: T,
}

impl<T> Frame<T> {
    pub fn new(id: u64, body: T) -> Self {
        Self { id, body }
    }
}

pub async fn write_frame<W, T>(writer: &mut W, frame: &Frame<T>) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next frame. `Ok(None)` means the peer closed cleanly.
pub async fn read_frame<R, T>(reader: &mut R, max_bytes: usize) -> Result<Option<Frame<T>>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(max_bytes as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;

    if read == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&b'\n') {
        if buf.len() > max_bytes {
            return Err(CloneError::Rpc(format!(
                "frame exceeds {} bytes",
                max_bytes
            )));
        }
        return Err(CloneError::Connection(
            "connection closed mid-frame".into(),
        ));
    }

    buf.pop();
    let frame = serde_json::from_slice(&buf)?;
    Ok(Some(frame))
}
