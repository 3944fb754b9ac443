//! Wire framing
//!
//! Client to server: one frame, a 4-byte big-endian length followed by that
//! many payload bytes. Server to client: unframed UTF-8 text fragments, ended
//! by the connection closing.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use splitlm::{Error, Result};

/// Size of the frame length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest frame accepted unless configured otherwise (64 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Read size used when streaming fragments back.
pub const FRAGMENT_READ_CHUNK: usize = 1024;

/// Send `payload` as one length-prefixed frame.
///
/// # Errors
/// Returns [`Error::FrameTooLarge`] if the payload does not fit a `u32`
/// length, or an IO error if the write fails.
pub async fn send_message<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let len = u32::try_from(payload.len()).map_err(|_| Error::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Receive one length-prefixed frame.
///
/// A declared length above `max_len` is rejected before any payload is
/// read or allocated.
///
/// # Errors
/// Returns [`Error::ConnectionClosed`] if the peer closes before the prefix
/// or the payload is complete, [`Error::FrameTooLarge`] for an oversize
/// declaration, or an IO error.
pub async fn receive_message<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    read_full(reader, &mut prefix).await?;
    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_len {
        return Err(Error::FrameTooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    read_full(reader, &mut payload).await?;
    Ok(payload)
}

/// Write raw bytes with no framing.
///
/// # Errors
/// Returns an IO error if the write fails (e.g. the peer disconnected).
pub async fn send_raw<W>(writer: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Like `read_exact`, but reports how far it got when the peer closes.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed {
                expected: buf.len(),
                received: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

/// Reads the server's fragment stream until the connection closes.
///
/// Each read of up to [`FRAGMENT_READ_CHUNK`] bytes becomes one fragment.
/// A UTF-8 character split across reads is held back and completed by the
/// next read; bytes still pending at close are decoded lossily.
pub struct FragmentReader<R> {
    reader: R,
    chunk: Box<[u8]>,
    pending: Vec<u8>,
    done: bool,
}

impl<R: AsyncRead + Unpin> FragmentReader<R> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, FRAGMENT_READ_CHUNK)
    }

    #[must_use]
    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk: vec![0u8; chunk_size.max(1)].into_boxed_slice(),
            pending: Vec::new(),
            done: false,
        }
    }

    /// Next fragment, or `None` once the connection has closed.
    ///
    /// # Errors
    /// Returns an IO error if the read fails; the reader is then finished.
    pub async fn next_fragment(&mut self) -> Result<Option<String>> {
        while !self.done {
            let n = match self.reader.read(&mut self.chunk).await {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Err(e.into());
                }
            };
            if n == 0 {
                self.done = true;
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.pending);
                return Ok(Some(String::from_utf8_lossy(&rest).into_owned()));
            }

            self.pending.extend_from_slice(&self.chunk[..n]);
            let cut = complete_prefix_len(&self.pending);
            if cut == 0 {
                continue;
            }
            let tail = self.pending.split_off(cut);
            let ready = std::mem::replace(&mut self.pending, tail);
            return Ok(Some(String::from_utf8_lossy(&ready).into_owned()));
        }
        Ok(None)
    }

    /// Read every remaining fragment.
    ///
    /// # Errors
    /// Returns the first read error.
    pub async fn collect(mut self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        while let Some(fragment) = self.next_fragment().await? {
            out.push(fragment);
        }
        Ok(out)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Length of `bytes` without a trailing, not yet complete, UTF-8 sequence.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    // A lead byte is at most 3 bytes before the end of an incomplete sequence.
    for back in 1..=bytes.len().min(3) {
        let i = bytes.len() - back;
        let b = bytes[i];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let needed = match b {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return bytes.len(),
        };
        return if back < needed { i } else { bytes.len() };
    }
    bytes.len()
}
