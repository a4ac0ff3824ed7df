//! Length-prefixed frames and raw file streaming
//!
//! A frame is a 4-byte big-endian length followed by that many bytes of UTF-8.
//! File contents follow their description frame as an unframed byte stream
//! whose length the receiver learns from `resourceSize`.
use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{MagpieError, Result};

pub const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;
pub const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// Write one text frame and flush
pub async fn write_frame<W>(writer: &mut W, text: &str, io_timeout: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(text.len())
        .ok()
        .filter(|len| *len as usize <= MAX_FRAME_LEN)
        .ok_or_else(|| MagpieError::Protocol(format!("Frame too large: {} bytes", text.len())))?;

    timeout(io_timeout, async {
        writer.write_all(&len.to_be_bytes()).await?;
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await
    })
    .await??;
    Ok(())
}

/// Read one frame's raw payload. `None` when the peer closed before sending a length.
pub async fn read_frame_bytes<R>(reader: &mut R, io_timeout: Duration) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match timeout(io_timeout, reader.read_exact(&mut len_bytes)).await? {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let msg_len = u32::from_be_bytes(len_bytes) as usize;
    if msg_len > MAX_FRAME_LEN {
        return Err(MagpieError::Protocol(format!(
            "Message too large: {} bytes",
            msg_len
        )));
    }

    let mut buf = vec![0u8; msg_len];
    timeout(io_timeout, reader.read_exact(&mut buf)).await??;
    Ok(Some(buf))
}

/// Read one text frame. `None` when the peer closed before sending a length.
pub async fn read_frame<R>(reader: &mut R, io_timeout: Duration) -> Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    match read_frame_bytes(reader, io_timeout).await? {
        Some(buf) => String::from_utf8(buf)
            .map(Some)
            .map_err(|e| MagpieError::Protocol(format!("Frame is not UTF-8: {}", e))),
        None => Ok(None),
    }
}

/// Stream exactly `size` bytes of the file at `path`.
///
/// Fails without sending the remainder if the file holds fewer bytes than
/// advertised, since the receiver cannot detect a short stream on its own.
pub async fn write_file<W>(
    writer: &mut W,
    path: &Path,
    size: u64,
    io_timeout: Duration,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let file = timeout(io_timeout, File::open(path)).await??;
    let mut reader = file.take(size);
    let mut buf = vec![0u8; FILE_CHUNK_SIZE];
    let mut sent = 0u64;

    loop {
        let read = timeout(io_timeout, reader.read(&mut buf)).await??;
        if read == 0 {
            break;
        }
        timeout(io_timeout, writer.write_all(&buf[..read])).await??;
        sent += read as u64;
    }

    if sent < size {
        return Err(MagpieError::Transport(format!(
            "File {} shrank to {} of {} advertised bytes",
            path.display(),
            sent,
            size
        )));
    }
    timeout(io_timeout, writer.flush()).await??;
    Ok(sent)
}

/// Read exactly `size` raw bytes following a FETCH description frame
pub async fn read_bytes<R>(reader: &mut R, size: u64, io_timeout: Duration) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    let mut remaining = size;
    let mut buf = vec![0u8; FILE_CHUNK_SIZE];

    while remaining > 0 {
        let want = remaining.min(FILE_CHUNK_SIZE as u64) as usize;
        let read = timeout(io_timeout, reader.read(&mut buf[..want])).await??;
        if read == 0 {
            return Err(MagpieError::Transport(format!(
                "Stream ended with {} of {} bytes outstanding",
                remaining, size
            )));
        }
        bytes.extend_from_slice(&buf[..read]);
        remaining -= read as u64;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const T: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_frame_layout() {
        let mut out = Vec::new();
        write_frame(&mut out, r#"{"response":"success"}"#, T)
            .await
            .unwrap();
        assert_eq!(&out[..4], &22u32.to_be_bytes());
        assert_eq!(&out[4..], br#"{"response":"success"}"#);
    }

    #[tokio::test]
    async fn test_read_frames_until_eof() {
        let mut out = Vec::new();
        write_frame(&mut out, "first", T).await.unwrap();
        write_frame(&mut out, "", T).await.unwrap();

        let mut input = out.as_slice();
        assert_eq!(read_frame(&mut input, T).await.unwrap().as_deref(), Some("first"));
        assert_eq!(read_frame(&mut input, T).await.unwrap().as_deref(), Some(""));
        assert!(read_frame(&mut input, T).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_utf8_payload_is_readable_as_bytes() {
        let mut out = 3u32.to_be_bytes().to_vec();
        out.extend_from_slice(&[0xff, 0xfe, 0x7b]);

        let mut input = out.as_slice();
        let payload = read_frame_bytes(&mut input, T).await.unwrap();
        assert_eq!(payload, Some(vec![0xff, 0xfe, 0x7b]));

        let mut input = out.as_slice();
        let result = read_frame(&mut input, T).await;
        assert!(matches!(result, Err(MagpieError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let len = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        let mut input = &len[..];
        let result = read_frame(&mut input, T).await;
        assert!(matches!(result, Err(MagpieError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_an_error() {
        let mut out = 10u32.to_be_bytes().to_vec();
        out.extend_from_slice(b"abc");
        let mut input = out.as_slice();
        assert!(read_frame(&mut input, T).await.is_err());
    }

    #[tokio::test]
    async fn test_file_stream_is_exact() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let contents: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        file.write_all(&contents).unwrap();

        let mut out = Vec::new();
        let sent = write_file(&mut out, file.path(), contents.len() as u64, T)
            .await
            .unwrap();
        assert_eq!(sent, contents.len() as u64);
        assert_eq!(out, contents);

        let mut input = out.as_slice();
        let received = read_bytes(&mut input, sent, T).await.unwrap();
        assert_eq!(received, contents);
    }

    #[tokio::test]
    async fn test_short_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"tiny").unwrap();

        let mut out = Vec::new();
        assert!(write_file(&mut out, file.path(), 100, T).await.is_err());
    }
}
