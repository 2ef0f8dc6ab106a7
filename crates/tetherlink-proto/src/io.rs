//! Length-prefixed frame reads and writes over async byte streams.
//!
//! TCP delivers an undelimited byte stream with arbitrary segmentation, so
//! the reader works in two exact-length steps: the 4-byte length prefix
//! first, then the rest of the frame. The size limit is enforced before any
//! payload allocation.
//!
//! Generic over `AsyncRead`/`AsyncWrite` so the same code runs over
//! `tokio::net` sockets in production and `turmoil::net` streams in the
//! deterministic simulation harness.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    errors::{FrameError, Result},
    frame::{HEADER_SIZE, LEN_SIZE, MAX_FRAME_SIZE},
};

/// Incremental frame reader that survives cancellation.
///
/// Receive loops that bound each read attempt (`tokio::time::timeout`) must
/// not lose partially read bytes when the timeout fires. This reader keeps
/// its accumulation buffer across calls: `next_frame` is cancel-safe because
/// the underlying `read_buf` either appended bytes to the buffer or did
/// nothing, and extraction only happens once a complete frame is present.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: BytesMut,
}

impl FrameReader {
    /// Empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read until one complete frame is available and return its wire bytes.
    ///
    /// # Errors
    ///
    /// - [`FrameError::FrameTooLarge`] if a length prefix exceeds
    ///   [`MAX_FRAME_SIZE`]
    /// - [`FrameError::Io`] on stream failure or clean EOF mid-stream
    pub async fn next_frame<R>(&mut self, reader: &mut R) -> Result<Bytes>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(wire) = self.try_extract()? {
                return Ok(wire);
            }

            let n = reader.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(FrameError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "peer closed the stream",
                )));
            }
        }
    }

    fn try_extract(&mut self) -> Result<Option<Bytes>> {
        let Some(len_bytes) = self.buf.get(..LEN_SIZE) else {
            return Ok(None);
        };

        let mut len_arr = [0u8; LEN_SIZE];
        len_arr.copy_from_slice(len_bytes);
        let payload_len = u32::from_be_bytes(len_arr) as usize;

        if payload_len > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge { size: payload_len, max: MAX_FRAME_SIZE });
        }

        let total = HEADER_SIZE + payload_len;
        if self.buf.len() < total {
            return Ok(None);
        }

        Ok(Some(self.buf.split_to(total).freeze()))
    }
}

/// Read one complete wire frame.
///
/// Returns the full frame bytes (length prefix included) ready for
/// [`crate::FrameReceiver::verify`]. Short reads are absorbed by
/// `read_exact`; a peer that closes mid-frame surfaces as an I/O error.
///
/// # Errors
///
/// - [`FrameError::FrameTooLarge`] if the length prefix exceeds
///   [`MAX_FRAME_SIZE`], rejected before allocating for the payload
/// - [`FrameError::Io`] on disconnect or any stream failure
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LEN_SIZE];
    reader.read_exact(&mut len_buf).await?;

    let payload_len = u32::from_be_bytes(len_buf) as usize;
    if payload_len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge { size: payload_len, max: MAX_FRAME_SIZE });
    }

    let total = HEADER_SIZE + payload_len;
    let mut wire = vec![0u8; total];
    wire[..LEN_SIZE].copy_from_slice(&len_buf);
    reader.read_exact(&mut wire[LEN_SIZE..]).await?;

    Ok(Bytes::from(wire))
}

/// Write one complete wire frame and flush it.
///
/// The frame is written fully or the call fails; there is no partial-send
/// state to resume from. Callers treat any error as a disconnect.
///
/// # Errors
///
/// - [`FrameError::Io`] on any stream failure
pub async fn write_frame<W>(writer: &mut W, wire: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(wire).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{framer::{FrameReceiver, FrameSender}, psk::Psk};

    fn test_psk() -> Arc<Psk> {
        Arc::new(Psk::new([0x42; 32]))
    }

    #[tokio::test]
    async fn frames_survive_segmentation() {
        let psk = test_psk();
        let sender = FrameSender::new(Arc::clone(&psk));
        let mut receiver = FrameReceiver::new(psk);

        let (client, server) = tokio::io::duplex(16); // tiny buffer forces short reads
        let (mut read_half, _keep) = tokio::io::split(server);
        let (_, mut write_half) = tokio::io::split(client);

        let wire = sender.build(bytes::Bytes::from(vec![0xABu8; 4096])).unwrap();
        let writer = tokio::spawn(async move {
            write_frame(&mut write_half, &wire).await.unwrap();
        });

        let frame_bytes = read_frame(&mut read_half).await.unwrap();
        let (seq, payload) = receiver.verify(&frame_bytes).unwrap();

        assert_eq!(seq, 0);
        assert_eq!(payload.len(), 4096);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn back_to_back_frames_read_individually() {
        let psk = test_psk();
        let sender = FrameSender::new(Arc::clone(&psk));
        let mut receiver = FrameReceiver::new(psk);

        let (client, server) = tokio::io::duplex(65536);
        let (mut read_half, _keep) = tokio::io::split(server);
        let (_, mut write_half) = tokio::io::split(client);

        for label in [b"one".as_slice(), b"two", b"three"] {
            let wire = sender.build(bytes::Bytes::copy_from_slice(label)).unwrap();
            write_frame(&mut write_half, &wire).await.unwrap();
        }

        for (expected_seq, label) in [b"one".as_slice(), b"two", b"three"].iter().enumerate() {
            let frame_bytes = read_frame(&mut read_half).await.unwrap();
            let (seq, payload) = receiver.verify(&frame_bytes).unwrap();
            assert_eq!(seq, expected_seq as u64);
            assert_eq!(&payload[..], *label);
        }
    }

    #[tokio::test]
    async fn oversized_length_prefix_rejected_before_payload_read() {
        let (client, server) = tokio::io::duplex(64);
        let (mut read_half, _keep) = tokio::io::split(server);
        let (_, mut write_half) = tokio::io::split(client);

        let bogus = u32::try_from(MAX_FRAME_SIZE + 1).unwrap().to_be_bytes();
        write_half.write_all(&bogus).await.unwrap();

        let result = read_frame(&mut read_half).await;
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn frame_reader_survives_read_timeouts() {
        let psk = test_psk();
        let sender = FrameSender::new(Arc::clone(&psk));
        let mut receiver = FrameReceiver::new(psk);

        let (client, server) = tokio::io::duplex(65536);
        let (mut read_half, _keep) = tokio::io::split(server);
        let (_, mut write_half) = tokio::io::split(client);

        let wire = sender.build(bytes::Bytes::from(vec![0x5Au8; 600])).unwrap();

        // Trickle the frame in three chunks with pauses longer than the
        // reader's per-attempt timeout.
        let chunks: Vec<Vec<u8>> = wire.chunks(250).map(<[u8]>::to_vec).collect();
        let writer = tokio::spawn(async move {
            for chunk in chunks {
                write_frame(&mut write_half, &chunk).await.unwrap();
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            }
        });

        let mut frame_reader = FrameReader::new();
        let frame_bytes = loop {
            match tokio::time::timeout(
                std::time::Duration::from_millis(10),
                frame_reader.next_frame(&mut read_half),
            )
            .await
            {
                Ok(result) => break result.unwrap(),
                Err(_) => continue, // timeout; partial bytes must survive
            }
        };

        let (_, payload) = receiver.verify(&frame_bytes).unwrap();
        assert_eq!(payload.len(), 600);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn frame_reader_rejects_oversized_prefix() {
        let (client, server) = tokio::io::duplex(64);
        let (mut read_half, _keep) = tokio::io::split(server);
        let (_, mut write_half) = tokio::io::split(client);

        let bogus = u32::try_from(MAX_FRAME_SIZE + 1).unwrap().to_be_bytes();
        write_half.write_all(&bogus).await.unwrap();

        let mut frame_reader = FrameReader::new();
        let result = frame_reader.next_frame(&mut read_half).await;
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn disconnect_mid_frame_is_io_error() {
        let (client, server) = tokio::io::duplex(64);
        let (mut read_half, _keep) = tokio::io::split(server);
        let (_, mut write_half) = tokio::io::split(client);

        // Length prefix promising 10 bytes, then hang up.
        write_half.write_all(&10u32.to_be_bytes()).await.unwrap();
        drop(write_half);
        drop(_keep);

        let result = read_frame(&mut read_half).await;
        assert!(matches!(result, Err(FrameError::Io(_))));
    }
}
