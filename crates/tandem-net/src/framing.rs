//! Length-prefixed framing for the TCP backend.
//!
//! ```text
//! +-------------------+-----------+--------------------+
//! | length (4 bytes)  | class (1) |   payload          |
//! | u32 little-endian |  u8       |   (length bytes)   |
//! +-------------------+-----------+--------------------+
//! ```
//!
//! The length counts payload bytes only. The class byte records the delivery
//! class the sender asked for; TCP delivers everything reliably, but the
//! receiver uses the class for per-class packet budgets and statistics.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::transport::Delivery;

/// Size of the frame header in bytes.
pub const FRAME_HEADER_LEN: usize = 5;

/// Configuration for the framing layer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum allowed payload size in bytes. Default: 64 KiB.
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 65_536,
        }
    }
}

/// Errors that can occur during framing operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload size exceeds the configured maximum.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// The actual payload size.
        size: u32,
        /// The configured maximum.
        max: u32,
    },

    /// The class byte is not a known delivery class.
    #[error("unknown delivery class {0}")]
    UnknownClass(u8),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn map_eof(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Read one frame. Returns the delivery class and payload.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<(Delivery, Vec<u8>), FrameError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header).await.map_err(map_eof)?;

    let payload_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if payload_len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: config.max_payload_size,
        });
    }
    let delivery = Delivery::from_u8(header[4]).ok_or(FrameError::UnknownClass(header[4]))?;

    let mut payload = vec![0u8; payload_len as usize];
    if payload_len > 0 {
        reader.read_exact(&mut payload).await.map_err(map_eof)?;
    }

    Ok((delivery, payload))
}

/// Write one frame and flush.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    delivery: Delivery,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    if len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: config.max_payload_size,
        });
    }

    let mut header = [0u8; FRAME_HEADER_LEN];
    header[..4].copy_from_slice(&len.to_le_bytes());
    header[4] = delivery.as_u8();
    writer.write_all(&header).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;

    Ok(())
}
