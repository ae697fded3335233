//! Dispatch protocol
//!
//! This module defines the messages exchanged between the coordinator and its
//! workers. Messages are serialized with MessagePack (rmp-serde) for compact
//! binary framing with full serde feature support.
//!
//! # Message Flow
//!
//! ```text
//! Worker                          Coordinator
//!   |                                 |
//!   |---------- GET ----------------->|
//!   |<--------- TASK(descriptor) -----|
//!   |   (execute, repeat)             |
//!   |---------- GET ----------------->|
//!   |<--------- STOP -----------------|
//!   |   (terminal, no further messages)
//! ```
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```
//!
//! The complete frame must fit in `MAX_MESSAGE_SIZE`. Task descriptors are
//! assumed to fit; one that does not is a configuration error, so both the
//! send and receive paths treat an oversized frame as fatal.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::task::TaskDescriptor;

/// Protocol version
///
/// Carried in every work request. Coordinator and workers must match.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum size of a framed message, length prefix included
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Protocol message
///
/// A fresh value is constructed for every exchange; no message outlives a
/// single request/reply pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Work request (Worker → Coordinator)
    ///
    /// Sent when the worker is idle. Doubles as the implicit completion
    /// report for the previous task.
    Get(GetMessage),

    /// Task assignment (Coordinator → Worker)
    Task(TaskMessage),

    /// Shutdown sentinel (Coordinator → Worker)
    ///
    /// Each worker receives exactly one, and nothing after it.
    Stop,
}

/// Work request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,

    /// Worker identifier (hostname and port)
    pub worker_id: String,
}

/// Task assignment message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    /// The unit of work to execute
    pub descriptor: TaskDescriptor,
}

/// Serialize a message to bytes
///
/// Prepends a 4-byte length field for framing. Fails if the framed message
/// would exceed `MAX_MESSAGE_SIZE`.
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec(msg).context("Failed to serialize message")?;

    if 4 + msg_bytes.len() > MAX_MESSAGE_SIZE {
        anyhow::bail!(
            "Message too large: {} bytes (max {})",
            4 + msg_bytes.len(),
            MAX_MESSAGE_SIZE
        );
    }

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Deserialize a message from bytes
///
/// Expects a 4-byte length prefix followed by a MessagePack-serialized
/// message. Returns (message, bytes_consumed) where bytes_consumed includes
/// the length prefix.
pub fn deserialize_message(buf: &[u8]) -> Result<(Message, usize)> {
    if buf.len() < 4 {
        anyhow::bail!(
            "Buffer too small for message length (need 4 bytes, got {})",
            buf.len()
        );
    }

    let msg_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if 4 + msg_len > MAX_MESSAGE_SIZE {
        anyhow::bail!("Message too large: {} bytes (max {})", 4 + msg_len, MAX_MESSAGE_SIZE);
    }

    if buf.len() < 4 + msg_len {
        anyhow::bail!(
            "Incomplete message (need {} bytes, got {})",
            4 + msg_len,
            buf.len()
        );
    }

    let msg = rmp_serde::from_slice(&buf[4..4 + msg_len]).context("Failed to deserialize message")?;

    Ok((msg, 4 + msg_len))
}

/// Read a complete message from a stream
///
/// Reads the length prefix, then the message body. Blocks until the full
/// frame has arrived.
pub async fn read_message<S>(stream: &mut S) -> Result<Message>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("Failed to read message length")?;

    let msg_len = u32::from_le_bytes(len_buf) as usize;

    if 4 + msg_len > MAX_MESSAGE_SIZE {
        anyhow::bail!("Message too large: {} bytes (max {})", 4 + msg_len, MAX_MESSAGE_SIZE);
    }

    let mut msg_buf = vec![0u8; msg_len];
    stream
        .read_exact(&mut msg_buf)
        .await
        .context("Failed to read message body")?;

    let msg = rmp_serde::from_slice(&msg_buf).context("Failed to deserialize message")?;

    Ok(msg)
}

/// Write a message to a stream
///
/// Serializes the message with its length prefix, writes it, and flushes so
/// the peer sees it immediately.
pub async fn write_message<S>(stream: &mut S, msg: &Message) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let framed = serialize_message(msg)?;

    stream
        .write_all(&framed)
        .await
        .context("Failed to write message")?;

    stream.flush().await.context("Failed to flush stream")?;

    Ok(())
}
