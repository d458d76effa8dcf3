//! Writing frames: a big-endian length prefix followed by the message's
//! kind header and body.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType, Serialize};

/// The writing half of an orchestrator/worker channel.
pub struct OnoSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> OnoSender<W> {
    /// Wraps `tx`, reusing one frame buffer across sends.
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Encodes `msg` into a single frame and flushes it.
    ///
    /// The length prefix also counts the borrowed tail `msg` may hand back
    /// (an error's text), which is written straight from `msg` without being
    /// copied into the frame buffer.
    ///
    /// # Errors
    /// Any I/O error of the underlying writer.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        let Self { buf, tx } = self;

        buf.clear();
        buf.resize(LEN_TYPE_SIZE, 0);

        let tail = msg.serialize(buf);
        let len = buf.len() - LEN_TYPE_SIZE + tail.map_or(0, <[_]>::len);
        buf[..LEN_TYPE_SIZE].copy_from_slice(&(len as LenType).to_be_bytes());
        tx.write_all(buf).await?;

        if let Some(tail) = tail {
            tx.write_all(tail).await?;
        }

        tx.flush().await
    }
}
