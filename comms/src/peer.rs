//! Wire form of the decentralized variant, where nodes exchange proximal
//! results directly with each other instead of going through an orchestrator.
//!
//! Every message is one JSON object per line carrying a `msgtype`
//! discriminator. A connection must complete the `hello` handshake before any
//! other message is acted upon.

use std::io;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};

use crate::{msg::SolveStatus, tensor::VarMap};

/// A message of the peer protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "msgtype", rename_all = "lowercase")]
pub enum PeerMsg {
    Hello {
        nodeid: String,
    },
    Ping {
        nodeid: String,
    },
    Pong {
        nodeid: String,
    },
    GetProx {
        nodeid: String,
    },
    Prox {
        nodeid: String,
        status: SolveStatus,
        xvals: VarMap,
    },
}

#[derive(Deserialize)]
struct Envelope {
    msgtype: String,
    nodeid: String,
}

#[derive(Deserialize)]
struct ProxBody {
    nodeid: String,
    status: SolveStatus,
    xvals: VarMap,
}

impl PeerMsg {
    pub fn nodeid(&self) -> &str {
        match self {
            PeerMsg::Hello { nodeid }
            | PeerMsg::Ping { nodeid }
            | PeerMsg::Pong { nodeid }
            | PeerMsg::GetProx { nodeid }
            | PeerMsg::Prox { nodeid, .. } => nodeid,
        }
    }

    pub fn msgtype(&self) -> &'static str {
        match self {
            PeerMsg::Hello { .. } => "hello",
            PeerMsg::Ping { .. } => "ping",
            PeerMsg::Pong { .. } => "pong",
            PeerMsg::GetProx { .. } => "getprox",
            PeerMsg::Prox { .. } => "prox",
        }
    }

    /// Encodes the message as a single newline terminated JSON line.
    pub fn encode(&self) -> io::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Decodes one line of the peer protocol.
    ///
    /// The `xvals` keys travel as strings and are restored to integer ids here.
    ///
    /// # Errors
    /// Returns `InvalidData` for malformed JSON or an unknown `msgtype`.
    pub fn decode(line: &str) -> io::Result<Self> {
        let Envelope { msgtype, nodeid } = serde_json::from_str(line)?;

        let msg = match msgtype.as_str() {
            "hello" => PeerMsg::Hello { nodeid },
            "ping" => PeerMsg::Ping { nodeid },
            "pong" => PeerMsg::Pong { nodeid },
            "getprox" => PeerMsg::GetProx { nodeid },
            "prox" => {
                let ProxBody {
                    nodeid,
                    status,
                    xvals,
                } = serde_json::from_str(line)?;

                PeerMsg::Prox {
                    nodeid,
                    status,
                    xvals,
                }
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown msgtype {other:?}"),
                ));
            }
        };

        Ok(msg)
    }
}

/// Handshake state of a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Hello,
    Ready,
}

/// Gates incoming peer messages on the `hello` handshake.
#[derive(Debug)]
pub struct PeerGate {
    local: String,
    remote: Option<String>,
    state: PeerState,
}

impl PeerGate {
    /// Creates a new `PeerGate` for the node identified by `local`.
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: None,
            state: PeerState::Hello,
        }
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn remote(&self) -> Option<&str> {
        self.remote.as_deref()
    }

    /// Runs `msg` through the handshake state machine.
    ///
    /// # Returns
    /// The message when it should be handled, `None` when it arrived before
    /// the handshake and must be dropped.
    ///
    /// # Errors
    /// Returns `ConnectionRefused` when the remote `hello` carries the local
    /// node id, the connection looped back onto this node and must be closed.
    pub fn admit(&mut self, msg: PeerMsg) -> io::Result<Option<PeerMsg>> {
        if let PeerMsg::Hello { nodeid } = &msg {
            if *nodeid == self.local {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connected to self",
                ));
            }

            if self.state == PeerState::Ready && self.remote.as_deref() != Some(nodeid) {
                warn!("peer changed its node id after the handshake");
            }

            self.remote = Some(nodeid.clone());
            self.state = PeerState::Ready;
            return Ok(Some(msg));
        }

        match self.state {
            PeerState::Hello => {
                debug!("dropping {} received before hello", msg.msgtype());
                Ok(None)
            }
            PeerState::Ready => Ok(Some(msg)),
        }
    }
}

/// The receiving end of a peer connection.
pub struct PeerReceiver<R: AsyncRead + Unpin> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> PeerReceiver<R> {
    /// Waits for the next message, skipping blank lines.
    ///
    /// # Returns
    /// `None` once the remote end closed the connection.
    pub async fn recv(&mut self) -> io::Result<Option<PeerMsg>> {
        while let Some(line) = self.lines.next_line().await? {
            let line = line.trim();
            if !line.is_empty() {
                return PeerMsg::decode(line).map(Some);
            }
        }

        Ok(None)
    }
}

/// The sending end of a peer connection.
pub struct PeerSender<W: AsyncWrite + Unpin> {
    tx: W,
}

impl<W: AsyncWrite + Unpin> PeerSender<W> {
    pub async fn send(&mut self, msg: &PeerMsg) -> io::Result<()> {
        self.tx.write_all(msg.encode()?.as_bytes()).await?;
        self.tx.flush().await
    }
}

/// Creates both ends of a newline delimited peer connection.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
pub fn peer_channel<R, W>(rx: R, tx: W) -> (PeerReceiver<R>, PeerSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let lines = BufReader::new(rx).lines();
    (PeerReceiver { lines }, PeerSender { tx })
}
