//! Messaging between the orchestrator and its workers.
//!
//! A channel carries length-prefixed frames whose body starts with a `u32`
//! kind header, see [`msg::Msg`]. Control commands and data payloads are
//! JSON, variable values travelling as [`VarMap`]s. The [`peer`] module holds
//! the line-oriented wire form nodes use among themselves.

mod deserialize;
pub mod msg;
pub mod peer;
mod receiver;
mod sender;
mod serialize;
pub mod specs;
pub mod tensor;

use tokio::io::{AsyncRead, AsyncWrite};

pub use deserialize::Deserialize;
pub use receiver::OnoReceiver;
pub use sender::OnoSender;
pub use serialize::Serialize;
pub use tensor::{VarId, VarMap};

/// Length prefix of every frame, big-endian.
type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// Frames `rx` and `tx` into the two halves of a message channel.
///
/// Both ends of a connection must be framed this way: the orchestrator and
/// the worker each call it on their half of the stream.
pub fn channel<R, W>(rx: R, tx: W) -> (OnoReceiver<R>, OnoSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (OnoReceiver::new(rx), OnoSender::new(tx))
}
