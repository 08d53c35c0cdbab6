//! Transport clients
//!
//! A transport client owns one direction of framing: `send_frame`
//! writes a complete frame to the wire, and a background receive thread
//! pushes every complete inbound frame into the shared inbound queue.
//! The messaging core never touches sockets.
//!
//! Two variants: reliable-ordered ([`TcpTransport`]) and best-effort
//! multicast ([`UdpTransport`]).

mod tcp;
mod udp;

pub use tcp::TcpTransport;
pub use udp::UdpTransport;

use std::sync::Arc;

use crate::error::Result;
use crate::queue::BlockingQueue;

/// Raw frame handoff queue shared by every receive thread.
pub type FrameQueue = Arc<BlockingQueue<Vec<u8>>>;

/// Delivery class a transport provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Reliable, ordered, connection-oriented
    Reliable,
    /// Best-effort multicast; frames may be dropped
    BestEffort,
}

/// A framed, unidirectional-send / thread-receive transport.
///
/// `init` establishes the link and starts the receive thread. Errors
/// from the receive side never cross back to callers; they are logged
/// and retried after a backoff.
pub trait TransportClient: Send + Sync {
    /// Establish the link and start the receive loop.
    fn init(&self) -> Result<()>;

    /// Send one framed buffer. Returns the number of payload bytes
    /// written.
    fn send_frame(&self, frame: &[u8]) -> Result<usize>;
}
