//! Transport contract and the in-core implementations that need no OS
//! resources.
//!
//! Concrete OS transports (TCP, Unix-domain sockets, named pipes, WebSocket)
//! live with the platform providers; the contract they implement is defined
//! here. Implementations own frame boundaries: the protocol layer never
//! observes a partial frame. Stream-oriented providers can lean on
//! [`StreamReassembler`] for the buffering that obligation requires.

mod in_memory;
mod stream;

pub use in_memory::InMemoryTransport;
pub use stream::StreamReassembler;

use crate::error::Result;
use crate::frame::Frame;

/// A bidirectional, frame-oriented channel.
pub trait Transport {
    /// Hand one frame to the peer. Blocking is implementation-defined.
    fn send(&mut self, frame: &Frame) -> Result<()>;

    /// The next complete frame, or `None` when nothing is available right
    /// now. Implementations must deliver frames in arrival order.
    fn receive(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying resources. Further sends fail.
    fn close(&mut self) -> Result<()>;
}
