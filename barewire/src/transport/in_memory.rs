//! A connected transport pair backed by in-process queues. The reference
//! `Transport` implementation, and the workhorse of protocol tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{BareWireError, Result};
use crate::frame::Frame;
use crate::transport::Transport;

#[derive(Debug, Default)]
struct Endpoint {
    queue: Mutex<VecDeque<Frame>>,
    open: AtomicBool,
}

/// One end of an in-memory connection. Frames cross as values, so frame
/// boundaries hold trivially; delivery order is FIFO per direction.
#[derive(Debug)]
pub struct InMemoryTransport {
    /// Frames addressed to this end.
    inbox: Arc<Endpoint>,
    /// Frames addressed to the peer.
    peer: Arc<Endpoint>,
}

impl InMemoryTransport {
    /// A connected pair; frames sent on one end are received on the other.
    pub fn pair() -> (InMemoryTransport, InMemoryTransport) {
        let a = Arc::new(Endpoint {
            queue: Mutex::new(VecDeque::new()),
            open: AtomicBool::new(true),
        });
        let b = Arc::new(Endpoint {
            queue: Mutex::new(VecDeque::new()),
            open: AtomicBool::new(true),
        });
        (
            InMemoryTransport {
                inbox: Arc::clone(&a),
                peer: Arc::clone(&b),
            },
            InMemoryTransport { inbox: b, peer: a },
        )
    }

    fn lock<'q>(
        queue: &'q Mutex<VecDeque<Frame>>,
    ) -> Result<std::sync::MutexGuard<'q, VecDeque<Frame>>> {
        queue
            .lock()
            .map_err(|_| BareWireError::Transport("queue lock poisoned".into()))
    }
}

impl Transport for InMemoryTransport {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        if !self.inbox.open.load(Ordering::Acquire) {
            return Err(BareWireError::Transport("transport is closed".into()));
        }
        if !self.peer.open.load(Ordering::Acquire) {
            return Err(BareWireError::Transport(
                "peer endpoint is closed".into(),
            ));
        }
        Self::lock(&self.peer.queue)?.push_back(frame.clone());
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Frame>> {
        if !self.inbox.open.load(Ordering::Acquire) {
            return Err(BareWireError::Transport("transport is closed".into()));
        }
        Ok(Self::lock(&self.inbox.queue)?.pop_front())
    }

    fn close(&mut self) -> Result<()> {
        self.inbox.open.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_delivers_in_fifo_order() {
        let (mut a, mut b) = InMemoryTransport::pair();
        let first = Frame::notification(vec![1]);
        let second = Frame::notification(vec![2]);
        a.send(&first).unwrap();
        a.send(&second).unwrap();

        assert_eq!(b.receive().unwrap(), Some(first));
        assert_eq!(b.receive().unwrap(), Some(second));
        assert_eq!(b.receive().unwrap(), None);
    }

    #[test]
    fn test_directions_are_independent() {
        let (mut a, mut b) = InMemoryTransport::pair();
        a.send(&Frame::notification(vec![1])).unwrap();
        assert_eq!(a.receive().unwrap(), None);
        assert!(b.receive().unwrap().is_some());
    }

    #[test]
    fn test_closed_endpoints_refuse_io() {
        let (mut a, mut b) = InMemoryTransport::pair();
        a.close().unwrap();
        assert!(a.send(&Frame::notification(vec![])).is_err());
        assert!(a.receive().is_err());
        // The peer notices on send.
        assert!(b.send(&Frame::notification(vec![])).is_err());
    }

    #[test]
    fn test_receive_from_another_thread() {
        let (mut a, mut b) = InMemoryTransport::pair();
        let frame = Frame::notification(vec![42]);
        let expected = frame.clone();
        let handle = std::thread::spawn(move || {
            a.send(&frame).unwrap();
        });
        handle.join().unwrap();
        assert_eq!(b.receive().unwrap(), Some(expected));
    }
}
