//! Queue of backend bytes waiting for a client poll.

use bytes::{Bytes, BytesMut};

/// Backend bytes not yet delivered to the client, in arrival order.
///
/// Data is appended at the tail as backend reads complete and consumed from
/// the head by downlink chunking. Whatever a chunk does not take stays queued
/// for the next poll.
#[derive(Debug, Default)]
pub struct PendingDownlink {
    buf: BytesMut,
}

impl PendingDownlink {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends backend data at the tail.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Removes and returns up to `max` bytes from the head.
    pub fn take(&mut self, max: usize) -> Bytes {
        let n = max.min(self.buf.len());
        self.buf.split_to(n).freeze()
    }
}
