// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The byte-stream seam between the session and the outside world.
//!
//! The session consumes a [`Transport`] but never connects, reconnects or
//! wraps sockets itself; the host owns all of that and tells the session
//! about connect, disconnect and data-ready moments. [`BufferTransport`] is
//! the in-memory implementation used by the tokio driver and by tests.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

/// A connected bidirectional byte stream, as seen from the session.
///
/// Reads are non-blocking: [`Transport::readable`] reports how many bytes
/// can be taken immediately, and [`Transport::read`] copies out at most that
/// many. Writes queue the bytes for delivery in submission order.
pub trait Transport: Send {
    /// Number of bytes that can be read without blocking.
    fn readable(&self) -> usize;

    /// Reads up to `buf.len()` bytes, returning how many were copied.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Queues bytes for transmission to the server.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
}

#[derive(Debug, Default)]
struct Shared {
    incoming: VecDeque<u8>,
    outgoing: Vec<u8>,
    closed: bool,
}

/// An in-memory [`Transport`] with shared interior.
///
/// Clones see the same buffers, so a driver (or a test) keeps one handle to
/// push received bytes and collect queued writes while the session owns the
/// other.
#[derive(Debug, Clone, Default)]
pub struct BufferTransport {
    shared: Arc<Mutex<Shared>>,
}

impl BufferTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes bytes available for the session to read.
    pub fn push_incoming(&self, bytes: &[u8]) {
        self.shared.lock().unwrap().incoming.extend(bytes);
    }

    /// Takes everything the session has written so far.
    pub fn take_outgoing(&self) -> Vec<u8> {
        std::mem::take(&mut self.shared.lock().unwrap().outgoing)
    }

    /// Marks the transport broken; subsequent reads and writes fail.
    pub fn set_closed(&self, closed: bool) {
        self.shared.lock().unwrap().closed = closed;
    }
}

impl Transport for BufferTransport {
    fn readable(&self) -> usize {
        self.shared.lock().unwrap().incoming.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut shared = self.shared.lock().unwrap();
        if shared.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "transport closed"));
        }
        let mut count = 0;
        while count < buf.len() {
            match shared.incoming.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut shared = self.shared.lock().unwrap();
        if shared.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "transport closed"));
        }
        shared.outgoing.extend_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_buffers() {
        let a = BufferTransport::new();
        let mut b = a.clone();

        a.push_incoming(&[1, 2, 3]);
        assert_eq!(b.readable(), 3);
        let mut buf = [0u8; 2];
        assert_eq!(b.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(a.readable(), 1);

        b.write_all(&[9, 8]).unwrap();
        assert_eq!(a.take_outgoing(), vec![9, 8]);
        assert!(a.take_outgoing().is_empty());
    }

    #[test]
    fn closed_transport_errors() {
        let mut t = BufferTransport::new();
        t.set_closed(true);
        assert!(t.write_all(&[1]).is_err());
        let mut buf = [0u8; 1];
        assert!(t.read(&mut buf).is_err());
    }
}
