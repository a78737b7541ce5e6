// Capture Buffer - tee writer keeping the trailing N bytes

use std::collections::VecDeque;
use std::io::{self, Write};

/// Pass-through writer that forwards every byte to `inner` and retains the last
/// `capacity` bytes written.
///
/// The retained tail only depends on the concatenated bytes, never on how they were
/// chunked across `write` calls. A failing destination does not affect the tail.
pub struct CaptureBuffer<W: Write> {
    inner: W,
    capacity: usize,
    tail: VecDeque<u8>,
    total_written: u64,
}

impl<W: Write> CaptureBuffer<W> {
    pub fn new(inner: W, capacity: usize) -> Self {
        Self {
            inner,
            capacity,
            tail: VecDeque::with_capacity(capacity),
            total_written: 0,
        }
    }

    /// Retained tail as raw bytes
    pub fn retained(&self) -> Vec<u8> {
        self.tail.iter().copied().collect()
    }

    /// Retained tail as text (invalid UTF-8 replaced)
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.retained()).into_owned()
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn retain(&mut self, buf: &[u8]) {
        self.total_written += buf.len() as u64;

        if self.capacity == 0 {
            return;
        }

        if buf.len() >= self.capacity {
            self.tail.clear();
            self.tail.extend(&buf[buf.len() - self.capacity..]);
            return;
        }

        let overflow = (self.tail.len() + buf.len()).saturating_sub(self.capacity);
        self.tail.drain(..overflow);
        self.tail.extend(buf);
    }
}

impl<W: Write> Write for CaptureBuffer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let forwarded = self.inner.write_all(buf);
        self.retain(buf);
        match forwarded {
            // Already retained; a retried write would capture the bytes twice
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(buf.len()),
            other => other.map(|_| buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
