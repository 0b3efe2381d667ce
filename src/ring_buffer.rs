//! Single-producer, single-consumer byte FIFO with blocking read/write, shutdown and reset.
//!
//! Mirrors the bounded-buffer discipline used throughout `audio/src/fetch/mod.rs`
//! (`parking_lot::{Mutex, Condvar}` guarding a shared status struct), generalized from a
//! byte-range download tracker to a plain ring of bytes.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingOutcome {
    /// Operation completed, with the given byte count (may be less than requested for a
    /// partial write/read at a close/EOF/timeout boundary).
    Count(usize),
    /// The ring is closed; no further data will flow in either direction.
    Shutdown,
    /// The requested timeout elapsed with no progress.
    TimedOut,
}

struct Shared {
    buf: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    filled: usize,
    closed: bool,
    /// Writer called `done_write`: no more bytes are coming, but already-buffered bytes
    /// are still delivered.
    write_done: bool,
}

/// A bounded byte FIFO. One thread may write, one thread may read, concurrently.
pub struct RingBuffer {
    shared: Mutex<Shared>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl RingBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            shared: Mutex::new(Shared {
                buf: vec![0u8; capacity],
                read_pos: 0,
                write_pos: 0,
                filled: 0,
                closed: false,
                write_done: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently buffered and not yet read.
    #[must_use]
    pub fn unread_size(&self) -> usize {
        self.shared.lock().filled
    }

    /// Free space currently available to a writer.
    #[must_use]
    pub fn available_size(&self) -> usize {
        let g = self.shared.lock();
        self.capacity - g.filled
    }

    /// Write up to `buf.len()` bytes, blocking while the ring is full.
    ///
    /// Returns the number of bytes actually written. A write only returns fewer than
    /// `buf.len()` bytes if the ring is closed or the timeout elapses before all bytes fit.
    pub fn write(&self, buf: &[u8], timeout: Option<Duration>) -> RingOutcome {
        if buf.is_empty() {
            return RingOutcome::Count(0);
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut g = self.shared.lock();
        let mut written = 0usize;

        while written < buf.len() {
            if g.closed {
                return if written > 0 {
                    RingOutcome::Count(written)
                } else {
                    RingOutcome::Shutdown
                };
            }

            let free = self.capacity - g.filled;
            if free == 0 {
                let timed_out = match deadline {
                    Some(dl) => {
                        let now = Instant::now();
                        if now >= dl {
                            true
                        } else {
                            self.not_full.wait_for(&mut g, dl - now).timed_out()
                        }
                    }
                    None => {
                        self.not_full.wait(&mut g);
                        false
                    }
                };
                if timed_out {
                    return if written > 0 {
                        RingOutcome::Count(written)
                    } else {
                        RingOutcome::TimedOut
                    };
                }
                continue;
            }

            let chunk = free.min(buf.len() - written);
            for i in 0..chunk {
                g.buf[g.write_pos] = buf[written + i];
                g.write_pos = (g.write_pos + 1) % self.capacity;
            }
            g.filled += chunk;
            written += chunk;
            self.not_empty.notify_one();
        }

        RingOutcome::Count(written)
    }

    /// Read up to `buf.len()` bytes, blocking while the ring is empty and not yet EOF/closed.
    pub fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> RingOutcome {
        if buf.is_empty() {
            return RingOutcome::Count(0);
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut g = self.shared.lock();

        loop {
            if g.filled > 0 {
                let n = g.filled.min(buf.len());
                for i in 0..n {
                    buf[i] = g.buf[g.read_pos];
                    g.read_pos = (g.read_pos + 1) % self.capacity;
                }
                g.filled -= n;
                self.not_full.notify_one();
                return RingOutcome::Count(n);
            }

            if g.closed {
                return RingOutcome::Shutdown;
            }
            if g.write_done {
                return RingOutcome::Count(0);
            }

            let timed_out = match deadline {
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        true
                    } else {
                        self.not_empty.wait_for(&mut g, dl - now).timed_out()
                    }
                }
                None => {
                    self.not_empty.wait(&mut g);
                    false
                }
            };
            if timed_out {
                return RingOutcome::TimedOut;
            }
        }
    }

    /// Signal clean end-of-stream: no more bytes will be written. Already-buffered bytes are
    /// still delivered to the reader; once drained, `read` reports EOF (`Count(0)`).
    pub fn done_write(&self) {
        let mut g = self.shared.lock();
        g.write_done = true;
        self.not_empty.notify_one();
    }

    /// Close the ring. Wakes any blocked reader/writer; subsequent operations return
    /// [`RingOutcome::Shutdown`] immediately.
    pub fn close(&self) {
        let mut g = self.shared.lock();
        g.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Restore the ring to a fresh, empty, open state.
    ///
    /// Only legal while no reader or writer is inside a blocking `read`/`write` call —
    /// callers (the source cache) must ensure the reader thread has already been quiesced
    /// (e.g. via a seek handshake) before calling this.
    pub fn reset(&self) {
        let mut g = self.shared.lock();
        g.read_pos = 0;
        g.write_pos = 0;
        g.filled = 0;
        g.closed = false;
        g.write_done = false;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order_is_preserved() {
        let rb = RingBuffer::new(8);
        assert_eq!(rb.write(b"abcd", None), RingOutcome::Count(4));
        let mut out = [0u8; 4];
        assert_eq!(rb.read(&mut out, None), RingOutcome::Count(4));
        assert_eq!(&out, b"abcd");
    }

    #[test]
    fn write_wraps_around_capacity() {
        let rb = RingBuffer::new(4);
        assert_eq!(rb.write(b"ab", None), RingOutcome::Count(2));
        let mut out = [0u8; 2];
        assert_eq!(rb.read(&mut out, None), RingOutcome::Count(2));
        assert_eq!(&out, b"ab");
        assert_eq!(rb.write(b"cdef", None), RingOutcome::Count(4));
        let mut out2 = [0u8; 4];
        assert_eq!(rb.read(&mut out2, None), RingOutcome::Count(4));
        assert_eq!(&out2, b"cdef");
    }

    #[test]
    fn done_write_then_drain_then_eof() {
        let rb = RingBuffer::new(4);
        rb.write(b"ab", None);
        rb.done_write();
        let mut out = [0u8; 2];
        assert_eq!(rb.read(&mut out, None), RingOutcome::Count(2));
        let mut out2 = [0u8; 2];
        assert_eq!(rb.read(&mut out2, None), RingOutcome::Count(0));
    }

    #[test]
    fn close_wakes_blocked_reader_with_shutdown() {
        let rb = Arc::new(RingBuffer::new(4));
        let rb2 = rb.clone();
        let t = thread::spawn(move || {
            let mut out = [0u8; 4];
            rb2.read(&mut out, None)
        });
        thread::sleep(Duration::from_millis(50));
        rb.close();
        assert_eq!(t.join().unwrap(), RingOutcome::Shutdown);
    }

    #[test]
    fn close_wakes_blocked_writer_with_shutdown_or_partial() {
        let rb = Arc::new(RingBuffer::new(2));
        assert_eq!(rb.write(b"xy", None), RingOutcome::Count(2));
        let rb2 = rb.clone();
        let t = thread::spawn(move || rb2.write(b"ab", None));
        thread::sleep(Duration::from_millis(50));
        rb.close();
        let outcome = t.join().unwrap();
        assert!(matches!(
            outcome,
            RingOutcome::Shutdown | RingOutcome::Count(0)
        ));
    }

    #[test]
    fn reset_restores_empty_open_state() {
        let rb = RingBuffer::new(4);
        rb.write(b"ab", None);
        rb.close();
        rb.reset();
        assert!(!rb.is_closed());
        assert_eq!(rb.unread_size(), 0);
        assert_eq!(rb.write(b"zz", None), RingOutcome::Count(2));
    }

    #[test]
    fn read_times_out_when_empty() {
        let rb = RingBuffer::new(4);
        let mut out = [0u8; 4];
        let start = Instant::now();
        let outcome = rb.read(&mut out, Some(Duration::from_millis(30)));
        assert_eq!(outcome, RingOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn concurrent_producer_consumer_preserves_order() {
        let rb = Arc::new(RingBuffer::new(16));
        let data: Vec<u8> = (0..=255u8).collect();
        let producer_data = data.clone();
        let rb_w = rb.clone();
        let writer = thread::spawn(move || {
            for chunk in producer_data.chunks(7) {
                rb_w.write(chunk, None);
            }
            rb_w.done_write();
        });

        let mut received = Vec::new();
        loop {
            let mut buf = [0u8; 5];
            match rb.read(&mut buf, None) {
                RingOutcome::Count(0) => break,
                RingOutcome::Count(n) => received.extend_from_slice(&buf[..n]),
                other => panic!("unexpected {other:?}"),
            }
        }
        writer.join().unwrap();
        assert_eq!(received, data);
    }
}
