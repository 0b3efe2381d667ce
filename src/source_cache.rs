//! Wraps a [`SourceWrapper`] and presents a single `read`/`seek` surface to the pipeline,
//! whether the adapter wants synchronous pass-through or an interposed reader thread.
//!
//! The async path generalizes `audio/src/fetch/mod.rs`'s `AudioFileStreaming` reader task
//! from a tokio task + `mpsc` command channel to a plain `std::thread` polling a couple of
//! `parking_lot`-guarded flags, since this engine's concurrency model is preemptive threads
//! rather than an async runtime.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};

use crate::adapter::{SourceHandle, SourceWrapper};
use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::ring_buffer::{RingBuffer, RingOutcome};

/// How often the reader thread rechecks `stop_requested`/`seek_request` while blocked
/// trying to push bytes into a full ring buffer.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct AsyncShared {
    seek_request: Option<i64>,
    stop_requested: bool,
    error: Option<PlayerError>,
}

struct AsyncCache {
    ring: Arc<RingBuffer>,
    shared: Arc<Mutex<AsyncShared>>,
    cond: Arc<Condvar>,
    reader: Option<JoinHandle<()>>,
}

enum Mode {
    Sync { handle: Option<SourceHandle> },
    Async(AsyncCache),
}

/// Wraps one open [`SourceWrapper`] handle for the lifetime of a single prepared stream.
pub struct SourceCache {
    wrapper: Arc<dyn SourceWrapper>,
    content_len: i64,
    position: i64,
    mode: Mode,
}

impl SourceCache {
    /// Open `url` through `wrapper`. If the wrapper declares `async_mode()`, spawns a
    /// reader thread immediately; the ring buffer it fills is sized per
    /// `wrapper.buffer_size()`.
    pub fn open(wrapper: Arc<dyn SourceWrapper>, url: &str, config: &PlayerConfig) -> Result<Self> {
        let handle = wrapper.open(url, 0)?;
        let content_len = wrapper.content_len(&handle);

        if wrapper.async_mode() {
            let declared = wrapper.buffer_size();
            let capacity = if declared == 0 { config.async_ring_capacity } else { declared }.max(1);
            let ring = Arc::new(RingBuffer::new(capacity));
            let shared = Arc::new(Mutex::new(AsyncShared {
                seek_request: None,
                stop_requested: false,
                error: None,
            }));
            let cond = Arc::new(Condvar::new());
            let max_single_read = config.max_single_read;

            let reader = {
                let wrapper = wrapper.clone();
                let ring = ring.clone();
                let shared = shared.clone();
                let cond = cond.clone();
                thread::Builder::new()
                    .name("audiocore-source-reader".into())
                    .spawn(move || run_reader(wrapper, handle, ring, shared, cond, max_single_read))
                    .expect("failed to spawn source reader thread")
            };

            Ok(Self {
                wrapper,
                content_len,
                position: 0,
                mode: Mode::Async(AsyncCache {
                    ring,
                    shared,
                    cond,
                    reader: Some(reader),
                }),
            })
        } else {
            Ok(Self {
                wrapper,
                content_len,
                position: 0,
                mode: Mode::Sync {
                    handle: Some(handle),
                },
            })
        }
    }

    /// Total content length in bytes, or `-1` if unknown.
    #[must_use]
    pub fn content_len(&self) -> i64 {
        self.content_len
    }

    /// Byte offset of the next byte the caller will receive from `read`.
    #[must_use]
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.mode {
            Mode::Sync { handle } => {
                let handle = handle.as_mut().expect("handle taken after close");
                let n = self.wrapper.read(handle, buf)?;
                self.position += n as i64;
                Ok(n)
            }
            Mode::Async(ac) => match ac.ring.read(buf, None) {
                RingOutcome::Count(n) => {
                    self.position += n as i64;
                    Ok(n)
                }
                RingOutcome::Shutdown => {
                    let mut g = ac.shared.lock();
                    Err(g.error.take().unwrap_or(PlayerError::Shutdown))
                }
                RingOutcome::TimedOut => unreachable!("read with no timeout cannot time out"),
            },
        }
    }

    /// Reposition to `offset`. In async mode, blocks until the reader thread has
    /// acknowledged the request and reset the ring.
    pub fn seek(&mut self, offset: i64) -> Result<()> {
        match &mut self.mode {
            Mode::Sync { handle } => {
                let handle = handle.as_mut().expect("handle taken after close");
                self.wrapper.seek(handle, offset)?;
                self.position = offset;
                Ok(())
            }
            Mode::Async(ac) => {
                {
                    let mut g = ac.shared.lock();
                    g.seek_request = Some(offset);
                }
                ac.cond.notify_all();

                let mut g = ac.shared.lock();
                while g.seek_request.is_some() && !g.stop_requested {
                    ac.cond.wait(&mut g);
                }
                if let Some(e) = g.error.take() {
                    return Err(e);
                }
                drop(g);
                self.position = offset;
                Ok(())
            }
        }
    }

    /// Stop the reader thread (if any) and release the underlying handle. Idempotent.
    pub fn stop(&mut self) {
        match &mut self.mode {
            Mode::Sync { handle } => {
                if let Some(h) = handle.take() {
                    self.wrapper.close(h);
                }
            }
            Mode::Async(ac) => {
                {
                    let mut g = ac.shared.lock();
                    g.stop_requested = true;
                }
                ac.cond.notify_all();
                ac.ring.close();
                if let Some(h) = ac.reader.take() {
                    if h.join().is_err() {
                        warn!("source reader thread panicked during stop");
                    }
                }
            }
        }
    }
}

impl Drop for SourceCache {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_reader(
    wrapper: Arc<dyn SourceWrapper>,
    mut handle: SourceHandle,
    ring: Arc<RingBuffer>,
    shared: Arc<Mutex<AsyncShared>>,
    cond: Arc<Condvar>,
    max_single_read: usize,
) {
    let chunk_size = max_single_read.min(ring.capacity()).max(1);
    let mut staging = vec![0u8; chunk_size];
    let mut write_done = false;

    'outer: loop {
        {
            let mut g = shared.lock();
            if g.stop_requested {
                break;
            }
            if let Some(off) = g.seek_request {
                drop(g);
                trace!("source reader: seeking to {off}");
                ring.reset();
                write_done = false;
                if let Err(e) = wrapper.seek(&mut handle, off) {
                    let mut g = shared.lock();
                    g.error = Some(e);
                    g.stop_requested = true;
                    drop(g);
                    ring.close();
                    cond.notify_all();
                    break;
                }
                let mut g = shared.lock();
                g.seek_request = None;
                drop(g);
                cond.notify_all();
                continue;
            }
        }

        if write_done {
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        match wrapper.read(&mut handle, &mut staging) {
            Ok(0) => {
                debug!("source reader: upstream EOF");
                ring.done_write();
                write_done = true;
            }
            Ok(n) => {
                let mut written = 0;
                while written < n {
                    match ring.write(&staging[written..n], Some(POLL_INTERVAL)) {
                        RingOutcome::Count(c) => written += c,
                        RingOutcome::TimedOut => {
                            let g = shared.lock();
                            let should_restart = g.stop_requested || g.seek_request.is_some();
                            drop(g);
                            if should_restart {
                                continue 'outer;
                            }
                        }
                        RingOutcome::Shutdown => break 'outer,
                    }
                }
            }
            Err(e) => {
                warn!("source reader: upstream read failed: {e}");
                let mut g = shared.lock();
                g.error = Some(e);
                g.stop_requested = true;
                drop(g);
                ring.close();
                cond.notify_all();
                break;
            }
        }
    }

    wrapper.close(handle);
}
