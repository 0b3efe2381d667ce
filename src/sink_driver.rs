//! Opens a `SinkWrapper` exactly once per prepared stream, writes PCM, and guarantees a
//! single matching `close`.

use std::sync::Arc;

use crate::adapter::{SinkHandle, SinkWrapper};
use crate::error::Result;

pub struct SinkDriver {
    wrapper: Arc<dyn SinkWrapper>,
    handle: Option<SinkHandle>,
}

impl SinkDriver {
    pub fn open(wrapper: Arc<dyn SinkWrapper>, rate: u32, channels: u16, bits: u16) -> Result<Self> {
        let handle = wrapper.open(rate, channels, bits)?;
        Ok(Self {
            wrapper,
            handle: Some(handle),
        })
    }

    /// Write `buf`, returning the actual count written (partial writes are legal).
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let handle = self.handle.as_mut().expect("write after close");
        self.wrapper.write(handle, buf)
    }

    /// Write the entire buffer, retrying on partial writes.
    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            if n == 0 {
                break;
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Bytes still buffered by the sink, or `None` if the wrapper (or an already-closed
    /// sink) can't report one.
    #[must_use]
    pub fn buffered_bytes(&self) -> Option<usize> {
        let handle = self.handle.as_ref()?;
        self.wrapper.buffered_bytes(handle)
    }

    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.wrapper.close(handle);
        }
    }
}

impl Drop for SinkDriver {
    fn drop(&mut self) {
        self.close();
    }
}
