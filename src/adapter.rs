//! Source/sink capability traits and the registry that selects among them.
//!
//! Generalizes the original C adapter contract (`adapter/source_file_wrapper.h`,
//! `adapter/alsa_wrapper.h`: a URL protocol string, an opaque handle, and a handful of
//! function pointers) into Rust trait objects.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PlayerError, Result};

/// An opaque, adapter-owned handle. Adapters decide what this means internally; the core
/// never interprets it beyond passing it back to the same adapter.
pub type SourceHandle = Box<dyn std::any::Any + Send>;
pub type SinkHandle = Box<dyn std::any::Any + Send>;

/// A byte-stream input capability (file, HTTP, flash, ...). Concrete adapters are out of
/// scope for this engine; this trait is the seam they plug into.
pub trait SourceWrapper: Send + Sync {
    /// URL scheme this wrapper handles, e.g. `"file"` or `"http"`.
    fn url_protocol(&self) -> &str;

    /// When true, the core interposes a reader thread + ring buffer.
    fn async_mode(&self) -> bool {
        false
    }

    /// Ring buffer capacity to use when `async_mode()` is true, or `0` to defer to
    /// `PlayerConfig::async_ring_capacity`. Most wrappers have no opinion here; only one
    /// with a genuine reason to dictate its own buffer size (e.g. matching a fixed hardware
    /// DMA chunk) should override it.
    fn buffer_size(&self) -> usize {
        0
    }

    fn open(&self, url: &str, content_pos: i64) -> Result<SourceHandle>;

    /// Read up to `buf.len()` bytes, returning the actual count (0 at EOF).
    fn read(&self, handle: &mut SourceHandle, buf: &mut [u8]) -> Result<usize>;

    fn content_pos(&self, handle: &SourceHandle) -> i64;

    /// Total content length in bytes, or `-1` if unknown (e.g. a live stream).
    fn content_len(&self, handle: &SourceHandle) -> i64;

    fn seek(&self, handle: &mut SourceHandle, offset: i64) -> Result<()>;

    fn close(&self, handle: SourceHandle);
}

/// An audio output capability (ALSA, I2S, OpenSL ES, AudioTrack, ...).
pub trait SinkWrapper: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self, rate: u32, channels: u16, bits: u16) -> Result<SinkHandle>;

    /// Write up to `buf.len()` bytes, returning the actual count written (partial writes
    /// are permitted).
    fn write(&self, handle: &mut SinkHandle, buf: &[u8]) -> Result<usize>;

    /// Bytes still buffered by the sink and not yet physically played, or `None` if the
    /// wrapper can't report this. Used to size the NEARLYCOMPLETED drain wait; `None`
    /// makes the caller wait the full `nearly_completed_drain_ceiling_ms` conservatively.
    fn buffered_bytes(&self, _handle: &SinkHandle) -> Option<usize> {
        None
    }

    fn close(&self, handle: SinkHandle);
}

/// Holds the registered source wrappers (keyed by protocol, plus registration order for
/// fallback selection) and the single sink wrapper.
#[derive(Default)]
pub struct AdapterRegistry {
    by_protocol: HashMap<String, usize>,
    sources: Vec<Arc<dyn SourceWrapper>>,
    sink: Option<Arc<dyn SinkWrapper>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_source(&mut self, wrapper: Arc<dyn SourceWrapper>) {
        let idx = self.sources.len();
        self.by_protocol
            .insert(wrapper.url_protocol().to_string(), idx);
        self.sources.push(wrapper);
    }

    pub fn register_sink(&mut self, wrapper: Arc<dyn SinkWrapper>) {
        self.sink = Some(wrapper);
    }

    #[must_use]
    pub fn sink(&self) -> Option<Arc<dyn SinkWrapper>> {
        self.sink.clone()
    }

    /// Resolve a URL to a registered source wrapper. `scheme://rest` selects by scheme;
    /// otherwise fall back to extension-based selection, then the first registered wrapper.
    pub fn resolve_source(&self, url: &str) -> Result<Arc<dyn SourceWrapper>> {
        if self.sources.is_empty() {
            return Err(PlayerError::InvalidArgument(
                "no source wrappers registered".into(),
            ));
        }

        if let Some(scheme) = url.split_once("://").map(|(s, _)| s) {
            if let Some(&idx) = self.by_protocol.get(scheme) {
                return Ok(self.sources[idx].clone());
            }
            return Err(PlayerError::InvalidArgument(format!(
                "no source wrapper registered for protocol {scheme:?}"
            )));
        }

        if let Some(ext) = url.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()) {
            let protocol_guess = match ext.as_str() {
                "mp3" => Some("file"),
                "aac" => Some("file"),
                "m4a" | "mp4" => Some("file"),
                "wav" => Some("file"),
                _ => None,
            };
            if let Some(proto) = protocol_guess {
                if let Some(&idx) = self.by_protocol.get(proto) {
                    return Ok(self.sources[idx].clone());
                }
            }
        }

        Ok(self.sources[0].clone())
    }
}
