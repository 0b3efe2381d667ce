//! A lightweight streaming audio player engine: ring-buffered source fetch, container
//! sniffing/extraction, codec decoding, resampling, and a pluggable sink, all driven by a
//! small lifecycle state machine.
//!
//! Adapters (where bytes come from, where PCM goes) are registered as trait objects
//! ([`adapter::SourceWrapper`], [`adapter::SinkWrapper`]); this crate ships none itself.

pub mod adapter;
pub mod config;
pub mod decoder;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod player;
pub mod resampler;
pub mod ring_buffer;
pub mod seek;
pub mod sink_driver;
pub mod source_cache;
pub mod state;

pub use adapter::{AdapterRegistry, SinkWrapper, SourceWrapper};
pub use config::PlayerConfig;
pub use error::{PlayerError, Result};
pub use player::Player;
pub use state::{Event, State};
