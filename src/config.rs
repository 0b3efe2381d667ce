//! Tunable defaults for the engine, layered the way `termusiclib::config` layers settings:
//! serde defaults merged with an optional TOML override, via `figment`.

use std::path::Path;

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Ring buffer capacity used for an async `SourceCache`, in bytes, when the
    /// registered `SourceWrapper` doesn't dictate one via `buffer_size`.
    pub async_ring_capacity: usize,
    /// Size of each chunk the decode task reads from the source cache.
    pub decode_chunk_size: usize,
    /// Upper bound on a single `SourceWrapper::read` request issued by the reader thread.
    pub max_single_read: usize,
    /// Resampler quality knob, passed through to the rate converter (0 = fastest/lowest quality).
    pub resample_quality: u8,
    /// Ceiling on how long NEARLYCOMPLETED waits for sink drain when the sink offers no
    /// drain query.
    pub nearly_completed_drain_ceiling_ms: u64,
    /// Budget for joining the decode/reader threads on `stop`/`destroy` before giving up.
    pub task_join_timeout_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            async_ring_capacity: 64 * 1024,
            decode_chunk_size: 4096,
            max_single_read: 32 * 1024,
            resample_quality: 5,
            nearly_completed_drain_ceiling_ms: 2000,
            task_join_timeout_ms: 1000,
        }
    }
}

impl PlayerConfig {
    /// Load defaults, optionally overridden by a TOML file. Missing/unreadable files are
    /// silently ignored: the core writes no persistent state and must never fail to start
    /// because of a missing config file.
    pub fn load(override_path: Option<&Path>) -> Self {
        let mut figment = Figment::from(Serialized::defaults(PlayerConfig::default()));
        if let Some(path) = override_path {
            figment = figment.merge(Toml::file(path));
        }
        figment.extract().unwrap_or_default()
    }
}
