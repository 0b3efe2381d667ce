//! The control surface: `Player` serializes every public operation through one control
//! mutex and drives the lifecycle state machine. Shaped after `playback/src/lib.rs`'s
//! `GeneralPlayer` command dispatch, generalized to an `Arc`-shared listener and adapter
//! registry instead of a playlist/track domain.

use std::sync::Arc;
use std::time::Duration;

use log::error;
use parking_lot::Mutex;

use crate::adapter::{AdapterRegistry, SinkWrapper, SourceWrapper};
use crate::config::PlayerConfig;
use crate::decoder::pcm::PcmDecoder;
use crate::decoder::symphonia_frame::SymphoniaFrameDecoder;
use crate::decoder::AudioDecoder;
use crate::error::{PlayerError, Result};
use crate::format::{self, ContainerKind, Fetch, MediaInfo};
use crate::pipeline::{self, PipelineHandle};
use crate::resampler::Resampler;
use crate::sink_driver::SinkDriver;
use crate::source_cache::SourceCache;
use crate::state::{Event, State};

pub type StateListener = Arc<dyn Fn(State, i32) + Send + Sync>;

struct Shared {
    state: Mutex<State>,
    listener: Mutex<Option<StateListener>>,
}

impl Shared {
    fn get(&self) -> State {
        *self.state.lock()
    }

    /// Apply `event`, then invoke the listener with the resulting state, outside the state
    /// lock.
    fn transition(&self, event: Event) -> State {
        self.transition_with_code(event, 0)
    }

    fn fail(&self, event: Event, err: &PlayerError) -> State {
        error!("player error: {err}");
        self.transition_with_code(event, err.errcode())
    }

    fn transition_with_code(&self, event: Event, errcode: i32) -> State {
        let new_state = {
            let mut g = self.state.lock();
            *g = g.apply(event);
            *g
        };
        if let Some(listener) = self.listener.lock().clone() {
            listener(new_state, errcode);
        }
        new_state
    }
}

/// A minimal `std::io::Read`-free fetch adapter over a [`SourceCache`], for the format
/// extractors, which need to seek around headers/tails rather than stream sequentially.
struct CacheFetch<'a> {
    cache: &'a mut SourceCache,
}

impl Fetch for CacheFetch<'_> {
    fn fetch(&mut self, offset: i64, buf: &mut [u8]) -> Result<usize> {
        self.cache.seek(offset)?;
        let mut total = 0;
        while total < buf.len() {
            let n = self.cache.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }
}

/// Top-level engine instance. Register adapters, set a data source, then drive it through
/// `prepare_async` → `start` → ... → `stop`/`reset`.
pub struct Player {
    shared: Arc<Shared>,
    registry: Mutex<AdapterRegistry>,
    config: PlayerConfig,
    url: Mutex<Option<String>>,
    pipeline: Arc<Mutex<Option<PipelineHandle>>>,
    /// Serializes every method below; held for the duration of the call, mirroring a
    /// single instance-wide control lock.
    control: Mutex<()>,
}

impl Player {
    #[must_use]
    pub fn create() -> Self {
        Self::with_config(PlayerConfig::default())
    }

    #[must_use]
    pub fn with_config(config: PlayerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Idle),
                listener: Mutex::new(None),
            }),
            registry: Mutex::new(AdapterRegistry::new()),
            config,
            url: Mutex::new(None),
            pipeline: Arc::new(Mutex::new(None)),
            control: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.shared.get()
    }

    pub fn register_source_wrapper(&self, wrapper: Arc<dyn SourceWrapper>) {
        let _guard = self.control.lock();
        self.registry.lock().register_source(wrapper);
    }

    pub fn register_sink_wrapper(&self, wrapper: Arc<dyn SinkWrapper>) {
        let _guard = self.control.lock();
        self.registry.lock().register_sink(wrapper);
    }

    /// Register the single state listener, replacing any previous one.
    pub fn register_state_listener<F>(&self, listener: F)
    where
        F: Fn(State, i32) + Send + Sync + 'static,
    {
        let _guard = self.control.lock();
        *self.shared.listener.lock() = Some(Arc::new(listener));
    }

    pub fn set_data_source(&self, url: &str) -> Result<()> {
        let _guard = self.control.lock();
        let current = self.shared.get();
        if current != State::Idle {
            return Err(PlayerError::InvalidState(current));
        }
        *self.url.lock() = Some(url.to_string());
        self.shared.transition(Event::SetDataSource);
        Ok(())
    }

    /// Resolve adapters, open the source, sniff and extract container metadata, build the
    /// decoder/resampler/sink, and spawn the decode task — all on a background thread.
    /// Transitions to `Prepared` on success or `Error` on failure.
    pub fn prepare_async(&self) -> Result<()> {
        let _guard = self.control.lock();
        let current = self.shared.get();
        if current != State::Inited {
            return Err(PlayerError::InvalidState(current));
        }

        let url = self
            .url
            .lock()
            .clone()
            .ok_or_else(|| PlayerError::InvalidArgument("no data source set".into()))?;
        let source_wrapper = self.registry.lock().resolve_source(&url)?;
        let sink_wrapper = self
            .registry
            .lock()
            .sink()
            .ok_or_else(|| PlayerError::InvalidArgument("no sink wrapper registered".into()))?;

        let shared = self.shared.clone();
        let pipeline_slot = self.pipeline.clone();
        let config = self.config;

        std::thread::Builder::new()
            .name("audiocore-prepare".into())
            .spawn(move || {
                match prepare_pipeline(source_wrapper, sink_wrapper, &url, &config, &shared) {
                    Ok(handle) => {
                        *pipeline_slot.lock() = Some(handle);
                        shared.transition(Event::PrepareOk);
                    }
                    Err(e) => {
                        shared.fail(Event::PrepareFail, &e);
                    }
                }
            })
            .expect("failed to spawn prepare thread");
        Ok(())
    }

    pub fn start(&self) -> Result<()> {
        let _guard = self.control.lock();
        let current = self.shared.get();
        if current != State::Prepared {
            return Err(PlayerError::InvalidState(current));
        }
        if let Some(p) = self.pipeline.lock().as_ref() {
            p.start();
        }
        self.shared.transition(Event::Start);
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        let _guard = self.control.lock();
        let current = self.shared.get();
        if current != State::Started {
            return Err(PlayerError::InvalidState(current));
        }
        if let Some(p) = self.pipeline.lock().as_ref() {
            p.pause();
        }
        self.shared.transition(Event::Pause);
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let _guard = self.control.lock();
        let current = self.shared.get();
        if current != State::Paused {
            return Err(PlayerError::InvalidState(current));
        }
        if let Some(p) = self.pipeline.lock().as_ref() {
            p.resume();
        }
        self.shared.transition(Event::Resume);
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let _guard = self.control.lock();
        let current = self.shared.get();
        if !current.is_playing() {
            return Err(PlayerError::InvalidState(current));
        }
        self.teardown_pipeline();
        self.shared.transition(Event::Stop);
        Ok(())
    }

    /// Unconditionally return to `Idle`, tearing down any running pipeline. Legal from
    /// every state.
    pub fn reset(&self) {
        let _guard = self.control.lock();
        self.teardown_pipeline();
        *self.url.lock() = None;
        self.shared.transition(Event::Reset);
    }

    pub fn destroy(&self) {
        self.reset();
    }

    /// Request a seek to `target_ms`. Legal only while playing; the decode task resolves
    /// it asynchronously and reflects the new position via `get_position`.
    pub fn seek(&self, target_ms: u64) -> Result<()> {
        let _guard = self.control.lock();
        let current = self.shared.get();
        if !current.is_playing() {
            return Err(PlayerError::InvalidState(current));
        }
        if let Some(p) = self.pipeline.lock().as_ref() {
            p.seek(target_ms);
        }
        Ok(())
    }

    #[must_use]
    pub fn get_position(&self) -> u64 {
        self.pipeline
            .lock()
            .as_ref()
            .map_or(0, PipelineHandle::position_ms)
    }

    #[must_use]
    pub fn get_duration(&self) -> u64 {
        self.pipeline
            .lock()
            .as_ref()
            .map_or(0, PipelineHandle::duration_ms)
    }

    fn teardown_pipeline(&self) {
        if let Some(mut p) = self.pipeline.lock().take() {
            p.stop(Duration::from_millis(self.config.task_join_timeout_ms));
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.teardown_pipeline();
    }
}

fn prepare_pipeline(
    source_wrapper: Arc<dyn SourceWrapper>,
    sink_wrapper: Arc<dyn SinkWrapper>,
    url: &str,
    config: &PlayerConfig,
    shared: &Arc<Shared>,
) -> Result<PipelineHandle> {
    let mut cache = SourceCache::open(source_wrapper, url, config)?;
    let content_len = cache.content_len();

    let kind = {
        let mut fetch = CacheFetch { cache: &mut cache };
        format::sniff(url, &mut fetch)?
    };

    let info = {
        let mut fetch = CacheFetch { cache: &mut cache };
        match kind {
            ContainerKind::Mp3 => MediaInfo::Mp3(format::mp3::extract(&mut fetch)?),
            ContainerKind::Aac => MediaInfo::Aac(format::aac::extract(&mut fetch)?),
            ContainerKind::Wav => MediaInfo::Wav(format::wav::extract(&mut fetch)?),
            ContainerKind::M4a => MediaInfo::M4a(format::m4a::extract(&mut fetch, content_len)?),
        }
    };

    let start_offset = match &info {
        MediaInfo::Wav(w) => w.data_offset,
        MediaInfo::Mp3(m) => m.frame_start_offset,
        MediaInfo::Aac(a) => a.adts_sync_offset,
        MediaInfo::M4a(m) => m.mdat_offset,
    };
    cache.seek(start_offset)?;

    let decoder: Box<dyn AudioDecoder> = match &info {
        MediaInfo::Wav(w) => Box::new(PcmDecoder::new(w)),
        MediaInfo::Mp3(m) => Box::new(SymphoniaFrameDecoder::for_mp3(m)?),
        MediaInfo::Aac(a) => Box::new(SymphoniaFrameDecoder::for_aac(a)?),
        MediaInfo::M4a(m) => Box::new(SymphoniaFrameDecoder::for_m4a(m)?),
    };

    let sample_rate = decoder.sample_rate();
    let channels = decoder.channels();
    let resampler = Resampler::open(sample_rate, channels, sample_rate, channels, config)?;
    let sink = SinkDriver::open(sink_wrapper, sample_rate, channels, 16)?;
    let duration_ms = estimate_duration_ms(&info, content_len, start_offset);

    let on_event = {
        let shared = shared.clone();
        Arc::new(move |ev: Event| shared.transition(ev)) as Arc<dyn Fn(Event) -> State + Send + Sync>
    };
    let on_fatal = {
        let shared = shared.clone();
        Arc::new(move |e: &PlayerError| {
            shared.fail(Event::Fatal, e);
        }) as Arc<dyn Fn(&PlayerError) + Send + Sync>
    };

    Ok(pipeline::spawn(
        cache,
        info,
        decoder,
        resampler,
        sink,
        *config,
        duration_ms,
        on_event,
        on_fatal,
    ))
}

fn estimate_duration_ms(info: &MediaInfo, content_len: i64, start_offset: i64) -> u64 {
    match info {
        MediaInfo::Wav(w) => {
            let byte_rate = u64::from(w.bits / 8 * w.channels) * u64::from(w.sample_rate);
            if byte_rate == 0 {
                0
            } else {
                (w.data_size as u64 * 1000) / byte_rate
            }
        }
        MediaInfo::Mp3(m) => {
            if m.bit_rate == 0 {
                return 0;
            }
            let audio_bytes = (content_len - start_offset).max(0) as u64;
            audio_bytes * 8000 / u64::from(m.bit_rate)
        }
        // Raw ADTS carries no total-frame-count table; duration is unknown until fully
        // decoded.
        MediaInfo::Aac(_) => 0,
        MediaInfo::M4a(m) => m.duration_ms(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{SinkHandle, SourceHandle};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    struct FakeSource {
        data: Vec<u8>,
    }

    impl SourceWrapper for FakeSource {
        fn url_protocol(&self) -> &str {
            "file"
        }
        fn open(&self, _url: &str, content_pos: i64) -> Result<SourceHandle> {
            Ok(Box::new(StdMutex::new(content_pos as usize)))
        }
        fn read(&self, handle: &mut SourceHandle, buf: &mut [u8]) -> Result<usize> {
            let pos = handle.downcast_mut::<StdMutex<usize>>().unwrap();
            let mut pos = pos.lock().unwrap();
            let remaining = self.data.len().saturating_sub(*pos);
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.data[*pos..*pos + n]);
            *pos += n;
            Ok(n)
        }
        fn content_pos(&self, handle: &SourceHandle) -> i64 {
            *handle.downcast_ref::<StdMutex<usize>>().unwrap().lock().unwrap() as i64
        }
        fn content_len(&self, _handle: &SourceHandle) -> i64 {
            self.data.len() as i64
        }
        fn seek(&self, handle: &mut SourceHandle, offset: i64) -> Result<()> {
            *handle.downcast_mut::<StdMutex<usize>>().unwrap().lock().unwrap() = offset as usize;
            Ok(())
        }
        fn close(&self, _handle: SourceHandle) {}
    }

    struct FakeSink {
        opened: Arc<AtomicBool>,
    }

    impl SinkWrapper for FakeSink {
        fn name(&self) -> &str {
            "fake"
        }
        fn open(&self, _rate: u32, _channels: u16, _bits: u16) -> Result<SinkHandle> {
            self.opened.store(true, Ordering::SeqCst);
            Ok(Box::new(()))
        }
        fn write(&self, _handle: &mut SinkHandle, buf: &[u8]) -> Result<usize> {
            Ok(buf.len())
        }
        fn buffered_bytes(&self, _handle: &SinkHandle) -> Option<usize> {
            Some(0)
        }
        fn close(&self, _handle: SinkHandle) {}
    }

    fn pcm_wav(sample_rate: u32, channels: u16, bits: u16, frames: usize) -> Vec<u8> {
        let block_align = (bits / 8) * channels;
        let data_size = frames * block_align as usize;
        let byte_rate = sample_rate * u32::from(block_align);
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_size as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&bits.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data_size as u32).to_le_bytes());
        out.resize(out.len() + data_size, 0);
        out
    }

    fn wait_for(player: &Player, want: State) {
        for _ in 0..200 {
            if player.state() == want {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("timed out waiting for {want:?}, last seen {:?}", player.state());
    }

    #[test]
    fn full_lifecycle_reaches_completed() {
        let player = Player::create();
        player.register_source_wrapper(Arc::new(FakeSource {
            data: pcm_wav(8000, 1, 16, 50),
        }));
        let opened = Arc::new(AtomicBool::new(false));
        player.register_sink_wrapper(Arc::new(FakeSink {
            opened: opened.clone(),
        }));

        player.set_data_source("fake.wav").unwrap();
        assert_eq!(player.state(), State::Inited);

        player.prepare_async().unwrap();
        wait_for(&player, State::Prepared);
        assert!(opened.load(Ordering::SeqCst));

        player.start().unwrap();
        wait_for(&player, State::Completed);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let player = Player::create();
        assert!(player.start().is_err());
    }

    #[test]
    fn reset_returns_to_idle_and_stops_pipeline() {
        let player = Player::create();
        player.register_source_wrapper(Arc::new(FakeSource {
            data: pcm_wav(8000, 1, 16, 50_000),
        }));
        player.register_sink_wrapper(Arc::new(FakeSink {
            opened: Arc::new(AtomicBool::new(false)),
        }));
        player.set_data_source("fake.wav").unwrap();
        player.prepare_async().unwrap();
        wait_for(&player, State::Prepared);
        player.start().unwrap();
        player.reset();
        assert_eq!(player.state(), State::Idle);
    }

    #[test]
    fn listener_receives_every_transition() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let player = Player::create();
        let seen_clone = seen.clone();
        player.register_state_listener(move |state, code| {
            seen_clone.lock().unwrap().push((state, code));
        });
        player.register_source_wrapper(Arc::new(FakeSource {
            data: pcm_wav(8000, 1, 16, 10),
        }));
        player.register_sink_wrapper(Arc::new(FakeSink {
            opened: Arc::new(AtomicBool::new(false)),
        }));
        player.set_data_source("fake.wav").unwrap();
        player.prepare_async().unwrap();
        wait_for(&player, State::Prepared);
        player.start().unwrap();
        wait_for(&player, State::Completed);

        let log = seen.lock().unwrap();
        assert!(log.contains(&(State::Inited, 0)));
        assert!(log.contains(&(State::Prepared, 0)));
        assert!(log.contains(&(State::Started, 0)));
        assert!(log.contains(&(State::Completed, 0)));
    }
}
