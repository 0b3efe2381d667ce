//! The decode→resample→sink dataflow and the decode task that drives it.
//!
//! The decode task is a single `std::thread` per prepared stream, matching the
//! concurrency model in §5: it parks on a condvar while paused, otherwise loops reading
//! from the source cache, decoding, resampling, and writing to the sink.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::config::PlayerConfig;
use crate::decoder::AudioDecoder;
use crate::error::PlayerError;
use crate::format::MediaInfo;
use crate::resampler::Resampler;
use crate::seek;
use crate::sink_driver::SinkDriver;
use crate::source_cache::SourceCache;
use crate::state::Event;

/// Shared control block between a caller thread (pause/resume/seek/stop) and the decode
/// thread it targets.
pub struct PipelineControl {
    pub pause_requested: bool,
    pub stop_requested: bool,
    pub seek_pending: Option<u64>,
    pub position_ms: u64,
    pub duration_ms: u64,
}

impl PipelineControl {
    fn new(duration_ms: u64) -> Self {
        // Starts paused: the decode thread is spawned once the pipeline is built, during
        // `prepare_async`, but must not produce audio until `start()`.
        Self {
            pause_requested: true,
            stop_requested: false,
            seek_pending: None,
            position_ms: 0,
            duration_ms,
        }
    }
}

pub struct PipelineHandle {
    pub control: Arc<Mutex<PipelineControl>>,
    cond: Arc<Condvar>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl PipelineHandle {
    #[must_use]
    pub fn position_ms(&self) -> u64 {
        self.control.lock().position_ms
    }

    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.control.lock().duration_ms
    }

    pub fn start(&self) {
        let mut g = self.control.lock();
        g.pause_requested = false;
        drop(g);
        self.cond.notify_all();
    }

    pub fn pause(&self) {
        let mut g = self.control.lock();
        g.pause_requested = true;
    }

    pub fn resume(&self) {
        let mut g = self.control.lock();
        g.pause_requested = false;
        drop(g);
        self.cond.notify_all();
    }

    pub fn seek(&self, target_ms: u64) {
        let mut g = self.control.lock();
        g.seek_pending = Some(target_ms);
        drop(g);
        self.cond.notify_all();
    }

    /// Signal the decode thread to stop and join it, waiting up to
    /// `PlayerConfig::task_join_timeout_ms`. Logs (does not panic) if the thread does not
    /// exit in time.
    pub fn stop(&mut self, join_timeout: Duration) {
        {
            let mut g = self.control.lock();
            g.stop_requested = true;
            g.pause_requested = false;
        }
        self.cond.notify_all();

        let Some(handle) = self.thread.take() else {
            return;
        };
        let (tx, rx) = std::sync::mpsc::channel();
        let _ = std::thread::Builder::new().spawn(move || {
            handle.join().ok();
            let _ = tx.send(());
        });
        if rx.recv_timeout(join_timeout).is_err() {
            warn!("decode thread did not exit within {join_timeout:?}; abandoning it");
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn spawn(
    mut source_cache: SourceCache,
    mut media_info: MediaInfo,
    mut decoder: Box<dyn AudioDecoder>,
    mut resampler: Resampler,
    mut sink: SinkDriver,
    config: PlayerConfig,
    duration_ms: u64,
    on_event: Arc<dyn Fn(Event) -> crate::state::State + Send + Sync>,
    on_fatal: Arc<dyn Fn(&PlayerError) + Send + Sync>,
) -> PipelineHandle {
    let control = Arc::new(Mutex::new(PipelineControl::new(duration_ms)));
    let cond = Arc::new(Condvar::new());

    let thread = {
        let control = control.clone();
        let cond = cond.clone();
        std::thread::Builder::new()
            .name("audiocore-decode".into())
            .spawn(move || {
                run(
                    &mut source_cache,
                    &mut media_info,
                    decoder.as_mut(),
                    &mut resampler,
                    &mut sink,
                    &config,
                    &control,
                    &cond,
                    on_event.as_ref(),
                    on_fatal.as_ref(),
                );
            })
            .expect("failed to spawn decode thread")
    };

    PipelineHandle {
        control,
        cond,
        thread: Some(thread),
    }
}

/// One codec frame sliced off the front of `pending`, for the compressed container kinds
/// (MP3, raw ADTS AAC, M4A). WAV/PCM has no frame concept and never goes through this.
enum FrameStep {
    /// Not enough bytes buffered yet for a whole frame; read more from the source.
    NeedMoreData,
    /// One whole frame is ready. `source_bytes` is how many bytes to drop from `pending`
    /// (the genuine bytes read off the wire); `decoder_input` is what gets handed to
    /// `decoder.decode` (identical to the source bytes for MP3/AAC, but prefixed with a
    /// synthesized ADTS header for M4A, whose elementary-stream frames carry none).
    Frame { source_bytes: usize, decoder_input: Vec<u8> },
    /// M4A only: the `stsz` table is exhausted, so nothing remains to frame even if
    /// `pending` still holds trailing bytes (container padding, moov-at-end tail, ...).
    TrackComplete,
}

/// Slice the next whole codec frame off the front of `pending` for a compressed container.
fn next_frame(media_info: &mut MediaInfo, pending: &[u8]) -> Result<FrameStep, PlayerError> {
    match media_info {
        MediaInfo::Mp3(_) => match crate::format::mp3::frame_len(pending) {
            Some(len) if pending.len() >= len => Ok(FrameStep::Frame {
                source_bytes: len,
                decoder_input: pending[..len].to_vec(),
            }),
            Some(_) => Ok(FrameStep::NeedMoreData),
            None if pending.len() < 4 => Ok(FrameStep::NeedMoreData),
            None => Err(PlayerError::DecoderError("lost MP3 frame sync".into())),
        },
        MediaInfo::Aac(_) => match crate::format::aac::frame_len(pending) {
            Some(len) if pending.len() >= len => Ok(FrameStep::Frame {
                source_bytes: len,
                decoder_input: pending[..len].to_vec(),
            }),
            Some(_) => Ok(FrameStep::NeedMoreData),
            None if pending.len() < crate::format::aac::ADTS_HEADER_LEN => Ok(FrameStep::NeedMoreData),
            None => Err(PlayerError::DecoderError("lost ADTS frame sync".into())),
        },
        MediaInfo::M4a(m) => {
            if m.frame_cursor >= m.stsz.len() {
                return Ok(FrameStep::TrackComplete);
            }
            let raw_len = m.stsz[m.frame_cursor] as usize;
            if pending.len() < raw_len {
                return Ok(FrameStep::NeedMoreData);
            }
            let total = crate::format::aac::ADTS_HEADER_LEN + raw_len;
            let header = crate::format::aac::build_adts_header(m.profile, m.sample_rate, m.channels, total);
            let mut decoder_input = Vec::with_capacity(total);
            decoder_input.extend_from_slice(&header);
            decoder_input.extend_from_slice(&pending[..raw_len]);
            Ok(FrameStep::Frame { source_bytes: raw_len, decoder_input })
        }
        MediaInfo::Wav(_) => unreachable!("WAV decodes via the chunk-based PCM path, not per-frame slicing"),
    }
}

/// How long NEARLYCOMPLETED should wait for the sink to drain before closing it, based on
/// how many bytes it still has buffered and the output byte rate. Falls back to the full
/// ceiling when the sink can't report its buffer occupancy.
fn drain_wait(sink: &SinkDriver, resampler: &Resampler, ceiling_ms: u64) -> Duration {
    let byte_rate = u64::from(resampler.out_rate()) * u64::from(resampler.out_channels()) * 2;
    let wait_ms = match sink.buffered_bytes() {
        Some(bytes) if byte_rate > 0 => (bytes as u64 * 1000 / byte_rate).min(ceiling_ms),
        _ => ceiling_ms,
    };
    Duration::from_millis(wait_ms)
}

fn finish_stream(
    sink: &mut SinkDriver,
    resampler: &Resampler,
    config: &PlayerConfig,
    on_event: &(dyn Fn(Event) -> crate::state::State + Send + Sync),
) {
    debug!("decode: draining sink before completion");
    on_event(Event::NearingEos);
    let wait = drain_wait(sink, resampler, config.nearly_completed_drain_ceiling_ms);
    if !wait.is_zero() {
        std::thread::sleep(wait);
    }
    sink.close();
    on_event(Event::SinkDrained);
    info!("decode: stream completed");
}

fn write_pcm(resampler: &mut Resampler, sink: &mut SinkDriver, pcm: &[i16]) -> crate::error::Result<()> {
    let resampled = resampler.process(pcm);
    let mut bytes = Vec::with_capacity(resampled.len() * 2);
    for s in &resampled {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    sink.write_all(&bytes)
}

#[allow(clippy::too_many_arguments)]
fn run(
    source_cache: &mut SourceCache,
    media_info: &mut MediaInfo,
    decoder: &mut dyn AudioDecoder,
    resampler: &mut Resampler,
    sink: &mut SinkDriver,
    config: &PlayerConfig,
    control: &Arc<Mutex<PipelineControl>>,
    cond: &Arc<Condvar>,
    on_event: &(dyn Fn(Event) -> crate::state::State + Send + Sync),
    on_fatal: &(dyn Fn(&PlayerError) + Send + Sync),
) {
    let mut chunk = vec![0u8; config.decode_chunk_size];
    // Bytes read but not yet consumed by the decoder, carried across reads so a frame
    // split across two source reads still decodes once enough of it has arrived.
    let mut pending: Vec<u8> = Vec::new();
    // Cumulative decoded-sample count, used to track position for containers (VBR MP3,
    // raw ADTS AAC) that have no byte-rate-based shortcut.
    let mut samples_decoded: u64 = 0;
    let is_compressed = !matches!(media_info, MediaInfo::Wav(_));

    'decode: loop {
        let seek_target = {
            let mut g = control.lock();
            loop {
                if g.stop_requested {
                    break 'decode;
                }
                if g.pause_requested {
                    cond.wait_for(&mut g, Duration::from_millis(200));
                    continue;
                }
                break;
            }
            g.seek_pending.take()
        };

        if let Some(target_ms) = seek_target {
            let target = seek::ms_to_byte_offset(media_info, target_ms, control.lock().duration_ms);
            if let Err(e) = source_cache.seek(target.byte_offset) {
                on_fatal(&e);
                break;
            }
            if let (MediaInfo::M4a(m), Some(fc)) = (&mut *media_info, target.frame_cursor) {
                m.frame_cursor = fc;
            }
            control.lock().position_ms = target_ms;
            pending.clear();
            samples_decoded = 0;
            continue;
        }

        if !is_compressed {
            let n = match source_cache.read(&mut chunk) {
                Ok(n) => n,
                Err(e) => {
                    on_fatal(&e);
                    break;
                }
            };

            if n == 0 {
                finish_stream(sink, resampler, config, on_event);
                break;
            }

            pending.extend_from_slice(&chunk[..n]);

            let decoded = match decoder.decode(&pending) {
                Ok(d) => d,
                Err(e) => {
                    on_fatal(&e);
                    break;
                }
            };

            if decoded.status == crate::decoder::DecodeStatus::NeedMoreData {
                continue;
            }

            let consumed = decoded.bytes_consumed.min(pending.len());
            pending.drain(..consumed);

            if !decoded.pcm.is_empty() {
                samples_decoded += (decoded.pcm.len() / usize::from(resampler.in_channels()).max(1)) as u64;
                if let Err(e) = write_pcm(resampler, sink, &decoded.pcm) {
                    on_fatal(&e);
                    break;
                }
            }

            {
                let mut g = control.lock();
                let byte_pos = source_cache.position();
                g.position_ms = seek::position_ms(media_info, byte_pos, samples_decoded);
            }

            if decoded.status == crate::decoder::DecodeStatus::EndOfStream {
                finish_stream(sink, resampler, config, on_event);
                break;
            }
            continue;
        }

        let step = match next_frame(media_info, &pending) {
            Ok(s) => s,
            Err(e) => {
                on_fatal(&e);
                break;
            }
        };

        match step {
            FrameStep::TrackComplete => {
                finish_stream(sink, resampler, config, on_event);
                break;
            }
            FrameStep::NeedMoreData => {
                let n = match source_cache.read(&mut chunk) {
                    Ok(n) => n,
                    Err(e) => {
                        on_fatal(&e);
                        break;
                    }
                };
                if n == 0 {
                    finish_stream(sink, resampler, config, on_event);
                    break;
                }
                pending.extend_from_slice(&chunk[..n]);
                continue;
            }
            FrameStep::Frame { source_bytes, decoder_input } => {
                let decoded = match decoder.decode(&decoder_input) {
                    Ok(d) => d,
                    Err(e) => {
                        on_fatal(&e);
                        break;
                    }
                };
                pending.drain(..source_bytes);
                if let MediaInfo::M4a(m) = &mut *media_info {
                    m.frame_cursor += 1;
                }

                if decoded.status == crate::decoder::DecodeStatus::NeedMoreData {
                    on_fatal(&PlayerError::DecoderError(
                        "decoder requested more data after a complete frame".into(),
                    ));
                    break;
                }

                if !decoded.pcm.is_empty() {
                    samples_decoded += (decoded.pcm.len() / usize::from(resampler.in_channels()).max(1)) as u64;
                    if let Err(e) = write_pcm(resampler, sink, &decoded.pcm) {
                        on_fatal(&e);
                        break;
                    }
                }

                {
                    let mut g = control.lock();
                    let byte_pos = source_cache.position();
                    g.position_ms = seek::position_ms(media_info, byte_pos, samples_decoded);
                }

                if decoded.status == crate::decoder::DecodeStatus::EndOfStream {
                    finish_stream(sink, resampler, config, on_event);
                    break;
                }
            }
        }
    }

    source_cache.stop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{AacInfo, M4aInfo, Mp3Info};

    fn mp3_frame(bit_rate_index: u8) -> Vec<u8> {
        // Mirrors format::mp3's own test fixture: mono, 44100 Hz, no CRC.
        let header = [0xFF, 0xFB, (bit_rate_index << 4), 0xC0];
        let len = crate::format::mp3::frame_len(&header).unwrap();
        let mut frame = header.to_vec();
        frame.resize(len, 0);
        frame
    }

    #[test]
    fn next_frame_slices_one_mp3_frame_at_a_time_out_of_a_multi_frame_buffer() {
        let mut info = MediaInfo::Mp3(Mp3Info {
            sample_rate: 44100,
            channels: 1,
            bit_rate: 128_000,
            frame_size: 417,
            frame_start_offset: 0,
            id3v2_length: 0,
            is_cbr: true,
        });

        let frame = mp3_frame(9);
        // A single decode_chunk_size-style read can hold several whole frames; every one
        // of them must come back as its own `Frame` step, not just the first.
        let mut pending = Vec::new();
        for _ in 0..10 {
            pending.extend_from_slice(&frame);
        }

        let mut frames_seen = 0;
        while !pending.is_empty() {
            match next_frame(&mut info, &pending).unwrap() {
                FrameStep::Frame { source_bytes, decoder_input } => {
                    assert_eq!(source_bytes, frame.len());
                    assert_eq!(decoder_input.len(), frame.len());
                    pending.drain(..source_bytes);
                    frames_seen += 1;
                }
                FrameStep::NeedMoreData => break,
                FrameStep::TrackComplete => unreachable!("MP3 has no TrackComplete step"),
            }
        }
        assert_eq!(frames_seen, 10);
    }

    #[test]
    fn next_frame_reports_need_more_data_for_a_partial_mp3_frame() {
        let mut info = MediaInfo::Mp3(Mp3Info {
            sample_rate: 44100,
            channels: 1,
            bit_rate: 128_000,
            frame_size: 417,
            frame_start_offset: 0,
            id3v2_length: 0,
            is_cbr: true,
        });
        let frame = mp3_frame(9);
        let partial = &frame[..frame.len() - 10];
        match next_frame(&mut info, partial).unwrap() {
            FrameStep::NeedMoreData => {}
            _ => panic!("expected NeedMoreData for a truncated frame"),
        }
    }

    #[test]
    fn next_frame_errors_on_lost_mp3_sync() {
        let mut info = MediaInfo::Mp3(Mp3Info {
            sample_rate: 44100,
            channels: 1,
            bit_rate: 128_000,
            frame_size: 417,
            frame_start_offset: 0,
            id3v2_length: 0,
            is_cbr: true,
        });
        assert!(next_frame(&mut info, &[0u8; 8]).is_err());
    }

    #[test]
    fn next_frame_slices_adts_aac_frames_by_their_own_length_field() {
        let mut info = MediaInfo::Aac(AacInfo {
            sample_rate: 44100,
            channels: 2,
            profile: 2,
            adts_sync_offset: 0,
        });
        let payload_len = 100;
        let total = crate::format::aac::ADTS_HEADER_LEN + payload_len;
        let header = crate::format::aac::build_adts_header(1, 44100, 2, total);
        let mut frame = header.to_vec();
        frame.resize(total, 0);

        let mut pending = [frame.clone(), frame.clone()].concat();
        let step = next_frame(&mut info, &pending).unwrap();
        let FrameStep::Frame { source_bytes, .. } = step else {
            panic!("expected a frame");
        };
        assert_eq!(source_bytes, frame.len());
        pending.drain(..source_bytes);
        assert_eq!(pending, frame);
    }

    #[test]
    fn next_frame_synthesizes_an_adts_header_for_m4a_and_drains_only_raw_bytes() {
        let mut info = MediaInfo::M4a(M4aInfo {
            sample_rate: 44100,
            channels: 2,
            bits: 16,
            asc: vec![0x12, 0x10],
            profile: 1,
            mdat_offset: 0,
            mdat_size: 300,
            stsz: vec![100, 120, 80],
            timescale: 44100,
            duration_ticks: 44100,
            frame_cursor: 0,
        });
        let pending = vec![0xABu8; 100];

        let step = next_frame(&mut info, &pending).unwrap();
        let FrameStep::Frame { source_bytes, decoder_input } = step else {
            panic!("expected a frame");
        };
        // Only the 100 raw source bytes are drained, even though the decoder sees a
        // synthetic 7-byte ADTS header in front of them too.
        assert_eq!(source_bytes, 100);
        assert_eq!(decoder_input.len(), crate::format::aac::ADTS_HEADER_LEN + 100);
        assert_eq!(&decoder_input[crate::format::aac::ADTS_HEADER_LEN..], &pending[..]);
        assert_eq!(crate::format::aac::frame_len(&decoder_input), Some(decoder_input.len()));
    }

    #[test]
    fn next_frame_reports_track_complete_once_stsz_is_exhausted() {
        let mut info = MediaInfo::M4a(M4aInfo {
            sample_rate: 44100,
            channels: 2,
            bits: 16,
            asc: vec![0x12, 0x10],
            profile: 1,
            mdat_offset: 0,
            mdat_size: 100,
            stsz: vec![100],
            timescale: 44100,
            duration_ticks: 44100,
            frame_cursor: 1, // already past the only frame
        });
        match next_frame(&mut info, &[0u8; 10]).unwrap() {
            FrameStep::TrackComplete => {}
            _ => panic!("expected TrackComplete"),
        }
    }

    #[test]
    fn drain_wait_uses_the_sinks_reported_buffer_when_available() {
        use crate::adapter::{SinkHandle, SinkWrapper};
        use std::sync::Arc;

        struct ReportingSink;
        impl SinkWrapper for ReportingSink {
            fn name(&self) -> &str {
                "reporting"
            }
            fn open(&self, _rate: u32, _channels: u16, _bits: u16) -> crate::error::Result<SinkHandle> {
                Ok(Box::new(()))
            }
            fn write(&self, _handle: &mut SinkHandle, buf: &[u8]) -> crate::error::Result<usize> {
                Ok(buf.len())
            }
            fn buffered_bytes(&self, _handle: &SinkHandle) -> Option<usize> {
                Some(44_100 * 2 * 2) // one second of 44.1kHz stereo 16-bit audio
            }
            fn close(&self, _handle: SinkHandle) {}
        }

        let sink_wrapper = Arc::new(ReportingSink);
        let sink = SinkDriver::open(sink_wrapper, 44100, 2, 16).unwrap();
        let cfg = PlayerConfig::default();
        let resampler = Resampler::open(44100, 2, 44100, 2, &cfg).unwrap();

        let wait = drain_wait(&sink, &resampler, 5000);
        assert_eq!(wait, Duration::from_millis(1000));
    }

    #[test]
    fn drain_wait_falls_back_to_the_ceiling_when_unreported() {
        use crate::adapter::{SinkHandle, SinkWrapper};
        use std::sync::Arc;

        struct SilentSink;
        impl SinkWrapper for SilentSink {
            fn name(&self) -> &str {
                "silent"
            }
            fn open(&self, _rate: u32, _channels: u16, _bits: u16) -> crate::error::Result<SinkHandle> {
                Ok(Box::new(()))
            }
            fn write(&self, _handle: &mut SinkHandle, buf: &[u8]) -> crate::error::Result<usize> {
                Ok(buf.len())
            }
            fn close(&self, _handle: SinkHandle) {}
        }

        let sink_wrapper = Arc::new(SilentSink);
        let sink = SinkDriver::open(sink_wrapper, 44100, 2, 16).unwrap();
        let cfg = PlayerConfig::default();
        let resampler = Resampler::open(44100, 2, 44100, 2, &cfg).unwrap();

        let wait = drain_wait(&sink, &resampler, 750);
        assert_eq!(wait, Duration::from_millis(750));
    }
}
