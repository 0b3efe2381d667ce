//! Rate and channel conversion to the sink's native format.
//!
//! Grounded on `liteplayer_resampler.c`'s `resampler_process` shape (passthrough when
//! nothing to convert, mono/stereo duplication-or-pick, then rate conversion), minus the
//! `speex` rate-conversion library itself — this engine implements plain linear
//! interpolation instead of pulling in libspeexdsp.

use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};

pub struct Resampler {
    in_rate: u32,
    in_channels: u16,
    out_rate: u32,
    out_channels: u16,
    quality: u8,
}

impl Resampler {
    pub fn open(
        in_rate: u32,
        in_channels: u16,
        out_rate: u32,
        out_channels: u16,
        config: &PlayerConfig,
    ) -> Result<Self> {
        let channels_convert = in_channels != out_channels;
        if channels_convert && !matches!((in_channels, out_channels), (1, 2) | (2, 1)) {
            return Err(PlayerError::InvalidArgument(format!(
                "unsupported channel conversion {in_channels} -> {out_channels}"
            )));
        }
        Ok(Self {
            in_rate,
            in_channels,
            out_rate,
            out_channels,
            quality: config.resample_quality,
        })
    }

    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.in_rate == self.out_rate && self.in_channels == self.out_channels
    }

    #[must_use]
    pub fn in_channels(&self) -> u16 {
        self.in_channels
    }

    #[must_use]
    pub fn out_rate(&self) -> u32 {
        self.out_rate
    }

    #[must_use]
    pub fn out_channels(&self) -> u16 {
        self.out_channels
    }

    /// Convert interleaved `in_samples` from the input format to the output format.
    pub fn process(&mut self, in_samples: &[i16]) -> Vec<i16> {
        if self.is_passthrough() {
            return in_samples.to_vec();
        }

        let channel_converted = match (self.in_channels, self.out_channels) {
            (1, 2) => mono_to_stereo(in_samples),
            (2, 1) => stereo_to_mono(in_samples),
            _ => in_samples.to_vec(),
        };

        if self.in_rate == self.out_rate {
            return channel_converted;
        }
        if self.quality == 0 {
            return nearest_neighbor_rate(&channel_converted, self.in_rate, self.out_rate, self.out_channels);
        }
        convert_rate(&channel_converted, self.in_rate, self.out_rate, self.out_channels)
    }
}

fn mono_to_stereo(buf: &[i16]) -> Vec<i16> {
    let mut out = Vec::with_capacity(buf.len() * 2);
    for &s in buf {
        out.push(s);
        out.push(s);
    }
    out
}

fn stereo_to_mono(buf: &[i16]) -> Vec<i16> {
    buf.chunks_exact(2).map(|c| c[0]).collect()
}

/// Cheapest possible rate conversion: pick the nearest source frame rather than
/// interpolating between two. Used when `resample_quality` is `0`.
fn nearest_neighbor_rate(buf: &[i16], in_rate: u32, out_rate: u32, channels: u16) -> Vec<i16> {
    if in_rate == 0 || buf.is_empty() {
        return Vec::new();
    }
    let channels = usize::from(channels);
    let in_frames = buf.len() / channels;
    if in_frames == 0 {
        return Vec::new();
    }
    let out_frames = (in_frames as u64 * u64::from(out_rate) / u64::from(in_rate)) as usize;
    let mut out = Vec::with_capacity(out_frames * channels);

    for out_idx in 0..out_frames {
        let src_pos = out_idx as f64 * f64::from(in_rate) / f64::from(out_rate);
        let src_frame = (src_pos.round() as usize).min(in_frames - 1);
        out.extend_from_slice(&buf[src_frame * channels..(src_frame + 1) * channels]);
    }
    out
}

/// Linear-interpolation rate conversion over interleaved `channels`-wide frames.
fn convert_rate(buf: &[i16], in_rate: u32, out_rate: u32, channels: u16) -> Vec<i16> {
    if in_rate == 0 || buf.is_empty() {
        return Vec::new();
    }
    let channels = usize::from(channels);
    let in_frames = buf.len() / channels;
    if in_frames == 0 {
        return Vec::new();
    }
    let out_frames = (in_frames as u64 * u64::from(out_rate) / u64::from(in_rate)) as usize;
    let mut out = Vec::with_capacity(out_frames * channels);

    for out_idx in 0..out_frames {
        let src_pos = out_idx as f64 * f64::from(in_rate) / f64::from(out_rate);
        let src_frame = src_pos.floor() as usize;
        let frac = src_pos - src_frame as f64;
        let next_frame = (src_frame + 1).min(in_frames - 1);

        for ch in 0..channels {
            let a = f64::from(buf[src_frame * channels + ch]);
            let b = f64::from(buf[next_frame * channels + ch]);
            let v = a + (b - a) * frac;
            out.push(v.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_returns_same_samples() {
        let cfg = PlayerConfig::default();
        let mut r = Resampler::open(44100, 2, 44100, 2, &cfg).unwrap();
        let input = vec![1i16, 2, 3, 4];
        assert_eq!(r.process(&input), input);
    }

    #[test]
    fn mono_to_stereo_duplicates_samples() {
        let cfg = PlayerConfig::default();
        let mut r = Resampler::open(44100, 1, 44100, 2, &cfg).unwrap();
        let out = r.process(&[10, 20]);
        assert_eq!(out, vec![10, 10, 20, 20]);
    }

    #[test]
    fn stereo_to_mono_picks_left_channel() {
        let cfg = PlayerConfig::default();
        let mut r = Resampler::open(44100, 2, 44100, 1, &cfg).unwrap();
        let out = r.process(&[10, 99, 20, 99]);
        assert_eq!(out, vec![10, 20]);
    }

    #[test]
    fn rate_conversion_changes_sample_count_proportionally() {
        let cfg = PlayerConfig::default();
        let mut r = Resampler::open(22050, 1, 44100, 1, &cfg).unwrap();
        let input: Vec<i16> = (0..100).collect();
        let out = r.process(&input);
        assert_eq!(out.len(), 200);
    }

    #[test]
    fn unsupported_channel_conversion_is_rejected() {
        let cfg = PlayerConfig::default();
        assert!(Resampler::open(44100, 3, 44100, 2, &cfg).is_err());
    }

    #[test]
    fn zero_quality_uses_nearest_neighbor_and_still_scales_sample_count() {
        let mut cfg = PlayerConfig::default();
        cfg.resample_quality = 0;
        let mut r = Resampler::open(22050, 1, 44100, 1, &cfg).unwrap();
        let input: Vec<i16> = (0..100).collect();
        let out = r.process(&input);
        assert_eq!(out.len(), 200);
    }

    #[test]
    fn accessors_report_output_format() {
        let cfg = PlayerConfig::default();
        let r = Resampler::open(22050, 1, 44100, 2, &cfg).unwrap();
        assert_eq!(r.in_channels(), 1);
        assert_eq!(r.out_rate(), 44100);
        assert_eq!(r.out_channels(), 2);
    }
}
