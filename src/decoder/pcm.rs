//! WAV/PCM decode: no codec library involved, just sample-width normalization to i16.

use super::{AudioDecoder, DecodeStatus, Decoded};
use crate::error::{PlayerError, Result};
use crate::format::{WavFormatTag, WavInfo};

pub struct PcmDecoder {
    sample_rate: u32,
    channels: u16,
    bits: u16,
    format: WavFormatTag,
    data_size: i64,
    consumed: i64,
}

impl PcmDecoder {
    #[must_use]
    pub fn new(info: &WavInfo) -> Self {
        Self {
            sample_rate: info.sample_rate,
            channels: info.channels,
            bits: info.bits,
            format: info.audio_format,
            data_size: info.data_size,
            consumed: 0,
        }
    }
}

impl AudioDecoder for PcmDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn decode(&mut self, input: &[u8]) -> Result<Decoded> {
        if self.format != WavFormatTag::Pcm && self.format != WavFormatTag::IeeeFloat {
            return Err(PlayerError::DecoderError(
                "ADPCM sample decoding is not implemented by this engine's PCM wrapper".into(),
            ));
        }

        let remaining = (self.data_size - self.consumed).max(0) as usize;
        let input = &input[..input.len().min(remaining)];

        let pcm = match (self.format, self.bits) {
            (WavFormatTag::Pcm, 16) => input
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]))
                .collect(),
            (WavFormatTag::Pcm, 8) => input.iter().map(|&b| (i16::from(b) - 128) * 256).collect(),
            (WavFormatTag::Pcm, 24) => input
                .chunks_exact(3)
                .map(|c| {
                    let v = i32::from_le_bytes([0, c[0], c[1], c[2]]) >> 8;
                    (v >> 8) as i16
                })
                .collect(),
            (WavFormatTag::Pcm, 32) => input
                .chunks_exact(4)
                .map(|c| (i32::from_le_bytes([c[0], c[1], c[2], c[3]]) >> 16) as i16)
                .collect(),
            (WavFormatTag::IeeeFloat, 32) => input
                .chunks_exact(4)
                .map(|c| {
                    let f = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                    (f.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
                })
                .collect(),
            _ => {
                return Err(PlayerError::DecoderError(format!(
                    "unsupported PCM sample width {} bits",
                    self.bits
                )))
            }
        };

        self.consumed += input.len() as i64;
        let status = if self.consumed >= self.data_size {
            DecodeStatus::EndOfStream
        } else {
            DecodeStatus::Ok
        };

        Ok(Decoded {
            status,
            pcm,
            bytes_consumed: input.len(),
        })
    }
}
