//! Feeds exactly one codec frame at a time into symphonia's low-level codec decoders,
//! bypassing symphonia's own `FormatReader`/demuxer (our own extractors, and the pipeline's
//! per-frame slicing in front of this decoder, already did that job). Mirrors
//! `audio/src/decoder/symphonia_decoder.rs`'s `SymphoniaDecoder::next_packet` decode step,
//! minus its container probing.
//!
//! M4A frames arrive here already wrapped in a synthetic ADTS header (built from the
//! track's `AudioSpecificConfig` and `stsz` entry) rather than raw MP4 elementary-stream
//! bytes, so a single AAC codec path covers both raw ADTS and M4A sources.

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_AAC, CODEC_TYPE_MP3};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

use super::{AudioDecoder, DecodeStatus, Decoded};
use crate::error::{PlayerError, Result};
use crate::format::{AacInfo, M4aInfo, Mp3Info};

pub struct SymphoniaFrameDecoder {
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    sample_buffer: Option<SampleBuffer<i16>>,
    sample_rate: u32,
    channels: u16,
}

impl SymphoniaFrameDecoder {
    fn from_params(params: &CodecParameters, sample_rate: u32, channels: u16) -> Result<Self> {
        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| PlayerError::DecoderError(e.to_string()))?;
        Ok(Self {
            decoder,
            sample_buffer: None,
            sample_rate,
            channels,
        })
    }

    pub fn for_mp3(info: &Mp3Info) -> Result<Self> {
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_MP3)
            .with_sample_rate(info.sample_rate)
            .with_bits_per_sample(16);
        Self::from_params(&params, info.sample_rate, info.channels)
    }

    pub fn for_aac(info: &AacInfo) -> Result<Self> {
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_AAC)
            .with_sample_rate(info.sample_rate)
            .with_bits_per_sample(16);
        Self::from_params(&params, info.sample_rate, info.channels)
    }

    /// M4A frames are rewrapped in a synthetic ADTS header before reaching `decode`, so
    /// this takes the same codec path as `for_aac` and needs no `extra_data` from the
    /// track's `AudioSpecificConfig` (the header carries that information per frame).
    pub fn for_m4a(info: &M4aInfo) -> Result<Self> {
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_AAC)
            .with_sample_rate(info.sample_rate)
            .with_bits_per_sample(16);
        Self::from_params(&params, info.sample_rate, info.channels)
    }
}

impl AudioDecoder for SymphoniaFrameDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn decode(&mut self, input: &[u8]) -> Result<Decoded> {
        let packet = Packet::new_from_slice(0, 0, 0, input);

        match self.decoder.decode(&packet) {
            Ok(buf) => {
                let spec = *buf.spec();
                let sample_buffer = self
                    .sample_buffer
                    .get_or_insert_with(|| SampleBuffer::new(buf.capacity() as u64, spec));
                sample_buffer.copy_interleaved_ref(buf);
                Ok(Decoded {
                    status: DecodeStatus::Ok,
                    pcm: sample_buffer.samples().to_vec(),
                    // Correct because `input` is always exactly one frame: the pipeline
                    // slices it to a single MP3/ADTS frame length before calling decode.
                    bytes_consumed: input.len(),
                })
            }
            Err(SymphoniaError::DecodeError(_)) => Ok(Decoded {
                status: DecodeStatus::NeedMoreData,
                pcm: Vec::new(),
                // Nothing consumed: the caller retains `input` in full and appends more
                // bytes before decoding again.
                bytes_consumed: 0,
            }),
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                Ok(Decoded {
                    status: DecodeStatus::EndOfStream,
                    pcm: Vec::new(),
                    bytes_consumed: 0,
                })
            }
            Err(e) => Err(PlayerError::DecoderError(e.to_string())),
        }
    }
}
