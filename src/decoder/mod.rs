//! Uniform decoder interface over codec libraries. Always emits interleaved signed
//! 16-bit PCM, regardless of source codec.
//!
//! Shaped after `audio/src/decoder/symphonia_decoder.rs`'s `AudioDecoder` trait,
//! but pull-based (`decode(bytes) -> status`) rather than owning its own container demuxer:
//! our own extractors already parsed the container, so this layer only wraps raw codec
//! frames, the way `symphonia::core::codecs::Decoder` does once you bypass its
//! `FormatReader`.

pub mod pcm;
pub mod symphonia_frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    Ok,
    NeedMoreData,
    EndOfStream,
}

pub struct Decoded {
    pub status: DecodeStatus,
    /// Interleaved signed 16-bit PCM samples produced by this call.
    pub pcm: Vec<i16>,
    /// Bytes of `input` actually consumed. On `NeedMoreData` this is `0`: the caller keeps
    /// the whole buffer and appends more bytes before calling `decode` again.
    pub bytes_consumed: usize,
}

pub trait AudioDecoder: Send {
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;

    /// Feed `input` to the decoder. `input` accumulates across calls that return
    /// `NeedMoreData`; the caller drops `bytes_consumed` bytes from the front afterward.
    fn decode(&mut self, input: &[u8]) -> crate::error::Result<Decoded>;
}
