//! Format sniffing and per-container metadata extraction.
//!
//! Each extractor takes a `Fetch` closure (`offset, buf -> n_read`) rather than owning a
//! `SourceCache` directly, mirroring the C core's `xxx_fetch_cb` callback shape
//! (`audio_extractor/mp3_extractor.h`, `m4a_extractor.h`) translated into a plain Rust closure.

pub mod aac;
pub mod m4a;
pub mod mp3;
pub mod wav;

use crate::error::{PlayerError, Result};

/// Pulls `buf.len()` bytes starting at `offset` from the underlying source, returning the
/// number actually read (less than requested only at EOF).
pub trait Fetch {
    fn fetch(&mut self, offset: i64, buf: &mut [u8]) -> Result<usize>;
}

impl<F> Fetch for F
where
    F: FnMut(i64, &mut [u8]) -> Result<usize>,
{
    fn fetch(&mut self, offset: i64, buf: &mut [u8]) -> Result<usize> {
        self(offset, buf)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mp3Info {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: u32,
    pub frame_size: u32,
    pub frame_start_offset: i64,
    pub id3v2_length: i64,
    pub is_cbr: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AacInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub profile: u8,
    pub adts_sync_offset: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct M4aInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits: u16,
    pub asc: Vec<u8>,
    /// ADTS `profile` field (`audioObjectType - 1`), derived once from `asc` at extract time
    /// so the decode loop can synthesize a per-frame ADTS header without re-parsing it.
    pub profile: u8,
    pub mdat_offset: i64,
    pub mdat_size: i64,
    /// Per-sample frame sizes, indexed 0..stsz_count.
    pub stsz: Vec<u32>,
    pub timescale: u32,
    pub duration_ticks: u64,
    /// Index into `stsz` of the next frame the decode loop will consume; shared between
    /// the decode loop and the seek engine so both agree on "what comes next".
    pub frame_cursor: usize,
}

impl M4aInfo {
    #[must_use]
    pub fn frame_samples(&self) -> u32 {
        1024
    }

    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        if self.timescale == 0 {
            return 0;
        }
        self.duration_ticks * 1000 / u64::from(self.timescale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavFormatTag {
    Pcm,
    IeeeFloat,
    Adpcm,
    DviAdpcm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits: u16,
    pub data_offset: i64,
    pub data_size: i64,
    pub audio_format: WavFormatTag,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaInfo {
    Mp3(Mp3Info),
    Aac(AacInfo),
    M4a(M4aInfo),
    Wav(WavInfo),
}

impl MediaInfo {
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        match self {
            MediaInfo::Mp3(i) => i.sample_rate,
            MediaInfo::Aac(i) => i.sample_rate,
            MediaInfo::M4a(i) => i.sample_rate,
            MediaInfo::Wav(i) => i.sample_rate,
        }
    }

    #[must_use]
    pub fn channels(&self) -> u16 {
        match self {
            MediaInfo::Mp3(i) => i.channels,
            MediaInfo::Aac(i) => i.channels,
            MediaInfo::M4a(i) => i.channels,
            MediaInfo::Wav(i) => i.channels,
        }
    }
}

/// A container kind, as determined by [`sniff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Mp3,
    Aac,
    M4a,
    Wav,
}

/// Identify the container: try the URL extension first, then fall back to sniffing up to
/// 64 KiB of magic bytes from the front of the stream.
pub fn sniff(url: &str, fetch: &mut dyn Fetch) -> Result<ContainerKind> {
    if let Some(ext) = url.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()) {
        match ext.as_str() {
            "mp3" => return Ok(ContainerKind::Mp3),
            "aac" => return Ok(ContainerKind::Aac),
            "m4a" | "mp4" => return Ok(ContainerKind::M4a),
            "wav" => return Ok(ContainerKind::Wav),
            _ => {}
        }
    }

    const PEEK: usize = 64 * 1024;
    let mut buf = vec![0u8; PEEK];
    let n = fetch.fetch(0, &mut buf)?;
    let buf = &buf[..n];

    if n >= 12 && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WAVE" {
        return Ok(ContainerKind::Wav);
    }
    if n >= 8 && (&buf[4..8] == b"ftyp" || &buf[4..8] == b"moov" || &buf[4..8] == b"free") {
        return Ok(ContainerKind::M4a);
    }
    if n >= 3 && &buf[0..3] == b"ID3" {
        return Ok(ContainerKind::Mp3);
    }
    // ADTS AAC (sync `0xFFF`, layer bits fixed `00`) and MPEG Layer III (sync `0xFFE`,
    // layer bits `01`) share the top 11 sync bits, so AAC must be ruled in before the
    // looser MP3 check below would otherwise claim it too.
    for w in buf.windows(2) {
        if w[0] == 0xFF && (w[1] & 0xF6) == 0xF0 {
            return Ok(ContainerKind::Aac);
        }
        if w[0] == 0xFF && (w[1] & 0xFE) == 0xFA {
            return Ok(ContainerKind::Mp3);
        }
    }

    Err(PlayerError::ParseError(
        "could not identify container format".into(),
    ))
}
