//! Raw ADTS AAC header parsing (no MP4 container).

use super::{AacInfo, Fetch};
use crate::error::{PlayerError, Result};

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

const SCAN_WINDOW: usize = 4096;

/// Fixed length of an ADTS header (no CRC, since `protection_absent` is always set here).
pub const ADTS_HEADER_LEN: usize = 7;

/// Total length (header + raw_data_block) of the ADTS frame starting at `buf[0]`, or
/// `None` if `buf` doesn't start with a valid ADTS sync. Frame length is carried in the
/// header itself (13-bit field spanning bytes 3-5), so, unlike MP3, no bitrate/sample-rate
/// arithmetic is needed to recover it.
#[must_use]
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < ADTS_HEADER_LEN || buf[0] != 0xFF || (buf[1] & 0xF6) != 0xF0 {
        return None;
    }
    let len = ((u32::from(buf[3] & 0x03)) << 11) | (u32::from(buf[4]) << 3) | (u32::from(buf[5]) >> 5);
    Some(len as usize)
}

/// Maps a sample rate to its ADTS `sampling_frequency_index`, the inverse of `SAMPLE_RATES`.
#[must_use]
pub fn sample_rate_index(rate: u32) -> Option<u8> {
    SAMPLE_RATES.iter().position(|&r| r == rate).map(|i| i as u8)
}

/// Recovers the ADTS `profile` field (`audioObjectType - 1`) from a raw `AudioSpecificConfig`
/// (MP4 `esds` DecoderSpecificInfo payload). `audioObjectType` is the top 5 bits of the first
/// byte; defaults to LC (profile 1) if `asc` is empty or the object type is out of ADTS's
/// 2-bit range.
#[must_use]
pub fn profile_from_asc(asc: &[u8]) -> u8 {
    let Some(&first) = asc.first() else {
        return 1;
    };
    let object_type = first >> 3;
    if object_type == 0 || object_type > 4 {
        return 1;
    }
    object_type - 1
}

/// Synthesizes a 7-byte ADTS header (no CRC) wrapping a `frame_len`-byte total frame
/// (header + payload), for M4A's raw elementary-stream AAC frames which lack one.
#[must_use]
pub fn build_adts_header(profile: u8, sample_rate: u32, channels: u16, frame_len: usize) -> [u8; 7] {
    let sr_index = sample_rate_index(sample_rate).unwrap_or(4); // 44100 fallback
    let channel_config = (channels as u8) & 0x07;
    let len = (frame_len as u32) & 0x1FFF;
    [
        0xFF,
        0xF1,
        ((profile & 0x03) << 6) | (sr_index << 2) | ((channel_config >> 2) & 0x01),
        ((channel_config & 0x03) << 6) | ((len >> 11) & 0x03) as u8,
        ((len >> 3) & 0xFF) as u8,
        (((len & 0x07) << 5) as u8) | 0x1F,
        0xFC,
    ]
}

pub fn extract(fetch: &mut dyn Fetch) -> Result<AacInfo> {
    let mut buf = vec![0u8; SCAN_WINDOW];
    let n = fetch.fetch(0, &mut buf)?;
    let buf = &buf[..n];

    for start in 0..buf.len().saturating_sub(7) {
        if buf[start] != 0xFF || (buf[start + 1] & 0xF6) != 0xF0 {
            continue;
        }
        let header = &buf[start..start + 7];
        let profile = (header[2] >> 6) & 0x03;
        let sr_index = (header[2] >> 2) & 0x0F;
        if sr_index as usize >= SAMPLE_RATES.len() {
            continue;
        }
        let channel_config = ((header[2] & 0x01) << 2) | ((header[3] >> 6) & 0x03);
        let channels = if channel_config == 0 { 2 } else { channel_config };

        return Ok(AacInfo {
            sample_rate: SAMPLE_RATES[sr_index as usize],
            channels: u16::from(channels),
            profile: profile + 1,
            adts_sync_offset: start as i64,
        });
    }

    Err(PlayerError::ParseError("no ADTS sync word found".into()))
}
