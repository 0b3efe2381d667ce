//! MPEG-1/2 Layer III header parsing: ID3v2 skip, syncword scan, CBR/VBR classification.
//!
//! Ported from `mp3_extractor.h`'s `mp3_find_syncword`/`mp3_parse_header` shape.

use super::{Fetch, Mp3Info};
use crate::error::{PlayerError, Result};

const BITRATES_V1_L3: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];
const SAMPLE_RATES_MPEG1: [u32; 3] = [44100, 48000, 32000];

/// How many consecutive frames must share a bitrate before we call the stream CBR.
const CBR_PROBE_FRAMES: usize = 8;

/// Number of bytes read past the ID3v2 header while hunting for a frame sync.
const SYNC_SCAN_WINDOW: usize = 8192;

fn id3v2_length(header: &[u8; 10]) -> Option<i64> {
    if &header[0..3] != b"ID3" {
        return None;
    }
    let size = ((header[6] as i64) << 21)
        | ((header[7] as i64) << 14)
        | ((header[8] as i64) << 7)
        | (header[9] as i64);
    Some(10 + size)
}

struct FrameHeader {
    sample_rate: u32,
    channels: u16,
    bit_rate: u32,
    frame_size: u32,
}

fn parse_frame_header(buf: &[u8]) -> Option<FrameHeader> {
    if buf.len() < 4 || buf[0] != 0xFF || (buf[1] & 0xE0) != 0xE0 {
        return None;
    }
    let version_bits = (buf[1] >> 3) & 0x03;
    let layer_bits = (buf[1] >> 1) & 0x03;
    if version_bits != 0b11 || layer_bits != 0b01 {
        // Only MPEG-1 Layer III is modeled; other profiles are out of scope here.
        return None;
    }
    let bitrate_index = (buf[2] >> 4) & 0x0F;
    let sample_rate_index = (buf[2] >> 2) & 0x03;
    let padding = (buf[2] >> 1) & 0x01;
    let channel_mode = (buf[3] >> 6) & 0x03;

    if bitrate_index == 0 || bitrate_index == 0x0F || sample_rate_index == 0x03 {
        return None;
    }

    let bit_rate = BITRATES_V1_L3[bitrate_index as usize] * 1000;
    let sample_rate = SAMPLE_RATES_MPEG1[sample_rate_index as usize];
    let channels = if channel_mode == 0x03 { 1 } else { 2 };
    let frame_size = 144 * bit_rate / sample_rate + u32::from(padding);

    Some(FrameHeader {
        sample_rate,
        channels,
        bit_rate,
        frame_size,
    })
}

/// Total length (header + payload) of the frame starting at `buf[0]`, or `None` if `buf`
/// doesn't start with a valid MPEG-1 Layer III sync + header. Used by the decode loop to
/// slice exactly one frame at a time off its accumulated read buffer, since frame size
/// varies frame-to-frame for VBR streams.
#[must_use]
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    parse_frame_header(buf).map(|h| h.frame_size as usize)
}

/// Scan `buf` for the first byte offset holding a valid frame sync + header, tolerating
/// arbitrary junk bytes before it (some encoders pad past the declared ID3v2 length).
fn find_syncword(buf: &[u8]) -> Option<(usize, FrameHeader)> {
    for start in 0..buf.len().saturating_sub(4) {
        if let Some(h) = parse_frame_header(&buf[start..]) {
            return Some((start, h));
        }
    }
    None
}

pub fn extract(fetch: &mut dyn Fetch) -> Result<Mp3Info> {
    let mut head = [0u8; 10];
    let n = fetch.fetch(0, &mut head)?;
    let id3_len = if n == 10 { id3v2_length(&head) } else { None };
    let search_start = id3_len.unwrap_or(0);

    let mut window = vec![0u8; SYNC_SCAN_WINDOW];
    let got = fetch.fetch(search_start, &mut window)?;
    let window = &window[..got];

    let (sync_pos, first) = find_syncword(window)
        .ok_or_else(|| PlayerError::ParseError("no MP3 frame sync found".into()))?;
    let frame_start_offset = search_start + sync_pos as i64;

    // Probe a handful of subsequent frames to classify CBR vs VBR.
    let mut probe = vec![0u8; CBR_PROBE_FRAMES * 1441 + 4];
    let probe_n = fetch.fetch(frame_start_offset, &mut probe)?;
    let probe = &probe[..probe_n];

    let mut is_cbr = true;
    let mut offset = 0usize;
    let mut seen = 0usize;
    while seen < CBR_PROBE_FRAMES && offset + 4 <= probe.len() {
        match parse_frame_header(&probe[offset..]) {
            Some(h) => {
                if h.bit_rate != first.bit_rate {
                    is_cbr = false;
                    break;
                }
                offset += h.frame_size.max(1) as usize;
                seen += 1;
            }
            None => {
                is_cbr = false;
                break;
            }
        }
    }

    Ok(Mp3Info {
        sample_rate: first.sample_rate,
        channels: first.channels,
        bit_rate: first.bit_rate,
        frame_size: first.frame_size,
        frame_start_offset,
        id3v2_length: id3_len.unwrap_or(0),
        is_cbr,
    })
}
