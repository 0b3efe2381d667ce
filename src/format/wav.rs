//! Microsoft RIFF/WAVE chunk walking, ported from `wav_extractor.c`.

use super::{Fetch, WavFormatTag, WavInfo};
use crate::error::{PlayerError, Result};

const HEADER_SCAN_SIZE: usize = 4096;
const MAX_CHANNELS: u16 = 8;

const FMT_PCM: u16 = 0x0001;
const FMT_IEEE_FLOAT: u16 = 0x0003;
const FMT_ADPCM: u16 = 0x0002;
const FMT_DVI_ADPCM: u16 = 0x0011;

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}
fn le_u16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

pub fn extract(fetch: &mut dyn Fetch) -> Result<WavInfo> {
    let mut buf = vec![0u8; HEADER_SCAN_SIZE];
    let n = fetch.fetch(0, &mut buf)?;
    let buf = &buf[..n];

    if n < 12 || &buf[0..4] != b"RIFF" || &buf[8..12] != b"WAVE" {
        return Err(PlayerError::ParseError("not a RIFF/WAVE file".into()));
    }

    let mut i = 12usize;
    let mut audio_format: Option<u16> = None;
    let mut channels = 0u16;
    let mut sample_rate = 0u32;
    let mut byte_rate = 0u32;
    let mut block_align = 0u16;
    let mut bits = 0u16;
    let mut data_offset: Option<i64> = None;
    let mut data_size = 0i64;

    while i + 8 <= buf.len() {
        let chunk_id = &buf[i..i + 4];
        let chunk_size = le_u32(&buf[i + 4..i + 8]) as usize;
        let body = i + 8;

        match chunk_id {
            b"fmt " => {
                if body + 16 > buf.len() {
                    return Err(PlayerError::ParseError("truncated fmt chunk".into()));
                }
                audio_format = Some(le_u16(&buf[body..body + 2]));
                channels = le_u16(&buf[body + 2..body + 4]);
                sample_rate = le_u32(&buf[body + 4..body + 8]);
                byte_rate = le_u32(&buf[body + 8..body + 12]);
                block_align = le_u16(&buf[body + 12..body + 14]);
                bits = le_u16(&buf[body + 14..body + 16]);
                i = body + chunk_size;
            }
            b"LIST" | b"PEAK" => {
                i = body + chunk_size;
            }
            b"fact" => {
                i = body + 4;
            }
            b"data" => {
                data_size = i64::from(le_u32(&buf[body..body + 4].try_into().unwrap_or([0; 4])));
                data_offset = Some(body as i64 + 4);
                break;
            }
            _ => {
                i += 1;
            }
        }
    }

    let audio_format = audio_format
        .ok_or_else(|| PlayerError::ParseError("missing fmt chunk".into()))?;
    let data_offset =
        data_offset.ok_or_else(|| PlayerError::ParseError("missing data chunk".into()))?;

    let tag = match audio_format {
        FMT_PCM => WavFormatTag::Pcm,
        FMT_IEEE_FLOAT => WavFormatTag::IeeeFloat,
        FMT_ADPCM => WavFormatTag::Adpcm,
        FMT_DVI_ADPCM => WavFormatTag::DviAdpcm,
        other => {
            return Err(PlayerError::ParseError(format!(
                "unsupported WAV audioFormat {other:#06x}"
            )))
        }
    };

    if channels == 0 || channels > MAX_CHANNELS {
        return Err(PlayerError::ParseError(format!(
            "unsupported channel count {channels}"
        )));
    }
    if block_align != bits / 8 * channels {
        return Err(PlayerError::ParseError(format!(
            "invalid blockAlign {block_align}"
        )));
    }
    if byte_rate != u32::from(block_align) * sample_rate {
        return Err(PlayerError::ParseError(format!(
            "invalid byteRate {byte_rate}"
        )));
    }

    Ok(WavInfo {
        sample_rate,
        channels,
        bits,
        data_offset,
        data_size,
        audio_format: tag,
    })
}
