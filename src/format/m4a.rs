//! ISO-BMFF (MP4/M4A) box walking: `moov/trak/mdia/mdhd` timescale+duration,
//! `stsd/mp4a/esds` AudioSpecificConfig, `stsz` per-sample frame sizes, `mdat` offset.
//!
//! Grounded on `m4a_extractor.h`'s `m4a_info_t` fields (`stszdata`/`stszcurrent`, `asc`,
//! `mdatofs`/`mdatsize`, `moovtail`) and `audio/src/decoder/symphonia_decoder.rs`'s
//! symphonia-based container handling for the general shape of "probe, then decode".

use super::{aac, Fetch, M4aInfo};
use crate::error::{PlayerError, Result};

/// Bound on how much of a `moov` box we'll buffer in one shot once located.
const MAX_MOOV_SIZE: usize = 8 * 1024 * 1024;
/// Tail window scanned when `moov` sits after `mdat` (streamed/progressive files).
const TAIL_SCAN_SIZE: usize = 2 * 1024 * 1024;

fn box_header(buf: &[u8]) -> Option<(u64, &[u8], usize)> {
    if buf.len() < 8 {
        return None;
    }
    let size32 = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    let kind = &buf[4..8];
    if size32 == 1 {
        if buf.len() < 16 {
            return None;
        }
        let size64 = u64::from_be_bytes(buf[8..16].try_into().unwrap());
        Some((size64, kind, 16))
    } else {
        Some((u64::from(size32), kind, 8))
    }
}

pub fn extract(fetch: &mut dyn Fetch, content_len: i64) -> Result<M4aInfo> {
    let mut offset: i64 = 0;
    let mut mdat_offset = 0i64;
    let mut mdat_size = 0i64;
    let mut moov_buf: Option<Vec<u8>> = None;
    let mut head = [0u8; 16];

    while content_len <= 0 || offset < content_len {
        let got = fetch.fetch(offset, &mut head)?;
        if got < 8 {
            break;
        }
        let Some((size, kind, header_len)) = box_header(&head[..got]) else {
            break;
        };
        let body_len = if size == 0 {
            if content_len > 0 {
                (content_len - offset - header_len as i64).max(0) as u64
            } else {
                0
            }
        } else {
            size.saturating_sub(header_len as u64)
        };

        match kind {
            b"moov" => {
                let n = (body_len as usize).min(MAX_MOOV_SIZE);
                let mut buf = vec![0u8; n];
                let got = fetch.fetch(offset + header_len as i64, &mut buf)?;
                buf.truncate(got);
                moov_buf = Some(buf);
            }
            b"mdat" => {
                mdat_offset = offset + header_len as i64;
                mdat_size = body_len as i64;
            }
            _ => {}
        }

        let advance = if size == 0 { body_len + header_len as u64 } else { size };
        if advance == 0 {
            break;
        }
        offset += advance as i64;
    }

    if moov_buf.is_none() && content_len > 0 {
        // moov-at-end: scan a window at the tail for the box magic.
        let window = TAIL_SCAN_SIZE.min(content_len as usize);
        let tail_start = (content_len as usize - window) as i64;
        let mut tail = vec![0u8; window];
        let got = fetch.fetch(tail_start, &mut tail)?;
        tail.truncate(got);

        if let Some(pos) = find_subslice(&tail, b"moov") {
            if pos >= 4 {
                let size = u32::from_be_bytes(tail[pos - 4..pos].try_into().unwrap()) as usize;
                let body_start_in_tail = pos + 4;
                let body_len = size.saturating_sub(8).min(tail.len() - body_start_in_tail);
                moov_buf = Some(tail[body_start_in_tail..body_start_in_tail + body_len].to_vec());
            }
        }
    }

    let moov_buf =
        moov_buf.ok_or_else(|| PlayerError::ParseError("no moov box found".into()))?;

    let mut parsed = MoovFields::default();
    walk_moov(&moov_buf, &mut parsed);

    if parsed.asc.is_empty() {
        return Err(PlayerError::ParseError(
            "no AudioSpecificConfig found in moov".into(),
        ));
    }

    let profile = aac::profile_from_asc(&parsed.asc);

    Ok(M4aInfo {
        sample_rate: parsed.sample_rate,
        channels: parsed.channels,
        bits: 16,
        asc: parsed.asc,
        profile,
        mdat_offset,
        mdat_size,
        stsz: parsed.stsz,
        timescale: parsed.timescale,
        duration_ticks: parsed.duration_ticks,
        frame_cursor: 0,
    })
}

#[derive(Default)]
struct MoovFields {
    timescale: u32,
    duration_ticks: u64,
    sample_rate: u32,
    channels: u16,
    asc: Vec<u8>,
    stsz: Vec<u32>,
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}

fn walk_moov(buf: &[u8], out: &mut MoovFields) {
    let mut pos = 0usize;
    while pos + 8 <= buf.len() {
        let Some((size, kind, header_len)) = box_header(&buf[pos..]) else {
            break;
        };
        let size = size as usize;
        if size < header_len || pos + size > buf.len() {
            break;
        }
        let body = &buf[pos + header_len..pos + size];

        match kind {
            b"trak" => walk_trak(body, out),
            b"mdia" | b"minf" | b"stbl" | b"udta" => walk_moov(body, out),
            _ => {}
        }

        pos += size;
    }
}

fn walk_trak(buf: &[u8], out: &mut MoovFields) {
    let mut pos = 0usize;
    while pos + 8 <= buf.len() {
        let Some((size, kind, header_len)) = box_header(&buf[pos..]) else {
            break;
        };
        let size = size as usize;
        if size < header_len || pos + size > buf.len() {
            break;
        }
        let body = &buf[pos + header_len..pos + size];
        if kind == b"mdia" {
            parse_mdia(body, out);
        }
        pos += size;
    }
}

fn parse_mdia(buf: &[u8], out: &mut MoovFields) {
    let mut pos = 0usize;
    while pos + 8 <= buf.len() {
        let Some((size, kind, header_len)) = box_header(&buf[pos..]) else {
            break;
        };
        let size = size as usize;
        if size < header_len || pos + size > buf.len() {
            break;
        }
        let body = &buf[pos + header_len..pos + size];
        match kind {
            b"mdhd" => parse_mdhd(body, out),
            b"minf" => parse_minf(body, out),
            _ => {}
        }
        pos += size;
    }
}

fn parse_mdhd(buf: &[u8], out: &mut MoovFields) {
    if buf.is_empty() {
        return;
    }
    let version = buf[0];
    if version == 1 {
        if buf.len() < 4 + 8 + 8 + 4 + 8 {
            return;
        }
        out.timescale = u32::from_be_bytes(buf[20..24].try_into().unwrap());
        out.duration_ticks = u64::from_be_bytes(buf[24..32].try_into().unwrap());
    } else {
        if buf.len() < 4 + 4 + 4 + 4 + 4 {
            return;
        }
        out.timescale = u32::from_be_bytes(buf[12..16].try_into().unwrap());
        out.duration_ticks = u64::from(u32::from_be_bytes(buf[16..20].try_into().unwrap()));
    }
}

fn parse_minf(buf: &[u8], out: &mut MoovFields) {
    let mut pos = 0usize;
    while pos + 8 <= buf.len() {
        let Some((size, kind, header_len)) = box_header(&buf[pos..]) else {
            break;
        };
        let size = size as usize;
        if size < header_len || pos + size > buf.len() {
            break;
        }
        let body = &buf[pos + header_len..pos + size];
        if kind == b"stbl" {
            parse_stbl(body, out);
        }
        pos += size;
    }
}

fn parse_stbl(buf: &[u8], out: &mut MoovFields) {
    let mut pos = 0usize;
    while pos + 8 <= buf.len() {
        let Some((size, kind, header_len)) = box_header(&buf[pos..]) else {
            break;
        };
        let size = size as usize;
        if size < header_len || pos + size > buf.len() {
            break;
        }
        let body = &buf[pos + header_len..pos + size];
        match kind {
            b"stsd" => parse_stsd(body, out),
            b"stsz" => parse_stsz(body, out),
            _ => {}
        }
        pos += size;
    }
}

fn parse_stsd(buf: &[u8], out: &mut MoovFields) {
    // version(1) + flags(3) + entry_count(4)
    if buf.len() < 8 {
        return;
    }
    let entry = &buf[8..];
    if entry.len() < 8 || &entry[4..8] != b"mp4a" {
        return;
    }
    // SampleEntry base (size+format, 8) + reserved/data_ref_index (8) + AudioSampleEntry's
    // own fixed fields (version/revision/vendor/channelcount/samplesize/pre_defined/
    // reserved/samplerate, 20) = 36 bytes before any child boxes.
    const AUDIO_SAMPLE_ENTRY_FIXED: usize = 36;
    if entry.len() < AUDIO_SAMPLE_ENTRY_FIXED {
        return;
    }
    out.channels = u16::from_be_bytes(entry[24..26].try_into().unwrap()).max(1);
    let sample_rate_fixed = u32::from_be_bytes(entry[32..36].try_into().unwrap());
    out.sample_rate = sample_rate_fixed >> 16;

    let child = &entry[AUDIO_SAMPLE_ENTRY_FIXED..];
    if let Some(pos) = find_subslice(child, b"esds") {
        if pos >= 4 {
            let esds_box = &child[pos - 4..];
            if let Some((esds_size, _, esds_header_len)) = box_header(esds_box) {
                let end = (esds_size as usize).min(esds_box.len());
                let payload = &esds_box[esds_header_len..end];
                out.asc = extract_asc(payload);
            }
        }
    }
}

/// Pull the DecoderSpecificInfo (tag `0x05`) bytes out of an MPEG-4 ES descriptor blob.
fn extract_asc(payload: &[u8]) -> Vec<u8> {
    let mut i = 0usize;
    while i < payload.len() {
        let tag = payload[i];
        i += 1;
        if i >= payload.len() {
            break;
        }
        // Descriptor length is a variable-length (base-128) integer; most ASC boxes use
        // a single length byte, which covers every case this engine targets.
        let len = payload[i] as usize;
        i += 1;
        if tag == 0x05 {
            let end = (i + len).min(payload.len());
            return payload[i..end].to_vec();
        }
        i += len;
    }
    Vec::new()
}

fn parse_stsz(buf: &[u8], out: &mut MoovFields) {
    if buf.len() < 12 {
        return;
    }
    let sample_size = u32::from_be_bytes(buf[4..8].try_into().unwrap());
    let sample_count = u32::from_be_bytes(buf[8..12].try_into().unwrap());
    if sample_size != 0 {
        out.stsz = vec![sample_size; sample_count as usize];
        return;
    }
    let mut sizes = Vec::with_capacity(sample_count as usize);
    let mut pos = 12usize;
    for _ in 0..sample_count {
        if pos + 4 > buf.len() {
            break;
        }
        sizes.push(u32::from_be_bytes(buf[pos..pos + 4].try_into().unwrap()));
        pos += 4;
    }
    out.stsz = sizes;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BufFetch(Vec<u8>);
    impl Fetch for BufFetch {
        fn fetch(&mut self, offset: i64, buf: &mut [u8]) -> Result<usize> {
            let offset = offset as usize;
            if offset >= self.0.len() {
                return Ok(0);
            }
            let n = (self.0.len() - offset).min(buf.len());
            buf[..n].copy_from_slice(&self.0[offset..offset + n]);
            Ok(n)
        }
    }

    fn be_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&((8 + body.len()) as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    fn build_minimal_m4a(stsz_sizes: &[u32]) -> Vec<u8> {
        let asc = [0x12, 0x10]; // AAC-LC, 44100, stereo (just bytes, not decoded here)
        let mut esds_payload = Vec::new();
        esds_payload.push(0x03); // ES_DescrTag
        esds_payload.push(0x19); // len (placeholder, not consumed)
        esds_payload.extend_from_slice(&[0x00, 0x00, 0x00]);
        esds_payload.push(0x04); // DecoderConfigDescrTag
        esds_payload.push(0x11);
        esds_payload.extend_from_slice(&[0u8; 13]);
        esds_payload.push(0x05); // DecoderSpecificInfoTag
        esds_payload.push(asc.len() as u8);
        esds_payload.extend_from_slice(&asc);
        let esds = be_box(b"esds", &esds_payload);

        let mut sample_entry = Vec::new();
        sample_entry.extend_from_slice(&[0u8; 6]); // reserved
        sample_entry.extend_from_slice(&[0, 1]); // data_reference_index
        sample_entry.extend_from_slice(&[0u8; 8]); // version/revision/vendor
        sample_entry.extend_from_slice(&2u16.to_be_bytes()); // channels
        sample_entry.extend_from_slice(&16u16.to_be_bytes()); // sample size
        sample_entry.extend_from_slice(&[0u8; 4]); // compression_id + packet_size
        sample_entry.extend_from_slice(&((44100u32) << 16).to_be_bytes()); // sample rate 16.16
        sample_entry.extend_from_slice(&esds);
        let mp4a = be_box(b"mp4a", &sample_entry);

        let mut stsd_body = Vec::new();
        stsd_body.extend_from_slice(&[0u8; 4]); // version/flags
        stsd_body.extend_from_slice(&1u32.to_be_bytes()); // entry_count
        stsd_body.extend_from_slice(&mp4a);
        let stsd = be_box(b"stsd", &stsd_body);

        let mut stsz_body = Vec::new();
        stsz_body.extend_from_slice(&[0u8; 4]);
        stsz_body.extend_from_slice(&0u32.to_be_bytes()); // sample_size=0 -> table follows
        stsz_body.extend_from_slice(&(stsz_sizes.len() as u32).to_be_bytes());
        for s in stsz_sizes {
            stsz_body.extend_from_slice(&s.to_be_bytes());
        }
        let stsz = be_box(b"stsz", &stsz_body);

        let stbl = be_box(b"stbl", &[stsd, stsz].concat());
        let minf = be_box(b"minf", &stbl);

        let mut mdhd_body = vec![0u8; 4]; // version 0 + flags
        mdhd_body.extend_from_slice(&[0u8; 8]); // creation + modification
        mdhd_body.extend_from_slice(&44100u32.to_be_bytes()); // timescale
        mdhd_body.extend_from_slice(&44100u32.to_be_bytes()); // duration (1s)
        let mdhd = be_box(b"mdhd", &mdhd_body);

        let mdia = be_box(b"mdia", &[mdhd, minf].concat());
        let trak = be_box(b"trak", &mdia);
        let moov = be_box(b"moov", &trak);

        let mdat_payload = vec![0u8; stsz_sizes.iter().sum::<u32>() as usize];
        let mdat = be_box(b"mdat", &mdat_payload);

        let ftyp = be_box(b"ftyp", b"M4A mp42isom");

        [ftyp, moov, mdat].concat()
    }

    #[test]
    fn parses_moov_first_layout() {
        let data = build_minimal_m4a(&[100, 110, 95]);
        let len = data.len() as i64;
        let mut f = BufFetch(data);
        let info = extract(&mut f, len).unwrap();
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 2);
        assert_eq!(info.stsz, vec![100, 110, 95]);
        assert_eq!(info.timescale, 44100);
        assert!(!info.asc.is_empty());
        assert_eq!(info.profile, 1); // AAC-LC
    }
}
