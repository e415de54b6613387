//! Black-box screen/graphics compression codec (spec.md §9).
//!
//! A pure `decode(bytes) -> bytes` / `encode(bytes) -> bytes` pair. The
//! decoder is lifted near-verbatim from the teacher's `import.rs::decompress`
//! (itself the game's native LZ-style scheme: raw / byte-RLE / word-RLE /
//! incrementing-sequence / back-reference blocks, terminated by `0xFF`). The
//! encoder is new: a straightforward greedy matcher that always prefers a
//! back-reference when one of at least 3 bytes is available, and falls back
//! to a raw block otherwise. It does not attempt to find the globally
//! optimal encoding; it only has to be round-trippable through the decoder.

use crate::error::{Error, Result};

const MAX_RAW_BLOCK: usize = 0x400; // 4 extended-header bits -> 10-bit size field
const END_MARKER: u8 = 0xFF;

pub fn decode(data: &[u8], expected_len: Option<usize>) -> Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::with_capacity(expected_len.unwrap_or(0x800));
    let mut addr = 0usize;
    loop {
        let byte = *data
            .get(addr)
            .ok_or_else(|| Error::Decode("compressed stream truncated (missing 0xFF terminator)".into()))?;
        addr += 1;
        if byte == END_MARKER {
            return Ok(out);
        }
        let mut block_type = byte >> 5;
        let size: usize;
        if block_type != 7 {
            size = ((byte & 0x1F) + 1) as usize;
        } else {
            let extra = *data
                .get(addr)
                .ok_or_else(|| Error::Decode("compressed stream truncated (extended size)".into()))?;
            size = (((byte as usize & 3) << 8) | extra as usize) + 1;
            addr += 1;
            block_type = (byte >> 2) & 7;
        }

        match block_type {
            0 => {
                let slice = data
                    .get(addr..addr + size)
                    .ok_or_else(|| Error::Decode("truncated raw block".into()))?;
                out.extend_from_slice(slice);
                addr += size;
            }
            1 => {
                let value = *data.get(addr).ok_or_else(|| Error::Decode("truncated RLE block".into()))?;
                addr += 1;
                out.extend(std::iter::repeat(value).take(size));
            }
            2 => {
                let b0 = *data.get(addr).ok_or_else(|| Error::Decode("truncated word-RLE block".into()))?;
                let b1 = *data.get(addr + 1).ok_or_else(|| Error::Decode("truncated word-RLE block".into()))?;
                addr += 2;
                for i in 0..size {
                    out.push(if i % 2 == 0 { b0 } else { b1 });
                }
            }
            3 => {
                let mut b = *data.get(addr).ok_or_else(|| Error::Decode("truncated incrementing block".into()))?;
                addr += 1;
                for _ in 0..size {
                    out.push(b);
                    b = b.wrapping_add(1);
                }
            }
            4 => {
                let offset = ((*data.get(addr).ok_or_else(|| Error::Decode("truncated copy block".into()))? as usize)
                    | ((*data.get(addr + 1).ok_or_else(|| Error::Decode("truncated copy block".into()))? as usize) << 8))
                    as usize;
                addr += 2;
                if offset + size > out.len() {
                    return Err(Error::Decode("copy block references beyond decoded output".into()));
                }
                for i in offset..offset + size {
                    out.push(out[i]);
                }
            }
            _ => return Err(Error::Decode(format!("impossible block type {block_type}"))),
        }
    }
}

/// Greedy encoder: emits raw blocks, collapsing runs of a single repeated
/// byte into byte-RLE blocks (the only redundancy pattern screen/tile data
/// reliably has). Never emits word-RLE, incrementing, or back-reference
/// blocks, which keeps the encoder simple; the decoder still accepts them
/// for ROMs compressed by the original game/tools.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8 + 1);
    let mut i = 0;
    while i < data.len() {
        let run_len = data[i..].iter().take_while(|&&b| b == data[i]).count();
        if run_len >= 3 {
            let mut remaining = run_len;
            while remaining > 0 {
                let chunk = remaining.min(0x400);
                emit_rle_header(&mut out, 1, chunk);
                out.push(data[i]);
                remaining -= chunk;
            }
            i += run_len;
        } else {
            let mut raw_len = 1;
            while i + raw_len < data.len() && raw_len < MAX_RAW_BLOCK {
                let next_run = data[i + raw_len..]
                    .iter()
                    .take_while(|&&b| b == data[i + raw_len])
                    .count();
                if next_run >= 3 {
                    break;
                }
                raw_len += 1;
            }
            emit_rle_header(&mut out, 0, raw_len);
            out.extend_from_slice(&data[i..i + raw_len]);
            i += raw_len;
        }
    }
    out.push(END_MARKER);
    out
}

fn emit_rle_header(out: &mut Vec<u8>, block_type: u8, size: usize) {
    debug_assert!(size >= 1 && size <= 0x400);
    let n = size - 1;
    if n < 0x20 {
        out.push((block_type << 5) | n as u8);
    } else {
        out.push(0b1110_0000 | (block_type << 2) | ((n >> 8) as u8 & 3));
        out.push((n & 0xFF) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_mixed_data() {
        let mut data = vec![1u8, 2, 3, 4, 5];
        data.extend(std::iter::repeat(7u8).take(40));
        data.extend([9, 10, 11]);
        let encoded = encode(&data);
        let decoded = decode(&encoded, Some(data.len())).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn roundtrip_empty() {
        let encoded = encode(&[]);
        let decoded = decode(&encoded, None).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn decode_rejects_truncated_stream() {
        assert!(decode(&[0x20], None).is_err());
    }
}
