//! Partial decompression of a (possibly truncated) multi-member gzip
//! stream. Ported from the reference implementation's `gzip_partial.py`:
//! the CRC/ISIZE trailer is never validated, because the whole point is to
//! decompress a prefix of a stream we deliberately only fetched part of.

use flate2::{Decompress, FlushDecompress, Status};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const FLAG_FTEXT: u8 = 0x01;
const FLAG_FHCRC: u8 = 0x02;
const FLAG_FEXTRA: u8 = 0x04;
const FLAG_FNAME: u8 = 0x08;
const FLAG_FCOMMENT: u8 = 0x10;

/// Parses one gzip member header at the start of `data`, returning the
/// header's length in bytes, or `None` if `data` does not begin with a
/// valid gzip header (the stop condition for the decompression loop).
fn parse_gzip_header(data: &[u8]) -> Option<usize> {
    if data.len() < 10 || data[0..2] != GZIP_MAGIC || data[2] != 0x08 {
        return None;
    }
    let flags = data[3];
    let _ = FLAG_FTEXT; // documented, not otherwise consulted
    let mut pos = 10usize;

    if flags & FLAG_FEXTRA != 0 {
        if data.len() < pos + 2 {
            return None;
        }
        let xlen = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2 + xlen;
        if data.len() < pos {
            return None;
        }
    }
    if flags & FLAG_FNAME != 0 {
        pos = find_nul(data, pos)?;
    }
    if flags & FLAG_FCOMMENT != 0 {
        pos = find_nul(data, pos)?;
    }
    if flags & FLAG_FHCRC != 0 {
        pos += 2;
        if data.len() < pos {
            return None;
        }
    }
    Some(pos)
}

fn find_nul(data: &[u8], start: usize) -> Option<usize> {
    let rel = data.get(start..)?.iter().position(|&b| b == 0)?;
    Some(start + rel + 1)
}

/// Decompresses up to `max_uncompressed` bytes from `data`, a prefix of a
/// (possibly multi-member) gzip stream. Stops at the first position that
/// is not a valid gzip header, rather than erroring.
pub fn partial_gunzip(data: &[u8], max_uncompressed: usize) -> Vec<u8> {
    let mut cursor = data;
    let mut output = Vec::new();

    while !cursor.is_empty() && output.len() < max_uncompressed {
        let header_len = match parse_gzip_header(cursor) {
            Some(len) => len,
            None => break,
        };
        let body = &cursor[header_len..];
        let budget = max_uncompressed - output.len();
        let (produced, consumed) = inflate_member(body, budget);
        output.extend_from_slice(&produced);

        let member_total = header_len + consumed;
        if member_total >= cursor.len() {
            break;
        }
        let after_member = &cursor[member_total..];
        let after_trailer = if after_member.len() >= 8 {
            &after_member[8..]
        } else {
            &[]
        };
        let nuls = after_trailer.iter().take_while(|&&b| b == 0).count();
        cursor = &after_trailer[nuls..];
    }

    output
}

/// Inflates a single raw-deflate member body, returning the decompressed
/// bytes (capped at `budget`) and the number of input bytes consumed.
fn inflate_member(body: &[u8], budget: usize) -> (Vec<u8>, usize) {
    let mut decompress = Decompress::new(false);
    let mut output = Vec::new();
    let mut in_pos = 0usize;
    let mut chunk = vec![0u8; 8192];

    loop {
        if output.len() >= budget || in_pos >= body.len() {
            break;
        }
        let before_out = decompress.total_out();
        let before_in = decompress.total_in();
        let status = match decompress.decompress(&body[in_pos..], &mut chunk, FlushDecompress::None)
        {
            Ok(status) => status,
            Err(_) => break,
        };
        let produced = (decompress.total_out() - before_out) as usize;
        output.extend_from_slice(&chunk[..produced]);
        in_pos += (decompress.total_in() - before_in) as usize;

        if status == Status::StreamEnd {
            break;
        }
        if produced == 0 && (decompress.total_in() - before_in) == 0 {
            // No progress possible with the data at hand: truncated member.
            break;
        }
    }
    if output.len() > budget {
        output.truncate(budget);
    }
    (output, in_pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip_member(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn decodes_single_member() {
        let compressed = gzip_member(b"hello world");
        let out = partial_gunzip(&compressed, usize::MAX);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn respects_max_uncompressed() {
        let compressed = gzip_member(b"0123456789");
        let out = partial_gunzip(&compressed, 4);
        assert_eq!(out, b"0123");
    }

    #[test]
    fn concatenates_multiple_members() {
        let mut compressed = gzip_member(b"first-");
        compressed.extend(gzip_member(b"second"));
        let out = partial_gunzip(&compressed, usize::MAX);
        assert_eq!(out, b"first-second");
    }

    #[test]
    fn truncated_prefix_yields_first_complete_member() {
        // First member decodes to 800 bytes and compresses small enough to
        // be fully contained well within the first 1024 bytes; a second,
        // much larger member follows but `data` only holds a short prefix
        // of it, so it must never appear in the output.
        let first = vec![b'a'; 800];
        let second = vec![b'b'; 50 * 1024 * 1024];
        let mut compressed = gzip_member(&first);
        compressed.extend(gzip_member(&second));
        let prefix = &compressed[..1024.min(compressed.len())];

        let out = partial_gunzip(prefix, usize::MAX);
        assert_eq!(out, first);
    }

    #[test]
    fn stops_at_invalid_header() {
        let mut compressed = gzip_member(b"payload");
        compressed.push(0xff); // garbage, not a valid gzip header
        let out = partial_gunzip(&compressed, usize::MAX);
        assert_eq!(out, b"payload");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(partial_gunzip(&[], usize::MAX), Vec::<u8>::new());
    }
}
