//! Diagram-source encoder for the PlantUML rendering service.
//!
//! The server accepts diagram source as a URL path segment: raw deflate of the
//! UTF-8 text, re-packed 6 bits at a time into the alphabet `0-9A-Za-z-_`.
//! The output must stay bit-compatible with the server, so the packing below
//! is fixed: 3 input bytes → 4 characters, final group zero-padded.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

const ALPHABET: &[u8; 64] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

/// zlib framing around the raw deflate stream.
const ZLIB_HEADER_LEN: usize = 2;
const ZLIB_CHECKSUM_LEN: usize = 4;

/// Encode diagram source text into the rendering service's URL alphabet.
pub fn encode(text: &str) -> String {
    pack(&deflate_raw(text.as_bytes()))
}

/// zlib-compress `bytes` and strip the 2-byte header and Adler-32 trailer.
fn deflate_raw(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(bytes.len() / 2 + 16), Compression::default());
    let zlib = encoder
        .write_all(bytes)
        .and_then(|()| encoder.finish())
        .expect("deflate into a Vec cannot fail");

    if zlib.len() < ZLIB_HEADER_LEN + ZLIB_CHECKSUM_LEN {
        return Vec::new();
    }
    zlib[ZLIB_HEADER_LEN..zlib.len() - ZLIB_CHECKSUM_LEN].to_vec()
}

fn pack(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let b1 = chunk[0];
        let b2 = chunk.get(1).copied().unwrap_or(0);
        let b3 = chunk.get(2).copied().unwrap_or(0);

        out.push(symbol(b1 >> 2));
        out.push(symbol(((b1 & 0x3) << 4) | (b2 >> 4)));
        out.push(symbol(((b2 & 0xF) << 2) | (b3 >> 6)));
        out.push(symbol(b3 & 0x3F));
    }
    out
}

fn symbol(six_bits: u8) -> char {
    ALPHABET[(six_bits & 0x3F) as usize] as char
}
