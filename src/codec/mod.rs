//! Fixed-width byte codecs, CRC32, and the intro-padding generator.
//!
//! # Endianness
//! Every multi-byte integer in the blob format is big-endian.  This is
//! non-negotiable and encoded in the format version; there is no runtime
//! negotiation.
//!
//! # Intro padding
//! A variable-length random prefix inside the encrypted region, placed
//! before the header.  Encoding is a single byte `b` followed by
//! `b mod 64` random bytes; total length 1..=64.  Its job is to shift the
//! header to an unpredictable offset within the keystream so that the
//! plaintext at any fixed ciphertext offset is unknown, frustrating
//! known-plaintext analysis of the encrypted header.

use byteorder::{BigEndian, ByteOrder};
use crc32fast::Hasher;
use rand::rngs::OsRng;
use rand::RngCore;

// ── Fixed-width integer codecs ───────────────────────────────────────────────

#[inline]
pub fn u32_to_bytes(v: u32) -> [u8; 4] {
    let mut buf = [0u8; 4];
    BigEndian::write_u32(&mut buf, v);
    buf
}

#[inline]
pub fn bytes_to_u32(b: &[u8]) -> u32 {
    BigEndian::read_u32(b)
}

/// Encode the low 24 bits of `v`.  Values above `0xFF_FFFF` are a caller
/// bug; field ranges are validated before encoding.
#[inline]
pub fn u24_to_bytes(v: u32) -> [u8; 3] {
    let mut buf = [0u8; 3];
    BigEndian::write_u24(&mut buf, v);
    buf
}

#[inline]
pub fn bytes_to_u24(b: &[u8]) -> u32 {
    BigEndian::read_u24(b)
}

#[inline]
pub fn i64_to_bytes(v: i64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    BigEndian::write_i64(&mut buf, v);
    buf
}

#[inline]
pub fn bytes_to_i64(b: &[u8]) -> i64 {
    BigEndian::read_i64(b)
}

// ── CRC32 ────────────────────────────────────────────────────────────────────

/// CRC32 (IEEE 802.3) over `data`.  Stored big-endian on disk.
pub fn crc32(data: &[u8]) -> u32 {
    let mut h = Hasher::new();
    h.update(data);
    h.finalize()
}

// ── Intro padding ────────────────────────────────────────────────────────────

/// Generator/decoder for the random prefix inside the encrypted region.
pub struct IntroPadding;

impl IntroPadding {
    /// The modulus applied to the length byte.
    pub const MODULUS: usize = 64;
    /// Largest possible encoded padding: length byte + 63 random bytes.
    pub const MAX_LEN: usize = Self::MODULUS;

    /// Emit `b ∥ random(b mod 64)` for a random `b`.
    pub fn generate() -> Vec<u8> {
        let mut first = [0u8; 1];
        OsRng.fill_bytes(&mut first);
        let mut out = vec![0u8; 1 + Self::len_from_first_byte(first[0])];
        out[0] = first[0];
        OsRng.fill_bytes(&mut out[1..]);
        out
    }

    /// Number of padding bytes that follow the length byte.
    #[inline]
    pub fn len_from_first_byte(b: u8) -> usize {
        b as usize % Self::MODULUS
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
