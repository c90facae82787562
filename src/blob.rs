//! Blob format v1 — fixed-size encrypted records, addressable only by key.
//!
//! # On-blob layout (total length = CLUSTER_SIZE, all integers big-endian)
//!
//! ```text
//! Offset  Size      Field
//!    0      56      ImprintA      nonce ∥ keyed digest (cleartext)
//!   56      56      ImprintB      second imprint; random bytes in a fake
//!  112       8      CipherNonce   ChaCha20 nonce (cleartext)
//!  120     1+p      IntroPadding  p = first byte mod 64, encrypted
//!   ..      20      Header        see field table below, encrypted
//!   ..       4      HeaderCRC     CRC32 of the 20 raw header bytes, encrypted
//!   ..       n      Body          n = PART_SIZE, encrypted
//!   ..       4      BodyCRC       CRC32 of the raw body, encrypted
//!   ..      ...     TailPadding   random bytes up to exactly CLUSTER_SIZE
//! ```
//!
//! Header fields:
//!
//! ```text
//! Offset  Size  Field
//!    0      2   FORMAT_ID    ASCII "LS"
//!    2      1   FORMAT_VER   = 1
//!    3      8   DATA_VER     i64, increases on every write of a codename
//!   11      4   FULL_SIZE    u32, size of the complete reassembled payload
//!   15      1   PARTS_LEN    u8, stores the part count minus one (1..=256)
//!   16      1   PART_IDX     u8, zero-based index of this part
//!   17      3   PART_SIZE    u24, payload bytes carried in this body
//! ```
//!
//! # Indistinguishability
//! Everything before the encrypted region is imprint and nonce material —
//! random-looking without the key.  Everything after it is keystream output
//! or raw CSRNG bytes.  A blob is always exactly `CLUSTER_SIZE` long, so
//! its length reveals nothing about the body size.
//!
//! # Integrity
//! CRC32 for the header and CRC32 for the body, both encrypted.  These are
//! checksums, not MACs: they verify faithful decryption and catch bit-rot,
//! while authenticity rests on the two imprints.  An AEAD upgrade would be
//! a new FORMAT_VER.
//!
//! # Lazy decoding
//! [`BlobReader`] is a forward-only state machine
//! (`Init → ImpA → ImpB → Header → Body`).  Each tier memoizes its verdict;
//! cheaper tiers gate the costlier ones, so a blob belonging to someone
//! else costs 56 bytes of hashing to dismiss.

use std::io::{self, Read, Seek, SeekFrom};

use chacha20::cipher::{NewCipher, StreamCipher};
use chacha20::ChaCha20Legacy;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

use crate::codec::{self, IntroPadding};
use crate::imprint::{self, Imprint};
use crate::kdf::CodenameKey;

// ── Constants ────────────────────────────────────────────────────────────────

/// Fixed byte size of every blob slot in a container.
pub const CLUSTER_SIZE: usize = 4096;

/// On-disk magic inside the encrypted header.
pub const FORMAT_ID: &[u8; 2] = b"LS";

/// Current blob format version.
pub const FORMAT_VER: u8 = 1;

/// ChaCha20 nonce length (the original 64-bit djb construction).
pub const CIPHER_NONCE_LEN: usize = 8;

/// Encoded header length.
pub const HEADER_LEN: usize = 20;

/// Length of each stored CRC32.
pub const CRC_LEN: usize = 4;

/// Worst-case non-body bytes in a blob: two imprints, cipher nonce,
/// maximal intro padding, header, and both CRCs.
pub const MAX_BLOB_OVERHEAD: usize =
    2 * imprint::FULL_LEN + CIPHER_NONCE_LEN + IntroPadding::MAX_LEN + HEADER_LEN + 2 * CRC_LEN;

/// Largest body one blob can carry while always fitting in its slot.
pub const MAX_PART_CONTENT_SIZE: usize = CLUSTER_SIZE - MAX_BLOB_OVERHEAD;

/// Largest number of parts an entry can be split into (PARTS_LEN is a u8
/// storing the count minus one).
pub const MAX_PARTS: usize = 256;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum BlobError {
    /// The blob (or the encode source stream) ended mid-field.
    #[error("unexpected end of data")]
    InsufficientData,
    /// Decrypted header bytes do not match their CRC32.
    #[error("header CRC32 mismatch")]
    HeaderChecksum,
    /// Decrypted body bytes do not match their CRC32 — corruption or
    /// tampering on a blob that passed both imprint checks.
    #[error("body CRC32 mismatch")]
    BodyChecksum,
    /// Header access on a blob whose first imprint never matched.
    /// Programming error: callers must gate on `belongs_to_namegroup`.
    #[error("blob does not carry this key's group imprint")]
    GroupImprintMismatch,
    /// Header access on a decoy.  Programming error: callers must gate on
    /// `contains_data`.
    #[error("blob is a decoy without a data imprint")]
    ItemImprintMismatch,
    /// Structurally invalid header (magic, version, or field ranges).
    #[error("malformed header: {0}")]
    HeaderFormat(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Second `read_body` call on one reader; the stream is consumed.
    #[error("blob body already consumed")]
    BodyConsumed,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Decoded form of the 20-byte encrypted header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobHeader {
    pub format_version: u8,
    pub data_version:   i64,
    pub full_size:      u32,
    /// Decoded part count, 1..=256.
    pub parts_len:      u16,
    pub part_idx:       u8,
    pub part_size:      u32,
}

impl BlobHeader {
    /// Encode the 20 raw header bytes (CRC not included).
    fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..2].copy_from_slice(FORMAT_ID);
        buf[2] = self.format_version;
        buf[3..11].copy_from_slice(&codec::i64_to_bytes(self.data_version));
        buf[11..15].copy_from_slice(&codec::u32_to_bytes(self.full_size));
        buf[15] = (self.parts_len - 1) as u8;
        buf[16] = self.part_idx;
        buf[17..20].copy_from_slice(&codec::u24_to_bytes(self.part_size));
        buf
    }

    /// Parse and validate 20 raw header bytes.
    ///
    /// The caller verifies the header CRC first; this checks magic,
    /// version, and field ranges.
    fn from_bytes(raw: &[u8; HEADER_LEN]) -> Result<Self, BlobError> {
        if &raw[0..2] != FORMAT_ID {
            return Err(BlobError::HeaderFormat("bad format id"));
        }
        let format_version = raw[2];
        if format_version != FORMAT_VER {
            return Err(BlobError::HeaderFormat("unsupported format version"));
        }
        let data_version = codec::bytes_to_i64(&raw[3..11]);
        let full_size    = codec::bytes_to_u32(&raw[11..15]);
        let parts_len    = raw[15] as u16 + 1;
        let part_idx     = raw[16];
        let part_size    = codec::bytes_to_u24(&raw[17..20]);

        if u16::from(part_idx) >= parts_len {
            return Err(BlobError::HeaderFormat("part index out of range"));
        }
        if part_size as usize > MAX_PART_CONTENT_SIZE {
            return Err(BlobError::HeaderFormat("part size exceeds the per-blob maximum"));
        }
        if full_size as u64 > (MAX_PART_CONTENT_SIZE * parts_len as usize) as u64 {
            return Err(BlobError::HeaderFormat("total size exceeds what the parts can carry"));
        }

        Ok(Self { format_version, data_version, full_size, parts_len, part_idx, part_size })
    }
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Per-part parameters for [`encode_blob`].
#[derive(Debug, Clone, Copy)]
pub struct EncodeSpec {
    pub data_version: i64,
    /// Zero-based index of this part.
    pub part_idx:     u8,
    /// Total part count, 1..=256.
    pub parts_len:    u16,
    /// Bytes to read from the source for this part.  May be omitted only
    /// for a single-part entry, where it defaults to the full stream size.
    pub part_size:    Option<u32>,
}

impl Default for EncodeSpec {
    fn default() -> Self {
        Self { data_version: 0, part_idx: 0, parts_len: 1, part_size: None }
    }
}

/// Total stream length, preserving the current position.
fn stream_size<S: Seek>(stream: &mut S) -> io::Result<u64> {
    let pos = stream.stream_position()?;
    let end = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(pos))?;
    Ok(end)
}

fn encrypt_into(out: &mut Vec<u8>, cipher: &mut ChaCha20Legacy, data: &[u8]) {
    let start = out.len();
    out.extend_from_slice(data);
    cipher.apply_keystream(&mut out[start..]);
}

/// Encrypt one part of an entry into a blob of exactly [`CLUSTER_SIZE`]
/// bytes.
///
/// `FULL_SIZE` in the header is the total stream length; the body is read
/// from the stream's current position, so successive calls over one stream
/// emit consecutive parts.  Fails with [`BlobError::InsufficientData`] if
/// the stream cannot supply the full part.
pub fn encode_blob<S: Read + Seek>(
    key:    &CodenameKey,
    spec:   &EncodeSpec,
    source: &mut S,
) -> Result<Vec<u8>, BlobError> {
    if !(1..=MAX_PARTS as u16).contains(&spec.parts_len) {
        return Err(BlobError::InvalidArgument(format!("parts_len={}", spec.parts_len)));
    }
    if u16::from(spec.part_idx) >= spec.parts_len {
        return Err(BlobError::InvalidArgument(format!(
            "part_idx={} with parts_len={}",
            spec.part_idx, spec.parts_len
        )));
    }
    if spec.part_size.is_none() && !(spec.part_idx == 0 && spec.parts_len == 1) {
        return Err(BlobError::InvalidArgument(
            "part_size is required for a multi-part entry".into(),
        ));
    }

    let full_size = stream_size(source)?;
    if full_size > (MAX_PART_CONTENT_SIZE * spec.parts_len as usize) as u64 {
        return Err(BlobError::InvalidArgument(format!(
            "{full_size}-byte payload cannot fit in {} part(s)",
            spec.parts_len
        )));
    }
    let part_size = spec.part_size.unwrap_or(full_size as u32);
    if part_size as usize > MAX_PART_CONTENT_SIZE {
        return Err(BlobError::InvalidArgument(format!("part_size={part_size}")));
    }

    // Two independent imprints.  They must differ; with 24-byte random
    // nonces a collision means a broken RNG, so resample rather than emit.
    let imprint_a = Imprint::generate(key);
    let mut imprint_b = Imprint::generate(key);
    while imprint_b.as_bytes() == imprint_a.as_bytes() {
        imprint_b = Imprint::generate(key);
    }

    let header = BlobHeader {
        format_version: FORMAT_VER,
        data_version:   spec.data_version,
        full_size:      full_size as u32,
        parts_len:      spec.parts_len,
        part_idx:       spec.part_idx,
        part_size,
    };
    let header_bytes = header.to_bytes();
    let header_crc   = codec::crc32(&header_bytes);

    let mut body = vec![0u8; part_size as usize];
    source.read_exact(&mut body).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => BlobError::InsufficientData,
        _ => BlobError::Io(e),
    })?;
    let body_crc = codec::crc32(&body);

    let mut nonce = [0u8; CIPHER_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let mut cipher = ChaCha20Legacy::new(key.as_bytes().into(), (&nonce).into());

    let mut out = Vec::with_capacity(CLUSTER_SIZE);
    out.extend_from_slice(imprint_a.as_bytes());
    out.extend_from_slice(imprint_b.as_bytes());
    out.extend_from_slice(&nonce);

    encrypt_into(&mut out, &mut cipher, &IntroPadding::generate());
    encrypt_into(&mut out, &mut cipher, &header_bytes);
    encrypt_into(&mut out, &mut cipher, &codec::u32_to_bytes(header_crc));
    encrypt_into(&mut out, &mut cipher, &body);
    encrypt_into(&mut out, &mut cipher, &codec::u32_to_bytes(body_crc));
    body.zeroize();

    debug_assert!(out.len() <= CLUSTER_SIZE);

    // Tail padding: every blob is brought to exactly CLUSTER_SIZE, so the
    // on-disk length is independent of the body length.
    let mut tail = vec![0u8; CLUSTER_SIZE - out.len()];
    OsRng.fill_bytes(&mut tail);
    out.extend_from_slice(&tail);

    Ok(out)
}

/// Author a decoy blob for `key`: one valid imprint followed by CSRNG
/// bytes.  It passes the first decoder tier and fails the second, so the
/// key holder sees a fake and everyone else sees noise.
pub fn fake_blob(key: &CodenameKey) -> Vec<u8> {
    let mut out = Vec::with_capacity(CLUSTER_SIZE);
    out.extend_from_slice(Imprint::generate(key).as_bytes());
    let mut rest = vec![0u8; CLUSTER_SIZE - imprint::FULL_LEN];
    OsRng.fill_bytes(&mut rest);
    out.extend_from_slice(&rest);
    out
}

// ── Decoding ─────────────────────────────────────────────────────────────────

/// Lazy blob decoder over an in-memory byte view.
///
/// Tiers are forward-only and memoized: `belongs_to_namegroup` reads only
/// ImprintA, `contains_data` additionally reads ImprintB, `header` sets up
/// the cipher and decrypts through the header CRC, `read_body` consumes the
/// body.  A failed header parse is remembered; the byte stream is not
/// rewound.
pub struct BlobReader<'a> {
    key:  &'a CodenameKey,
    data: &'a [u8],
    pos:  usize,

    cipher:        Option<ChaCha20Legacy>,
    belongs:       Option<bool>,
    has_data:      Option<bool>,
    header:        Option<BlobHeader>,
    header_failed: bool,
    body_read:     bool,
}

impl<'a> BlobReader<'a> {
    pub fn new(key: &'a CodenameKey, data: &'a [u8]) -> Self {
        Self {
            key,
            data,
            pos: 0,
            cipher: None,
            belongs: None,
            has_data: None,
            header: None,
            header_failed: false,
            body_read: false,
        }
    }

    /// Take the next `n` bytes of the raw view.
    fn read_exact(&mut self, n: usize) -> Result<&'a [u8], BlobError> {
        if self.data.len() - self.pos < n {
            return Err(BlobError::InsufficientData);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_and_decrypt(&mut self, cipher: &mut ChaCha20Legacy, n: usize) -> Result<Vec<u8>, BlobError> {
        let mut buf = self.read_exact(n)?.to_vec();
        cipher.apply_keystream(&mut buf);
        Ok(buf)
    }

    /// Tier 1: does ImprintA verify under this key?  O(56 bytes).
    pub fn belongs_to_namegroup(&mut self) -> bool {
        if let Some(b) = self.belongs {
            return b;
        }
        let b = match self.read_exact(imprint::FULL_LEN) {
            Ok(bytes) => imprint::matches_key(self.key, bytes),
            Err(_) => false,
        };
        self.belongs = Some(b);
        b
    }

    /// Tier 2: does ImprintB verify too?  False on a fake.
    pub fn contains_data(&mut self) -> bool {
        if !self.belongs_to_namegroup() {
            return false;
        }
        if let Some(b) = self.has_data {
            return b;
        }
        let b = match self.read_exact(imprint::FULL_LEN) {
            Ok(bytes) => imprint::matches_key(self.key, bytes),
            Err(_) => false,
        };
        self.has_data = Some(b);
        b
    }

    /// Tier 3: decrypt and validate the header.
    ///
    /// Calling this on a foreign blob or a fake is a caller bug and yields
    /// [`BlobError::GroupImprintMismatch`] / [`BlobError::ItemImprintMismatch`].
    pub fn header(&mut self) -> Result<BlobHeader, BlobError> {
        if !self.belongs_to_namegroup() {
            return Err(BlobError::GroupImprintMismatch);
        }
        if !self.contains_data() {
            return Err(BlobError::ItemImprintMismatch);
        }
        if let Some(h) = self.header {
            return Ok(h);
        }
        if self.header_failed {
            return Err(BlobError::HeaderFormat("header previously failed to parse"));
        }
        match self.parse_header() {
            Ok(h) => {
                self.header = Some(h);
                Ok(h)
            }
            Err(e) => {
                self.header_failed = true;
                Err(e)
            }
        }
    }

    fn parse_header(&mut self) -> Result<BlobHeader, BlobError> {
        let nonce: [u8; CIPHER_NONCE_LEN] =
            self.read_exact(CIPHER_NONCE_LEN)?.try_into().unwrap();
        let mut cipher = ChaCha20Legacy::new(self.key.as_bytes().into(), (&nonce).into());

        // Skip the intro padding.
        let first = self.read_and_decrypt(&mut cipher, 1)?[0];
        let skip = IntroPadding::len_from_first_byte(first);
        if skip > 0 {
            self.read_and_decrypt(&mut cipher, skip)?;
        }

        let raw: [u8; HEADER_LEN] = self
            .read_and_decrypt(&mut cipher, HEADER_LEN)?
            .as_slice()
            .try_into()
            .unwrap();
        let stored_crc = codec::bytes_to_u32(&self.read_and_decrypt(&mut cipher, CRC_LEN)?);

        // CRC32 first — cheapest check, and it rejects random bytes that a
        // colliding imprint would otherwise feed to field validation.
        if codec::crc32(&raw) != stored_crc {
            return Err(BlobError::HeaderChecksum);
        }
        let header = BlobHeader::from_bytes(&raw)?;

        self.cipher = Some(cipher);
        Ok(header)
    }

    /// Tier 4: decrypt the body and verify its CRC.  Consumes the stream;
    /// a second call is an error.
    pub fn read_body(&mut self) -> Result<Vec<u8>, BlobError> {
        if self.body_read {
            return Err(BlobError::BodyConsumed);
        }
        let header = self.header()?;
        let mut cipher = match self.cipher.take() {
            Some(c) => c,
            None => return Err(BlobError::BodyConsumed),
        };

        let body = self.read_and_decrypt(&mut cipher, header.part_size as usize)?;
        let stored_crc = codec::bytes_to_u32(&self.read_and_decrypt(&mut cipher, CRC_LEN)?);
        if codec::crc32(&body) != stored_crc {
            return Err(BlobError::BodyChecksum);
        }

        self.body_read = true;
        Ok(body)
    }
}
