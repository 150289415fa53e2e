//! Fixed-width content fingerprints (size + CRC32/MD5/SHA-1) with
//! present-mask comparison semantics.
//!
//! Grounded on `Hashes.h`/`Hashes.cc` (original ckmame) and the
//! teacher's `HashType` string handling in `models.rs`.

use std::fmt;
use std::sync::OnceLock;

use thiserror::Error;

pub const SIZE_CRC: usize = 4;
pub const SIZE_MD5: usize = 16;
pub const SIZE_SHA1: usize = 20;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HashKind {
    Crc32,
    Md5,
    Sha1,
}

impl HashKind {
    pub fn byte_len(self) -> usize {
        match self {
            HashKind::Crc32 => SIZE_CRC,
            HashKind::Md5 => SIZE_MD5,
            HashKind::Sha1 => SIZE_SHA1,
        }
    }

    /// Deduce a digest type from a hex string's byte length, per spec.
    pub fn from_hex_len(hex_len: usize) -> Option<HashKind> {
        match hex_len {
            8 => Some(HashKind::Crc32),
            32 => Some(HashKind::Md5),
            40 => Some(HashKind::Sha1),
            _ => None,
        }
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HashKind::Crc32 => "crc",
            HashKind::Md5 => "md5",
            HashKind::Sha1 => "sha1",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashesError {
    #[error("invalid hash hex string length {0} (expected 8, 32, or 40)")]
    InvalidHexLength(usize),
    #[error("invalid hex digit in hash string {0:?}")]
    InvalidHex(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Compare {
    Match,
    Mismatch,
    /// No digest type is present on both sides.
    NoCommonHash,
}

/// Size plus zero or more fixed-width digests. At least one field is
/// expected to be present for a meaningful fingerprint, but an empty
/// `Hashes` is a valid (if useless) value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Hashes {
    pub size: Option<u64>,
    pub crc32: Option<u32>,
    pub md5: Option<[u8; SIZE_MD5]>,
    pub sha1: Option<[u8; SIZE_SHA1]>,
}

impl Hashes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(size: u64) -> Self {
        Self {
            size: Some(size),
            ..Default::default()
        }
    }

    /// Widen the present set by zero-filling any requested digest type
    /// that isn't already present.
    pub fn add_types(&mut self, kinds: &[HashKind]) {
        for kind in kinds {
            match kind {
                HashKind::Crc32 => {
                    self.crc32.get_or_insert(0);
                }
                HashKind::Md5 => {
                    self.md5.get_or_insert([0u8; SIZE_MD5]);
                }
                HashKind::Sha1 => {
                    self.sha1.get_or_insert([0u8; SIZE_SHA1]);
                }
            }
        }
    }

    /// Copy every field `other` has that `self` lacks.
    pub fn merge(&mut self, other: &Hashes) {
        if self.size.is_none() {
            self.size = other.size;
        }
        if self.crc32.is_none() {
            self.crc32 = other.crc32;
        }
        if self.md5.is_none() {
            self.md5 = other.md5;
        }
        if self.sha1.is_none() {
            self.sha1 = other.sha1;
        }
    }

    fn common_kinds(&self, other: &Hashes) -> Vec<HashKind> {
        let mut kinds = Vec::with_capacity(3);
        if self.crc32.is_some() && other.crc32.is_some() {
            kinds.push(HashKind::Crc32);
        }
        if self.md5.is_some() && other.md5.is_some() {
            kinds.push(HashKind::Md5);
        }
        if self.sha1.is_some() && other.sha1.is_some() {
            kinds.push(HashKind::Sha1);
        }
        kinds
    }

    /// Compare using only digest types present on both sides. Never
    /// considers `size`.
    pub fn compare(&self, other: &Hashes) -> Compare {
        let common = self.common_kinds(other);
        if common.is_empty() {
            return Compare::NoCommonHash;
        }
        for kind in common {
            let eq = match kind {
                HashKind::Crc32 => self.crc32 == other.crc32,
                HashKind::Md5 => self.md5 == other.md5,
                HashKind::Sha1 => self.sha1 == other.sha1,
            };
            if !eq {
                return Compare::Mismatch;
            }
        }
        Compare::Match
    }

    /// `true` iff both sizes are known and equal AND `compare()` is a
    /// `Match` (not merely `NoCommonHash`).
    pub fn compare_with_size(&self, other: &Hashes) -> bool {
        match (self.size, other.size) {
            (Some(a), Some(b)) if a == b => self.compare(other) == Compare::Match,
            _ => false,
        }
    }

    /// Whether the given digest kind, if present, equals the
    /// well-known digest of the empty byte stream.
    pub fn is_zero(&self, kind: HashKind) -> bool {
        let empty = empty_file_hashes();
        match kind {
            HashKind::Crc32 => self.crc32.is_some() && self.crc32 == empty.crc32,
            HashKind::Md5 => self.md5.is_some() && self.md5 == empty.md5,
            HashKind::Sha1 => self.sha1.is_some() && self.sha1 == empty.sha1,
        }
    }

    pub fn has(&self, kind: HashKind) -> bool {
        match kind {
            HashKind::Crc32 => self.crc32.is_some(),
            HashKind::Md5 => self.md5.is_some(),
            HashKind::Sha1 => self.sha1.is_some(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.crc32.is_none() && self.md5.is_none() && self.sha1.is_none()
    }

    pub fn crc32_hex(&self) -> Option<String> {
        self.crc32.map(|c| format!("{c:08x}"))
    }

    pub fn md5_hex(&self) -> Option<String> {
        self.md5.map(hex::encode)
    }

    pub fn sha1_hex(&self) -> Option<String> {
        self.sha1.map(hex::encode)
    }

    /// Set a single digest from a hex string, deducing the kind from
    /// its length.
    pub fn set_from_hex(&mut self, hex_str: &str) -> Result<HashKind, HashesError> {
        let kind = HashKind::from_hex_len(hex_str.len())
            .ok_or(HashesError::InvalidHexLength(hex_str.len()))?;
        let bytes = hex::decode(hex_str)
            .map_err(|_| HashesError::InvalidHex(hex_str.to_string()))?;
        match kind {
            HashKind::Crc32 => {
                let mut arr = [0u8; 4];
                arr.copy_from_slice(&bytes);
                self.crc32 = Some(u32::from_be_bytes(arr));
            }
            HashKind::Md5 => {
                let mut arr = [0u8; SIZE_MD5];
                arr.copy_from_slice(&bytes);
                self.md5 = Some(arr);
            }
            HashKind::Sha1 => {
                let mut arr = [0u8; SIZE_SHA1];
                arr.copy_from_slice(&bytes);
                self.sha1 = Some(arr);
            }
        }
        Ok(kind)
    }
}

/// All three digests of the zero-length byte stream, computed once.
pub fn empty_file_hashes() -> &'static Hashes {
    static EMPTY: OnceLock<Hashes> = OnceLock::new();
    EMPTY.get_or_init(|| compute(&[]))
}

/// Compute every supported digest over `data` plus its size.
pub fn compute(data: &[u8]) -> Hashes {
    use md5::{Digest as Md5Digest, Md5};
    use sha1::{Digest as Sha1Digest, Sha1};

    let mut crc = crc32fast::Hasher::new();
    crc.update(data);

    let mut md5 = Md5::new();
    md5.update(data);

    let mut sha1 = Sha1::new();
    sha1.update(data);

    Hashes {
        size: Some(data.len() as u64),
        crc32: Some(crc.finalize()),
        md5: Some(md5.finalize().into()),
        sha1: Some(sha1.finalize().into()),
    }
}

/// Minimal hex helpers so the crate doesn't need a `hex` dependency
/// for this narrow use (encode/decode of fixed-width digests only).
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut s = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, ()> {
        if s.len() % 2 != 0 {
            return Err(());
        }
        let mut out = Vec::with_capacity(s.len() / 2);
        let bytes = s.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let hi = (bytes[i] as char).to_digit(16).ok_or(())?;
            let lo = (bytes[i + 1] as char).to_digit(16).ok_or(())?;
            out.push(((hi << 4) | lo) as u8);
            i += 2;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hashes_match_known_values() {
        let empty = empty_file_hashes();
        assert_eq!(empty.crc32_hex().unwrap(), "00000000");
        assert_eq!(empty.md5_hex().unwrap(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            empty.sha1_hex().unwrap(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[test]
    fn compare_uses_only_common_digest_types() {
        let mut a = Hashes::with_size(4);
        a.crc32 = Some(0x1234_5678);
        let mut b = Hashes::with_size(4);
        b.md5 = Some([0u8; 16]);
        assert_eq!(a.compare(&b), Compare::NoCommonHash);

        b.crc32 = Some(0x1234_5678);
        assert_eq!(a.compare(&b), Compare::Match);

        b.crc32 = Some(0xdead_beef);
        assert_eq!(a.compare(&b), Compare::Mismatch);
    }

    #[test]
    fn compare_with_size_requires_known_equal_sizes() {
        let mut a = Hashes::with_size(4);
        a.crc32 = Some(1);
        let mut b = Hashes::with_size(4);
        b.crc32 = Some(1);
        assert!(a.compare_with_size(&b));

        b.size = Some(5);
        assert!(!a.compare_with_size(&b));

        b.size = None;
        assert!(!a.compare_with_size(&b));
    }

    #[test]
    fn merge_adopts_missing_fields_only() {
        let mut a = Hashes {
            size: Some(4),
            crc32: Some(1),
            md5: None,
            sha1: None,
        };
        let b = Hashes {
            size: Some(99),
            crc32: Some(2),
            md5: Some([9u8; 16]),
            sha1: Some([8u8; 20]),
        };
        a.merge(&b);
        assert_eq!(a.size, Some(4), "size already present, not overwritten");
        assert_eq!(a.crc32, Some(1), "crc32 already present, not overwritten");
        assert_eq!(a.md5, Some([9u8; 16]));
        assert_eq!(a.sha1, Some([8u8; 20]));
    }

    #[test]
    fn from_hex_deduces_kind_from_length() {
        let mut h = Hashes::new();
        let kind = h.set_from_hex("12345678").unwrap();
        assert_eq!(kind, HashKind::Crc32);
        assert_eq!(h.crc32, Some(0x1234_5678));

        assert_eq!(
            HashesError::InvalidHexLength(7),
            h.set_from_hex("1234567").unwrap_err()
        );
    }

    #[test]
    fn compute_matches_known_vectors() {
        let h = compute(b"hello");
        assert_eq!(h.size, Some(5));
        assert_eq!(h.crc32_hex().unwrap(), "3610a686");
    }
}
