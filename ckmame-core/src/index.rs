//! Cross-archive content index, per spec §4.D.
//!
//! Grounded on the teacher's `Cache::{roms_by_hash, build_hash_index}`
//! generalized from a single configured digest type to every digest a
//! member carries.

use std::collections::HashMap;

use crate::archive::{ArchiveId, FileType};
use crate::hashes::{HashKind, Hashes};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    Romset,
    Extra,
    Needed,
    Superfluous,
    /// An archive named after a game in an old/retired catalog (spec
    /// §4.G `find_in_old`): content here is known-good but superseded,
    /// not a repair source for the current catalog's required files.
    Old,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FindResult {
    pub archive: ArchiveId,
    pub member_index: usize,
    pub detector_id: u16,
    pub location: Location,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Key {
    filetype: FileType,
    kind: HashKind,
    digest: Vec<u8>,
}

/// Content index over every archive the engine has opened, keyed by
/// `(filetype, digest kind, digest bytes)` so a single member with
/// CRC+MD5+SHA1 present yields three lookup keys (spec §4.D).
#[derive(Default)]
pub struct MemoryIndex {
    entries: HashMap<Key, Vec<FindResult>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every present digest of one member under `detector_id`
    /// (0 = raw hashes). Call this in the same step that adds/updates
    /// the member on its owning `Archive` (Testable Property 2).
    pub fn insert(
        &mut self,
        archive: &ArchiveId,
        member_index: usize,
        detector_id: u16,
        hashes: &Hashes,
        location: Location,
    ) {
        for (kind, digest) in digests_of(hashes) {
            let key = Key {
                filetype: archive.filetype,
                kind,
                digest,
            };
            self.entries.entry(key).or_default().push(FindResult {
                archive: archive.clone(),
                member_index,
                detector_id,
                location,
            });
        }
    }

    pub fn remove_archive(&mut self, archive: &ArchiveId) {
        for results in self.entries.values_mut() {
            results.retain(|r| &r.archive != archive);
        }
    }

    /// Candidates agreeing with `hashes` on at least one digest kind
    /// both sides carry. A candidate only needs to appear in one
    /// queried kind's bucket to surface here — requiring it to appear
    /// in every kind's bucket would drop any candidate missing a kind
    /// the query carries (e.g. a CHD whose header yields only SHA-1
    /// against a catalog entry listing MD5+SHA-1), a false negative by
    /// absence the spec §4.A/§4.D contract forbids. The caller still
    /// must re-verify strictly (`Finder::verify_candidates`): union
    /// membership alone doesn't guarantee every common kind matched,
    /// and detector collisions across detectors are possible.
    pub fn find(&self, filetype: FileType, hashes: &Hashes) -> Vec<FindResult> {
        let wanted = digests_of(hashes);
        if wanted.is_empty() {
            return Vec::new();
        }

        let mut seen = std::collections::HashSet::new();
        let mut results = Vec::new();
        for (kind, digest) in &wanted {
            let key = Key {
                filetype,
                kind: *kind,
                digest: digest.clone(),
            };
            for hit in self.entries.get(&key).into_iter().flatten() {
                if seen.insert(hit.clone()) {
                    results.push(hit.clone());
                }
            }
        }
        results
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn digests_of(hashes: &Hashes) -> Vec<(HashKind, Vec<u8>)> {
    let mut out = Vec::with_capacity(3);
    if let Some(c) = hashes.crc32 {
        out.push((HashKind::Crc32, c.to_be_bytes().to_vec()));
    }
    if let Some(m) = hashes.md5 {
        out.push((HashKind::Md5, m.to_vec()));
    }
    if let Some(s) = hashes.sha1 {
        out.push((HashKind::Sha1, s.to_vec()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveKind;
    use std::path::PathBuf;

    fn archive_id(name: &str) -> ArchiveId {
        ArchiveId::new(ArchiveKind::Zip, PathBuf::from(name), FileType::Rom)
    }

    #[test]
    fn find_matches_on_any_shared_digest_kind() {
        let mut index = MemoryIndex::new();
        let id = archive_id("g.zip");
        let hashes = Hashes {
            size: Some(4),
            crc32: Some(1),
            md5: Some([2u8; 16]),
            sha1: None,
        };
        index.insert(&id, 0, 0, &hashes, Location::Romset);

        let query = Hashes {
            size: Some(4),
            crc32: Some(1),
            md5: Some([2u8; 16]),
            sha1: None,
        };
        let hits = index.find(FileType::Rom, &query);
        assert_eq!(hits.len(), 1);

        // No digest kind in common at all: no candidate surfaces.
        let disjoint = Hashes {
            size: Some(4),
            crc32: None,
            md5: None,
            sha1: Some([9u8; 20]),
        };
        assert!(index.find(FileType::Rom, &disjoint).is_empty());
    }

    #[test]
    fn find_does_not_drop_a_candidate_missing_a_queried_digest_kind() {
        // A CHD whose header only yields a SHA-1 must still surface
        // against a catalog entry that also lists an MD5 the candidate
        // never carries (spec §4.A/§4.D: never false-negative by
        // absence). Union-over-kinds finds it via the shared SHA-1
        // bucket even though it's entirely absent from the MD5 bucket.
        let mut index = MemoryIndex::new();
        let id = archive_id("disk.chd");
        let candidate = Hashes {
            size: None,
            crc32: None,
            md5: None,
            sha1: Some([3u8; 20]),
        };
        index.insert(&id, 0, 0, &candidate, Location::Romset);

        let query = Hashes {
            size: None,
            crc32: None,
            md5: Some([5u8; 16]),
            sha1: Some([3u8; 20]),
        };
        let hits = index.find(FileType::Rom, &query);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn remove_archive_drops_its_entries() {
        let mut index = MemoryIndex::new();
        let id = archive_id("g.zip");
        let hashes = Hashes {
            size: Some(1),
            crc32: Some(7),
            md5: None,
            sha1: None,
        };
        index.insert(&id, 0, 0, &hashes, Location::Romset);
        assert_eq!(index.find(FileType::Rom, &hashes).len(), 1);

        index.remove_archive(&id);
        assert!(index.find(FileType::Rom, &hashes).is_empty());
    }
}
