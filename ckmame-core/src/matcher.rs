//! Per-file quality ladder and per-game status derivation, per spec §4.H.
//!
//! Grounded on the teacher's exact/partial match priority in
//! `check_rom_matches`/`handle_rom_matches` (`file_commands.rs`),
//! generalized to the full ladder `Match.h` (original_source) defines.

use crate::archive::{ArchiveId, FileType};
use crate::catalog::{Game, RomStatus, Where};
use crate::detector::{self, Detector};
use crate::error::ArchiveError;
use crate::finder::{ArchiveSource, Finder};
use crate::hashes::{Compare, HashKind, Hashes};
use crate::index::Location;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Quality {
    Missing,
    Ok,
    NameError,
    Long,
    Copied,
    InZip,
    Old,
    OkAndOld,
    NoHash,
    Unchecked,
}

#[derive(Clone, Debug)]
pub struct RomMatch {
    pub quality: Quality,
    pub source_archive: Option<ArchiveId>,
    pub source_index: Option<usize>,
    /// For `Long`: the offset within the source member the required
    /// range starts at.
    pub offset: Option<u64>,
    pub location: Option<Location>,
}

impl RomMatch {
    fn missing() -> Self {
        RomMatch {
            quality: Quality::Missing,
            source_archive: None,
            source_index: None,
            offset: None,
            location: None,
        }
    }

    fn at(quality: Quality, archive: ArchiveId, index: usize, location: Location) -> Self {
        RomMatch {
            quality,
            source_archive: Some(archive),
            source_index: Some(index),
            offset: None,
            location: Some(location),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GameStatus {
    Correct,
    CorrectMia,
    Old,
    Fixable,
    Partial,
    Missing,
}

#[derive(Clone, Debug, Default)]
pub struct MatcherOptions {
    /// Mirrors the original's configuration toggle: when set, a
    /// `NoDump` required rom DOES count as missing for `GameStatus`
    /// purposes (spec.md §4.H leaves the default up to us; see
    /// DESIGN.md — default is `false`, NoDump is not missing).
    pub nodump_counts_as_missing: bool,
}

/// Bundle of already-open archives a single game's matching pass may
/// draw from: its own, its parent's, and its grandparent's. Roms and
/// disks are distinct `FileType`s and therefore distinct archives
/// (spec §6 "top-level CHDs" vs. per-game zips); `disk` mirrors `rom`
/// one-for-one but is optional since a game with no `<disk>` entries
/// never needs one opened.
pub struct GameArchives<'a> {
    pub own: &'a ArchiveId,
    pub parent: Option<&'a ArchiveId>,
    pub grandparent: Option<&'a ArchiveId>,
    pub own_disk: Option<&'a ArchiveId>,
    pub parent_disk: Option<&'a ArchiveId>,
    pub grandparent_disk: Option<&'a ArchiveId>,
}

pub struct MatchResult {
    pub rom_matches: Vec<RomMatch>,
    pub disk_matches: Vec<RomMatch>,
    pub status: GameStatus,
}

pub fn match_game<S: ArchiveSource>(
    source: &mut S,
    finder: &Finder<'_>,
    detectors: &[Detector],
    game: &Game,
    archives: &GameArchives<'_>,
    options: &MatcherOptions,
) -> Result<MatchResult, ArchiveError> {
    let rom_archives = GameArchives {
        own: archives.own,
        parent: archives.parent,
        grandparent: archives.grandparent,
        own_disk: None,
        parent_disk: None,
        grandparent_disk: None,
    };
    let mut rom_matches = Vec::with_capacity(game.roms.len());
    for rom in &game.roms {
        let m = match_one(
            source,
            finder,
            detectors,
            FileType::Rom,
            &rom.name,
            &rom.hashes,
            rom.merge_name.as_deref(),
            rom.where_,
            &rom_archives,
        )?;
        rom_matches.push(m);
    }

    let mut disk_matches = Vec::with_capacity(game.disks.len());
    if let Some(disk_own) = archives.own_disk {
        let disk_archives = GameArchives {
            own: disk_own,
            parent: archives.parent_disk,
            grandparent: archives.grandparent_disk,
            own_disk: None,
            parent_disk: None,
            grandparent_disk: None,
        };
        for disk in &game.disks {
            let hashes = Hashes {
                size: None,
                crc32: None,
                md5: disk.md5,
                sha1: disk.sha1,
            };
            let m = match_one(
                source,
                finder,
                detectors,
                FileType::Disk,
                &disk.name,
                &hashes,
                disk.merge_name.as_deref(),
                disk.where_,
                &disk_archives,
            )?;
            disk_matches.push(m);
        }
    } else {
        disk_matches.extend(game.disks.iter().map(|_| RomMatch::missing()));
    }

    let status = derive_status(game, &rom_matches, &disk_matches, options);

    Ok(MatchResult {
        rom_matches,
        disk_matches,
        status,
    })
}

/// Full per-required-file ladder (spec §4.H), wrapping the primary
/// name/hash/Finder search with the two cross-cutting old-catalog
/// outcomes: a file that's otherwise `Ok` but duplicated in the old
/// catalog's archives becomes `OkAndOld` (the duplicate is a deletion
/// candidate), and a file that's otherwise unreachable but findable
/// there is `Old` instead of truly `Missing` (spec §4.G `find_in_old`,
/// Scenario S5).
fn match_one<S: ArchiveSource>(
    source: &mut S,
    finder: &Finder<'_>,
    detectors: &[Detector],
    filetype: FileType,
    name: &str,
    wanted: &Hashes,
    merge_name: Option<&str>,
    where_: Where,
    archives: &GameArchives<'_>,
) -> Result<RomMatch, ArchiveError> {
    let base = match_one_primary(source, finder, detectors, filetype, name, wanted, merge_name, where_, archives)?;

    if base.quality == Quality::Ok {
        if let Some(hit) = finder.find_in_old(source, filetype, wanted)?.into_iter().next() {
            return Ok(RomMatch {
                quality: Quality::OkAndOld,
                source_archive: Some(hit.archive),
                source_index: Some(hit.member_index),
                offset: None,
                location: Some(hit.location),
            });
        }
        return Ok(base);
    }

    if base.quality == Quality::Missing {
        if let Some(hit) = finder.find_in_old(source, filetype, wanted)?.into_iter().next() {
            return Ok(RomMatch {
                quality: Quality::Old,
                source_archive: Some(hit.archive),
                source_index: Some(hit.member_index),
                offset: None,
                location: Some(hit.location),
            });
        }
    }

    Ok(base)
}

fn match_one_primary<S: ArchiveSource>(
    source: &mut S,
    finder: &Finder<'_>,
    detectors: &[Detector],
    filetype: FileType,
    name: &str,
    wanted: &Hashes,
    merge_name: Option<&str>,
    where_: Where,
    archives: &GameArchives<'_>,
) -> Result<RomMatch, ArchiveError> {
    // 1. name+size+digests in the expected (own) archive.
    if let Some(m) = find_by_name_in(source, archives.own, detectors, wanted, Some(name))? {
        return Ok(m);
    }

    // 2. merge_name+size+digests in the ancestor `where_` designates
    // (spec §3/§4.E "where: InGame|InParent|InGrandparent"), rather
    // than trying both unconditionally whenever a merge name is set.
    match (where_, merge_name) {
        (Where::Parent, Some(merge_name)) => {
            if let Some(parent) = archives.parent {
                if let Some(m) = find_by_name_in(source, parent, detectors, wanted, Some(merge_name))? {
                    return Ok(m);
                }
            }
        }
        (Where::Grandparent, Some(merge_name)) => {
            if let Some(grandparent) = archives.grandparent {
                if let Some(m) = find_by_name_in(source, grandparent, detectors, wanted, Some(merge_name))? {
                    return Ok(m);
                }
            }
        }
        _ => {}
    }

    // A disk present under its expected name but sharing no digest
    // kind with what the catalog records (e.g. a v1 CHD only carries
    // an MD5 but the DAT only lists a SHA-1) can't be judged match or
    // mismatch; report it as such instead of falling through to
    // `Missing` (spec §3 Match quality "disk with no common digest").
    if filetype == FileType::Disk {
        if let Some(index) = find_named_no_common_hash(source, archives.own, name, wanted)? {
            return Ok(RomMatch::at(Quality::NoHash, archives.own.clone(), index, Location::Romset));
        }
    }

    // 3. size+digests anywhere in the game's own archive (NameError).
    if let Some(m) = find_anywhere_in(source, archives.own, detectors, wanted)? {
        return Ok(m);
    }

    // 4. Long: sub-range scan within the own archive's oversized members.
    if let Some(m) = find_long(source, archives.own, wanted)? {
        return Ok(m);
    }

    // 5. Finder across the romset (Copied / InZip).
    let romset_hits = finder.find_in_romset(source, filetype, wanted)?;
    if let Some(hit) = romset_hits.into_iter().next() {
        let quality = if &hit.archive == archives.own {
            Quality::InZip
        } else {
            Quality::Copied
        };
        return Ok(RomMatch {
            quality,
            source_archive: Some(hit.archive),
            source_index: Some(hit.member_index),
            offset: None,
            location: Some(hit.location),
        });
    }

    // 6. Finder across needed/extra.
    let needed_hits = finder.find_in_needed_or_extra(source, filetype, wanted)?;
    if let Some(hit) = needed_hits.into_iter().next() {
        return Ok(RomMatch {
            quality: Quality::Copied,
            source_archive: Some(hit.archive),
            source_index: Some(hit.member_index),
            offset: None,
            location: Some(hit.location),
        });
    }

    Ok(RomMatch::missing())
}

/// Index of the member named `name` in `archive_id`, if its hashes
/// share no common digest kind with `wanted` (`Compare::NoCommonHash`).
fn find_named_no_common_hash<S: ArchiveSource>(
    source: &mut S,
    archive_id: &ArchiveId,
    name: &str,
    wanted: &Hashes,
) -> Result<Option<usize>, ArchiveError> {
    let index = {
        let archive = source.archive_mut(archive_id)?;
        archive.files().iter().position(|m| m.alive && m.name == name)
    };
    let Some(index) = index else { return Ok(None) };

    let archive = source.archive_mut(archive_id)?;
    for kind in [HashKind::Crc32, HashKind::Md5, HashKind::Sha1] {
        archive.ensure_member_hashes(index, 0, None, kind)?;
    }
    let member = &archive.files()[index];
    if member.hashes.compare(wanted) == Compare::NoCommonHash {
        Ok(Some(index))
    } else {
        Ok(None)
    }
}

fn find_by_name_in<S: ArchiveSource>(
    source: &mut S,
    archive_id: &ArchiveId,
    detectors: &[Detector],
    wanted: &Hashes,
    want_name: Option<&str>,
) -> Result<Option<RomMatch>, ArchiveError> {
    let indices: Vec<(usize, String)> = {
        let archive = source.archive_mut(archive_id)?;
        archive
            .files()
            .iter()
            .enumerate()
            .filter(|(_, m)| m.alive)
            .filter(|(_, m)| match want_name {
                Some(name) => m.name == name,
                None => true,
            })
            .map(|(i, m)| (i, m.name.clone()))
            .collect()
    };
    for (index, _) in indices {
        let archive = source.archive_mut(archive_id)?;
        for kind in [HashKind::Crc32, HashKind::Md5, HashKind::Sha1] {
            archive.ensure_member_hashes(index, 0, None, kind)?;
        }
        if archive.files()[index].hashes.compare_with_size(wanted) {
            return Ok(Some(RomMatch::at(Quality::Ok, archive_id.clone(), index, Location::Romset)));
        }
        for (pos, detector) in detectors.iter().enumerate() {
            let detector_id = detector::detector_id_for(pos);
            for kind in [HashKind::Crc32, HashKind::Md5, HashKind::Sha1] {
                archive.ensure_member_hashes(index, detector_id, Some(detector), kind)?;
            }
            let matches = archive.files()[index]
                .detector_hashes
                .get(&detector_id)
                .is_some_and(|h| h.compare_with_size(wanted));
            if matches {
                return Ok(Some(RomMatch::at(Quality::Ok, archive_id.clone(), index, Location::Romset)));
            }
        }
    }
    Ok(None)
}

fn find_anywhere_in<S: ArchiveSource>(
    source: &mut S,
    archive_id: &ArchiveId,
    detectors: &[Detector],
    wanted: &Hashes,
) -> Result<Option<RomMatch>, ArchiveError> {
    let len = source.archive_mut(archive_id)?.files().len();
    for index in 0..len {
        let archive = source.archive_mut(archive_id)?;
        if !archive.files()[index].alive {
            continue;
        }
        for kind in [HashKind::Crc32, HashKind::Md5, HashKind::Sha1] {
            archive.ensure_member_hashes(index, 0, None, kind)?;
        }
        let member = &archive.files()[index];
        if member.hashes.compare(wanted) == Compare::Match && member.hashes.size == wanted.size {
            return Ok(Some(RomMatch::at(Quality::NameError, archive_id.clone(), index, Location::Romset)));
        }

        for (pos, detector) in detectors.iter().enumerate() {
            let detector_id = detector::detector_id_for(pos);
            for kind in [HashKind::Crc32, HashKind::Md5, HashKind::Sha1] {
                archive.ensure_member_hashes(index, detector_id, Some(detector), kind)?;
            }
            let matches = archive.files()[index]
                .detector_hashes
                .get(&detector_id)
                .is_some_and(|h| h.compare(wanted) == Compare::Match && h.size == wanted.size);
            if matches {
                return Ok(Some(RomMatch::at(Quality::NameError, archive_id.clone(), index, Location::Romset)));
            }
        }
    }
    Ok(None)
}

fn find_long<S: ArchiveSource>(
    source: &mut S,
    archive_id: &ArchiveId,
    wanted: &Hashes,
) -> Result<Option<RomMatch>, ArchiveError> {
    let length = match wanted.size {
        Some(len) if len > 0 => len,
        _ => return Ok(None),
    };
    let archive = source.archive_mut(archive_id)?;
    for index in 0..archive.files().len() {
        let member_size = archive.files()[index].hashes.size.unwrap_or(0);
        if !archive.files()[index].alive || member_size <= length {
            continue;
        }
        if let Some(offset) = archive.find_offset(index, length, wanted)? {
            return Ok(Some(RomMatch {
                quality: Quality::Long,
                source_archive: Some(archive_id.clone()),
                source_index: Some(index),
                offset: Some(offset),
                location: Some(Location::Romset),
            }));
        }
    }
    Ok(None)
}

fn derive_status(
    game: &Game,
    rom_matches: &[RomMatch],
    disk_matches: &[RomMatch],
    options: &MatcherOptions,
) -> GameStatus {
    let required: Vec<(&Quality, RomStatus, bool)> = game
        .roms
        .iter()
        .zip(rom_matches)
        .map(|(rom, m)| (&m.quality, rom.status, rom.mia))
        .chain(
            game.disks
                .iter()
                .zip(disk_matches)
                .map(|(disk, m)| (&m.quality, disk.status, false)),
        )
        .collect();

    if required.is_empty() {
        return GameStatus::Correct;
    }

    let is_missing_ok = |quality: &Quality, status: RomStatus| -> bool {
        if status == RomStatus::NoDump && !options.nodump_counts_as_missing {
            return true;
        }
        *quality == Quality::Ok
    };

    let all_ok = required.iter().all(|(q, s, _)| is_missing_ok(q, *s));
    if all_ok {
        let any_mia = required.iter().any(|(_, _, mia)| *mia);
        return if any_mia {
            GameStatus::CorrectMia
        } else {
            GameStatus::Correct
        };
    }

    let all_old_or_ok = required
        .iter()
        .all(|(q, _, _)| matches!(q, Quality::Old | Quality::OkAndOld) || **q == Quality::Ok);
    if all_old_or_ok && required.iter().any(|(q, _, _)| matches!(q, Quality::Old | Quality::OkAndOld)) {
        return GameStatus::Old;
    }

    // Every required file has content available somewhere (a repair
    // action would make the game Correct), even if not yet in place.
    let none_truly_missing = required
        .iter()
        .all(|(q, s, _)| is_missing_ok(q, *s) || **q != Quality::Missing);
    if none_truly_missing {
        return GameStatus::Fixable;
    }

    let any_ok = required.iter().any(|(q, s, _)| is_missing_ok(q, *s));
    if any_ok {
        GameStatus::Partial
    } else {
        GameStatus::Missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Rom;

    fn rom(status: RomStatus, mia: bool) -> Rom {
        Rom {
            name: "a.rom".to_string(),
            hashes: Hashes::with_size(1),
            status,
            mia,
            merge_name: None,
            where_: Where::Game,
        }
    }

    fn game_with(roms: Vec<Rom>) -> Game {
        Game {
            name: "g".to_string(),
            description: String::new(),
            category: None,
            parent_name: None,
            grandparent_name: None,
            roms,
            disks: Vec::new(),
        }
    }

    fn ok_match() -> RomMatch {
        RomMatch::at(
            Quality::Ok,
            ArchiveId::new(crate::archive::ArchiveKind::Zip, "g.zip", FileType::Rom),
            0,
            Location::Romset,
        )
    }

    fn old_match() -> RomMatch {
        RomMatch::at(
            Quality::Old,
            ArchiveId::new(crate::archive::ArchiveKind::Zip, "old.zip", FileType::Rom),
            0,
            Location::Old,
        )
    }

    #[test]
    fn all_old_is_old_status() {
        let game = game_with(vec![rom(RomStatus::Ok, false)]);
        let status = derive_status(&game, &[old_match()], &[], &MatcherOptions::default());
        assert_eq!(status, GameStatus::Old);
    }

    #[test]
    fn all_ok_with_no_mia_is_correct() {
        let game = game_with(vec![rom(RomStatus::Ok, false)]);
        let status = derive_status(&game, &[ok_match()], &[], &MatcherOptions::default());
        assert_eq!(status, GameStatus::Correct);
    }

    #[test]
    fn all_ok_with_mia_is_correct_mia() {
        let game = game_with(vec![rom(RomStatus::Ok, true)]);
        let status = derive_status(&game, &[ok_match()], &[], &MatcherOptions::default());
        assert_eq!(status, GameStatus::CorrectMia);
    }

    #[test]
    fn nodump_does_not_count_as_missing_by_default() {
        let game = game_with(vec![rom(RomStatus::NoDump, false)]);
        let status = derive_status(&game, &[RomMatch::missing()], &[], &MatcherOptions::default());
        assert_eq!(status, GameStatus::Correct);
    }

    #[test]
    fn nodump_counts_as_missing_when_configured() {
        let game = game_with(vec![rom(RomStatus::NoDump, false)]);
        let options = MatcherOptions {
            nodump_counts_as_missing: true,
        };
        let status = derive_status(&game, &[RomMatch::missing()], &[], &options);
        assert_eq!(status, GameStatus::Missing);
    }

    #[test]
    fn mixed_ok_and_missing_is_partial() {
        let game = game_with(vec![rom(RomStatus::Ok, false), rom(RomStatus::Ok, false)]);
        let status = derive_status(
            &game,
            &[ok_match(), RomMatch::missing()],
            &[],
            &MatcherOptions::default(),
        );
        assert_eq!(status, GameStatus::Partial);
    }

    struct FakeSource {
        archives: std::collections::HashMap<ArchiveId, crate::archive::Archive>,
    }

    impl ArchiveSource for FakeSource {
        fn archive_mut(&mut self, id: &ArchiveId) -> Result<&mut crate::archive::Archive, ArchiveError> {
            self.archives.get_mut(id).ok_or(ArchiveError::NoSuchMember(0))
        }
    }

    fn zip_with(dir: &std::path::Path, name: &str, entry: &str, content: &[u8]) -> ArchiveId {
        let path = dir.join(name);
        {
            let file = std::fs::File::create(&path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();
            writer.start_file(entry, options).unwrap();
            use std::io::Write;
            writer.write_all(content).unwrap();
            writer.finish().unwrap();
        }
        ArchiveId::new(crate::archive::ArchiveKind::Zip, &path, FileType::Rom)
    }

    #[test]
    fn missing_rom_found_in_old_catalog_is_quality_old() {
        let dir = tempfile::tempdir().unwrap();
        let own_path = dir.path().join("g.zip");
        std::fs::File::create(&own_path).unwrap();
        let own_id = ArchiveId::new(crate::archive::ArchiveKind::Zip, &own_path, FileType::Rom);
        let own = crate::archive::Archive::open(own_id.clone(), crate::archive::ArchiveFlags::default()).unwrap();

        let old_id = zip_with(dir.path(), "old.zip", "a.rom", b"hello");

        let mut index = crate::index::MemoryIndex::new();
        let wanted = crate::hashes::compute(b"hello");
        index.insert(&old_id, 0, 0, &wanted, Location::Old);

        let mut source = FakeSource {
            archives: std::collections::HashMap::from([(own_id.clone(), own)]),
        };
        let detectors: Vec<Detector> = Vec::new();
        let finder = Finder::new(&index, &detectors);

        let archives = GameArchives {
            own: &own_id,
            parent: None,
            grandparent: None,
            own_disk: None,
            parent_disk: None,
            grandparent_disk: None,
        };

        let m = match_one(
            &mut source,
            &finder,
            &detectors,
            FileType::Rom,
            "a.rom",
            &wanted,
            None,
            Where::Game,
            &archives,
        )
        .unwrap();

        assert_eq!(m.quality, Quality::Old);
        assert_eq!(m.source_archive, Some(old_id));
    }

    /// A minimal valid v5 CHD header carrying only a SHA-1 (v5 never
    /// stores an MD5), matching `chd::tests::v5_header`'s layout.
    fn v5_chd_header(logical_size: u64, sha1: [u8; 20]) -> Vec<u8> {
        let mut buf = vec![0u8; 124];
        buf[0..8].copy_from_slice(b"MComprHD");
        buf[8..12].copy_from_slice(&124u32.to_be_bytes());
        buf[12..16].copy_from_slice(&5u32.to_be_bytes());
        buf[32..40].copy_from_slice(&logical_size.to_be_bytes());
        buf[84..104].copy_from_slice(&sha1);
        buf
    }

    #[test]
    fn renamed_file_is_name_error_not_ok() {
        // Scenario S2: required `a.rom` is present under a different
        // name but with matching content. Step 1 must only match by
        // name, so this falls through to step 3's `find_anywhere_in`
        // and comes back `NameError`, not `Ok`.
        let dir = tempfile::tempdir().unwrap();
        let own_id = zip_with(dir.path(), "g.zip", "a-renamed.rom", b"hello");
        let own = crate::archive::Archive::open(own_id.clone(), crate::archive::ArchiveFlags::default()).unwrap();

        let mut source = FakeSource {
            archives: std::collections::HashMap::from([(own_id.clone(), own)]),
        };
        let index = crate::index::MemoryIndex::new();
        let detectors: Vec<Detector> = Vec::new();
        let finder = Finder::new(&index, &detectors);
        let wanted = crate::hashes::compute(b"hello");

        let archives = GameArchives {
            own: &own_id,
            parent: None,
            grandparent: None,
            own_disk: None,
            parent_disk: None,
            grandparent_disk: None,
        };

        let m = match_one(
            &mut source,
            &finder,
            &detectors,
            FileType::Rom,
            "a.rom",
            &wanted,
            None,
            Where::Game,
            &archives,
        )
        .unwrap();

        assert_eq!(m.quality, Quality::NameError);
        assert_eq!(m.source_index, Some(0));
    }

    #[test]
    fn disk_with_no_common_digest_is_quality_no_hash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("g.chd"), v5_chd_header(2048, [0x11; 20])).unwrap();

        let own_id = ArchiveId::new(crate::archive::ArchiveKind::DiskDir, dir.path(), FileType::Disk);
        let own = crate::archive::Archive::open(own_id.clone(), crate::archive::ArchiveFlags::default()).unwrap();

        let mut source = FakeSource {
            archives: std::collections::HashMap::from([(own_id.clone(), own)]),
        };
        let index = crate::index::MemoryIndex::new();
        let detectors: Vec<Detector> = Vec::new();
        let finder = Finder::new(&index, &detectors);

        // The DAT only recorded this disk's MD5 (say, from an updated
        // listing); the CHD on disk is a v5 file, which only ever
        // carries a SHA-1. Neither side has a kind the other does.
        let wanted = Hashes {
            size: None,
            crc32: None,
            md5: Some([0xEE; 16]),
            sha1: None,
        };

        let archives = GameArchives {
            own: &own_id,
            parent: None,
            grandparent: None,
            own_disk: None,
            parent_disk: None,
            grandparent_disk: None,
        };

        let m = match_one(
            &mut source,
            &finder,
            &detectors,
            FileType::Disk,
            "g.chd",
            &wanted,
            None,
            Where::Game,
            &archives,
        )
        .unwrap();

        assert_eq!(m.quality, Quality::NoHash);
    }
}
