//! In-archive mutation planner, per spec §4.I.
//!
//! Grounded on `Archive.cc`'s `file_copy`/`file_copy_part`/
//! `file_rename*` methods (original_source) and the teacher's
//! filesystem-rename step in `handle_rom_matches`, generalized into a
//! per-quality action list over the tagged-variant `Archive`.

use crate::archive::{ArchiveId, FileType};
use crate::catalog::{Disk, Rom};
use crate::deletelist::DeleteList;
use crate::error::ArchiveError;
use crate::finder::ArchiveSource;
use crate::hashes::Hashes;
use crate::matcher::{GameArchives, Quality, RomMatch};

#[derive(Clone, Debug, Default)]
pub struct PlannerOptions {
    pub keep_duplicates: bool,
    /// Whether a `Copied` match sourced from an extra root may delete
    /// its source after copying. Mirrors the original's
    /// `--move-from-extra` switch; romset-internal sources are always
    /// subject to `keep_duplicates` instead, regardless of this flag.
    pub move_from_extra: bool,
}

/// Plan and apply repairs for one required rom, given its match.
/// `needed_dir`/`unknown_dir` name the stash/garbage roots a caller
/// should pre-create archives under before calling this (spec §4.I,
/// §6 Filesystem Layout).
pub fn apply_rom_plan<S: ArchiveSource>(
    source: &mut S,
    rom: &Rom,
    rom_match: &RomMatch,
    archives: &GameArchives<'_>,
    delete_list: &mut DeleteList,
    options: &PlannerOptions,
) -> Result<(), ArchiveError> {
    apply_plan(source, &rom.name, rom.hashes.size, rom_match, archives, delete_list, options)
}

/// Plan and apply repairs for one required disk. Disks never get the
/// `Missing` + size-0 `add_empty` treatment roms do (a zero-byte CHD
/// isn't meaningful), and their content comes from the CHD header
/// leaf service rather than raw-byte hashing, but the rename/copy/
/// displace machinery is otherwise identical (spec §4.I).
pub fn apply_disk_plan<S: ArchiveSource>(
    source: &mut S,
    disk: &Disk,
    disk_match: &RomMatch,
    archives: &GameArchives<'_>,
    delete_list: &mut DeleteList,
    options: &PlannerOptions,
) -> Result<(), ArchiveError> {
    apply_plan(source, &disk.name, None, disk_match, archives, delete_list, options)
}

fn apply_plan<S: ArchiveSource>(
    source: &mut S,
    name: &str,
    required_size: Option<u64>,
    rom_match: &RomMatch,
    archives: &GameArchives<'_>,
    delete_list: &mut DeleteList,
    options: &PlannerOptions,
) -> Result<(), ArchiveError> {
    match rom_match.quality {
        Quality::Ok => Ok(()),

        Quality::Missing => {
            if required_size == Some(0) {
                let archive = source.archive_mut(archives.own)?;
                archive.add_empty(name.to_string());
            }
            Ok(())
        }

        Quality::NameError => {
            let index = rom_match.source_index.expect("NameError match carries a source index");
            let archive = source.archive_mut(archives.own)?;
            if has_name_collision(archive.files().iter().map(|m| m.name.as_str()), name, index) {
                let colliding = find_index_by_name(archive, name);
                if let Some(colliding) = colliding {
                    archive.rename_to_unique(colliding)?;
                }
            }
            archive.rename(index, name.to_string())?;
            Ok(())
        }

        Quality::Long => {
            let source_archive_id = rom_match
                .source_archive
                .clone()
                .expect("Long match carries a source archive");
            let src_index = rom_match.source_index.expect("Long match carries a source index");
            let offset = rom_match.offset.expect("Long match carries an offset");
            let length = required_size.unwrap_or(0);

            let bytes_and_hashes = {
                let src = source.archive_mut(&source_archive_id)?;
                read_range(src, src_index, offset, length)?
            };

            if &source_archive_id == archives.own {
                let own = source.archive_mut(archives.own)?;
                own.delete(src_index)?;
            }

            let own = source.archive_mut(archives.own)?;
            own.add_bytes(name.to_string(), bytes_and_hashes);
            Ok(())
        }

        Quality::Copied => {
            let src_archive_id = rom_match
                .source_archive
                .clone()
                .expect("Copied match carries a source archive");
            let src_index = rom_match.source_index.expect("Copied match carries a source index");

            if &src_archive_id == archives.own {
                // Can't meaningfully copy within the same in-progress
                // archive; nothing to do beyond what NameError already
                // covers.
                return Ok(());
            }

            {
                let own = source.archive_mut(archives.own)?;
                if let Some(colliding) = find_index_by_name(own, name) {
                    own.rename_to_unique(colliding)?;
                }
            }

            let data = {
                let src = source.archive_mut(&src_archive_id)?;
                read_whole(src, src_index)?
            };
            let own = source.archive_mut(archives.own)?;
            own.add_bytes(name.to_string(), data);

            let from_extra = rom_match.location == Some(crate::index::Location::Extra);
            if !from_extra || options.move_from_extra {
                delete_list.queue_delete(src_archive_id, src_index);
            }
            Ok(())
        }

        Quality::InZip => {
            // Deferred: stashing to needed/ is handled by the caller
            // that owns the needed-archive registry (spec.md §4.I),
            // since it requires a digest-keyed unique name allocator
            // shared across the whole run.
            Ok(())
        }

        Quality::OkAndOld => {
            if !options.keep_duplicates {
                if let (Some(archive_id), Some(index)) =
                    (rom_match.source_archive.clone(), rom_match.source_index)
                {
                    delete_list.queue_delete(archive_id, index);
                }
            }
            Ok(())
        }

        Quality::Old | Quality::NoHash | Quality::Unchecked => Ok(()),
    }
}

fn has_name_collision<'a>(names: impl Iterator<Item = &'a str>, wanted: &str, exclude_index: usize) -> bool {
    names
        .enumerate()
        .any(|(i, n)| i != exclude_index && n == wanted)
}

fn find_index_by_name(archive: &crate::archive::Archive, name: &str) -> Option<usize> {
    archive
        .files()
        .iter()
        .enumerate()
        .find(|(_, m)| m.alive && m.name == name)
        .map(|(i, _)| i)
}

fn read_whole(archive: &crate::archive::Archive, index: usize) -> Result<Vec<u8>, ArchiveError> {
    use std::io::Read;
    let mut reader = archive.file_open(index, None)?;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).map_err(ArchiveError::from)?;
    Ok(buf)
}

fn read_range(
    archive: &crate::archive::Archive,
    index: usize,
    offset: u64,
    length: u64,
) -> Result<Vec<u8>, ArchiveError> {
    use std::io::Read;
    let mut reader = archive.file_open(index, Some((offset, length)))?;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).map_err(ArchiveError::from)?;
    Ok(buf)
}

/// Queue a deferred stash of an `InZip`-quality match into a
/// digest-named archive under `needed/`. Called by the engine once per
/// run, after all games' primary passes, with a shared unique-name
/// allocator (spec §4.I "needed-stash naming").
pub fn needed_stash_name(hashes: &Hashes, filetype: FileType, sequence: u32) -> String {
    let digest = hashes
        .sha1_hex()
        .or_else(|| hashes.md5_hex())
        .or_else(|| hashes.crc32_hex())
        .unwrap_or_else(|| "unknown".to_string());
    let ext = match filetype {
        FileType::Rom => "zip",
        FileType::Disk => "chd",
    };
    format!("{digest}-{sequence:03}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needed_stash_name_prefers_sha1_then_md5_then_crc() {
        let hashes = Hashes {
            size: Some(4),
            crc32: Some(1),
            md5: None,
            sha1: Some([0xAB; 20]),
        };
        let name = needed_stash_name(&hashes, FileType::Rom, 3);
        assert!(name.starts_with("abababab"));
        assert!(name.ends_with("-003.zip"));
    }

    #[test]
    fn has_name_collision_ignores_the_excluded_index() {
        let names = vec!["a.rom", "b.rom"];
        assert!(!has_name_collision(names.iter().copied(), "a.rom", 0));
        assert!(has_name_collision(names.iter().copied(), "a.rom", 1));
    }
}
