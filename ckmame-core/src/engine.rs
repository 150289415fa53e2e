//! Top-level orchestration: scan, match, repair, recheck, sweep.
//!
//! Grounded on the teacher's top-level command handlers
//! (`file_commands.rs`'s `check`/`repair` entry points drive the same
//! scan-then-per-game loop) for the overall run shape, and on
//! `ckmame.cc`'s main loop (original_source) for the match → plan →
//! recheck → sweep ordering and the "stashes only flow downward, two
//! passes suffice" recheck discipline documented on `RecheckSet`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::archive::{Archive, ArchiveFlags, ArchiveId, ArchiveKind, FileType};
use crate::cache::{ArchiveCache, CachedFile, DetectorKey};
use crate::catalog::{Catalog, Game};
use crate::config::EngineConfig;
use crate::deletelist::DeleteList;
use crate::detector::{self, Detector};
use crate::error::{ArchiveError, EngineError};
use crate::finder::{ArchiveSource, Finder};
use crate::hashes::{self, HashKind};
use crate::index::{Location, MemoryIndex};
use crate::matcher::{self, GameArchives, GameStatus, MatcherOptions, Quality};
use crate::planner::{self, PlannerOptions};
use crate::tree::{RecheckSet, Tree};

/// Identity map + LRU-bounded set of open archive backend handles, per
/// spec §9's "re-architecture note": callers borrow by `ArchiveId`
/// instead of holding an `Rc`/`Weak` cycle back to an owning registry.
/// Eviction commits whatever is pending on the least-recently-used
/// entry before dropping it, so a full `EngineConfig::max_open_archives`
/// budget never silently loses a write.
pub struct ArchiveRegistry {
    archives: HashMap<ArchiveId, Archive>,
    order: VecDeque<ArchiveId>,
    max_open: usize,
}

impl ArchiveRegistry {
    pub fn new(max_open: usize) -> Self {
        ArchiveRegistry {
            archives: HashMap::new(),
            order: VecDeque::new(),
            max_open: max_open.max(1),
        }
    }

    /// Make sure `id` is resident, opening (and possibly creating) it
    /// per `flags` if it isn't. A no-op, besides bumping recency, if
    /// already open.
    pub fn ensure_open(&mut self, id: &ArchiveId, flags: ArchiveFlags) -> Result<(), ArchiveError> {
        if self.archives.contains_key(id) {
            self.touch(id);
            return Ok(());
        }
        self.evict_to_fit()?;
        trace!("opening archive {:?}", id.path);
        let archive = Archive::open(id.clone(), flags)?;
        self.archives.insert(id.clone(), archive);
        self.order.push_back(id.clone());
        Ok(())
    }

    fn touch(&mut self, id: &ArchiveId) {
        if let Some(pos) = self.order.iter().position(|x| x == id) {
            let id = self.order.remove(pos).expect("position just found");
            self.order.push_back(id);
        }
    }

    fn evict_to_fit(&mut self) -> Result<(), ArchiveError> {
        while self.order.len() >= self.max_open {
            let Some(lru) = self.order.pop_front() else {
                break;
            };
            if let Some(mut archive) = self.archives.remove(&lru) {
                debug!("evicting archive {:?} (open-handle budget reached)", lru.path);
                archive.commit()?;
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &ArchiveId) -> Option<&Archive> {
        self.archives.get(id)
    }

    pub fn get_mut(&mut self, id: &ArchiveId) -> Option<&mut Archive> {
        self.archives.get_mut(id)
    }

    pub fn commit(&mut self, id: &ArchiveId) -> Result<(), ArchiveError> {
        if let Some(archive) = self.archives.get_mut(id) {
            archive.commit()?;
        }
        Ok(())
    }

    pub fn rollback(&mut self, id: &ArchiveId) {
        if let Some(archive) = self.archives.get_mut(id) {
            archive.rollback();
        }
    }

    pub fn commit_all(&mut self) -> Result<(), ArchiveError> {
        for archive in self.archives.values_mut() {
            archive.commit()?;
        }
        Ok(())
    }
}

impl ArchiveSource for ArchiveRegistry {
    fn archive_mut(&mut self, id: &ArchiveId) -> Result<&mut Archive, ArchiveError> {
        if !self.archives.contains_key(id) {
            self.ensure_open(id, ArchiveFlags::default())?;
        }
        self.touch(id);
        self.archives.get_mut(id).ok_or(ArchiveError::NoSuchMember(0))
    }
}

/// One required-file decision, independent of how a caller chooses to
/// present it (spec §6). Never formatted by the library itself; the
/// CLI turns these into the teacher's bracket-tag lines.
#[derive(Clone, Debug)]
pub struct DiagnosticRecord {
    pub game: String,
    pub filetype: FileType,
    pub required_index: usize,
    pub name: String,
    pub quality: Quality,
}

#[derive(Clone, Debug)]
pub struct GameResult {
    pub game: String,
    pub status: GameStatus,
}

#[derive(Clone, Debug, Default)]
pub struct RunReport {
    pub games: Vec<GameResult>,
    pub diagnostics: Vec<DiagnosticRecord>,
}

/// Owns every piece of process-wide state a run needs: the content
/// index, the bounded set of open archives, the pending-delete
/// ledger, and one `.ckmame.db` cache per scanned directory (spec
/// §4.C/§9).
pub struct Engine {
    config: EngineConfig,
    catalog: Catalog,
    old_catalog: Option<Catalog>,
    detectors: Vec<Detector>,
    registry: ArchiveRegistry,
    index: MemoryIndex,
    delete_list: DeleteList,
    caches: HashMap<PathBuf, ArchiveCache>,
    needed_sequence: u32,
}

impl Engine {
    pub fn new(config: EngineConfig, catalog: Catalog, detectors: Vec<Detector>) -> Engine {
        Self::with_old_catalog(config, catalog, None, detectors)
    }

    /// Like [`Engine::new`], additionally given a parsed old/retired
    /// catalog (spec §4.G `find_in_old`) so `Quality::Old`/`OkAndOld`
    /// can fire. `config.old_catalog` only records where that catalog
    /// came from for diagnostics; the engine never loads it itself,
    /// matching the teacher's presentation-layer-parses-the-DAT split.
    pub fn with_old_catalog(
        config: EngineConfig,
        catalog: Catalog,
        old_catalog: Option<Catalog>,
        detectors: Vec<Detector>,
    ) -> Engine {
        let max_open = config.max_open_archives;
        Engine {
            config,
            catalog,
            old_catalog,
            detectors,
            registry: ArchiveRegistry::new(max_open),
            index: MemoryIndex::new(),
            delete_list: DeleteList::new(),
            caches: HashMap::new(),
            needed_sequence: 0,
        }
    }

    /// Run the full scan → match → repair → recheck → sweep pipeline
    /// (spec §2). `config.read_only` gates every mutation (matching
    /// still happens, so a dry-run `Check` command gets full
    /// diagnostics); it never gates indexing or reporting.
    pub fn run(&mut self) -> Result<RunReport, EngineError> {
        self.index_romset()?;
        self.index_extra_roots()?;
        self.index_old_catalog()?;

        let tree = Tree::build(&self.catalog);
        let order = tree.walk();

        let mut report = RunReport::default();
        let any_stashed = self.match_and_repair_games(&order, &mut report)?;

        if any_stashed {
            let mut recheck = RecheckSet::new();
            for name in &order {
                recheck.mark(name.clone());
            }
            let pending = recheck.take();
            let mut second_report = RunReport::default();
            self.match_and_repair_games(&pending, &mut second_report)?;
            for updated in second_report.games {
                if let Some(slot) = report.games.iter_mut().find(|g| g.game == updated.game) {
                    *slot = updated;
                }
            }
            report.diagnostics.extend(second_report.diagnostics);
        }

        self.registry.commit_all()?;

        let read_only = self.config.read_only;
        self.delete_list.sweep(&mut self.index, |id| {
            Archive::open(
                id.clone(),
                ArchiveFlags {
                    read_only,
                    ..Default::default()
                },
            )
        })?;

        Ok(report)
    }

    fn rom_archive_id(&self, game_name: &str) -> ArchiveId {
        if self.config.unpacked {
            ArchiveId::new(ArchiveKind::Directory, self.config.romset_root.join(game_name), FileType::Rom)
        } else {
            ArchiveId::new(
                ArchiveKind::Zip,
                self.config.romset_root.join(format!("{game_name}.zip")),
                FileType::Rom,
            )
        }
    }

    fn disk_archive_id(&self, game_name: &str) -> ArchiveId {
        if self.config.have_toplevel_disks {
            ArchiveId::new(ArchiveKind::DiskDir, self.config.romset_root.clone(), FileType::Disk)
        } else {
            ArchiveId::new(ArchiveKind::DiskDir, self.config.romset_root.join(game_name), FileType::Disk)
        }
    }

    fn open_writable(&mut self, id: &ArchiveId) -> Result<(), EngineError> {
        self.registry.ensure_open(
            id,
            ArchiveFlags {
                create: true,
                read_only: self.config.read_only,
                ..Default::default()
            },
        )?;
        Ok(())
    }

    fn open_readonly_if_exists(&mut self, id: &ArchiveId) -> Result<bool, EngineError> {
        if self.registry.get(id).is_some() {
            return Ok(true);
        }
        if !id.path.exists() {
            return Ok(false);
        }
        self.registry.ensure_open(
            id,
            ArchiveFlags {
                read_only: true,
                ..Default::default()
            },
        )?;
        Ok(true)
    }

    // -- indexing ------------------------------------------------------

    fn index_romset(&mut self) -> Result<(), EngineError> {
        let mut indexed = HashSet::new();
        let names: Vec<String> = self.catalog.games.iter().map(|g| g.name.clone()).collect();
        for name in &names {
            let rom_id = self.rom_archive_id(name);
            self.index_archive_if_present(&rom_id, Location::Romset, &mut indexed)?;

            let disk_id = self.disk_archive_id(name);
            self.index_archive_if_present(&disk_id, Location::Romset, &mut indexed)?;
        }
        Ok(())
    }

    fn index_extra_roots(&mut self) -> Result<(), EngineError> {
        let mut indexed = HashSet::new();
        let roots = self.config.extra_roots.clone();
        for root in &roots {
            if !root.exists() {
                continue;
            }

            // One shared CHD directory per extra root, mirroring
            // `have_toplevel_disks` for the romset itself.
            let disk_id = ArchiveId::new(ArchiveKind::DiskDir, root.clone(), FileType::Disk);
            self.index_archive_if_present(&disk_id, Location::Extra, &mut indexed)?;

            let entries = walkdir::WalkDir::new(root).min_depth(1).max_depth(1);
            for entry in entries {
                let entry = entry.map_err(|source| {
                    EngineError::from(ArchiveError::Io {
                        path: root.clone(),
                        source: std::io::Error::new(std::io::ErrorKind::Other, source),
                    })
                })?;
                let path = entry.into_path();
                let ext = path.extension().and_then(|e| e.to_str());
                if ext == Some("chd") {
                    continue; // already covered by the shared DiskDir archive
                }
                let id = if path.is_dir() {
                    ArchiveId::new(ArchiveKind::Directory, path, FileType::Rom)
                } else if ext == Some("zip") {
                    ArchiveId::new(ArchiveKind::Zip, path, FileType::Rom)
                } else {
                    continue;
                };
                self.index_archive_if_present(&id, Location::Extra, &mut indexed)?;
            }
        }
        Ok(())
    }

    /// Index every archive named after a game in the old/retired
    /// catalog, tagged `Location::Old` (spec §4.G). Old games live
    /// under the same romset root as current ones — a retired game's
    /// zip sitting alongside the current set's, never cleaned up — so
    /// this reuses `rom_archive_id`/`disk_archive_id` rather than a
    /// separate root.
    fn index_old_catalog(&mut self) -> Result<(), EngineError> {
        let Some(old) = self.old_catalog.clone() else {
            return Ok(());
        };
        let mut indexed = HashSet::new();
        for game in &old.games {
            // A name still present in the current catalog is already
            // indexed as `Location::Romset` by `index_romset`; "old"
            // only means games the current catalog no longer lists.
            if self.catalog.game(&game.name).is_some() {
                continue;
            }
            let rom_id = self.rom_archive_id(&game.name);
            self.index_archive_if_present(&rom_id, Location::Old, &mut indexed)?;

            let disk_id = self.disk_archive_id(&game.name);
            self.index_archive_if_present(&disk_id, Location::Old, &mut indexed)?;
        }
        Ok(())
    }

    fn index_archive_if_present(
        &mut self,
        id: &ArchiveId,
        location: Location,
        indexed: &mut HashSet<ArchiveId>,
    ) -> Result<(), EngineError> {
        if indexed.contains(id) {
            return Ok(());
        }
        if !id.path.exists() {
            return Ok(());
        }
        self.registry.ensure_open(
            id,
            ArchiveFlags {
                read_only: true,
                ..Default::default()
            },
        )?;
        self.hash_and_index_archive(id, location)?;
        indexed.insert(id.clone());
        Ok(())
    }

    fn hash_and_index_archive(&mut self, id: &ArchiveId, location: Location) -> Result<(), EngineError> {
        self.seed_from_cache(id)?;

        let member_count = self.registry.get(id).map(|a| a.files().len()).unwrap_or(0);
        let detectors = self.detectors.clone();
        for i in 0..member_count {
            let archive = self.registry.archive_mut(id)?;
            archive.ensure_member_hashes(i, 0, None, HashKind::Crc32)?;
            archive.ensure_member_hashes(i, 0, None, HashKind::Md5)?;
            archive.ensure_member_hashes(i, 0, None, HashKind::Sha1)?;
            let member = &archive.files()[i];
            if member.alive {
                let hashes = member.hashes.clone();
                self.index.insert(id, i, 0, &hashes, location);
            }

            // Every registered detector gets its own transformed digest
            // indexed alongside the raw one (spec §4.D: a member
            // contributes one entry per digest kind present, per
            // detector id). `MemoryIndex`'s key excludes the detector
            // id, so a plain lookup later finds either transparently.
            for (pos, det) in detectors.iter().enumerate() {
                if id.filetype == FileType::Disk {
                    break; // detectors never apply to CHDs
                }
                let detector_id = detector::detector_id_for(pos);
                let archive = self.registry.archive_mut(id)?;
                archive.ensure_member_hashes(i, detector_id, Some(det), HashKind::Crc32)?;
                archive.ensure_member_hashes(i, detector_id, Some(det), HashKind::Md5)?;
                archive.ensure_member_hashes(i, detector_id, Some(det), HashKind::Sha1)?;
                let member = &archive.files()[i];
                if member.alive {
                    if let Some(transformed) = member.detector_hashes.get(&detector_id).cloned() {
                        self.index.insert(id, i, detector_id, &transformed, location);
                    }
                }
            }
        }

        self.write_cache(id)?;
        Ok(())
    }

    fn cache_dir_for(id: &ArchiveId) -> Option<PathBuf> {
        id.path.parent().filter(|p| !p.as_os_str().is_empty()).map(Path::to_path_buf)
    }

    /// Filesystem `(mtime, size)` of an archive's backing path, for
    /// `ArchiveCache::is_up_to_date`. `None` if the path doesn't exist
    /// yet (freshly `create`d archives) or its mtime can't be read.
    fn archive_fs_stat(id: &ArchiveId) -> Option<(i64, u64)> {
        let metadata = std::fs::metadata(&id.path).ok()?;
        let mtime = metadata
            .modified()
            .ok()?
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs() as i64;
        Some((mtime, metadata.len()))
    }

    fn cache_for(&mut self, dir: &Path) -> Result<&mut ArchiveCache, EngineError> {
        if !self.caches.contains_key(dir) {
            let cache = ArchiveCache::open(dir)?;
            self.caches.insert(dir.to_path_buf(), cache);
        }
        Ok(self.caches.get_mut(dir).expect("just inserted"))
    }

    /// Seed cached hashes onto members whose name and mtime still match
    /// what was last written to this directory's `.ckmame.db`, saving
    /// a full re-hash of unchanged archives. Detector-specific hashes
    /// round-trip too: the cache keys them by `(name, version)`
    /// (`DetectorKey`), not by this run's engine-wide detector id, so
    /// they stay meaningful across runs as long as the same detector
    /// definitions are supplied again.
    fn seed_from_cache(&mut self, id: &ArchiveId) -> Result<(), EngineError> {
        let Some(dir) = Self::cache_dir_for(id) else {
            return Ok(());
        };
        let Some(name) = id.path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            return Ok(());
        };

        let cache_archive_id = {
            let cache = self.cache_for(&dir)?;
            cache.get_archive_id(&name, id.filetype)?
        };
        let Some(cache_archive_id) = cache_archive_id else {
            return Ok(());
        };

        // Archive-level staleness check (spec §4.C `is_up_to_date`):
        // purely informational here, since a stale cache is still
        // consulted as per-member hints below (spec: "the cached
        // member list is treated as hints only and refreshed") rather
        // than skipped outright.
        if let Some((fs_mtime, fs_size)) = Self::archive_fs_stat(id) {
            let is_directory = matches!(id.kind, ArchiveKind::Directory | ArchiveKind::DiskDir);
            let cache = self.cache_for(&dir)?;
            if !cache.is_up_to_date(&name, id.filetype, is_directory, fs_mtime, fs_size)? {
                debug!("cache entry for {:?} is stale, refreshing from per-member hints", id.path);
            }
        }
        let cached_files = {
            let cache = self.cache_for(&dir)?;
            cache.read_files(cache_archive_id)?
        };

        let mut global_ids: HashMap<i64, u16> = HashMap::new();
        for (pos, det) in self.detectors.iter().enumerate() {
            let key = DetectorKey {
                name: det.name.clone(),
                version: det.version.clone(),
            };
            let cache = self.cache_for(&dir)?;
            global_ids.insert(cache.local_detector_id(&key)?, detector::detector_id_for(pos));
        }

        if let Some(archive) = self.registry.get_mut(id) {
            debug!("seeding {} member hashes from cache at {:?}", cached_files.len(), dir);
            for cached in &cached_files {
                if let Some(member) = archive
                    .files
                    .iter_mut()
                    .find(|m| m.name == cached.name && m.mtime == cached.mtime)
                {
                    member.hashes.merge(&cached.hashes);
                    member.broken = member.broken || cached.broken;
                    for (local_id, hashes) in &cached.detector_hashes {
                        if let Some(global_id) = global_ids.get(local_id) {
                            member.detector_hashes.entry(*global_id).or_default().merge(hashes);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn write_cache(&mut self, id: &ArchiveId) -> Result<(), EngineError> {
        let Some(dir) = Self::cache_dir_for(id) else {
            return Ok(());
        };
        let Some(name) = id.path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            return Ok(());
        };

        let Some(archive) = self.registry.get(id) else {
            return Ok(());
        };
        let mtime = archive.files().iter().map(|m| m.mtime).max().unwrap_or(0);
        let size: u64 = archive.files().iter().filter_map(|m| m.hashes.size).sum();
        let raw_members: Vec<(String, i64, bool, crate::hashes::Hashes, HashMap<u16, crate::hashes::Hashes>)> =
            archive
                .files()
                .iter()
                .map(|m| (m.name.clone(), m.mtime, m.broken, m.hashes.clone(), m.detector_hashes.clone()))
                .collect();

        // Translate the engine-wide detector ids in `detector_hashes`
        // into this cache's own stable local ids before the cache
        // struct borrow is taken, since both live on `self`.
        let mut local_ids: HashMap<u16, i64> = HashMap::new();
        for (pos, det) in self.detectors.iter().enumerate() {
            let global_id = detector::detector_id_for(pos);
            let key = DetectorKey {
                name: det.name.clone(),
                version: det.version.clone(),
            };
            let cache = self.cache_for(&dir)?;
            local_ids.insert(global_id, cache.local_detector_id(&key)?);
        }

        let files: Vec<CachedFile> = raw_members
            .into_iter()
            .map(|(name, mtime, broken, hashes, detector_hashes)| CachedFile {
                name,
                mtime,
                broken,
                hashes,
                detector_hashes: detector_hashes
                    .into_iter()
                    .filter_map(|(global_id, h)| local_ids.get(&global_id).map(|local| (*local, h)))
                    .collect(),
            })
            .collect();

        let cache = self.cache_for(&dir)?;
        cache.write_archive(&name, id.filetype, mtime, size, &files)?;
        Ok(())
    }

    // -- match + repair --------------------------------------------------

    fn match_and_repair_games(&mut self, names: &[String], report: &mut RunReport) -> Result<bool, EngineError> {
        let mut any_stashed = false;
        for name in names {
            any_stashed |= self.match_and_repair_one(name, report)?;
        }
        Ok(any_stashed)
    }

    fn match_and_repair_one(&mut self, name: &str, report: &mut RunReport) -> Result<bool, EngineError> {
        let Some(game) = self.catalog.game(name).cloned() else {
            return Ok(false);
        };

        let own = self.rom_archive_id(name);
        self.open_writable(&own)?;

        let parent = match &game.parent_name {
            Some(p) => {
                let id = self.rom_archive_id(p);
                if self.open_readonly_if_exists(&id)? { Some(id) } else { None }
            }
            None => None,
        };
        let grandparent = match &game.grandparent_name {
            Some(p) => {
                let id = self.rom_archive_id(p);
                if self.open_readonly_if_exists(&id)? { Some(id) } else { None }
            }
            None => None,
        };

        let own_disk = if game.disks.is_empty() {
            None
        } else {
            let id = self.disk_archive_id(name);
            self.open_writable(&id)?;
            Some(id)
        };
        let parent_disk = if own_disk.is_some() {
            match &game.parent_name {
                Some(p) => {
                    let id = self.disk_archive_id(p);
                    if self.open_readonly_if_exists(&id)? { Some(id) } else { None }
                }
                None => None,
            }
        } else {
            None
        };
        let grandparent_disk = if own_disk.is_some() {
            match &game.grandparent_name {
                Some(p) => {
                    let id = self.disk_archive_id(p);
                    if self.open_readonly_if_exists(&id)? { Some(id) } else { None }
                }
                None => None,
            }
        } else {
            None
        };

        let archives = GameArchives {
            own: &own,
            parent: parent.as_ref(),
            grandparent: grandparent.as_ref(),
            own_disk: own_disk.as_ref(),
            parent_disk: parent_disk.as_ref(),
            grandparent_disk: grandparent_disk.as_ref(),
        };

        let finder = Finder::new(&self.index, &self.detectors);
        let options = MatcherOptions {
            nodump_counts_as_missing: self.config.nodump_counts_as_missing,
        };
        let result = matcher::match_game(&mut self.registry, &finder, &self.detectors, &game, &archives, &options)?;

        for (i, (rom, m)) in game.roms.iter().zip(&result.rom_matches).enumerate() {
            report.diagnostics.push(DiagnosticRecord {
                game: name.to_string(),
                filetype: FileType::Rom,
                required_index: i,
                name: rom.name.clone(),
                quality: m.quality,
            });
        }
        for (i, (disk, m)) in game.disks.iter().zip(&result.disk_matches).enumerate() {
            report.diagnostics.push(DiagnosticRecord {
                game: name.to_string(),
                filetype: FileType::Disk,
                required_index: i,
                name: disk.name.clone(),
                quality: m.quality,
            });
        }

        let mut stashed = false;
        let mut status = result.status;

        if !self.config.read_only {
            let mark = self.delete_list.mark();
            let planner_options = PlannerOptions {
                keep_duplicates: self.config.keep_duplicates,
                move_from_extra: self.config.move_from_extra,
            };

            let outcome = self.apply_game_plan(&game, &result, &archives, &planner_options);
            match outcome {
                Ok(any_inzip) => {
                    stashed = any_inzip;
                    self.registry.commit(&own)?;
                    if let Some(d) = &own_disk {
                        self.registry.commit(d)?;
                    }

                    let rom_names: HashSet<String> = game.roms.iter().map(|r| r.name.clone()).collect();
                    self.sweep_unclaimed(&own, &rom_names)?;

                    // A shared top-level CHD directory (`have_toplevel_disks`)
                    // holds every game's disks at once, so "unclaimed by
                    // this game" would misfire on other games' files; the
                    // sweep only makes sense for a game's own archive.
                    if let Some(d) = &own_disk {
                        if !self.config.have_toplevel_disks {
                            let disk_names: HashSet<String> = game.disks.iter().map(|disk| disk.name.clone()).collect();
                            self.sweep_unclaimed(d, &disk_names)?;
                        }
                    }
                }
                Err(_) => {
                    debug!("repair failed for {name}, rolling back");
                    self.delete_list.rollback_to(mark);
                    self.registry.rollback(&own);
                    if let Some(d) = &own_disk {
                        self.registry.rollback(d);
                    }
                    status = downgrade(status);
                }
            }
        }

        report.games.push(GameResult {
            game: name.to_string(),
            status,
        });

        Ok(stashed)
    }

    /// Apply every rom/disk repair for one game; `Quality::InZip`
    /// matches are stashed into `needed/` here rather than in
    /// `planner`, since that needs the run-wide unique-name sequence.
    /// Returns whether anything was stashed (driving a recheck pass).
    fn apply_game_plan(
        &mut self,
        game: &Game,
        result: &matcher::MatchResult,
        archives: &GameArchives<'_>,
        options: &PlannerOptions,
    ) -> Result<bool, EngineError> {
        let mut stashed = false;

        for (rom, rom_match) in game.roms.iter().zip(&result.rom_matches) {
            if rom_match.quality == Quality::InZip {
                if let Some(src_index) = rom_match.source_index {
                    self.stash_inzip(archives.own, src_index, FileType::Rom)?;
                    stashed = true;
                }
                continue;
            }
            planner::apply_rom_plan(&mut self.registry, rom, rom_match, archives, &mut self.delete_list, options)?;
        }

        if let Some(own_disk) = archives.own_disk {
            for (disk, disk_match) in game.disks.iter().zip(&result.disk_matches) {
                if disk_match.quality == Quality::InZip {
                    if let Some(src_index) = disk_match.source_index {
                        self.stash_inzip(own_disk, src_index, FileType::Disk)?;
                        stashed = true;
                    }
                    continue;
                }
                planner::apply_disk_plan(&mut self.registry, disk, disk_match, archives, &mut self.delete_list, options)?;
            }
        }

        Ok(stashed)
    }

    fn stash_inzip(&mut self, own: &ArchiveId, src_index: usize, filetype: FileType) -> Result<(), EngineError> {
        let data = {
            let archive = self.registry.archive_mut(own)?;
            let mut reader = archive.file_open(src_index, None)?;
            let mut buf = Vec::new();
            reader
                .read_to_end(&mut buf)
                .map_err(|source| ArchiveError::Io { path: own.path.clone(), source })?;
            buf
        };
        let wanted = hashes::compute(&data);

        let needed_id = ArchiveId::new(ArchiveKind::Directory, self.config.needed_dir.clone(), filetype);
        self.registry.ensure_open(
            &needed_id,
            ArchiveFlags {
                create: true,
                read_only: self.config.read_only,
                ..Default::default()
            },
        )?;

        let stash_name = planner::needed_stash_name(&wanted, filetype, self.needed_sequence);
        self.needed_sequence += 1;

        let new_index = {
            let archive = self.registry.archive_mut(&needed_id)?;
            archive.add_bytes(stash_name, data)
        };
        self.registry.commit(&needed_id)?;

        let hashes = self
            .registry
            .get(&needed_id)
            .and_then(|a| a.files().get(new_index))
            .map(|m| m.hashes.clone())
            .unwrap_or_default();
        self.index.insert(&needed_id, new_index, 0, &hashes, Location::Needed);
        Ok(())
    }

    /// After a game's own archive has been repaired, find members no
    /// required rom/disk name claims and either delete them outright
    /// (name matches a `delete_unknown_patterns` glob) or move them
    /// into a garbage-sibling archive under `unknown_dir` (spec §4.I).
    fn sweep_unclaimed(&mut self, own: &ArchiveId, claimed: &HashSet<String>) -> Result<(), EngineError> {
        let to_handle: Vec<(usize, String)> = match self.registry.get(own) {
            Some(archive) => archive
                .files()
                .iter()
                .enumerate()
                .filter(|(_, m)| m.alive && !claimed.contains(&m.name))
                .map(|(i, m)| (i, m.name.clone()))
                .collect(),
            None => Vec::new(),
        };

        for (index, name) in to_handle {
            if self.config.delete_unknown_patterns.iter().any(|p| p.matches(&name)) {
                debug!("deleting unknown member {name:?} from {:?} (matches delete-unknown pattern)", own.path);
                self.delete_list.queue_delete(own.clone(), index);
            } else {
                self.stash_unknown(own, index, &name)?;
            }
        }
        Ok(())
    }

    /// Move one unclaimed member into `<unknown_dir>/<archive-name>`,
    /// the garbage sibling spec §6's filesystem layout describes, and
    /// queue the original for deletion from `own`.
    fn stash_unknown(&mut self, own: &ArchiveId, index: usize, name: &str) -> Result<(), EngineError> {
        let data = {
            let archive = self.registry.archive_mut(own)?;
            let mut reader = archive.file_open(index, None)?;
            let mut buf = Vec::new();
            reader
                .read_to_end(&mut buf)
                .map_err(|source| ArchiveError::Io { path: own.path.clone(), source })?;
            buf
        };

        let sibling_file_name = own
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());
        let sibling_kind = match own.kind {
            ArchiveKind::Directory | ArchiveKind::DiskDir => ArchiveKind::Directory,
            _ => ArchiveKind::Zip,
        };
        let sibling_id = ArchiveId::new(sibling_kind, self.config.unknown_dir.join(&sibling_file_name), own.filetype);
        self.registry.ensure_open(
            &sibling_id,
            ArchiveFlags {
                create: true,
                read_only: self.config.read_only,
                ..Default::default()
            },
        )?;

        let new_index = {
            let archive = self.registry.archive_mut(&sibling_id)?;
            archive.add_bytes(name.to_string(), data)
        };
        self.registry.commit(&sibling_id)?;

        let hashes = self
            .registry
            .get(&sibling_id)
            .and_then(|a| a.files().get(new_index))
            .map(|m| m.hashes.clone())
            .unwrap_or_default();
        self.index.insert(&sibling_id, new_index, 0, &hashes, Location::Superfluous);

        self.delete_list.queue_delete(own.clone(), index);
        Ok(())
    }
}

/// One notch down the quality ladder when a committed repair actually
/// failed (spec.md §7): the decisions matcher made were sound, but the
/// backend couldn't carry them out, so the on-disk truth is worse than
/// what was reported.
fn downgrade(status: GameStatus) -> GameStatus {
    match status {
        GameStatus::Correct | GameStatus::CorrectMia => GameStatus::Fixable,
        GameStatus::Fixable => GameStatus::Partial,
        GameStatus::Old | GameStatus::Partial | GameStatus::Missing => GameStatus::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveKind;

    #[test]
    fn registry_evicts_least_recently_used_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir(&a).unwrap();
        std::fs::create_dir(&b).unwrap();

        let mut registry = ArchiveRegistry::new(1);
        let id_a = ArchiveId::new(ArchiveKind::Directory, &a, FileType::Rom);
        let id_b = ArchiveId::new(ArchiveKind::Directory, &b, FileType::Rom);

        registry.ensure_open(&id_a, ArchiveFlags::default()).unwrap();
        assert!(registry.get(&id_a).is_some());

        registry.ensure_open(&id_b, ArchiveFlags::default()).unwrap();
        assert!(registry.get(&id_a).is_none());
        assert!(registry.get(&id_b).is_some());
    }

    #[test]
    fn downgrade_steps_down_one_status() {
        assert_eq!(downgrade(GameStatus::Correct), GameStatus::Fixable);
        assert_eq!(downgrade(GameStatus::Fixable), GameStatus::Partial);
        assert_eq!(downgrade(GameStatus::Missing), GameStatus::Missing);
    }
}
