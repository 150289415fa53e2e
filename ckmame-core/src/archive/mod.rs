//! Uniform, transactional view over zip / 7z / directory storage
//! backends, per spec §4.B.
//!
//! Grounded on the teacher's `zip` dependency and `Cache`'s
//! load/rebuild discipline (`cache.rs`), and on `Archive.h`/
//! `ArchiveZip.h`/`ArchiveDir.h` (original_source) for the
//! commit/rollback/quarantine protocol.

mod sevenzip;

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use crate::detector::Detector;
use crate::error::ArchiveError;
use crate::hashes::{self, Hashes};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    Zip,
    SevenZip,
    Directory,
    DiskDir,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FileType {
    Rom,
    Disk,
}

/// Process-wide archive identity: `(kind, path, filetype)`. At most
/// one live `Archive` exists per identity (the `ArchiveRegistry` in
/// `crate::engine` enforces this).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArchiveId {
    pub kind: ArchiveKind,
    pub path: PathBuf,
    pub filetype: FileType,
}

impl ArchiveId {
    pub fn new(kind: ArchiveKind, path: impl Into<PathBuf>, filetype: FileType) -> Self {
        Self {
            kind,
            path: path.into(),
            filetype,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchiveFlags {
    pub create: bool,
    pub read_only: bool,
    pub top_level_only: bool,
    pub keep_empty: bool,
}

/// A logical member of an archive. Deletion sets `alive = false` but
/// never removes the slot, so indices are stable for the archive's
/// lifetime (spec §3 "Members are logical").
#[derive(Clone, Debug)]
pub struct Member {
    pub name: String,
    pub mtime: i64,
    pub broken: bool,
    pub hashes: Hashes,
    pub detector_hashes: HashMap<u16, Hashes>,
    pub alive: bool,
    /// The name this member had in the still-on-disk backend, used at
    /// commit time to locate source bytes for members that were only
    /// renamed (not newly added). `None` for members added in this
    /// session (`AddEmpty`/`AddBytes`).
    pub(crate) original_name: Option<String>,
}

impl Member {
    fn from_disk(name: String, mtime: i64) -> Self {
        Self {
            original_name: Some(name.clone()),
            name,
            mtime,
            broken: false,
            hashes: Hashes::new(),
            detector_hashes: HashMap::new(),
            alive: true,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Change {
    None,
    Delete,
    Rename,
    AddEmpty,
    AddBytes(Vec<u8>),
}

pub struct Archive {
    pub id: ArchiveId,
    pub flags: ArchiveFlags,
    pub files: Vec<Member>,
    pub changes: Vec<Change>,
    pub modified: bool,
    pub cache_dirty: bool,
    /// Number of members that existed in the backend when it was
    /// opened; only these indices can be read back by position from
    /// the original zip, or by `original_name` from the original
    /// directory.
    original_count: usize,
}

impl Archive {
    /// Open (or create, if `flags.create` and it doesn't exist yet) an
    /// archive. `cached_members` is an optional hint list from the
    /// archive-contents cache (§4.C); used only to seed hashes when
    /// mtimes/sizes agree, never trusted for the member *list* itself
    /// except for the directory backend where it may save re-hashing.
    pub fn open(id: ArchiveId, flags: ArchiveFlags) -> Result<Archive, ArchiveError> {
        match id.kind {
            ArchiveKind::Zip => Self::open_zip(id, flags),
            ArchiveKind::SevenZip => Self::open_sevenzip(id, flags),
            ArchiveKind::Directory | ArchiveKind::DiskDir => Self::open_directory(id, flags),
        }
    }

    fn open_zip(id: ArchiveId, flags: ArchiveFlags) -> Result<Archive, ArchiveError> {
        if !id.path.exists() {
            if flags.create {
                return Ok(Archive {
                    id,
                    flags,
                    files: Vec::new(),
                    changes: Vec::new(),
                    modified: false,
                    cache_dirty: false,
                    original_count: 0,
                });
            }
            return Err(ArchiveError::Io {
                path: id.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "archive not found"),
            });
        }

        let file = File::open(&id.path).map_err(|source| ArchiveError::Io {
            path: id.path.clone(),
            source,
        })?;
        let mut zip = zip::ZipArchive::new(file).map_err(|_| ArchiveError::Corrupt(id.path.clone()))?;

        let mut files = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let entry = zip.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let mtime = entry
                .last_modified()
                .and_then(|dt| dt.to_time().ok())
                .map(|t| t.unix_timestamp())
                .unwrap_or(0);
            let mut member = Member::from_disk(entry.name().to_string(), mtime);
            member.hashes.size = Some(entry.size());
            files.push(member);
        }
        let original_count = files.len();
        let changes = vec![Change::None; files.len()];

        Ok(Archive {
            id,
            flags,
            files,
            changes,
            modified: false,
            cache_dirty: false,
            original_count,
        })
    }

    fn open_sevenzip(id: ArchiveId, flags: ArchiveFlags) -> Result<Archive, ArchiveError> {
        let exe = sevenzip::find_tool()?;
        let names = sevenzip::list_entries(&exe, &id.path)?;
        let files: Vec<Member> = names
            .into_iter()
            .map(|name| Member::from_disk(name, 0))
            .collect();
        let original_count = files.len();
        let changes = vec![Change::None; files.len()];
        Ok(Archive {
            id,
            flags: ArchiveFlags {
                read_only: true,
                ..flags
            },
            files,
            changes,
            modified: false,
            cache_dirty: false,
            original_count,
        })
    }

    fn open_directory(id: ArchiveId, flags: ArchiveFlags) -> Result<Archive, ArchiveError> {
        if !id.path.exists() {
            if flags.create {
                fs::create_dir_all(&id.path).map_err(|source| ArchiveError::Io {
                    path: id.path.clone(),
                    source,
                })?;
            } else {
                return Err(ArchiveError::Io {
                    path: id.path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "directory not found"),
                });
            }
        }

        let mut files = Vec::new();
        if id.path.is_dir() {
            for entry in fs::read_dir(&id.path).map_err(|source| ArchiveError::Io {
                path: id.path.clone(),
                source,
            })? {
                let entry = entry.map_err(|source| ArchiveError::Io {
                    path: id.path.clone(),
                    source,
                })?;
                if !entry.path().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') {
                    continue;
                }
                let meta = entry.metadata().map_err(|source| ArchiveError::Io {
                    path: id.path.clone(),
                    source,
                })?;
                let mtime = mtime_of(&meta);
                let mut member = Member::from_disk(name, mtime);
                member.hashes.size = Some(meta.len());
                files.push(member);
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        let original_count = files.len();
        let changes = vec![Change::None; files.len()];

        Ok(Archive {
            id,
            flags,
            files,
            changes,
            modified: false,
            cache_dirty: false,
            original_count,
        })
    }

    pub fn files(&self) -> &[Member] {
        &self.files
    }

    fn ensure_writable(&self) -> Result<(), ArchiveError> {
        if self.flags.read_only {
            return Err(ArchiveError::ReadOnly(self.id.path.clone()));
        }
        if self.id.kind == ArchiveKind::SevenZip {
            return Err(ArchiveError::ReadOnlyBackend(self.id.path.clone()));
        }
        Ok(())
    }

    /// Open a sequential reader over member `index`, optionally
    /// limited to `[start, start+length)`.
    pub fn file_open(
        &self,
        index: usize,
        range: Option<(u64, u64)>,
    ) -> Result<Box<dyn Read + '_>, ArchiveError> {
        let member = self.files.get(index).ok_or(ArchiveError::NoSuchMember(index))?;
        let data = self.read_member_bytes(index, member)?;
        let (start, len) = range.unwrap_or((0, data.len() as u64));
        let start = start as usize;
        let end = (start + len as usize).min(data.len());
        let slice = data.get(start..end).unwrap_or(&[]).to_vec();
        Ok(Box::new(Cursor::new(slice)))
    }

    fn read_member_bytes(&self, index: usize, member: &Member) -> Result<Vec<u8>, ArchiveError> {
        match self.id.kind {
            ArchiveKind::Zip => {
                if index >= self.original_count {
                    // Newly staged member; bytes live in `changes`.
                    return match &self.changes[index] {
                        Change::AddBytes(data) => Ok(data.clone()),
                        Change::AddEmpty => Ok(Vec::new()),
                        _ => Ok(Vec::new()),
                    };
                }
                let file = File::open(&self.id.path).map_err(|source| ArchiveError::Io {
                    path: self.id.path.clone(),
                    source,
                })?;
                let mut zip = zip::ZipArchive::new(file)?;
                let mut entry = zip.by_index(index)?;
                let mut buf = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut buf).map_err(|source| ArchiveError::Io {
                    path: self.id.path.clone(),
                    source,
                })?;
                Ok(buf)
            }
            ArchiveKind::SevenZip => {
                let exe = sevenzip::find_tool()?;
                let (_tmp, extracted) = sevenzip::extract_all(&exe, &self.id.path)?;
                let target = member
                    .original_name
                    .as_deref()
                    .unwrap_or(&member.name);
                for (rel, abs) in &extracted {
                    if rel.to_string_lossy() == target {
                        return fs::read(abs).map_err(|source| ArchiveError::Io {
                            path: abs.clone(),
                            source,
                        });
                    }
                }
                Err(ArchiveError::NoSuchName(target.to_string()))
            }
            ArchiveKind::Directory | ArchiveKind::DiskDir => {
                if let Change::AddBytes(data) = &self.changes[index] {
                    return Ok(data.clone());
                }
                if matches!(self.changes[index], Change::AddEmpty) {
                    return Ok(Vec::new());
                }
                let name = member.original_name.as_deref().unwrap_or(&member.name);
                let path = self.id.path.join(name);
                fs::read(&path).map_err(|source| ArchiveError::Io { path, source })
            }
        }
    }

    /// Compute and cache whatever digests from `wanted` are still
    /// missing on member `index`, for the given detector id (0 = raw).
    /// A non-zero `detector_id` must come with the matching `Detector`
    /// in `detector`, whose byte-range transform is applied before
    /// hashing (spec §4.F); the id itself is only a storage key.
    ///
    /// Disk-typed archives (`FileType::Disk`) never hash raw bytes:
    /// a `.chd` is a compressed container, so its content digests are
    /// read out of the CHD header (spec §6) rather than computed over
    /// the compressed stream. Detectors don't apply to disks.
    pub fn ensure_member_hashes(
        &mut self,
        index: usize,
        detector_id: u16,
        detector: Option<&Detector>,
        wanted: crate::hashes::HashKind,
    ) -> Result<(), ArchiveError> {
        let member = self.files.get(index).ok_or(ArchiveError::NoSuchMember(index))?;
        let already = if detector_id == 0 {
            member.hashes.has(wanted)
        } else {
            member
                .detector_hashes
                .get(&detector_id)
                .is_some_and(|h| h.has(wanted))
        };
        if already {
            return Ok(());
        }

        if self.id.filetype == FileType::Disk && detector_id == 0 {
            return self.ensure_disk_hashes(index);
        }

        let bytes = match self.read_member_bytes(index, member) {
            Ok(b) => b,
            Err(_) => {
                self.files[index].broken = true;
                return Ok(());
            }
        };

        if detector_id == 0 {
            let computed = hashes::compute(&bytes);
            self.files[index].hashes.merge(&computed);
        } else if let Some(detector) = detector {
            if let Some(computed) = detector.transform_and_hash(&bytes) {
                self.files[index]
                    .detector_hashes
                    .entry(detector_id)
                    .or_default()
                    .merge(&computed);
            }
        }
        self.cache_dirty = true;
        Ok(())
    }

    fn ensure_disk_hashes(&mut self, index: usize) -> Result<(), ArchiveError> {
        let member = &self.files[index];
        let path = match self.id.kind {
            ArchiveKind::Directory | ArchiveKind::DiskDir => {
                let name = member.original_name.as_deref().unwrap_or(&member.name);
                self.id.path.join(name)
            }
            _ => self.id.path.clone(),
        };

        match crate::chd::read_header(&path) {
            Ok(info) => {
                let hashes = &mut self.files[index].hashes;
                hashes.size = Some(info.logical_size);
                if info.sha1.is_some() {
                    hashes.sha1 = info.sha1;
                }
                if info.md5.is_some() {
                    hashes.md5 = info.md5;
                }
            }
            Err(_) => {
                self.files[index].broken = true;
            }
        }
        self.cache_dirty = true;
        Ok(())
    }

    pub fn add_empty(&mut self, name: impl Into<String>) -> usize {
        let index = self.files.len();
        self.files.push(Member {
            name: name.into(),
            mtime: 0,
            broken: false,
            hashes: hashes::empty_file_hashes().clone(),
            detector_hashes: HashMap::new(),
            alive: true,
            original_name: None,
        });
        self.changes.push(Change::AddEmpty);
        self.modified = true;
        index
    }

    /// Copy an entire member from another (already-open) archive.
    pub fn copy_from(
        &mut self,
        src: &Archive,
        src_index: usize,
        dst_name: impl Into<String>,
    ) -> Result<usize, ArchiveError> {
        let mut reader = src.file_open(src_index, None)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(|source| ArchiveError::Io {
            path: src.id.path.clone(),
            source,
        })?;
        let hashes = hashes::compute(&data);
        let index = self.files.len();
        self.files.push(Member {
            name: dst_name.into(),
            mtime: 0,
            broken: false,
            hashes,
            detector_hashes: HashMap::new(),
            alive: true,
            original_name: None,
        });
        self.changes.push(Change::AddBytes(data));
        self.modified = true;
        Ok(index)
    }

    /// Copy a `[offset, offset+length)` sub-range of `src_index` in
    /// another archive, verifying it matches `expected` first.
    pub fn copy_range_from(
        &mut self,
        src: &Archive,
        src_index: usize,
        dst_name: impl Into<String>,
        offset: u64,
        length: u64,
        expected: &Hashes,
    ) -> Result<usize, ArchiveError> {
        let mut reader = src.file_open(src_index, Some((offset, length)))?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(|source| ArchiveError::Io {
            path: src.id.path.clone(),
            source,
        })?;
        let computed = hashes::compute(&data);
        if computed.compare(expected) == crate::hashes::Compare::Mismatch {
            return Err(ArchiveError::Corrupt(src.id.path.clone()));
        }
        let index = self.files.len();
        self.files.push(Member {
            name: dst_name.into(),
            mtime: 0,
            broken: false,
            hashes: computed,
            detector_hashes: HashMap::new(),
            alive: true,
            original_name: None,
        });
        self.changes.push(Change::AddBytes(data));
        self.modified = true;
        Ok(index)
    }

    /// Append a member backed by already-in-memory bytes (used by the
    /// planner when bytes were read from a source archive that can't
    /// stay borrowed through to this call, e.g. cross-archive copies
    /// mediated by an `ArchiveSource`).
    pub fn add_bytes(&mut self, name: impl Into<String>, data: Vec<u8>) -> usize {
        let hashes = hashes::compute(&data);
        let index = self.files.len();
        self.files.push(Member {
            name: name.into(),
            mtime: 0,
            broken: false,
            hashes,
            detector_hashes: HashMap::new(),
            alive: true,
            original_name: None,
        });
        self.changes.push(Change::AddBytes(data));
        self.modified = true;
        index
    }

    pub fn delete(&mut self, index: usize) -> Result<(), ArchiveError> {
        self.ensure_writable()?;
        let member = self.files.get_mut(index).ok_or(ArchiveError::NoSuchMember(index))?;
        member.alive = false;
        self.changes[index] = Change::Delete;
        self.modified = true;
        Ok(())
    }

    pub fn rename(&mut self, index: usize, new_name: impl Into<String>) -> Result<(), ArchiveError> {
        self.ensure_writable()?;
        let member = self.files.get_mut(index).ok_or(ArchiveError::NoSuchMember(index))?;
        member.name = new_name.into();
        if matches!(self.changes[index], Change::None) {
            self.changes[index] = Change::Rename;
        }
        self.modified = true;
        Ok(())
    }

    /// Rename a member to a name guaranteed not to collide with any
    /// other live member (used to displace a name collision before an
    /// incoming rename/copy, per spec §4.I).
    pub fn rename_to_unique(&mut self, index: usize) -> Result<String, ArchiveError> {
        let base = self.files[index].name.clone();
        let mut candidate = format!("{base}.ckmame-displaced");
        let mut n = 0u32;
        let existing: std::collections::HashSet<String> = self
            .files
            .iter()
            .enumerate()
            .filter(|(i, m)| *i != index && m.alive)
            .map(|(_, m)| m.name.clone())
            .collect();
        while existing.contains(&candidate) {
            n += 1;
            candidate = format!("{base}.ckmame-displaced-{n}");
        }
        self.rename(index, candidate.clone())?;
        Ok(candidate)
    }

    /// Aligned-window scan: windows of exactly `length` bytes stepped
    /// by `length`; the final window only qualifies when
    /// `offset + length == member_size` (spec §4.B numeric semantics).
    pub fn find_offset(
        &self,
        index: usize,
        length: u64,
        hashes: &Hashes,
    ) -> Result<Option<u64>, ArchiveError> {
        if length == 0 {
            return Ok(None);
        }
        let member = self.files.get(index).ok_or(ArchiveError::NoSuchMember(index))?;
        let size = match member.hashes.size {
            Some(s) => s,
            None => return Ok(None),
        };
        let mut offset = 0u64;
        while offset + length <= size {
            let mut reader = self.file_open(index, Some((offset, length)))?;
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).map_err(|source| ArchiveError::Io {
                path: self.id.path.clone(),
                source,
            })?;
            let window_hashes = hashes::compute(&buf);
            if window_hashes.compare(hashes) == crate::hashes::Compare::Match {
                return Ok(Some(offset));
            }
            offset += length;
        }
        Ok(None)
    }

    pub fn is_empty(&self) -> bool {
        self.files.iter().all(|m| !m.alive)
    }

    /// Write staged changes to the backend. A no-op success if the
    /// archive was never modified.
    pub fn commit(&mut self) -> Result<(), ArchiveError> {
        if !self.modified {
            return Ok(());
        }
        self.ensure_writable()?;

        match self.id.kind {
            ArchiveKind::Zip => self.commit_zip()?,
            ArchiveKind::Directory | ArchiveKind::DiskDir => self.commit_directory()?,
            ArchiveKind::SevenZip => return Err(ArchiveError::ReadOnlyBackend(self.id.path.clone())),
        }

        self.modified = false;
        self.cache_dirty = true;
        self.original_count = self.files.iter().filter(|m| m.alive).count();
        self.changes = vec![Change::None; self.files.len()];
        Ok(())
    }

    fn commit_zip(&mut self) -> Result<(), ArchiveError> {
        let tmp_path = self.id.path.with_extension("ckmame-tmp");
        {
            let tmp_file = File::create(&tmp_path).map_err(|source| ArchiveError::Io {
                path: tmp_path.clone(),
                source,
            })?;
            let mut writer = zip::ZipWriter::new(tmp_file);
            let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();

            for (index, member) in self.files.iter().enumerate() {
                if !member.alive {
                    continue;
                }
                let data = self.read_member_bytes(index, member).unwrap_or_default();
                writer
                    .start_file(&member.name, options.clone())
                    .map_err(|_| ArchiveError::CommitFailed(self.id.path.clone()))?;
                writer
                    .write_all(&data)
                    .map_err(|source| ArchiveError::Io {
                        path: tmp_path.clone(),
                        source,
                    })?;
            }
            writer
                .finish()
                .map_err(|_| ArchiveError::CommitFailed(self.id.path.clone()))?;
        }

        fs::rename(&tmp_path, &self.id.path).map_err(|source| ArchiveError::Io {
            path: self.id.path.clone(),
            source,
        })?;
        Ok(())
    }

    fn commit_directory(&mut self) -> Result<(), ArchiveError> {
        let quarantine = self.id.path.join(format!(".ckmame-quarantine-{}", std::process::id()));
        fs::create_dir_all(&quarantine).map_err(|source| ArchiveError::Io {
            path: quarantine.clone(),
            source,
        })?;

        let mut moved: Vec<(PathBuf, PathBuf)> = Vec::new();
        let result = (|| -> Result<(), ArchiveError> {
            // Phase 1: move every surviving on-disk member into quarantine.
            for (index, member) in self.files.iter().enumerate() {
                if index >= self.original_count {
                    continue;
                }
                if let Some(original) = &member.original_name {
                    let src = self.id.path.join(original);
                    if src.exists() {
                        let dst = quarantine.join(format!("{index}"));
                        fs::rename(&src, &dst).map_err(|source| ArchiveError::Io {
                            path: src.clone(),
                            source,
                        })?;
                        moved.push((src, dst));
                    }
                }
            }

            // Phase 2: materialize the final member set from quarantine
            // or staged bytes, under final names.
            for (index, member) in self.files.iter().enumerate() {
                if !member.alive {
                    continue;
                }
                let dst = self.id.path.join(&member.name);
                if index < self.original_count {
                    let quarantined = quarantine.join(format!("{index}"));
                    if quarantined.exists() {
                        fs::rename(&quarantined, &dst).map_err(|source| ArchiveError::Io {
                            path: quarantined.clone(),
                            source,
                        })?;
                        continue;
                    }
                }
                let data = match &self.changes[index] {
                    Change::AddBytes(data) => data.clone(),
                    Change::AddEmpty => Vec::new(),
                    _ => continue,
                };
                fs::write(&dst, &data).map_err(|source| ArchiveError::Io {
                    path: dst.clone(),
                    source,
                })?;
            }
            Ok(())
        })();

        let _ = fs::remove_dir_all(&quarantine);

        if result.is_err() {
            // Best-effort rollback: move anything still in quarantine back.
            for (src, dst) in moved.iter().rev() {
                if dst.exists() {
                    let _ = fs::rename(dst, src);
                }
            }
            return result;
        }
        Ok(())
    }

    /// Discard staged changes, reverting `files`/`changes` to their
    /// pre-mutation state. Only meaningful before `commit`.
    pub fn rollback(&mut self) {
        self.files.truncate(self.original_count);
        for (index, change) in self.changes.iter_mut().enumerate().take(self.original_count) {
            if let Change::Rename | Change::Delete = change {
                if let Some(member) = self.files.get_mut(index) {
                    member.alive = true;
                    if let Some(original) = &member.original_name {
                        member.name = original.clone();
                    }
                }
            }
            *change = Change::None;
        }
        self.changes.truncate(self.original_count);
        self.modified = false;
    }

    pub fn close(&mut self) -> Result<(), ArchiveError> {
        self.commit()
    }
}

fn mtime_of(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn make_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options.clone()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn open_zip_lists_members_with_stable_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.zip");
        make_zip(&path, &[("a.rom", b"hello"), ("b.rom", b"world!")]);

        let id = ArchiveId::new(ArchiveKind::Zip, &path, FileType::Rom);
        let archive = Archive::open(id, ArchiveFlags::default()).unwrap();
        assert_eq!(archive.files().len(), 2);
        assert_eq!(archive.files()[0].name, "a.rom");
        assert_eq!(archive.files()[0].hashes.size, Some(5));
        assert_eq!(archive.files()[1].name, "b.rom");
    }

    #[test]
    fn find_offset_only_considers_aligned_windows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.zip");
        // 8 bytes; the wanted 4-byte content is at [4..8).
        make_zip(&path, &[("a.rom", b"XXXXWXYZ")]);
        let id = ArchiveId::new(ArchiveKind::Zip, &path, FileType::Rom);
        let archive = Archive::open(id, ArchiveFlags::default()).unwrap();
        let wanted = hashes::compute(b"WXYZ");
        let offset = archive.find_offset(0, 4, &wanted).unwrap();
        assert_eq!(offset, Some(4));

        // A length that doesn't evenly divide member size never matches
        // past the final aligned window.
        let wanted2 = hashes::compute(b"XYZ");
        let offset2 = archive.find_offset(0, 3, &wanted2).unwrap();
        assert_eq!(offset2, None);
    }

    #[test]
    fn rename_and_commit_round_trips_members() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.zip");
        make_zip(&path, &[("old.rom", b"data")]);
        let id = ArchiveId::new(ArchiveKind::Zip, &path, FileType::Rom);
        let mut archive = Archive::open(id.clone(), ArchiveFlags::default()).unwrap();
        archive.rename(0, "new.rom").unwrap();
        archive.commit().unwrap();

        let reopened = Archive::open(id, ArchiveFlags::default()).unwrap();
        assert_eq!(reopened.files().len(), 1);
        assert_eq!(reopened.files()[0].name, "new.rom");
    }

    #[test]
    fn delete_then_commit_removes_member() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.zip");
        make_zip(&path, &[("a.rom", b"1"), ("b.rom", b"2")]);
        let id = ArchiveId::new(ArchiveKind::Zip, &path, FileType::Rom);
        let mut archive = Archive::open(id.clone(), ArchiveFlags::default()).unwrap();
        archive.delete(0).unwrap();
        archive.commit().unwrap();

        let reopened = Archive::open(id, ArchiveFlags::default()).unwrap();
        assert_eq!(reopened.files().len(), 1);
        assert_eq!(reopened.files()[0].name, "b.rom");
    }

    #[test]
    fn read_only_archive_rejects_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.zip");
        make_zip(&path, &[("a.rom", b"1")]);
        let id = ArchiveId::new(ArchiveKind::Zip, &path, FileType::Rom);
        let mut archive = Archive::open(
            id,
            ArchiveFlags {
                read_only: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(archive.delete(0).is_err());
    }

    #[test]
    fn directory_backend_add_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g");
        let id = ArchiveId::new(ArchiveKind::Directory, &path, FileType::Rom);
        let mut archive = Archive::open(
            id.clone(),
            ArchiveFlags {
                create: true,
                ..Default::default()
            },
        )
        .unwrap();
        archive.add_empty("empty.rom");
        archive.commit().unwrap();

        let reopened = Archive::open(id, ArchiveFlags::default()).unwrap();
        assert_eq!(reopened.files().len(), 1);
        assert_eq!(reopened.files()[0].name, "empty.rom");
        assert_eq!(reopened.files()[0].hashes.size, Some(0));
    }
}
