//! Per-directory `.ckmame.db` archive-contents cache, per spec §4.C.
//!
//! Grounded on `CkmameDB.cc`/`CkmameDB.h` (original_source) for the
//! exact schema and migration chain, and on the teacher's
//! `database.rs` for rusqlite transaction/statement style.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::archive::FileType;
use crate::error::CacheError;
use crate::hashes::Hashes;

pub const CACHE_FILE_NAME: &str = ".ckmame.db";
const SCHEMA_VERSION: i64 = 4;

/// A detector-key pair identifying which detector a set of
/// `detector_hashes` on a `CachedFile` was computed under, matching
/// the cache's own local detector id (not the engine-wide one).
pub type LocalDetectorId = i64;

#[derive(Clone, Debug)]
pub struct CachedFile {
    pub name: String,
    pub mtime: i64,
    pub broken: bool,
    pub hashes: Hashes,
    pub detector_hashes: HashMap<LocalDetectorId, Hashes>,
}

/// A `(name, version)` detector identity as recorded in the cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DetectorKey {
    pub name: String,
    pub version: String,
}

/// SQLite-backed cache of one directory's archive contents, avoiding
/// re-hashing members whose mtime/size haven't changed since the last
/// run (spec §4.C "Staleness").
pub struct ArchiveCache {
    conn: Connection,
    detector_ids: HashMap<DetectorKey, LocalDetectorId>,
}

impl ArchiveCache {
    pub fn open(directory: impl AsRef<Path>) -> Result<ArchiveCache, CacheError> {
        Self::open_at(directory.as_ref().join(CACHE_FILE_NAME))
    }

    pub fn open_at(db_path: impl Into<PathBuf>) -> Result<ArchiveCache, CacheError> {
        let conn = Connection::open(db_path.into())?;
        let mut cache = ArchiveCache {
            conn,
            detector_ids: HashMap::new(),
        };
        cache.migrate()?;
        cache.load_detector_ids()?;
        Ok(cache)
    }

    fn migrate(&mut self) -> Result<(), CacheError> {
        let current: i64 = self
            .conn
            .query_row("pragma user_version", [], |row| row.get(0))?;

        if current == 0 {
            self.create_fresh_schema()?;
            return Ok(());
        }

        if current > SCHEMA_VERSION {
            return Err(CacheError::SchemaTooNew {
                found: current,
                supported: SCHEMA_VERSION,
            });
        }

        let tx = self.conn.transaction()?;
        if current < 3 {
            tx.execute_batch(
                "create table if not exists detector (
                    detector_id integer primary key autoincrement,
                    name text not null,
                    version text not null
                );
                create index if not exists detector_name_version on detector (name, version);
                alter table file add column detector_id integer not null default 0;
                create index if not exists file_size on file (size);
                create index if not exists file_crc on file (crc);
                create index if not exists file_md5 on file (md5);
                create index if not exists file_sha1 on file (sha1);",
            )?;
        }
        if current < 4 {
            tx.execute_batch(&format!(
                "alter table archive add column file_type integer not null default {rom};
                 update archive set file_type = {disk}
                   where exists (select * from file f
                                 where f.archive_id = archive.archive_id and f.crc is null);",
                rom = filetype_code(FileType::Rom),
                disk = filetype_code(FileType::Disk),
            ))?;
        }
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tx.commit()?;
        Ok(())
    }

    fn create_fresh_schema(&mut self) -> Result<(), CacheError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "create table archive (
                archive_id integer primary key autoincrement,
                name text not null,
                mtime integer not null,
                size integer not null,
                file_type integer not null
            );
            create index archive_name on archive (name);
            create table detector (
                detector_id integer primary key autoincrement,
                name text not null,
                version text not null
            );
            create index detector_name_version on detector (name, version);
            create table file (
                archive_id integer not null,
                file_idx integer,
                name text not null,
                mtime integer not null,
                status integer not null,
                size integer not null,
                crc integer,
                md5 blob,
                sha1 blob,
                detector_id integer not null default 0
            );
            create index file_archive_id on file (archive_id);
            create index file_idx on file (file_idx);
            create index file_size on file (size);
            create index file_crc on file (crc);
            create index file_md5 on file (md5);
            create index file_sha1 on file (sha1);",
        )?;
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tx.commit()?;
        Ok(())
    }

    fn load_detector_ids(&mut self) -> Result<(), CacheError> {
        let mut stmt = self
            .conn
            .prepare("select detector_id, name, version from detector")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                DetectorKey {
                    name: row.get(1)?,
                    version: row.get(2)?,
                },
            ))
        })?;
        for row in rows {
            let (id, key) = row?;
            self.detector_ids.insert(key, id);
        }
        Ok(())
    }

    pub fn local_detector_id(&mut self, key: &DetectorKey) -> Result<LocalDetectorId, CacheError> {
        if let Some(id) = self.detector_ids.get(key) {
            return Ok(*id);
        }
        self.conn.execute(
            "insert into detector (name, version) values (?1, ?2)",
            params![key.name, key.version],
        )?;
        let id = self.conn.last_insert_rowid();
        self.detector_ids.insert(key.clone(), id);
        Ok(id)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        let exists: Option<i64> = self
            .conn
            .query_row("select archive_id from archive limit 1", [], |row| row.get(0))
            .optional()?;
        Ok(exists.is_none())
    }

    pub fn list_archives(&self) -> Result<Vec<(String, FileType)>, CacheError> {
        let mut stmt = self.conn.prepare("select name, file_type from archive")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (name, code) = row?;
            out.push((name, filetype_from_code(code)));
        }
        Ok(out)
    }

    /// Archive-level staleness check (spec §4.C): does the cached
    /// `(mtime, size)` for `name`/`filetype` still match what's on the
    /// filesystem? `false` for both a never-cached archive and a
    /// directory-as-archive (`is_directory`) entry, whose stored size
    /// is always 0 and whose directory mtime doesn't propagate through
    /// member changes — per spec, such archives are "always
    /// re-enumerated and re-compared to the cached list" rather than
    /// trusted from an mtime/size match alone.
    pub fn is_up_to_date(
        &self,
        name: &str,
        filetype: FileType,
        is_directory: bool,
        fs_mtime: i64,
        fs_size: u64,
    ) -> Result<bool, CacheError> {
        if is_directory {
            return Ok(false);
        }
        let row: Option<(i64, i64)> = self
            .conn
            .query_row(
                "select mtime, size from archive where name = ?1 and file_type = ?2",
                params![name, filetype_code(filetype)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(matches!(row, Some((mtime, size)) if mtime == fs_mtime && size as u64 == fs_size))
    }

    pub fn get_archive_id(&self, name: &str, filetype: FileType) -> Result<Option<i64>, CacheError> {
        self.conn
            .query_row(
                "select archive_id from archive where name = ?1 and file_type = ?2",
                params![name, filetype_code(filetype)],
                |row| row.get(0),
            )
            .optional()
            .map_err(CacheError::from)
    }

    pub fn delete_archive(&self, id: i64) -> Result<(), CacheError> {
        self.conn.execute("delete from file where archive_id = ?1", params![id])?;
        self.conn.execute("delete from archive where archive_id = ?1", params![id])?;
        Ok(())
    }

    /// Replace the stored contents of one archive (by name + filetype)
    /// with `files`, under a single transaction.
    pub fn write_archive(
        &mut self,
        name: &str,
        filetype: FileType,
        mtime: i64,
        size: u64,
        files: &[CachedFile],
    ) -> Result<i64, CacheError> {
        let existing = self.get_archive_id(name, filetype)?;
        let tx = self.conn.transaction()?;

        if let Some(id) = existing {
            tx.execute("delete from file where archive_id = ?1", params![id])?;
            tx.execute("delete from archive where archive_id = ?1", params![id])?;
        }

        tx.execute(
            "insert into archive (name, file_type, mtime, size) values (?1, ?2, ?3, ?4)",
            params![name, filetype_code(filetype), mtime, size as i64],
        )?;
        let archive_id = tx.last_insert_rowid();

        for (index, file) in files.iter().enumerate() {
            tx.execute(
                "insert into file (archive_id, file_idx, detector_id, name, mtime, status, size, crc, md5, sha1)
                 values (?1, ?2, 0, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    archive_id,
                    index as i64,
                    file.name,
                    file.mtime,
                    file.broken as i64,
                    file.hashes.size.map(|s| s as i64),
                    file.hashes.crc32.map(|c| c as i64),
                    file.hashes.md5.map(|m| m.to_vec()),
                    file.hashes.sha1.map(|s| s.to_vec()),
                ],
            )?;

            for (detector_id, hashes) in &file.detector_hashes {
                tx.execute(
                    "insert into file (archive_id, file_idx, detector_id, name, mtime, status, size, crc, md5, sha1)
                     values (?1, ?2, ?3, '', 0, 0, ?4, ?5, ?6, ?7)",
                    params![
                        archive_id,
                        index as i64,
                        detector_id,
                        hashes.size.map(|s| s as i64),
                        hashes.crc32.map(|c| c as i64),
                        hashes.md5.map(|m| m.to_vec()),
                        hashes.sha1.map(|s| s.to_vec()),
                    ],
                )?;
            }
        }

        tx.commit()?;
        Ok(archive_id)
    }

    pub fn read_files(&self, archive_id: i64) -> Result<Vec<CachedFile>, CacheError> {
        let mut stmt = self.conn.prepare(
            "select file_idx, detector_id, name, mtime, status, size, crc, md5, sha1
             from file where archive_id = ?1 order by file_idx, detector_id",
        )?;
        let mut files: Vec<CachedFile> = Vec::new();
        let rows = stmt.query_map(params![archive_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, Option<i64>>(6)?,
                row.get::<_, Option<Vec<u8>>>(7)?,
                row.get::<_, Option<Vec<u8>>>(8)?,
            ))
        })?;

        for row in rows {
            let (file_idx, detector_id, name, mtime, status, size, crc, md5, sha1) = row?;
            let hashes = Hashes {
                size: size.map(|s| s as u64),
                crc32: crc.map(|c| c as u32),
                md5: md5.and_then(|v| v.try_into().ok()),
                sha1: sha1.and_then(|v| v.try_into().ok()),
            };

            if detector_id == 0 {
                files.push(CachedFile {
                    name,
                    mtime,
                    broken: status != 0,
                    hashes,
                    detector_hashes: HashMap::new(),
                });
            } else if let Some(file) = files.get_mut(file_idx as usize) {
                file.detector_hashes.insert(detector_id, hashes);
            }
        }

        Ok(files)
    }
}

fn filetype_code(filetype: FileType) -> i64 {
    match filetype {
        FileType::Rom => 0,
        FileType::Disk => 1,
    }
}

fn filetype_from_code(code: i64) -> FileType {
    match code {
        1 => FileType::Disk,
        _ => FileType::Rom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cache_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArchiveCache::open(dir.path()).unwrap();
        assert!(cache.is_empty().unwrap());
        assert!(cache.list_archives().unwrap().is_empty());
    }

    #[test]
    fn write_then_read_round_trips_members() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ArchiveCache::open(dir.path()).unwrap();

        let files = vec![CachedFile {
            name: "a.rom".to_string(),
            mtime: 1234,
            broken: false,
            hashes: Hashes {
                size: Some(4),
                crc32: Some(0xdead_beef),
                md5: Some([1u8; 16]),
                sha1: Some([2u8; 20]),
            },
            detector_hashes: HashMap::new(),
        }];

        let id = cache
            .write_archive("sub.zip", FileType::Rom, 1000, 4, &files)
            .unwrap();
        assert!(id > 0);

        let read_back = cache.read_files(id).unwrap();
        assert_eq!(read_back.len(), 1);
        assert_eq!(read_back[0].name, "a.rom");
        assert_eq!(read_back[0].hashes.crc32, Some(0xdead_beef));
    }

    #[test]
    fn rewriting_an_archive_replaces_its_old_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ArchiveCache::open(dir.path()).unwrap();

        let first = vec![CachedFile {
            name: "old.rom".to_string(),
            mtime: 1,
            broken: false,
            hashes: Hashes::with_size(1),
            detector_hashes: HashMap::new(),
        }];
        cache.write_archive("g.zip", FileType::Rom, 1, 1, &first).unwrap();

        let second = vec![CachedFile {
            name: "new.rom".to_string(),
            mtime: 2,
            broken: false,
            hashes: Hashes::with_size(2),
            detector_hashes: HashMap::new(),
        }];
        let id = cache.write_archive("g.zip", FileType::Rom, 2, 2, &second).unwrap();

        let files = cache.read_files(id).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "new.rom");
        assert_eq!(cache.list_archives().unwrap().len(), 1);
    }

    #[test]
    fn is_up_to_date_checks_archive_level_mtime_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ArchiveCache::open(dir.path()).unwrap();
        cache.write_archive("g.zip", FileType::Rom, 1000, 4, &[]).unwrap();

        assert!(cache.is_up_to_date("g.zip", FileType::Rom, false, 1000, 4).unwrap());
        assert!(!cache.is_up_to_date("g.zip", FileType::Rom, false, 1001, 4).unwrap());
        assert!(!cache.is_up_to_date("g.zip", FileType::Rom, false, 1000, 5).unwrap());
        assert!(!cache.is_up_to_date("missing.zip", FileType::Rom, false, 1000, 4).unwrap());

        // A directory-as-archive entry is never considered up to date:
        // its stored size is always 0 and its mtime doesn't propagate
        // through member changes, so it must always be re-enumerated.
        assert!(!cache.is_up_to_date("g.zip", FileType::Rom, true, 1000, 4).unwrap());
    }

    #[test]
    fn detector_ids_are_stable_across_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ArchiveCache::open(dir.path()).unwrap();
        let key = DetectorKey {
            name: "nes".to_string(),
            version: "1".to_string(),
        };
        let id1 = cache.local_detector_id(&key).unwrap();
        let id2 = cache.local_detector_id(&key).unwrap();
        assert_eq!(id1, id2);
    }
}
