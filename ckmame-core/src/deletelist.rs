//! Deferred cleanup of superfluous archive members, per spec §4.K.
//!
//! Grounded on `DeleteList.h`/`DeleteList.cc` (original_source)'s
//! `Mark`/rollback-on-failure pattern, re-expressed as an explicit
//! mark/rollback pair instead of the original's weak-ref RAII (no
//! weak-ref backing is needed per spec §9).

use std::collections::HashSet;

use crate::archive::{Archive, ArchiveId};
use crate::error::ArchiveError;
use crate::index::MemoryIndex;

/// `(archive, member_index)` entries queued for deletion, plus archive
/// identities to check for emptiness once their deletes land.
#[derive(Default)]
pub struct DeleteList {
    archives: Vec<ArchiveId>,
    entries: Vec<(ArchiveId, usize)>,
}

impl DeleteList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_archive_for_emptiness_check(&mut self, archive: ArchiveId) {
        if !self.archives.contains(&archive) {
            self.archives.push(archive);
        }
    }

    pub fn queue_delete(&mut self, archive: ArchiveId, member_index: usize) {
        self.entries.push((archive, member_index));
    }

    /// A rollback point: discard every entry/archive queued after this
    /// mark (used when a game's repair plan fails partway through and
    /// must not leave stray delete-list entries behind).
    pub fn mark(&self) -> (usize, usize) {
        (self.archives.len(), self.entries.len())
    }

    pub fn rollback_to(&mut self, mark: (usize, usize)) {
        self.archives.truncate(mark.0);
        self.entries.truncate(mark.1);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.archives.is_empty()
    }

    /// Apply every queued delete, batched per archive, then remove any
    /// archive left with zero surviving members from disk and from
    /// `index`. Members previously marked `broken` are deleted too;
    /// the caller is responsible for never queuing a `PartUsed`
    /// member (the matcher tracks that by simply not queuing it).
    pub fn sweep<F>(&mut self, index: &mut MemoryIndex, mut open: F) -> Result<(), ArchiveError>
    where
        F: FnMut(&ArchiveId) -> Result<Archive, ArchiveError>,
    {
        let mut by_archive: Vec<ArchiveId> = Vec::new();
        for (archive, _) in &self.entries {
            if !by_archive.contains(archive) {
                by_archive.push(archive.clone());
            }
        }

        for archive_id in &by_archive {
            let mut archive = open(archive_id)?;
            let indices: HashSet<usize> = self
                .entries
                .iter()
                .filter(|(a, _)| a == archive_id)
                .map(|(_, i)| *i)
                .collect();
            for member_index in indices {
                archive.delete(member_index)?;
            }
            archive.commit()?;
            if archive.is_empty() {
                self.queue_archive_for_emptiness_check(archive_id.clone());
            }
        }

        for archive_id in &self.archives {
            let archive = open(archive_id)?;
            if archive.is_empty() {
                let _ = std::fs::remove_file(&archive_id.path);
                let _ = std::fs::remove_dir(&archive_id.path);
                index.remove_archive(archive_id);
            }
        }

        self.entries.clear();
        self.archives.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveFlags, ArchiveKind, FileType};
    use std::io::Write;

    fn make_zip(path: &std::path::Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options.clone()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn sweep_deletes_queued_members_and_removes_empty_archives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.zip");
        make_zip(&path, &[("junk.rom", b"x")]);
        let id = ArchiveId::new(ArchiveKind::Zip, &path, FileType::Rom);

        let mut list = DeleteList::new();
        list.queue_delete(id.clone(), 0);

        let mut index = MemoryIndex::new();
        list.sweep(&mut index, |aid| Archive::open(aid.clone(), ArchiveFlags::default()))
            .unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn mark_and_rollback_discards_later_entries() {
        let id = ArchiveId::new(ArchiveKind::Zip, "g.zip", FileType::Rom);
        let mut list = DeleteList::new();
        let mark = list.mark();
        list.queue_delete(id, 0);
        assert!(!list.is_empty());
        list.rollback_to(mark);
        assert!(list.is_empty());
    }
}
