//! Typed error taxonomy for the engine library, per spec §7.
//!
//! Library code returns these; the CLI binary wraps them with
//! `anyhow::Context` the way the teacher's `main.rs`/`file_commands.rs` do.

use std::path::PathBuf;

use thiserror::Error;

use crate::hashes::HashesError;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("malformed catalog: {0}")]
    Format(String),
    #[error("duplicate game {0:?} in catalog")]
    DuplicateGame(String),
    #[error("game {0:?} references unknown parent {1:?}")]
    UnknownParent(String, String),
    #[error("detector referenced by catalog was not supplied")]
    DetectorMissing,
    #[error(transparent)]
    InvalidFingerprint(#[from] HashesError),
    #[error("xml error reading {path:?}: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: quick_xml::DeError,
    },
    #[error("io error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io error on archive {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("archive {0:?} is corrupt")]
    Corrupt(PathBuf),
    #[error("archive {0:?} is read-only")]
    ReadOnly(PathBuf),
    #[error("backend for archive {0:?} does not support writes")]
    ReadOnlyBackend(PathBuf),
    #[error("member index {0} out of range")]
    NoSuchMember(usize),
    #[error("no member named {0:?}")]
    NoSuchName(String),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("external 7z tool not found on PATH")]
    SevenZipToolMissing,
    #[error("commit failed for archive {0:?}, rolled back")]
    CommitFailed(PathBuf),
}

impl From<std::io::Error> for ArchiveError {
    fn from(source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cache schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::DeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("rule has no tests")]
    EmptyRule,
}

#[derive(Debug, Error)]
pub enum ChdError {
    #[error("not a CHD file (bad tag)")]
    BadTag,
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("unsupported CHD version {0}")]
    UnsupportedVersion(u32),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
}
