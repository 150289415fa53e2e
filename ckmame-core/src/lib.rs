//! Verification and repair engine for ROM collections described by
//! clrmamepro-style DAT catalogs.
//!
//! Each module is grounded on a piece of the original ckmame's
//! architecture (see each module's header and `DESIGN.md`), rebuilt
//! around a tagged-variant `Archive` and a process-wide `ArchiveId`
//! instead of the original's `shared_ptr`/cache-object graph.

pub mod archive;
pub mod cache;
pub mod catalog;
pub mod chd;
pub mod config;
pub mod deletelist;
pub mod detector;
pub mod engine;
pub mod error;
pub mod finder;
pub mod hashes;
pub mod index;
pub mod matcher;
pub mod planner;
pub mod tree;

pub use config::EngineConfig;
pub use engine::{DiagnosticRecord, Engine, GameResult, RunReport};
pub use error::EngineError;
