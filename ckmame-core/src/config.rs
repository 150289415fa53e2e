//! Engine configuration, per spec §6 and the original's
//! `Configuration.h`/`Commandline.h`.
//!
//! Grounded on the teacher's `Cli`/`StorageMode` clap-derived options
//! (`main.rs`); loaded from an optional TOML file and merged with
//! CLI-provided overrides, CLI taking precedence, matching the
//! `toml`-based settings layer used elsewhere in the pack (e.g.
//! `retro-junk-lib::settings`).

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::CacheError;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub romset_root: PathBuf,
    pub extra_roots: Vec<PathBuf>,
    pub needed_dir: PathBuf,
    pub unknown_dir: PathBuf,
    pub old_catalog: Option<PathBuf>,
    pub read_only: bool,
    pub move_from_extra: bool,
    pub keep_duplicates: bool,
    pub nodump_counts_as_missing: bool,
    pub have_toplevel_disks: bool,
    /// When true, each game's roms live as loose files under
    /// `<romset_root>/<game>/` instead of `<romset_root>/<game>.zip`
    /// (spec §6 "unpacked mode"). Mirrors the original's
    /// `--unpacked`/`db-unpacked` knob.
    pub unpacked: bool,
    pub delete_unknown_patterns: Vec<glob::Pattern>,
    /// Bound on concurrently open archive backend handles (spec §5's
    /// "bounded fd budget"; not stated as a fixed number in the
    /// original, which never surfaces a knob for it — picked a
    /// generous default here, see DESIGN.md).
    pub max_open_archives: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            romset_root: PathBuf::from("."),
            extra_roots: Vec::new(),
            needed_dir: PathBuf::from("needed"),
            unknown_dir: PathBuf::from("unknown"),
            old_catalog: None,
            read_only: false,
            move_from_extra: false,
            keep_duplicates: false,
            nodump_counts_as_missing: false,
            have_toplevel_disks: false,
            unpacked: false,
            delete_unknown_patterns: Vec::new(),
            max_open_archives: 64,
        }
    }
}

/// Raw TOML shape; every field optional so a config file can specify
/// just the parts it cares about.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TomlConfig {
    pub romset_root: Option<PathBuf>,
    #[serde(default)]
    pub extra_roots: Vec<PathBuf>,
    pub needed_dir: Option<PathBuf>,
    pub unknown_dir: Option<PathBuf>,
    pub old_catalog: Option<PathBuf>,
    pub read_only: Option<bool>,
    pub move_from_extra: Option<bool>,
    pub keep_duplicates: Option<bool>,
    pub nodump_counts_as_missing: Option<bool>,
    pub have_toplevel_disks: Option<bool>,
    pub unpacked: Option<bool>,
    #[serde(default)]
    pub delete_unknown_patterns: Vec<String>,
    pub max_open_archives: Option<usize>,
}

impl TomlConfig {
    pub fn parse(text: &str) -> Result<TomlConfig, toml::de::Error> {
        toml::from_str(text)
    }

    /// Merge this file-sourced config onto `base`, only overwriting
    /// fields that were actually present in the file.
    pub fn apply_onto(self, mut base: EngineConfig) -> Result<EngineConfig, CacheError> {
        if let Some(v) = self.romset_root {
            base.romset_root = v;
        }
        if !self.extra_roots.is_empty() {
            base.extra_roots = self.extra_roots;
        }
        if let Some(v) = self.needed_dir {
            base.needed_dir = v;
        }
        if let Some(v) = self.unknown_dir {
            base.unknown_dir = v;
        }
        if self.old_catalog.is_some() {
            base.old_catalog = self.old_catalog;
        }
        if let Some(v) = self.read_only {
            base.read_only = v;
        }
        if let Some(v) = self.move_from_extra {
            base.move_from_extra = v;
        }
        if let Some(v) = self.keep_duplicates {
            base.keep_duplicates = v;
        }
        if let Some(v) = self.nodump_counts_as_missing {
            base.nodump_counts_as_missing = v;
        }
        if let Some(v) = self.have_toplevel_disks {
            base.have_toplevel_disks = v;
        }
        if let Some(v) = self.unpacked {
            base.unpacked = v;
        }
        if !self.delete_unknown_patterns.is_empty() {
            base.delete_unknown_patterns = self
                .delete_unknown_patterns
                .iter()
                .filter_map(|p| glob::Pattern::new(p).ok())
                .collect();
        }
        if let Some(v) = self.max_open_archives {
            base.max_open_archives = v;
        }
        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_config_only_overrides_present_fields() {
        let toml = TomlConfig::parse(
            r#"
            read-only = true
            keep-duplicates = true
            "#,
        )
        .unwrap();
        let merged = toml.apply_onto(EngineConfig::default()).unwrap();
        assert!(merged.read_only);
        assert!(merged.keep_duplicates);
        assert_eq!(merged.needed_dir, PathBuf::from("needed"));
    }

    #[test]
    fn delete_unknown_patterns_compile_to_glob_patterns() {
        let toml = TomlConfig::parse(r#"delete-unknown-patterns = ["*.txt", "*.nfo"]"#).unwrap();
        let merged = toml.apply_onto(EngineConfig::default()).unwrap();
        assert_eq!(merged.delete_unknown_patterns.len(), 2);
        assert!(merged.delete_unknown_patterns[0].matches("readme.txt"));
    }
}
