//! Read-only 7z listing/extraction via a system `7z`/`7za` binary.
//!
//! Grounded on the `igir` example's `scan_7z_entries`/
//! `extract_7z_to_temp_and_scan` (no native 7z crate is reachable from
//! this corpus, so shelling out to the real tool -- found with `which`
//! -- is the idiomatic approach used there too).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ArchiveError;

pub fn find_tool() -> Result<PathBuf, ArchiveError> {
    which::which("7z")
        .or_else(|_| which::which("7za"))
        .map_err(|_| ArchiveError::SevenZipToolMissing)
}

/// List member names inside a 7z archive, in archive order as best as
/// can be recovered from `7z l` output.
pub fn list_entries(exe: &Path, archive_path: &Path) -> Result<Vec<String>, ArchiveError> {
    let output = Command::new(exe)
        .arg("l")
        .arg(archive_path.as_os_str())
        .output()
        .map_err(|source| ArchiveError::Io {
            path: archive_path.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        return Err(ArchiveError::Corrupt(archive_path.to_path_buf()));
    }

    let text = String::from_utf8_lossy(&output.stdout).to_string();
    let mut names: Vec<String> = Vec::new();
    let mut seen = HashSet::new();

    if let Some(header_line) = text.lines().find(|l| l.contains("Name")) {
        if let Some(name_idx) = header_line.find("Name") {
            let mut in_table = false;
            for line in text.lines() {
                if !in_table {
                    if line.trim_start().starts_with("----") {
                        in_table = true;
                    }
                    continue;
                }
                if line.trim_start().starts_with("----") {
                    break;
                }
                if line.contains("Name") && line.contains("Size") {
                    continue;
                }
                if line.len() > name_idx {
                    let name = line[name_idx..].trim().to_string();
                    if !name.is_empty() && seen.insert(name.clone()) {
                        names.push(name);
                    }
                }
            }
        }
    }

    Ok(names)
}

/// Extract the whole archive to a temp directory and return
/// `(relative_path, absolute_path)` for every regular file found.
pub fn extract_all(
    exe: &Path,
    archive_path: &Path,
) -> Result<(tempfile::TempDir, Vec<(PathBuf, PathBuf)>), ArchiveError> {
    let tmp = tempfile::tempdir().map_err(|source| ArchiveError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;

    let status = Command::new(exe)
        .arg("x")
        .arg(archive_path.as_os_str())
        .arg(format!("-o{}", tmp.path().to_string_lossy()))
        .arg("-y")
        .status()
        .map_err(|source| ArchiveError::Io {
            path: archive_path.to_path_buf(),
            source,
        })?;

    if !status.success() {
        return Err(ArchiveError::Corrupt(archive_path.to_path_buf()));
    }

    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(tmp.path())
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let abs = entry.into_path();
        let rel = abs
            .strip_prefix(tmp.path())
            .unwrap_or(&abs)
            .to_path_buf();
        out.push((rel, abs));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));

    Ok((tmp, out))
}
