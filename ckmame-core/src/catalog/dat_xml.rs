//! Minimal DAT-XML catalog reader.
//!
//! Grounded on the teacher's `xml_parser::parse_file` +
//! `models::{DataFile, Header, Game, Rom}` (`quick_xml::de::from_reader`),
//! extended with `cloneof`/`romof` attributes and `<disk>` entries the
//! teacher's model never carried.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::catalog::{Catalog, DatHeader, Disk, Game, Rom, RomStatus};
use crate::error::CatalogError;

#[derive(Clone, Debug, Deserialize)]
struct XmlDataFile {
    header: XmlHeader,
    #[serde(rename = "game", default)]
    games: Vec<XmlGame>,
}

#[derive(Clone, Debug, Deserialize)]
struct XmlHeader {
    name: String,
    description: String,
    #[serde(default)]
    version: String,
}

#[derive(Clone, Debug, Deserialize)]
struct XmlGame {
    #[serde(rename = "@name")]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "@cloneof", default)]
    cloneof: Option<String>,
    #[serde(rename = "@romof", default)]
    romof: Option<String>,
    #[serde(rename = "rom", default)]
    roms: Vec<XmlRom>,
    #[serde(rename = "disk", default)]
    disks: Vec<XmlDisk>,
}

#[derive(Clone, Debug, Deserialize)]
struct XmlRom {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@size", default)]
    size: Option<u64>,
    #[serde(rename = "@crc", default)]
    crc: Option<String>,
    #[serde(rename = "@md5", default)]
    md5: Option<String>,
    #[serde(rename = "@sha1", default)]
    sha1: Option<String>,
    #[serde(rename = "@status", default)]
    status: Option<String>,
    #[serde(rename = "@mia", default)]
    mia: Option<String>,
    #[serde(rename = "@merge", default)]
    merge: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct XmlDisk {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@md5", default)]
    md5: Option<String>,
    #[serde(rename = "@sha1", default)]
    sha1: Option<String>,
    #[serde(rename = "@status", default)]
    status: Option<String>,
    #[serde(rename = "@merge", default)]
    merge: Option<String>,
}

fn parse_status(raw: Option<&str>) -> RomStatus {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("baddump") => RomStatus::BadDump,
        Some("nodump") => RomStatus::NoDump,
        _ => RomStatus::Ok,
    }
}

fn parse_bool(raw: Option<&str>) -> bool {
    matches!(raw, Some("yes") | Some("true"))
}

pub fn parse_path(path: &Path) -> Result<Catalog, CatalogError> {
    let file = File::open(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let xml: XmlDataFile =
        quick_xml::de::from_reader(BufReader::new(file)).map_err(|source| CatalogError::Xml {
            path: path.to_path_buf(),
            source,
        })?;
    from_xml(xml)
}

fn from_xml(xml: XmlDataFile) -> Result<Catalog, CatalogError> {
    let header = DatHeader {
        name: xml.header.name,
        description: xml.header.description,
        version: xml.header.version,
    };

    let mut games = Vec::with_capacity(xml.games.len());
    for g in xml.games {
        // A merged name resolves against the nearest ancestor the game
        // declares: `cloneof` (parent) takes precedence over `romof`
        // (grandparent/BIOS set), matching the original's clone chain
        // (spec §4.E).
        let merge_where = if g.cloneof.is_some() {
            crate::catalog::Where::Parent
        } else if g.romof.is_some() {
            crate::catalog::Where::Grandparent
        } else {
            crate::catalog::Where::Game
        };

        let mut roms = Vec::with_capacity(g.roms.len());
        for r in g.roms {
            let mut hashes = crate::hashes::Hashes::with_size(r.size.unwrap_or(0));
            if let Some(crc) = &r.crc {
                hashes.set_from_hex(crc)?;
            }
            if let Some(md5) = &r.md5 {
                hashes.set_from_hex(md5)?;
            }
            if let Some(sha1) = &r.sha1 {
                hashes.set_from_hex(sha1)?;
            }
            let where_ = if r.merge.is_some() { merge_where } else { crate::catalog::Where::Game };
            roms.push(Rom {
                name: r.name,
                hashes,
                status: parse_status(r.status.as_deref()),
                mia: parse_bool(r.mia.as_deref()),
                merge_name: r.merge,
                where_,
            });
        }

        let mut disks = Vec::with_capacity(g.disks.len());
        for d in g.disks {
            let mut md5 = None;
            let mut sha1 = None;
            if let Some(raw) = &d.md5 {
                let mut h = crate::hashes::Hashes::new();
                h.set_from_hex(raw)?;
                md5 = h.md5;
            }
            if let Some(raw) = &d.sha1 {
                let mut h = crate::hashes::Hashes::new();
                h.set_from_hex(raw)?;
                sha1 = h.sha1;
            }
            let where_ = if d.merge.is_some() { merge_where } else { crate::catalog::Where::Game };
            disks.push(Disk {
                name: d.name,
                sha1,
                md5,
                status: parse_status(d.status.as_deref()),
                merge_name: d.merge,
                where_,
            });
        }

        games.push(Game {
            name: g.name,
            description: g.description,
            category: None,
            parent_name: g.cloneof,
            grandparent_name: g.romof,
            roms,
            disks,
        });
    }

    Catalog::new(header, games)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<datafile>
  <header>
    <name>Test Set</name>
    <description>A test catalog</description>
    <version>20260101</version>
  </header>
  <game name="base">
    <description>Base Game</description>
    <rom name="base.rom" size="4" crc="12345678"/>
  </game>
  <game name="clone" cloneof="base">
    <description>Clone Game</description>
    <rom name="clone.rom" size="4" crc="87654321" merge="base.rom"/>
  </game>
</datafile>
"#;

    #[test]
    fn parses_header_and_games_with_cloneof() {
        let xml: XmlDataFile = quick_xml::de::from_str(SAMPLE).unwrap();
        let catalog = from_xml(xml).unwrap();
        assert_eq!(catalog.header.name, "Test Set");
        assert_eq!(catalog.games.len(), 2);

        let clone = catalog.game("clone").unwrap();
        assert_eq!(clone.parent_name.as_deref(), Some("base"));
        assert_eq!(clone.roms[0].merge_name.as_deref(), Some("base.rom"));

        let base = catalog.game("base").unwrap();
        assert_eq!(base.roms[0].hashes.crc32_hex().unwrap(), "12345678");
    }
}
