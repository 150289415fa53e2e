//! Parsed DAT catalog model, per spec §4.E.
//!
//! Grounded on the teacher's `models::{DataFile, Header, Game, Rom}`,
//! generalized with parent/grandparent relationships, disks, and the
//! full `RomStatus` the original's `Rom.h`/`File.h` carry.

pub mod dat_xml;

use std::collections::HashMap;

use crate::error::CatalogError;
use crate::hashes::Hashes;

#[derive(Clone, Debug, Default)]
pub struct DatHeader {
    pub name: String,
    pub description: String,
    pub version: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RomStatus {
    Ok,
    BadDump,
    NoDump,
}

impl Default for RomStatus {
    fn default() -> Self {
        RomStatus::Ok
    }
}

/// Which generation of a family a merged rom/disk name resolves
/// against (spec §4.E).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Where {
    Game,
    Parent,
    Grandparent,
}

impl Default for Where {
    fn default() -> Self {
        Where::Game
    }
}

#[derive(Clone, Debug)]
pub struct Rom {
    pub name: String,
    pub hashes: Hashes,
    pub status: RomStatus,
    pub mia: bool,
    /// Name to look the content up under in an ancestor archive, if
    /// this rom is merged (`None` means `name` itself).
    pub merge_name: Option<String>,
    /// Which generation's archive `merge_name` resolves against
    /// (spec §3/§4.H); `Where::Game` when the rom isn't merged.
    pub where_: Where,
}

#[derive(Clone, Debug)]
pub struct Disk {
    pub name: String,
    pub sha1: Option<[u8; 20]>,
    pub md5: Option<[u8; 16]>,
    pub status: RomStatus,
    pub merge_name: Option<String>,
    pub where_: Where,
}

#[derive(Clone, Debug)]
pub struct Game {
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub parent_name: Option<String>,
    pub grandparent_name: Option<String>,
    pub roms: Vec<Rom>,
    pub disks: Vec<Disk>,
}

impl Game {
    pub fn is_required_rom_present(&self) -> bool {
        !self.roms.is_empty() || !self.disks.is_empty()
    }
}

/// A fully parsed catalog: header, games in declaration order, and a
/// name index. Names are stored as plain strings, never indices or
/// pointers — `Tree`/`Matcher` resolve names to archives at match time.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub header: DatHeader,
    pub games: Vec<Game>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(header: DatHeader, games: Vec<Game>) -> Result<Catalog, CatalogError> {
        let mut by_name = HashMap::with_capacity(games.len());
        for (index, game) in games.iter().enumerate() {
            if by_name.insert(game.name.clone(), index).is_some() {
                return Err(CatalogError::DuplicateGame(game.name.clone()));
            }
        }
        for game in &games {
            if let Some(parent) = &game.parent_name {
                if !by_name.contains_key(parent) {
                    return Err(CatalogError::UnknownParent(game.name.clone(), parent.clone()));
                }
            }
            if let Some(grandparent) = &game.grandparent_name {
                if !by_name.contains_key(grandparent) {
                    return Err(CatalogError::UnknownParent(game.name.clone(), grandparent.clone()));
                }
            }
        }
        Ok(Catalog { header, games, by_name })
    }

    pub fn game(&self, name: &str) -> Option<&Game> {
        self.by_name.get(name).map(|&i| &self.games[i])
    }

    pub fn parent_of(&self, game: &Game) -> Option<&Game> {
        game.parent_name.as_deref().and_then(|name| self.game(name))
    }

    pub fn grandparent_of(&self, game: &Game) -> Option<&Game> {
        game.grandparent_name.as_deref().and_then(|name| self.game(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(name: &str, parent: Option<&str>) -> Game {
        Game {
            name: name.to_string(),
            description: String::new(),
            category: None,
            parent_name: parent.map(str::to_string),
            grandparent_name: None,
            roms: Vec::new(),
            disks: Vec::new(),
        }
    }

    #[test]
    fn rejects_duplicate_game_names() {
        let games = vec![game("a", None), game("a", None)];
        let err = Catalog::new(DatHeader::default(), games).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateGame(_)));
    }

    #[test]
    fn rejects_unknown_parent() {
        let games = vec![game("clone", Some("missing"))];
        let err = Catalog::new(DatHeader::default(), games).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownParent(_, _)));
    }

    #[test]
    fn resolves_parent_by_name() {
        let games = vec![game("base", None), game("clone", Some("base"))];
        let catalog = Catalog::new(DatHeader::default(), games).unwrap();
        let clone = catalog.game("clone").unwrap();
        let parent = catalog.parent_of(clone).unwrap();
        assert_eq!(parent.name, "base");
    }
}
