//! Ancestor-before-descendant game ordering, per spec §4.J.
//!
//! Grounded on `Tree.h`/`Tree.cc` (original_source): a multi-root
//! `name -> children` map built by inserting each target game after
//! its ancestors, walked pre-order so a child's matcher call can treat
//! its parent's archive as already repaired.

use std::collections::{HashMap, HashSet};

use crate::catalog::Catalog;

#[derive(Default)]
pub struct Tree {
    children: HashMap<String, Vec<String>>,
    roots: Vec<String>,
}

impl Tree {
    /// Build the traversal tree for every game in `catalog`, ordering
    /// children after all of their ancestors.
    pub fn build(catalog: &Catalog) -> Tree {
        let mut tree = Tree::default();
        let mut inserted = HashSet::new();

        for game in &catalog.games {
            tree.insert_with_ancestors(catalog, &game.name, &mut inserted);
        }
        tree
    }

    fn insert_with_ancestors(&mut self, catalog: &Catalog, name: &str, inserted: &mut HashSet<String>) {
        if inserted.contains(name) {
            return;
        }

        let game = match catalog.game(name) {
            Some(g) => g,
            None => return,
        };

        match &game.parent_name {
            Some(parent) => {
                self.insert_with_ancestors(catalog, parent, inserted);
                self.children.entry(parent.clone()).or_default().push(name.to_string());
            }
            None => {
                self.roots.push(name.to_string());
            }
        }

        inserted.insert(name.to_string());
    }

    /// Pre-order traversal: every parent before its descendants.
    pub fn walk(&self) -> Vec<String> {
        let mut order = Vec::new();
        for root in &self.roots {
            self.walk_from(root, &mut order);
        }
        order
    }

    fn walk_from(&self, name: &str, order: &mut Vec<String>) {
        order.push(name.to_string());
        if let Some(children) = self.children.get(name) {
            for child in children {
                self.walk_from(child, order);
            }
        }
    }
}

/// Tracks which games need a second look because an earlier game's
/// repair pass stashed a file they depend on (spec §4.J "recheck").
/// Stashes only flow downward in the dependency graph, so two full
/// passes always suffice.
#[derive(Default)]
pub struct RecheckSet {
    names: HashSet<String>,
}

impl RecheckSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn take(&mut self) -> Vec<String> {
        self.names.drain().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DatHeader, Game};

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
    fn walk_visits_parents_before_children() {
        let games = vec![
            game("clone", Some("base")),
            game("base", None),
            game("grandclone", Some("clone")),
        ];
        let catalog = Catalog::new(DatHeader::default(), games).unwrap();
        let tree = Tree::build(&catalog);
        let order = tree.walk();

        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("base") < pos("clone"));
        assert!(pos("clone") < pos("grandclone"));
    }

    #[test]
    fn recheck_set_drains_on_take() {
        let mut set = RecheckSet::new();
        set.mark("g1");
        set.mark("g2");
        let taken = set.take();
        assert_eq!(taken.len(), 2);
        assert!(set.is_empty());
    }
}
