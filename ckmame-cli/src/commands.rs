//! Subcommand handlers, one function per `Commands` variant, in the
//! teacher's `file_commands.rs` style: parse args, build the engine's
//! inputs, run it, print results with `anyhow::Context` on every
//! fallible step.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Args, Subcommand};

use ckmame_core::cache::ArchiveCache;
use ckmame_core::catalog::dat_xml;
use ckmame_core::config::{EngineConfig, TomlConfig};
use ckmame_core::detector;
use ckmame_core::matcher::{GameStatus, Quality};
use ckmame_core::{Engine, GameResult, RunReport};

#[derive(Args)]
pub struct RunArgs {
    /// DAT catalog describing the expected romset
    #[arg(long)]
    dat: Utf8PathBuf,

    /// DAT catalog of a retired/previous romset; a required file found
    /// there is reported `Old` instead of missing
    #[arg(long)]
    old_dat: Option<Utf8PathBuf>,

    /// Root directory holding the romset's own archives
    #[arg(long, default_value = ".")]
    romset_root: Utf8PathBuf,

    /// Additional roots to search for correct-but-misplaced files
    #[arg(long, value_delimiter = ',')]
    extra_root: Vec<Utf8PathBuf>,

    /// clrmamepro header-skip detector definition (repeatable)
    #[arg(long, value_delimiter = ',')]
    detector: Vec<Utf8PathBuf>,

    /// TOML file overriding any of the flags below that it sets
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    /// Keep romset-internal duplicates instead of deleting them
    #[arg(long)]
    keep_duplicates: bool,

    /// Allow deleting a correct file found in an extra root after copying it in
    #[arg(long)]
    move_from_extra: bool,

    /// Treat each game's roms as loose files under romset_root/<game>/
    #[arg(long)]
    unpacked: bool,

    /// CHDs live flat under romset_root, named `<game>.chd`
    #[arg(long)]
    have_toplevel_disks: bool,

    /// A required rom marked nodump counts as missing
    #[arg(long)]
    nodump_counts_as_missing: bool,
}

pub fn run(args: &RunArgs, read_only: bool) -> Result<()> {
    let mut config = EngineConfig {
        romset_root: args.romset_root.clone().into_std_path_buf(),
        extra_roots: args
            .extra_root
            .iter()
            .map(|p| p.clone().into_std_path_buf())
            .collect(),
        read_only,
        keep_duplicates: args.keep_duplicates,
        move_from_extra: args.move_from_extra,
        unpacked: args.unpacked,
        have_toplevel_disks: args.have_toplevel_disks,
        nodump_counts_as_missing: args.nodump_counts_as_missing,
        ..EngineConfig::default()
    };

    if let Some(path) = &args.config {
        let text =
            std::fs::read_to_string(path.as_std_path()).with_context(|| format!("reading config file {path}"))?;
        let toml = TomlConfig::parse(&text).with_context(|| format!("parsing config file {path}"))?;
        config = toml
            .apply_onto(config)
            .with_context(|| format!("applying config file {path}"))?;
    }

    let catalog =
        dat_xml::parse_path(args.dat.as_std_path()).with_context(|| format!("reading DAT catalog {}", args.dat))?;

    let old_catalog = match &args.old_dat {
        Some(path) => {
            config.old_catalog = Some(path.clone().into_std_path_buf());
            Some(dat_xml::parse_path(path.as_std_path()).with_context(|| format!("reading old DAT catalog {path}"))?)
        }
        None => None,
    };

    let mut detectors = Vec::new();
    for path in &args.detector {
        let parsed = detector::parse_path(path.as_std_path()).with_context(|| format!("reading detector {path}"))?;
        detectors.push(parsed);
    }

    let mut engine = Engine::with_old_catalog(config, catalog, old_catalog, detectors);
    let report = engine.run().context("scan/repair run failed")?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    for diag in &report.diagnostics {
        let tag = match diag.quality {
            Quality::Ok => "[OK  ]",
            Quality::NameError => "[NAME]",
            Quality::Missing => "[MISS]",
            Quality::Long | Quality::Copied => "[HASH]",
            Quality::InZip => "[MOVE]",
            Quality::Old | Quality::OkAndOld => "[MOVE]",
            Quality::NoHash | Quality::Unchecked => "[GONE]",
        };
        println!("{tag} {}: {}", diag.game, diag.name);
    }

    println!("\nFound Games:");
    for GameResult { game, status } in &report.games {
        let tag = match status {
            GameStatus::Correct | GameStatus::CorrectMia => "[FULL]",
            GameStatus::Old => "[MOVE]",
            GameStatus::Fixable | GameStatus::Partial => "[PART]",
            GameStatus::Missing => "[MISS]",
        };
        println!("{tag} {game}");
    }
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List archives a directory's `.ckmame.db` has cached hashes for
    List {
        /// Directory whose cache to inspect
        directory: Utf8PathBuf,
    },
}

pub fn handle_cache(command: &CacheCommands) -> Result<()> {
    match command {
        CacheCommands::List { directory } => {
            let cache =
                ArchiveCache::open(directory.as_std_path()).with_context(|| format!("opening cache at {directory}"))?;
            for (name, filetype) in cache.list_archives().context("listing cached archives")? {
                println!("{:<4} {name}", filetype.to_string());
            }
        }
    }
    Ok(())
}

#[derive(Args)]
pub struct DumpArgs {
    /// DAT catalog to parse and summarize
    #[arg(long)]
    dat: Option<Utf8PathBuf>,

    /// Detector definition to parse and summarize
    #[arg(long)]
    detector: Option<Utf8PathBuf>,
}

pub fn dump(args: &DumpArgs) -> Result<()> {
    if let Some(path) = &args.dat {
        let catalog =
            dat_xml::parse_path(path.as_std_path()).with_context(|| format!("reading DAT catalog {path}"))?;
        println!("{} ({})", catalog.header.name, catalog.header.version);
        for game in &catalog.games {
            println!("  {} - {} roms, {} disks", game.name, game.roms.len(), game.disks.len());
        }
    }

    if let Some(path) = &args.detector {
        let parsed = detector::parse_path(path.as_std_path()).with_context(|| format!("reading detector {path}"))?;
        println!("detector {} v{}", parsed.name, parsed.version);
    }

    Ok(())
}
