//! Command-line front end for `ckmame-core`, grounded on the
//! teacher's `Cli`/subcommand split (`main.rs`) and its bracket-tag
//! per-file report style (`file_commands.rs`'s `[OK  ]`/`[MISS]`
//! lines).

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a romset against a DAT catalog without changing anything
    Check(commands::RunArgs),
    /// Verify a romset against a DAT catalog and repair what it can
    Repair(commands::RunArgs),
    /// Inspect a directory's archive hash cache
    Cache {
        #[command(subcommand)]
        cache_command: commands::CacheCommands,
    },
    /// Parse and print a DAT catalog or detector definition
    Dump(commands::DumpArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match &cli.command {
        Commands::Check(args) => commands::run(args, true),
        Commands::Repair(args) => commands::run(args, false),
        Commands::Cache { cache_command } => commands::handle_cache(cache_command),
        Commands::Dump(args) => commands::dump(args),
    }
}
