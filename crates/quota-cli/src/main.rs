mod commands;
mod input;
mod output;
mod opts;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::check::CheckArgs;
use commands::list::ListArgs;
use commands::replay::ReplayArgs;
use opts::GlobalOpts;

#[derive(Parser, Debug)]
#[command(name = "quota", version, about = "Placement quota engine CLI")]
struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a limits config against an object catalog
    Check(CheckArgs),

    /// List tracked object types
    List(ListArgs),

    /// Replay a scenario against the in-memory host
    Replay(ReplayArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = &cli.opts;

    match cli.command {
        Command::Check(args) => commands::check::cmd_check(opts, &args),
        Command::List(args) => commands::list::cmd_list(opts, &args),
        Command::Replay(args) => commands::replay::cmd_replay(opts, &args),
    }
}
