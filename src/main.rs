//! arcprobe - archive format detection

use anyhow::Context;
use arcprobe::{
    cli::{Cli, Commands},
    list,
    session::Session,
};
use clap::Parser;
use std::process;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Detect { archive, probe } => {
            let session = Session::new(&probe.session_options());
            list::detect(&archive, &session, cli.verbose)
                .with_context(|| format!("failed to inspect {}", archive.display()))?;
        }

        Commands::List {
            archive,
            probe,
            progress,
        } => {
            let session = Session::new(&probe.session_options());
            list::list(&archive, &session, cli.verbose, progress)
                .with_context(|| format!("failed to list {}", archive.display()))?;
        }
    }

    Ok(())
}
