//! The `denovo` command line tool
mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let result = match args.command {
        Command::Run(run) => commands::run(&args.session, &run),
        Command::Import(import) => commands::import(&args.session, &import),
        Command::Export(export) => commands::export(&args.session, &export),
        Command::Map(map) => commands::map(&args.session, &map),
        Command::Annotate(annotate) => commands::annotate(&args.session, &annotate),
        Command::Defaults(defaults) => commands::defaults(&defaults),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
