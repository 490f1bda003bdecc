#![allow(missing_docs)]

use clap::{ArgAction, Parser, ValueHint};
use galev::config::Config;
use galev::cooling::CoolingTables;
use galev::{driver, Error};
use log::{error, info, LevelFilter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

/// Evolve a synthetic galaxy population over dark-matter merger trees.
#[derive(Parser)]
#[command(
    arg_required_else_help = true,
    author,
    about,
    name = "galev",
    version = git_version::git_version!(
        args = ["--always", "--dirty", "--long", "--tags"],
        cargo_prefix = "",
        fallback = "unknown"
    )
)]
struct Opts {
    /// Raise the log level; repeat for trace output.
    #[arg(action = ArgAction::Count, long, short)]
    verbose: u8,
    /// Log warnings and errors only.
    #[arg(conflicts_with = "verbose", long, short)]
    quiet: bool,
    /// Replace existing output catalogues.
    #[arg(long)]
    overwrite: bool,
    /// Parameter file describing the run.
    #[arg(value_hint = ValueHint::FilePath)]
    parameter_file: PathBuf,
}

fn exit_code_for(err: &Error) -> ExitCode {
    match err {
        Error::Config(_) => ExitCode::from(2),
        Error::MissingDataFile { .. } => ExitCode::from(3),
        Error::Format { .. } => ExitCode::from(4),
        Error::Invariant { .. } | Error::Numeric(_) | Error::ResourceExhaustion(_) => {
            ExitCode::from(5)
        }
        Error::Io(_) => ExitCode::FAILURE,
    }
}

fn run(opts: &Opts) -> galev::Result<driver::RunSummary> {
    let config = Config::from_file(&opts.parameter_file)?;
    let cooling = CoolingTables::load(&config.cool_functions_dir)?;
    std::fs::create_dir_all(&config.output_dir)?;

    let cancel = AtomicBool::new(false);
    driver::run(&config, &cooling, &cancel, opts.overwrite)
}

fn main() -> ExitCode {
    let opts = Opts::parse();

    let level = if opts.quiet {
        LevelFilter::Warn
    } else {
        match opts.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };
    env_logger::Builder::new().filter_level(level).init();

    match run(&opts) {
        Ok(summary) => {
            info!(
                "{} file(s) done, {} failed; {} trees ({} skipped); {} galaxies written",
                summary.files_done,
                summary.files_failed,
                summary.trees_done,
                summary.trees_skipped,
                summary.galaxies_written
            );
            if summary.files_failed > 0 {
                error!("{} file(s) failed", summary.files_failed);
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            error!("{err}");
            exit_code_for(&err)
        }
    }
}
