use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use cjsify::{Config, Converter};

#[derive(Parser)]
#[command(name = "cjsify")]
#[command(version, about = "Convert a compiled ESM output tree to CommonJS and repair module paths", long_about = None)]
struct Cli {
    /// Compiled output tree to convert in place
    #[arg(short, long, default_value = "dist")]
    output: PathBuf,

    /// Project root
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Compute everything, write nothing
    #[arg(long)]
    dry_run: bool,

    /// Skip the pre-run backup snapshot
    #[arg(long)]
    no_backup: bool,

    /// Leave @-prefixed alias specifiers untouched
    #[arg(long)]
    no_aliases: bool,

    /// Skip the tree-wide dependency path fixing pass
    #[arg(long)]
    no_path_fix: bool,

    /// Print the final statistics as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let mut config = Config::new(&cli.root, &cli.output);
    config.verbose = cli.verbose;
    config.dry_run = cli.dry_run;
    config.create_backup = !cli.no_backup;
    config.resolve_aliases = !cli.no_aliases;
    config.fix_dependency_paths = !cli.no_path_fix;

    let mut converter = Converter::new(config);
    let result = converter.run();
    let stats = converter.stats();

    // The summary always prints, even for a failed run, from whatever
    // counters accumulated before the failure.
    if cli.json {
        match serde_json::to_string_pretty(stats) {
            Ok(json) => println!("{json}"),
            Err(err) => error!(error = %err, "could not serialize statistics"),
        }
    } else {
        println!("{}", stats.summary());
    }

    match result {
        Err(err) => {
            error!(error = %err, "conversion failed");
            ExitCode::FAILURE
        }
        Ok(()) if stats.errors > 0 => ExitCode::FAILURE,
        Ok(()) => ExitCode::SUCCESS,
    }
}
