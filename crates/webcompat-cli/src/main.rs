//! Webcompat CLI: drive intervention probes against Firefox
//!
//! ## Usage
//!
//! ```bash
//! webcompat run                      # Run every probe under probes/
//! webcompat run --only-id publix     # Filter by id
//! webcompat run --headless -j 8      # Headless, eight sessions at once
//! webcompat list                     # Show probe metadata without running
//! ```

use clap::Parser;
use std::process::ExitCode;
use webcompat_cli::{
    logging, runner, Cli, CliConfig, CliResult, Commands, ProgressReporter, Verbosity,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    logging::init(config.verbosity);

    match run(cli, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: &CliConfig) -> CliResult<ExitCode> {
    let mut reporter =
        ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());

    match cli.command {
        Commands::Run(args) => runner::run_fleet(args, &mut reporter).await,
        Commands::List(args) => {
            runner::list_probes(&args)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.verbose, cli.quiet))
        .with_color(cli.color.clone().into())
}
