use std::process::ExitCode;

use clap::Parser;

use flowtest_cli::cli::{Cli, Commands};
use flowtest_cli::error::CliError;
use flowtest_cli::{commands, logging, reporter};
use flowtest_core::config::FlowtestConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<u8, CliError> {
    let (config_path, required) = cli.config_path();
    let mut config = FlowtestConfig::load_or_default(&config_path, required).await?;
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
        config.validate()?;
    }

    logging::init_tracing(&config.general)?;
    flowtest_core::metrics::describe_all();
    tracing::debug!(config = %config_path.display(), "configuration loaded");

    let mut reporter = reporter::stdout_reporter(cli.output, !cli.no_color);
    match cli.command {
        Commands::Test(args) => {
            let summary = commands::test::execute(args, config, reporter.as_mut()).await?;
            Ok(summary.exit_code())
        }
    }
}
