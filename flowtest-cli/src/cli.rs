//! CLI argument parsing using clap derive API
//!
//! Purely declarative; no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Default configuration file, used only if present.
pub const DEFAULT_CONFIG_PATH: &str = "flowtest.toml";

/// flowtest -- run catalog tests against an ephemeral cluster.
///
/// Use `flowtest <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "flowtest", version, about, long_about = None)]
pub struct Cli {
    /// Path to the flowtest.toml configuration file [default: flowtest.toml].
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Disable colored text output.
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// The config path and whether it was given explicitly.
    pub fn config_path(&self) -> (PathBuf, bool) {
        match &self.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        }
    }
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// One machine-readable JSON summary document.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a catalog and run every test case it declares.
    Test(TestArgs),
}

/// Build and test a catalog source.
#[derive(Args, Debug, Clone)]
pub struct TestArgs {
    /// Catalog source to build (file path or URL).
    #[arg(long)]
    pub source: String,

    /// Project directory the compiler and worker run in.
    #[arg(long, default_value = ".")]
    pub directory: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_test_with_defaults() {
        let cli = Cli::try_parse_from(["flowtest", "test", "--source", "flow.yaml"])
            .expect("parse succeeded");
        let Commands::Test(args) = &cli.command;
        assert_eq!(args.source, "flow.yaml");
        assert_eq!(args.directory, PathBuf::from("."));
        assert_eq!(cli.output, OutputFormat::Text);
        assert!(cli.log_level.is_none());
        assert_eq!(
            cli.config_path(),
            (PathBuf::from(DEFAULT_CONFIG_PATH), false),
            "default config path is optional"
        );
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "flowtest",
            "test",
            "--source",
            "flow.yaml",
            "--directory",
            "/work",
            "--config",
            "/etc/flowtest.toml",
            "--log-level",
            "debug",
            "--output",
            "json",
        ])
        .expect("parse succeeded");
        let Commands::Test(args) = &cli.command;
        assert_eq!(args.directory, PathBuf::from("/work"));
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(
            cli.config_path(),
            (PathBuf::from("/etc/flowtest.toml"), true)
        );
    }

    #[test]
    fn test_cli_source_is_required() {
        let result = Cli::try_parse_from(["flowtest", "test"]);
        assert!(result.is_err(), "--source must be required");
    }

    #[test]
    fn test_cli_rejects_unknown_output_format() {
        let result = Cli::try_parse_from(["flowtest", "test", "--source", "s", "--output", "xml"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
