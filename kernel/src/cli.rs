//! CLI command definitions and subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// taskkernel - event-sourced autonomous task orchestration kernel
#[derive(Parser)]
#[command(name = "taskkernel", about = "Event-sourced autonomous task orchestration kernel", version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one named seed test, or every seed test if none is given
    RunTest {
        /// Seed test id (e.g. `budget-tokens`); omit to run the full catalogue
        test_id: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run a run to completion and emit its bundle as JSON on stdout
    ExportBundle {
        /// Human-readable run name; a fresh run id is generated from it
        #[arg(default_value = "cli-run")]
        run_id: String,
    },

    /// Reconstruct a kernel from a bundle file and verify the replay checksum
    Replay {
        /// Path to a bundle JSON file previously produced by `export-bundle`
        bundle_path: PathBuf,
    },

    /// List the built-in seed test catalogue
    ListTests,
}

/// Output format for report-producing commands.
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown format: {s}. use: text or json")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_test_with_no_id() {
        let cli = Cli::parse_from(["taskkernel", "run-test"]);
        assert!(matches!(cli.command, Command::RunTest { test_id: None, .. }));
    }

    #[test]
    fn parses_run_test_with_id() {
        let cli = Cli::parse_from(["taskkernel", "run-test", "budget-tokens"]);
        match cli.command {
            Command::RunTest { test_id: Some(id), .. } => assert_eq!(id, "budget-tokens"),
            _ => panic!("expected RunTest command"),
        }
    }

    #[test]
    fn parses_replay_with_path() {
        let cli = Cli::parse_from(["taskkernel", "replay", "bundle.json"]);
        match cli.command {
            Command::Replay { bundle_path } => assert_eq!(bundle_path, PathBuf::from("bundle.json")),
            _ => panic!("expected Replay command"),
        }
    }

    #[test]
    fn output_format_from_str_round_trips() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("invalid".parse::<OutputFormat>().is_err());
    }
}
