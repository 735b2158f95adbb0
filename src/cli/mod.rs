//! CLI module for deepbench
//!
//! Provides command-line interface parsing for the deepbench-server binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod init;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Deepbench - streaming deep-research server
///
/// Runs multi-stage research pipelines against OpenAI, Anthropic and Kimi,
/// streams progress over SSE and keeps a queryable history of every run.
#[derive(Parser, Debug)]
#[command(
    name = "deepbench-server",
    version,
    about = "Deepbench - streaming deep-research server",
    long_about = "Runs multi-stage research pipelines against swappable LLM providers,\n\
                  streams progress as Server-Sent Events and records every run for\n\
                  side-by-side model comparison.\n\n\
                  Run without arguments to start the server, or use 'init' to write a starter config.",
    after_help = "EXAMPLES:\n    \
                  deepbench-server init                    # Write deepbench.toml and .env.example\n    \
                  deepbench-server                         # Start the server (requires deepbench.toml)\n    \
                  deepbench-server --json-logs serve       # Start with JSON logs\n    \
                  deepbench-server config --validate       # Check the configuration\n    \
                  deepbench-server --config my.toml models # List models with effective settings"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "deepbench.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (the default)
    Serve,

    /// Write a starter deepbench.toml and .env.example
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite existing files
        #[arg(short, long)]
        force: bool,

        /// Host address for the server
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port for the server
        #[arg(long, default_value = "3000")]
        port: u16,
    },

    /// Show configuration information
    Config {
        /// Print the full resolved configuration as TOML
        #[arg(short = 'f', long)]
        full: bool,

        /// Validate the configuration file and report warnings
        #[arg(long)]
        validate: bool,
    },

    /// List supported models and their effective provider settings
    Models,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_server() {
        let cli = Cli::try_parse_from(["deepbench-server"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("deepbench.toml"));
        assert!(!cli.json_logs);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "deepbench-server",
            "config",
            "--validate",
            "--config",
            "other.toml",
            "--no-color",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert!(cli.no_color);
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                validate: true,
                full: false
            })
        ));
    }
}
