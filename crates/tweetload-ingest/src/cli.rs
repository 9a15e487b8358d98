//! Command-line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::PipelineConfig;

/// Parallel loader for tweet archives
#[derive(Parser, Debug)]
#[command(name = "tweetload")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract, load and audit in one go
    Run {
        #[command(flatten)]
        extract: ExtractArgs,

        /// Process input files in rounds of this many files
        #[arg(long)]
        round_size: Option<usize>,

        /// Keep row files after they have been loaded
        #[arg(long)]
        keep_row_files: bool,

        /// Print the completion report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract input files into row files without loading them
    Extract {
        #[command(flatten)]
        extract: ExtractArgs,
    },

    /// Load the row files found in a work directory
    Load {
        /// Directory holding row files (defaults to the configured work directory)
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Concurrent table loads within a tier
        #[arg(long)]
        load_concurrency: Option<usize>,
    },

    /// Report table counts and dangling references
    Report {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Options shared by every command that extracts
#[derive(Args, Debug, Default)]
pub struct ExtractArgs {
    /// Directory holding the source documents
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory for row files and bad-line logs
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Process at most this many input files
    #[arg(long)]
    pub limit: Option<usize>,

    /// Number of extraction workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Rows buffered per table before writing
    #[arg(long)]
    pub batch_size: Option<usize>,
}

impl ExtractArgs {
    /// Override configuration values with the flags that were given.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if self.limit.is_some() {
            config.limit = self.limit;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "tweetload",
            "run",
            "--limit",
            "3",
            "--workers",
            "2",
            "--round-size",
            "10",
            "--keep-row-files",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);

        let Commands::Run {
            extract,
            round_size,
            keep_row_files,
            json,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(round_size, Some(10));
        assert!(keep_row_files);
        assert!(!json);

        let mut config = PipelineConfig::default();
        extract.apply(&mut config);
        assert_eq!(config.limit, Some(3));
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn test_report_json() {
        let cli = Cli::try_parse_from(["tweetload", "report", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Report { json: true }));
    }
}
