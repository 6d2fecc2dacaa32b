//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "simfuzz")]
#[command(about = "simfuzz - experiment orchestrator for simulation-based scenario search", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .simfuzz/config.yaml and .simfuzz/local.yaml)
    #[arg(short, long, global = true, env = "SIMFUZZ_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize simfuzz configuration and database
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Create a new experiment
    Create(CreateArgs),

    /// Create an experiment and run it in the foreground
    Run(CreateArgs),

    /// Start a created experiment and follow it until it finishes (Ctrl-C stops it)
    Start {
        /// Experiment ID
        id: Uuid,
    },

    /// Stop a running experiment
    Stop {
        /// Experiment ID
        id: Uuid,
    },

    /// List experiments
    List(ListArgs),

    /// Show details for an experiment
    Show {
        /// Experiment ID
        id: Uuid,
    },

    /// Show the results of an experiment
    Results {
        /// Experiment ID
        id: Uuid,
    },

    /// Update experiment notes or tags
    Update(UpdateArgs),

    /// Delete an experiment and its output directory
    Delete {
        /// Experiment ID
        id: Uuid,
    },

    /// Resolve a file inside an experiment's output directory
    File {
        /// Experiment ID
        id: Uuid,

        /// File name relative to the output directory
        name: String,
    },

    /// Fail experiments left running by a process that no longer exists
    Recover,
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// Route identifier
    #[arg(long)]
    pub route_id: String,

    /// Route definition file
    #[arg(long)]
    pub route_file: String,

    /// Search method
    #[arg(short, long, default_value = "random")]
    pub method: String,

    /// Number of search iterations
    #[arg(short = 'n', long, default_value = "10")]
    pub iterations: u32,

    /// Per-scenario timeout in seconds
    #[arg(short, long, default_value = "300")]
    pub timeout: u32,

    /// Run the simulator without rendering
    #[arg(long)]
    pub headless: bool,

    /// Random seed
    #[arg(short, long, default_value = "42")]
    pub seed: u64,

    /// Reward function
    #[arg(short, long, default_value = "ttc")]
    pub reward_function: String,

    /// Treat higher rewards as better
    #[arg(long)]
    pub maximize: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Filter by status
    #[arg(short, long)]
    pub status: Option<String>,

    /// Filter by search method
    #[arg(short, long)]
    pub method: Option<String>,

    /// Maximum number of experiments to display
    #[arg(short, long, default_value = "50")]
    pub limit: usize,

    /// Number of experiments to skip
    #[arg(short, long, default_value = "0")]
    pub offset: usize,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// Experiment ID
    pub id: Uuid,

    /// Free-form notes
    #[arg(long)]
    pub notes: Option<String>,

    /// Tags (comma-separated, replaces existing tags)
    #[arg(long, value_delimiter = ',')]
    pub tags: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from([
            "simfuzz", "create", "--route-id", "3", "--route-file", "routes.xml", "-n", "25", "--headless",
        ])
        .unwrap();
        match cli.command {
            Commands::Create(args) => {
                assert_eq!(args.route_id, "3");
                assert_eq!(args.iterations, 25);
                assert!(args.headless);
                assert_eq!(args.method, "random");
                assert!(!args.maximize);
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn test_parse_update_tags() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from(["simfuzz", "--json", "update", &id.to_string(), "--tags", "a,b"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Update(args) => {
                assert_eq!(args.id, id);
                assert_eq!(args.tags, Some(vec!["a".to_string(), "b".to_string()]));
                assert!(args.notes.is_none());
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_rejects_bad_uuid() {
        assert!(Cli::try_parse_from(["simfuzz", "show", "not-a-uuid"]).is_err());
    }
}
