//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Catalog synchronization inspector
#[derive(Parser, Debug)]
#[command(name = "catsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Catalog fixture (TOML, or JSON by extension)
    #[arg(short, long, env = "CATSYNC_FIXTURE")]
    pub fixture: PathBuf,

    /// Engine config file (defaults to the platform config directory)
    #[arg(short, long, env = "CATSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Principal the queries run as
    #[arg(short, long, default_value = "admin", global = true)]
    pub principal: String,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Push-direction sync contexts for items
    Status {
        /// Item keys
        #[arg(required = true)]
        items: Vec<u64>,
    },

    /// Pull-direction sync contexts for target-side items
    Pull {
        #[arg(required = true)]
        items: Vec<u64>,
    },

    /// Accessible and forbidden rules across items
    Rules {
        #[arg(required = true)]
        items: Vec<u64>,
    },

    /// Reference closure of an item
    Closure {
        item: u64,

        /// Override the configured depth
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Items an item was synchronized from and to
    Ledger { item: u64 },

    /// Dispatch items (and their closures) for synchronization
    Dispatch {
        #[arg(required = true)]
        items: Vec<u64>,

        /// Explicit rules (multi-rule mode)
        #[arg(short, long = "rule")]
        rules: Vec<String>,

        /// Target version for single-rule mode
        #[arg(short, long)]
        target: Option<String>,

        /// Rule code narrowing the target
        #[arg(short, long)]
        qualifier: Option<String>,
    },

    /// Re-synchronize target-side items from their pull source
    DispatchPull {
        #[arg(required = true)]
        items: Vec<u64>,
    },

    /// Full synchronization of whole versions
    DispatchVersions {
        #[arg(required = true)]
        versions: Vec<String>,

        #[arg(short, long = "rule")]
        rules: Vec<String>,

        #[arg(short, long)]
        target: Option<String>,

        #[arg(short, long)]
        qualifier: Option<String>,
    },
}

impl Commands {
    /// Whether the command submits executions to the job worker.
    pub fn dispatches(&self) -> bool {
        matches!(
            self,
            Commands::Dispatch { .. } | Commands::DispatchPull { .. } | Commands::DispatchVersions { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_dispatch() {
        let cli = Cli::parse_from([
            "catsync", "-f", "catalog.toml", "dispatch", "1", "2", "--rule", "r1", "--rule", "r2",
        ]);
        assert_eq!(cli.fixture, PathBuf::from("catalog.toml"));
        assert_eq!(cli.principal, "admin");
        assert_eq!(
            cli.command,
            Commands::Dispatch {
                items: vec![1, 2],
                rules: vec!["r1".into(), "r2".into()],
                target: None,
                qualifier: None,
            }
        );
        assert!(cli.command.dispatches());
    }

    #[test]
    fn test_parse_status_requires_items() {
        assert!(Cli::try_parse_from(["catsync", "-f", "c.toml", "status"]).is_err());
        let cli = Cli::parse_from(["catsync", "-f", "c.toml", "-p", "editor", "status", "7"]);
        assert_eq!(cli.command, Commands::Status { items: vec![7] });
        assert!(!cli.command.dispatches());
    }
}
