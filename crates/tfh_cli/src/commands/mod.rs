//! CLI command definitions.
//!
//! Each subcommand maps to one way of exercising a module's examples.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

pub mod convert;
pub mod run;

/// tfharness - apply and destroy Terraform module examples
#[derive(Parser)]
#[command(name = "tfharness")]
#[command(version, about = "tfharness - apply and destroy Terraform module examples")]
#[command(long_about = r#"
tfharness applies every example of a Terraform module repository, destroys it
again, and reports each failure at the end.

COMMANDS:
  examples  → Run the examples named with --example, in parallel
  all       → Discover and run every example
  convert   → Point one example directory at the local module source
  revert    → Restore files saved by convert, pinned to the latest release

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - One or more modules failed
  5 - IaC error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// YAML configuration file; flags override its values
    #[arg(short, long, global = true, env = "TFH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run specific examples in parallel
    Examples(run::ExamplesArgs),

    /// Discover and run every example
    All(run::AllArgs),

    /// Rewrite registry sources in one directory to local paths
    Convert(convert::ConvertArgs),

    /// Replay a saved restore file against the registry
    Revert(convert::RevertArgs),
}

/// A run finished but some modules recorded errors.
#[derive(Error, Debug)]
#[error("{failed} of {total} modules failed")]
pub struct ModuleFailures {
    pub failed: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_examples() {
        let cli = Cli::try_parse_from([
            "tfharness",
            "-v",
            "examples",
            "--example",
            "default,complete",
            "--local",
            "--exception",
            "private",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Examples(args) => {
                assert_eq!(args.example.as_deref(), Some("default,complete"));
                assert!(args.options.local);
                assert_eq!(args.options.exception.as_deref(), Some("private"));
                assert!(!args.options.skip_destroy);
            }
            _ => panic!("expected examples command"),
        }
    }

    #[test]
    fn test_parse_all_sequential() {
        let cli = Cli::try_parse_from(["tfharness", "all", "--sequential", "--skip-destroy"]).unwrap();
        match cli.command {
            Commands::All(args) => {
                assert!(args.sequential);
                assert!(args.options.skip_destroy);
            }
            _ => panic!("expected all command"),
        }
    }

    #[test]
    fn test_convert_requires_identity() {
        assert!(Cli::try_parse_from(["tfharness", "convert", "--dir", "."]).is_err());
        let cli = Cli::try_parse_from([
            "tfharness",
            "convert",
            "--dir",
            "../examples/default",
            "--name",
            "vnet",
            "--provider",
            "azure",
            "--restore-file",
            "restores.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Convert(args) => {
                assert_eq!(args.name, "vnet");
                assert_eq!(args.provider, "azure");
            }
            _ => panic!("expected convert command"),
        }
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["tfharness", "-v", "-q", "all"]).is_err());
    }
}
