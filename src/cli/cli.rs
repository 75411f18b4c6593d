use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::application::data::LogLevel;

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[clap(long, short, default_value = "warn", value_enum, global = true)]
    pub log_level: LogLevel,

    /// Settings file to read instead of `locksmith.yaml` in the working directory
    #[clap(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// The root directory of the repository, overriding `projectRoot`
    #[clap(long, short, global = true)]
    pub root: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the repository tree with lock owners
    Tree {
        /// Case-insensitive text matched against file names and paths
        #[clap(long, short)]
        filter: Option<String>,
        /// Which files to show; defaults to `defaultMode` from the settings
        #[clap(long, short, value_enum)]
        mode: Option<ModeArg>,
        /// Only show files locked by this user
        #[clap(long)]
        owner: Option<String>,
        /// Directories deeper than this are collapsed
        #[clap(long, short)]
        depth: Option<usize>,
    },
    /// List everyone currently holding a lock
    Owners,
    /// Lock the given repository paths
    Lock {
        #[clap(required = true)]
        paths: Vec<String>,
    },
    /// Release your locks on the given paths
    Unlock {
        #[clap(required = true)]
        paths: Vec<String>,
    },
    /// Release other users' locks on the given paths (administrators only)
    ForceUnlock {
        #[clap(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    All,
    Lockable,
    Locked,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_tree_options() {
        let cli = Cli::try_parse_from([
            "locksmith", "tree", "--filter", "hero", "--mode", "locked", "--owner", "bob", "-d",
            "2",
        ])
        .unwrap();

        assert_eq!(
            cli.command,
            Command::Tree {
                filter: Some("hero".into()),
                mode: Some(ModeArg::Locked),
                owner: Some("bob".into()),
                depth: Some(2),
            }
        );
        assert!(cli.config.is_none());
        assert!(cli.root.is_none());
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "locksmith",
            "lock",
            "Content/Hero.uasset",
            "--root",
            "../Game",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(
            cli.command,
            Command::Lock {
                paths: vec!["Content/Hero.uasset".into()]
            }
        );
        assert_eq!(cli.root, Some(PathBuf::from("../Game")));
        assert!(matches!(cli.log_level, LogLevel::Debug));
    }

    #[rstest]
    #[case("lock")]
    #[case("unlock")]
    #[case("force-unlock")]
    fn path_commands_require_paths(#[case] command: &str) {
        assert!(Cli::try_parse_from(["locksmith", command]).is_err());
    }
}
