//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "bubblewatch",
    version,
    author = "neur0map",
    about = "Feed repetition monitor that scores how self-similar a content feed is",
    long_about = "bubblewatch scores batches of feed texts for repetitiveness, reports when a feed \
                  turns into a filter bubble, records the dominant keywords over time, and suggests \
                  searches that lead outside the bubble."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/bubblewatch/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config file
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the daemon in the foreground, serving feed clients over IPC
    Serve,

    /// Ask a running daemon to stop
    Stop,

    /// Show daemon status
    Status,

    /// Score a batch of feed texts, one per line
    Analyze {
        /// File with one feed item per line (reads stdin when omitted)
        file: Option<PathBuf>,

        /// Sensitivity override in [0, 1]
        #[arg(short, long)]
        sensitivity: Option<f64>,

        /// Pretty-print the JSON result
        #[arg(long)]
        pretty: bool,
    },

    /// Monitor a text file as a live feed (SIGUSR1 triggers a scroll pass)
    Watch {
        /// Feed file, re-read on every pass
        file: PathBuf,

        /// URL reported for the feed
        #[arg(short, long)]
        url: Option<String>,

        /// Print every report instead of only changed ones
        #[arg(long)]
        all: bool,
    },

    /// Summarize recorded keywords over a time window
    Stats {
        /// Window: hour, day, week or a number of milliseconds
        #[arg(short, long, default_value = "hour")]
        window: String,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Resolve a search that leads outside the current bubble
    Explore {
        /// Keyword to search for (defaults to the first expansion keyword in settings)
        keyword: Option<String>,

        /// URL the keyword was observed on; selects the search site
        #[arg(short, long)]
        source_url: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Print the configuration file path
    Path,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_stats_window() {
        let cli = Cli::try_parse_from(["bubblewatch", "stats", "--window", "day"]).unwrap();
        match cli.command {
            Commands::Stats { window, json } => {
                assert_eq!(window, "day");
                assert!(!json);
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "bubblewatch",
            "watch",
            "feed.txt",
            "-v",
            "--profile",
            "strict",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.profile.as_deref(), Some("strict"));
    }
}
