//! CLI command definitions and parsing
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "cheereading",
    version,
    about = "Book recommendations from reading history",
    long_about = "Cheereading embeds catalog books with a local multilingual model, keeps a \
                  similarity index over them and recommends unread books to readers based on \
                  their rated reading history."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/cheereading/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate embedding vectors for catalog books
    Embed {
        /// Re-embed every book, not only those without a vector
        #[arg(long)]
        regenerate: bool,
    },

    /// Build or inspect the similarity index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Recommend books for a reader
    Recommend {
        /// Reader id
        #[arg(short, long)]
        user: i64,

        /// Number of books (defaults to recommendation.default_k)
        #[arg(short)]
        k: Option<usize>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Find books similar to a piece of text
    Similar {
        /// Free text, e.g. a short description of what to read next
        text: String,

        /// Maximum number of results to return
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Mark a book as "not interested" for a reader
    Feedback {
        #[arg(short, long)]
        user: i64,

        #[arg(short, long)]
        item: i64,
    },

    /// Record that a reader read a book
    Rate {
        #[arg(short, long)]
        user: i64,

        #[arg(short, long)]
        item: i64,

        /// Rating from 1 to 5
        #[arg(short, long, value_parser = clap::value_parser!(i64).range(1..=5))]
        rating: Option<i64>,

        /// Read date as YYYY-MM-DD (defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Show catalog and activity counts
    Stats,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Rebuild the index from stored vectors
    Build,

    /// Show dimension, size and build time of the persisted index
    Info,
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
    fn test_parse_rate() {
        let cli = Cli::try_parse_from([
            "cheereading",
            "rate",
            "--user",
            "3",
            "--item",
            "17",
            "--rating",
            "5",
            "--date",
            "2024-03-01",
        ])
        .unwrap();

        match cli.command {
            Commands::Rate {
                user,
                item,
                rating,
                date,
            } => {
                assert_eq!((user, item, rating), (3, 17, Some(5)));
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 1));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rating_out_of_range() {
        let result = Cli::try_parse_from([
            "cheereading",
            "rate",
            "--user",
            "3",
            "--item",
            "17",
            "--rating",
            "6",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_recommend_defaults() {
        let cli = Cli::try_parse_from(["cheereading", "recommend", "--user", "1"]).unwrap();
        match cli.command {
            Commands::Recommend { user, k, json } => {
                assert_eq!(user, 1);
                assert_eq!(k, None);
                assert!(!json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
