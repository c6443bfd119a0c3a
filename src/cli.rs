//! Command-line interface definitions for article_harvest.
//!
//! Every option can also be supplied through an environment variable.

use crate::models::Theme;
use clap::Parser;
use std::path::PathBuf;

/// Harvest news articles for a theme/keyword pair into structured records.
///
/// # Examples
///
/// ```sh
/// # Search for the keyword and extract whatever comes back
/// article_harvest --theme supply --keyword "renewable diesel" -o ./out
///
/// # Fetch explicit URLs with a custom instruction table
/// article_harvest --theme demand --keyword tallow \
///     --url https://www.fastmarkets.com/insights/a \
///     --url https://www.ers.usda.gov/b \
///     --instructions ./rules.yaml -o ./out
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Theme the keyword belongs to
    #[arg(short, long, value_enum, env = "HARVEST_THEME")]
    pub theme: Theme,

    /// Search keyword; also recorded on every record
    #[arg(short, long, env = "HARVEST_KEYWORD")]
    pub keyword: String,

    /// Article URL to fetch instead of searching (repeatable)
    #[arg(short, long = "url")]
    pub urls: Vec<String>,

    /// Output directory for the JSON report
    #[arg(short, long, env = "HARVEST_OUTPUT_DIR")]
    pub output_dir: String,

    /// Optional path to a config.yaml file
    #[arg(short, long, env = "HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Instruction table replacing the builtin one
    #[arg(short, long, env = "HARVEST_INSTRUCTIONS")]
    pub instructions: Option<PathBuf>,

    /// Total fetch passes per batch, the first one included
    #[arg(long, env = "HARVEST_MAX_PASSES", value_parser = clap::value_parser!(usize))]
    pub max_passes: Option<usize>,

    /// Give up on unfetched URLs after this many seconds
    #[arg(long, env = "HARVEST_DEADLINE_SECS")]
    pub deadline_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "article_harvest",
            "--theme",
            "feedstock-price",
            "--keyword",
            "used cooking oil",
            "--output-dir",
            "./out",
        ]);

        assert_eq!(cli.theme, Theme::FeedstockPrice);
        assert_eq!(cli.keyword, "used cooking oil");
        assert_eq!(cli.output_dir, "./out");
        assert!(cli.urls.is_empty());
        assert!(cli.max_passes.is_none());
    }

    #[test]
    fn test_cli_short_flags_and_repeated_urls() {
        let cli = Cli::parse_from([
            "article_harvest",
            "-t",
            "supply",
            "-k",
            "tallow",
            "-u",
            "https://a.example/1",
            "-u",
            "https://b.example/2",
            "-o",
            "/tmp/out",
            "--max-passes",
            "5",
        ]);

        assert_eq!(cli.theme, Theme::Supply);
        assert_eq!(cli.urls, vec!["https://a.example/1", "https://b.example/2"]);
        assert_eq!(cli.output_dir, "/tmp/out");
        assert_eq!(cli.max_passes, Some(5));
    }

    #[test]
    fn test_cli_rejects_unknown_theme() {
        let result = Cli::try_parse_from([
            "article_harvest",
            "--theme",
            "weather",
            "--keyword",
            "x",
            "--output-dir",
            "o",
        ]);
        assert!(result.is_err());
    }
}
