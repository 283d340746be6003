//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use mediathek_core::JobCategory;

/// Download and search media through a Mediathek backend.
///
/// Jobs are submitted to the backend, which does the actual downloading;
/// this tool follows their progress until they finish.
#[derive(Parser, Debug)]
#[command(name = "mediathek")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Backend base URL [default: http://localhost:8000]
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check whether the backend is reachable
    Health {
        /// Keep probing and report every status change
        #[arg(long)]
        watch: bool,
    },

    /// Submit a download job and follow its progress
    Download(DownloadArgs),

    /// Search for videos; results are printed as they arrive
    Search(SearchArgs),
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    /// What to download
    #[arg(value_enum)]
    pub category: CategoryArg,

    /// Container format (video: mp4, mkv; audio: mp3, wav)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Destination folder on the backend host [default: Downloads]
    #[arg(short, long)]
    pub output_path: Option<String>,

    /// Put each job's files in a timestamped subfolder
    #[arg(long)]
    pub timestamped: bool,

    /// Status poll period in milliseconds (50-60000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(50..=60000))]
    pub poll_interval_ms: Option<u64>,

    /// Give up after this many failed status checks in a row (0 retries forever)
    #[arg(long)]
    pub max_poll_failures: Option<u32>,

    /// Video URLs (youtube.com or youtu.be)
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct SearchArgs {
    /// Maximum number of results (1-100)
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub max_results: Option<u32>,

    /// Give up when the search has not finished after this many seconds (1-600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=600))]
    pub timeout_secs: Option<u64>,

    /// Search terms
    #[arg(required = true, value_name = "QUERY")]
    pub query: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CategoryArg {
    Video,
    Audio,
}

impl From<CategoryArg> for JobCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Video => Self::Video,
            CategoryArg::Audio => Self::Audio,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_health_parses() {
        let args = Args::try_parse_from(["mediathek", "health"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(matches!(args.command, Command::Health { watch: false }));

        let args = Args::try_parse_from(["mediathek", "health", "--watch"]).unwrap();
        assert!(matches!(args.command, Command::Health { watch: true }));
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["mediathek", "-v", "health"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["mediathek", "health", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["mediathek", "--quiet", "health"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["mediathek", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Args::try_parse_from(["mediathek", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["mediathek", "--invalid-flag", "health"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_subcommand_is_required() {
        assert!(Args::try_parse_from(["mediathek"]).is_err());
    }

    #[test]
    fn test_cli_download_args() {
        let args = Args::try_parse_from([
            "mediathek",
            "--api-url",
            "http://media.local:8000",
            "download",
            "audio",
            "-f",
            "wav",
            "--timestamped",
            "https://youtu.be/abc",
            "https://youtu.be/def",
        ])
        .unwrap();
        assert_eq!(args.api_url.as_deref(), Some("http://media.local:8000"));
        let Command::Download(download) = args.command else {
            panic!("expected download command");
        };
        assert_eq!(download.category, CategoryArg::Audio);
        assert_eq!(download.format.as_deref(), Some("wav"));
        assert!(download.timestamped);
        assert_eq!(download.urls.len(), 2);
        assert_eq!(JobCategory::from(download.category), JobCategory::Audio);
    }

    #[test]
    fn test_cli_download_requires_urls() {
        let err = Args::try_parse_from(["mediathek", "download", "video"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_download_rejects_unknown_category() {
        let err =
            Args::try_parse_from(["mediathek", "download", "podcast", "https://youtu.be/abc"])
                .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn test_cli_poll_interval_range() {
        let result = Args::try_parse_from([
            "mediathek",
            "download",
            "video",
            "--poll-interval-ms",
            "10",
            "https://youtu.be/abc",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_search_collects_query_words() {
        let args =
            Args::try_parse_from(["mediathek", "search", "-n", "5", "lofi", "beats"]).unwrap();
        let Command::Search(search) = args.command else {
            panic!("expected search command");
        };
        assert_eq!(search.max_results, Some(5));
        assert_eq!(search.query, vec!["lofi", "beats"]);
    }

    #[test]
    fn test_cli_search_max_results_range() {
        assert!(Args::try_parse_from(["mediathek", "search", "-n", "0", "x"]).is_err());
        assert!(Args::try_parse_from(["mediathek", "search", "-n", "101", "x"]).is_err());
    }
}
