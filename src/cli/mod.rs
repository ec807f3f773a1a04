use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tubescript",
    about = "Fetch, store and search YouTube transcripts",
    version,
    long_about = "Fetches YouTube transcripts by trying several extraction strategies in a fixed order \
(external fetcher process, Data API with OAuth or an API key, the embedded player client, and the watch page) \
until one returns captions. Transcripts can be stored in a local SQLite database and searched with full-text queries."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./tubescript.yaml or the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Transcript database file
    #[arg(long, global = true, value_name = "FILE", env = "TUBESCRIPT_DB")]
    pub database: Option<PathBuf>,

    /// YouTube Data API key
    #[arg(long, global = true, value_name = "KEY", env = "TUBESCRIPT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators and informational logs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a transcript and video info without storing it
    Fetch {
        /// Video URL or 11-character id
        #[arg(value_name = "URL_OR_ID")]
        input: String,

        /// Preferred caption languages for the fetcher process (repeatable)
        #[arg(short, long = "language", value_name = "LANG")]
        languages: Vec<String>,
    },

    /// Fetch a transcript and store it in the database
    Store {
        /// Video URL or 11-character id
        #[arg(value_name = "URL_OR_ID")]
        input: String,

        /// Preferred caption languages for the fetcher process (repeatable)
        #[arg(short, long = "language", value_name = "LANG")]
        languages: Vec<String>,
    },

    /// Full-text search over stored transcripts
    Search {
        /// Words that must all appear
        #[arg(value_name = "QUERY")]
        query: String,
    },

    /// List stored transcripts, newest first
    List,

    /// Show one stored transcript
    Show {
        /// Record id
        id: i64,
    },

    /// Delete a stored transcript
    Delete {
        /// Record id
        id: i64,
    },

    /// Probe every extraction strategy
    Health,

    /// Rebuild the full-text search index
    Reindex,

    /// Show or initialize configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Machine-readable JSON
    Json,
    /// Human-readable text
    Text,
    /// SRT subtitles, for commands that return segments
    Srt,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Srt => write!(f, "srt"),
        }
    }
}
