//! Command-line interface definitions.
//!
//! All options can be provided via command-line flags; the API key can
//! also come from the environment.

use clap::Parser;

/// Command-line arguments for one pipeline run.
///
/// # Examples
///
/// ```sh
/// # Basic usage
/// coincal -d ./data -c ./coincal.yaml
///
/// # Facet extraction mode
/// OPENAI_API_KEY=sk-... coincal -d ./data --facet-extraction
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Data directory holding stage files, calendars, and archives
    #[arg(short, long, default_value = "./data")]
    pub data_dir: String,

    /// Path to the YAML run configuration
    #[arg(short, long, default_value = "./coincal.yaml")]
    pub config: String,

    /// API key for the LLM endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Extract with independent per-facet sub-queries instead of the
    /// two-pass schema extraction
    #[arg(long)]
    pub facet_extraction: bool,
}
