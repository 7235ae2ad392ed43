//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Article Lens - compare article analyses across LLM providers
///
/// Sends the same article to every configured provider concurrently and
/// reports each provider's analysis (or failure) side by side.
///
/// Examples:
///   article-lens analyze --file post.md --topic "remote work"
///   cat post.md | article-lens analyze --format json --output report.json
///   article-lens serve --bind 0.0.0.0:8000
///   article-lens init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .article-lens.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Analyze one article and print or save the comparison report
    Analyze(AnalyzeArgs),
    /// Serve the analysis endpoint over HTTP
    Serve(ServeArgs),
    /// Generate a default .article-lens.toml configuration file
    InitConfig,
}

/// Arguments for `article-lens analyze`.
#[derive(clap::Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Article file to analyze (reads stdin when omitted)
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Target topic or search term
    #[arg(short, long, value_name = "TOPIC")]
    pub topic: Option<String>,

    /// Per-provider timeout in seconds
    #[arg(long, value_name = "SECS", env = "ARTICLE_LENS_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Only query these provider ids (comma-separated)
    ///
    /// Example: --providers openai,perplexity
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub providers: Option<Vec<String>>,

    /// Provider id used to synthesize the analyses
    #[arg(long, value_name = "ID", conflicts_with = "no_synthesis")]
    pub synthesizer: Option<String>,

    /// Skip the synthesis step even if the config enables it
    #[arg(long)]
    pub no_synthesis: bool,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write the report to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Exit with code 2 when any provider did not succeed
    ///
    /// Useful for CI pipelines.
    #[arg(long)]
    pub fail_on_degraded: bool,
}

/// Arguments for `article-lens serve`.
#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to
    #[arg(long, value_name = "ADDR", env = "ARTICLE_LENS_BIND")]
    pub bind: Option<String>,

    /// Per-provider timeout in seconds
    #[arg(long, value_name = "SECS", env = "ARTICLE_LENS_TIMEOUT")]
    pub timeout: Option<u64>,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match &self.command {
            Command::Analyze(analyze) => {
                if let Some(timeout) = analyze.timeout {
                    if timeout == 0 {
                        return Err("Timeout must be at least 1 second".to_string());
                    }
                }

                if let Some(ref file) = analyze.file {
                    if !file.is_file() {
                        return Err(format!("Article file does not exist: {}", file.display()));
                    }
                }

                if let Some(ref providers) = analyze.providers {
                    if providers.iter().all(|p| p.trim().is_empty()) {
                        return Err("--providers needs at least one provider id".to_string());
                    }
                }
            }
            Command::Serve(serve) => {
                if let Some(timeout) = serve.timeout {
                    if timeout == 0 {
                        return Err("Timeout must be at least 1 second".to_string());
                    }
                }

                if let Some(ref bind) = serve.bind {
                    if bind.parse::<std::net::SocketAddr>().is_err() {
                        return Err(format!("Invalid bind address: {}", bind));
                    }
                }
            }
            Command::InitConfig => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
