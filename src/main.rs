//! Article Lens - compare article analyses across LLM providers
//!
//! Sends one article to several hosted LLM providers concurrently, bounds
//! each call with a timeout, and reports every provider's outcome side by
//! side. Runs once from the command line or as an HTTP service.
//!
//! Exit codes:
//!   0 - Success (or degraded providers without --fail-on-degraded)
//!   1 - Runtime error (config, missing API key, unreadable input, etc.)
//!   2 - At least one provider did not succeed and --fail-on-degraded was set

mod analysis;
mod cli;
mod config;
mod models;
mod prompt;
mod provider;
mod report;
mod server;

use analysis::{Aggregator, AggregatorOptions, RetryPolicy};
use anyhow::{bail, Context, Result};
use cli::{AnalyzeArgs, Args, Command, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use indicatif::{ProgressBar, ProgressStyle};
use models::AnalysisRequest;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    // API keys may live in a .env file
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    init_logging(&args);

    info!("Article Lens v{}", env!("CARGO_PKG_VERSION"));
    match dotenv {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => debug!("No .env file found"),
        Err(e) => warn!("Failed to load .env file: {}", e),
    }
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .article-lens.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to choose providers, models, timeouts, and the synthesizer.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `RUST_LOG` wins over the command-line verbosity when set.
fn init_logging(args: &Args) {
    let level = args.log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration, build the aggregator, and dispatch the subcommand.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    let aggregator = build_aggregator(&config)?;
    let shutdown = shutdown_on_ctrl_c();

    match args.command {
        Command::Analyze(ref analyze) => {
            run_analyze(analyze, &config, &aggregator, &shutdown, args.quiet).await
        }
        Command::Serve(_) => {
            let state = server::AppState::new(
                aggregator,
                config.analysis.min_article_chars,
                shutdown.clone(),
            );
            server::run_server(state, &config.server.bind, shutdown).await?;
            Ok(0)
        }
        Command::InitConfig => Ok(0),
    }
}

/// Analyze a single article and emit the report. Returns exit code (0 or 2).
async fn run_analyze(
    args: &AnalyzeArgs,
    config: &Config,
    aggregator: &Aggregator,
    shutdown: &CancellationToken,
    quiet: bool,
) -> Result<i32> {
    let text = read_article(args.file.as_deref())?;

    let chars = text.trim().chars().count();
    if chars < config.analysis.min_article_chars {
        bail!(
            "Article text is too short. Please provide at least {} characters.",
            config.analysis.min_article_chars
        );
    }

    let request = AnalysisRequest::new(text, args.topic.clone());
    info!(request_id = %request.id, chars, "Analyzing article");

    // Status lines go to stderr so the report can be piped from stdout
    if !quiet {
        eprintln!("🔬 Comparing analyses...");
        eprintln!("   Providers: {}", aggregator.provider_ids().join(", "));
        if let Some(synthesizer) = aggregator.synthesizer_id() {
            eprintln!("   Synthesizer: {}", synthesizer);
        }
        eprintln!("   Timeout: {}s per call\n", config.analysis.timeout_seconds);
    }

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        create_spinner()
    };
    spinner.set_message("Waiting for providers...");

    let result = aggregator.analyze_with_cancel(&request, shutdown).await;
    spinner.finish_and_clear();
    let report = result?;

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    match args.output {
        Some(ref path) => std::fs::write(path, &output)
            .with_context(|| format!("Failed to write report to {}", path.display()))?,
        None => println!("{}", output),
    }

    if !quiet {
        let summary = &report.comparison;
        eprintln!("\n📊 Comparison Summary:");
        eprintln!(
            "   ✅ Succeeded: {} | ❌ Failed: {} | ⏱️ Timed out: {} | 🚫 Cancelled: {}",
            summary.succeeded, summary.failed, summary.timed_out, summary.cancelled
        );
        if let Some(ref fastest) = summary.fastest {
            eprintln!("   Fastest: {}", fastest);
        }
        eprintln!("   Duration: {:.1}s", report.duration_ms as f64 / 1000.0);
        if let Some(ref path) = args.output {
            eprintln!("\n✅ Report saved to: {}", path.display());
        }
    }

    if args.fail_on_degraded && !report.all_succeeded() {
        eprintln!(
            "\n⛔ Providers without a result: {}. Failing (exit code 2).",
            report.degraded_providers().join(", ")
        );
        return Ok(2);
    }

    Ok(0)
}

/// Read the article from a file, or from stdin when no file is given.
fn read_article(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read article: {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read article from stdin")?;
            Ok(text)
        }
    }
}

fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Build provider clients and the aggregator from the merged configuration.
fn build_aggregator(config: &Config) -> Result<Aggregator> {
    let http = provider::http_client()?;
    let providers = provider::build_providers(config.enabled_providers(), &http)?;

    let options = AggregatorOptions::new(config.analysis.per_call_timeout()).with_retry(
        RetryPolicy::new(config.analysis.retries, config.analysis.retry_backoff()),
    );
    debug!("Aggregator options: {:?}", options);

    let mut aggregator = Aggregator::new(providers.clone(), options);

    if let Some(ref id) = config.analysis.synthesizer {
        // Reuse the compared provider's client when the synthesizer is one of them
        let synthesizer = match providers.iter().find(|p| p.id() == id) {
            Some(existing) => existing.clone(),
            None => {
                let provider_config = config
                    .provider(id)
                    .with_context(|| format!("Synthesizer '{}' is not configured", id))?;
                provider::build_provider(provider_config, &http)?
            }
        };
        aggregator = aggregator.with_synthesizer(synthesizer);
    }

    Ok(aggregator)
}

/// Cancel the returned token on Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, cancelling pending provider calls");
                trigger.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    token
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
