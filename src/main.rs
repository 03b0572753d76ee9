use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use doclens::config::{Config, API_KEY_ENV};
use doclens::fetch::HttpFetcher;
use doclens::llm::Model;
use doclens::report::{ReportStore, SavedPaths};
use doclens::util::mask_secret;
use doclens::{
    AnalysisReport, DimensionKey, DocumentSource, Pipeline, ReportFormat, RevisionEngine,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "doclens",
    about = "Grade documentation articles and draft link-preserving revisions",
    version
)]
struct Cli {
    /// Verbose logging (same as RUST_LOG=doclens=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze an article and write reports (optionally a revision too)
    Analyze(AnalyzeArgs),
    /// Revise an article from a previously saved JSON report
    Revise(ReviseArgs),
    /// Check configuration and API key
    Doctor,
    /// Store an OpenRouter API key in the system keychain
    Setup,
}

#[derive(Args, Debug, Clone)]
struct RunOptions {
    /// Model tier: speed, balanced or smart
    #[arg(long)]
    model: Option<String>,
    /// Oracle attempts per request
    #[arg(long)]
    attempts: Option<u32>,
    /// Seconds to wait between attempts
    #[arg(long)]
    backoff_secs: Option<u64>,
    /// Output directory for reports
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Discard revisions that add or drop any hyperlink
    #[arg(long)]
    verify_links: bool,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Article URL
    #[arg(required_unless_present = "file")]
    url: Option<String>,
    /// Analyze a local file instead of fetching a URL ("-" reads stdin)
    #[arg(long, conflicts_with = "url")]
    file: Option<PathBuf>,
    /// Skip the revision step
    #[arg(long)]
    no_revise: bool,
    /// Print the rendered report to stdout as well
    #[arg(long, value_parser = parse_format)]
    print: Option<ReportFormat>,
    #[command(flatten)]
    options: RunOptions,
}

#[derive(Args, Debug)]
struct ReviseArgs {
    /// Saved structured report (<stem>_analysis.json)
    report: PathBuf,
    /// Use this file as the article text instead of re-fetching the report's URL
    #[arg(long)]
    file: Option<PathBuf>,
    #[command(flatten)]
    options: RunOptions,
}

fn parse_format(raw: &str) -> Result<ReportFormat, String> {
    ReportFormat::parse(raw).ok_or_else(|| format!("unknown format '{}' (json or markdown)", raw))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "doclens=debug" } else { "doclens=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Analyze(args) => run_analyze(args).await,
        Commands::Revise(args) => run_revise(args).await,
        Commands::Doctor => run_doctor(),
        Commands::Setup => run_setup(),
    }
}

fn resolve_config(options: &RunOptions) -> Result<Config> {
    let mut config = Config::load_with_env();
    if let Some(raw) = &options.model {
        config.model = Model::parse(raw)
            .with_context(|| format!("unknown model '{}' (speed, balanced or smart)", raw))?;
    }
    if let Some(attempts) = options.attempts {
        config.max_attempts = attempts;
    }
    if let Some(backoff) = options.backoff_secs {
        config.backoff_secs = backoff;
    }
    if let Some(output) = &options.output {
        config.output_dir = Some(output.clone());
    }
    if options.verify_links {
        config.verify_links = true;
    }
    Ok(config)
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let gateway = config.build_gateway(config.get_api_key());
    if let Some(reason) = gateway.unavailable_reason() {
        eprintln!("  Warning: {}", reason);
        eprintln!("  Every analysis will be reported as Error.");
    }
    let fetcher = HttpFetcher::new().context("Failed to build HTTP client")?;
    Ok(Pipeline::new(gateway, Arc::new(fetcher))
        .with_revision_engine(RevisionEngine::new(config.verify_links)))
}

fn read_document(path: &Path) -> Result<(String, String)> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(("stdin".to_string(), text));
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let label = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok((label, text))
}

async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let config = resolve_config(&args.options)?;
    let pipeline = build_pipeline(&config)?;

    let source = match (&args.url, &args.file) {
        (_, Some(path)) => {
            let (label, text) = read_document(path)?;
            DocumentSource::Text { label, text }
        }
        (Some(url), None) => DocumentSource::Url(url.clone()),
        (None, None) => bail!("provide an article URL or --file"),
    };

    eprintln!("  Analyzing {}...", source.label());
    let output = pipeline
        .analyze_and_optionally_revise(source, !args.no_revise)
        .await?;

    let store = ReportStore::new(config.output_dir());
    let mut saved = store.save_report(&output.report)?;
    if let Some(revision) = &output.revision {
        let revised = store.save_revision(&output.report.source_url, &revision.text)?;
        saved.revised_text = revised.revised_text;
        saved.revised_markdown = revised.revised_markdown;
    } else if !args.no_revise {
        eprintln!("  Revision did not produce output; see the log for details.");
    }

    if let Some(format) = args.print {
        println!("{}", output.report.render(format));
    }
    print_summary(&output.report, &saved);
    Ok(())
}

async fn run_revise(args: ReviseArgs) -> Result<()> {
    let config = resolve_config(&args.options)?;
    let report = ReportStore::load_report(&args.report)?;
    let pipeline = build_pipeline(&config)?;

    let document = match &args.file {
        Some(path) => read_document(path)?.1,
        None => {
            let source = DocumentSource::Url(report.source_url.clone());
            pipeline.load_document(&source).await?
        }
    };

    eprintln!("  Revising {}...", report.source_url);
    let Some(revision) = pipeline.revise(&report, &document).await else {
        bail!("revision failed; no output written");
    };

    let store = ReportStore::new(config.output_dir());
    let saved = store.save_revision(&report.source_url, &revision.text)?;
    for path in saved.all() {
        eprintln!("  + Saved {}", path.display());
    }
    Ok(())
}

fn print_summary(report: &AnalysisReport, saved: &SavedPaths) {
    eprintln!();
    eprintln!("  Overall score: {}", report.current_overall_score());
    for key in DimensionKey::ALL {
        if let Some(result) = report.dimensions.get(&key) {
            eprintln!(
                "    {:<13} {:<5}  {} issue(s), {} suggestion(s)",
                key.display_name(),
                result.score.as_str(),
                result.issues.len(),
                result.suggestions.len()
            );
        }
    }
    eprintln!();
    for path in saved.all() {
        eprintln!("  + Saved {}", path.display());
    }
}

fn run_doctor() -> Result<()> {
    let config = Config::load_with_env();
    println!("Config:        {}", Config::config_location());
    println!("Model:         {} ({})", config.model, config.model.id());
    println!(
        "Retry policy:  {} attempt(s), {}s backoff",
        config.max_attempts, config.backoff_secs
    );
    println!("Timeout:       {}s", config.request_timeout_secs);
    println!("Output dir:    {}", config.output_dir().display());
    println!("Verify links:  {}", config.verify_links);

    match config.get_api_key() {
        Some(key) => {
            println!("API key:       {}", mask_secret(&key));
            if !Config::validate_api_key_format(&key) {
                println!("  Warning: key doesn't look like an OpenRouter key (should start with sk-)");
            }
            Ok(())
        }
        None => {
            println!("API key:       missing");
            bail!(
                "no OpenRouter API key found; set {} or run `doclens setup`",
                API_KEY_ENV
            )
        }
    }
}

fn run_setup() -> Result<()> {
    use std::io::Write;

    println!();
    println!("  doclens uses OpenRouter to grade and revise articles.");
    println!("  1. Get an API key at: https://openrouter.ai/keys");
    println!("  2. Paste it below (saved in your system keychain)");
    println!();
    print!("  API Key: ");
    std::io::stdout().flush()?;

    let mut key = String::new();
    std::io::stdin().read_line(&mut key)?;
    let key = key.trim();
    if key.is_empty() {
        bail!("no API key provided");
    }
    if !Config::validate_api_key_format(key) {
        println!("  Warning: key doesn't look like an OpenRouter key (should start with sk-). Saving anyway...");
    }

    let config = Config::load();
    config.set_api_key(key).map_err(anyhow::Error::msg)?;
    config.save().map_err(anyhow::Error::msg)?;
    println!("  + API key saved ({})", mask_secret(key));
    Ok(())
}
