//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kaggleingest_core::pipeline::PipelineConfig;
use kaggleingest_core::{JobRegistry, JobState, RenderCache, cache_key};
use kaggleingest_shared::{
    AppConfig, IngestRequest, OutputFormat, ResourceRef, init_config, load_config,
};
use kaggleingest_source::{KaggleClient, NotebookSource};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// KaggleIngest: Kaggle context for LLMs.
#[derive(Parser)]
#[command(
    name = "kaggleingest",
    version,
    about = "Turn Kaggle competition and dataset URLs into token-efficient LLM context.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ingest a Kaggle competition or dataset.
    Ingest {
        /// Kaggle URL (competition or dataset).
        url: String,

        /// Number of top notebooks to include (1-50, defaults from config).
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// Output format: toon, txt, or md (defaults from config).
        #[arg(short, long)]
        format: Option<String>,

        /// Validate the resource and print metadata without fetching content.
        #[arg(long)]
        dry_run: bool,

        /// Output file path (defaults to <resource>.<format> in the cwd).
        #[arg(short, long)]
        out: Option<String>,

        /// Print the rendered output to stdout instead of a file.
        #[arg(long)]
        stdout: bool,
    },

    /// TOON document tooling.
    Toon {
        #[command(subcommand)]
        action: ToonAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// TOON subcommands.
#[derive(Subcommand)]
pub(crate) enum ToonAction {
    /// Validate a TOON file's structure and column alignment.
    Validate {
        /// Path to a .toon file.
        file: String,
    },
    /// Convert a TOON file to JSON on stdout.
    ToJson {
        /// Path to a .toon file.
        file: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kaggleingest=info",
        1 => "kaggleingest=debug",
        _ => "kaggleingest=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ingest {
            url,
            top_n,
            format,
            dry_run,
            out,
            stdout,
        } => cmd_ingest(&url, top_n, format.as_deref(), dry_run, out.as_deref(), stdout).await,
        Command::Toon { action } => match action {
            ToonAction::Validate { file } => cmd_toon_validate(&file),
            ToonAction::ToJson { file } => cmd_toon_to_json(&file),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// ingest
// ---------------------------------------------------------------------------

async fn cmd_ingest(
    url: &str,
    top_n: Option<usize>,
    format: Option<&str>,
    dry_run: bool,
    out: Option<&str>,
    to_stdout: bool,
) -> Result<()> {
    let config = load_config()?;

    let resource = ResourceRef::from_url(url)?;
    let format: OutputFormat = format.unwrap_or(config.defaults.format.as_str()).parse()?;
    let request = IngestRequest {
        resource,
        top_n: top_n.unwrap_or(config.defaults.top_n),
        format,
        dry_run,
    };

    // Credentials are validated here, before any job is registered.
    let source: Arc<dyn NotebookSource> = Arc::new(KaggleClient::new(&config.kaggle)?);

    let registry = Arc::new(JobRegistry::new());
    let pipeline_config = PipelineConfig {
        concurrency: config.defaults.concurrency,
        ranking: config.ranking.clone(),
    };

    info!(resource = %request.resource, top_n = request.top_n, "ingest starting");
    let job_id = Arc::clone(&registry)
        .submit(request.clone(), source, pipeline_config)
        .await;
    let cancel = registry.cancel_token(job_id).await?;
    spawn_ctrlc_handler(cancel);

    // The job runs in its own task; the CLI just polls for status.
    let spinner = make_spinner();
    let snapshot = loop {
        let snap = registry.snapshot(job_id).await?;
        match snap.state {
            JobState::Queued => spinner.set_message("Queued"),
            JobState::InProgress if snap.progress.total > 0 => {
                spinner.set_message(format!(
                    "Fetching notebooks [{}/{}]",
                    snap.progress.processed, snap.progress.total
                ));
            }
            JobState::InProgress => spinner.set_message("Fetching metadata"),
            JobState::Complete | JobState::Failed => break snap,
        }
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
    };
    spinner.finish_and_clear();

    if snapshot.state == JobState::Failed {
        let reason = snapshot.error.unwrap_or_else(|| "job failed".into());
        return Err(eyre!(reason));
    }
    let result = registry.result(job_id).await?;

    if dry_run {
        println!();
        println!("  Resource validated.");
        println!("  Title:  {}", result.metadata.title);
        println!("  Kind:   {}", result.metadata.kind);
        println!("  URL:    {}", result.metadata.url);
        println!();
        return Ok(());
    }

    // Render through the cache so identical requests in one process share a
    // single render. The CLI builds a fresh cache per invocation, so the TTL
    // and sweeper only matter to long-lived embedders, which should hold one
    // process-scoped cache and call spawn_sweeper on it.
    let cache = RenderCache::new(config.cache.ttl());
    let rendered = cache
        .get_or_render(&cache_key(&request), || async {
            kaggleingest_toon::render(&result, request.format)
        })
        .await?;

    if to_stdout {
        println!("{rendered}");
    } else {
        let path = match out {
            Some(p) => PathBuf::from(p),
            None => PathBuf::from(format!(
                "{}.{}",
                request.resource.id.replace('/', "-"),
                request.format.extension()
            )),
        };
        std::fs::write(&path, rendered.as_bytes())
            .map_err(|e| eyre!("failed to write {}: {e}", path.display()))?;

        println!();
        println!("  Ingestion complete!");
        println!("  Job:        {}", snapshot.id);
        println!("  Notebooks:  {}/{} fetched", result.stats.successful, result.stats.requested);
        if result.stats.failed > 0 {
            println!("  Failed:     {}", result.stats.failed);
            for failure in &result.stats.failures {
                println!("    - {} ({})", failure.reference, failure.reason);
            }
        }
        println!("  Time:       {:.1}s", result.stats.duration_seconds);
        println!("  Output:     {}", path.display());
        println!();
    }

    Ok(())
}

/// Cancel the running job on ctrl-C; a second ctrl-C kills the process.
fn spawn_ctrlc_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling job");
            cancel.cancel();
        }
    });
}

/// Terminal spinner shown while a job is polled.
fn make_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

// ---------------------------------------------------------------------------
// toon tooling
// ---------------------------------------------------------------------------

fn cmd_toon_validate(file: &str) -> Result<()> {
    let text = std::fs::read_to_string(file).map_err(|e| eyre!("failed to read {file}: {e}"))?;
    kaggleingest_toon::validate(&text)?;

    let doc = kaggleingest_toon::decode(&text)?;
    println!(
        "{file}: valid ({} sections, {} blocks)",
        doc.sections.len(),
        doc.blocks.len()
    );
    Ok(())
}

fn cmd_toon_to_json(file: &str) -> Result<()> {
    let text = std::fs::read_to_string(file).map_err(|e| eyre!("failed to read {file}: {e}"))?;
    let doc = kaggleingest_toon::decode(&text)?;
    let json = kaggleingest_toon::to_json(&doc);
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
