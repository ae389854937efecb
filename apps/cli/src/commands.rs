//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use lotscout_extract::{BrowserExtractor, BrowserOptions, PageExtractor};
use lotscout_notify::TelegramNotifier;
use lotscout_pipeline::{Pipeline, PipelineOptions, PoolOptions, Progress, RunSummary};
use lotscout_shared::{
    AppConfig, Dispatch, init_config, load_config, load_config_from, worker_count,
};
use lotscout_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LotScout — scrape live-auction lots and track buy-now offers.
#[derive(Parser)]
#[command(
    name = "lotscout",
    version,
    about = "Scrape live-auction lot listings and re-check buy-now offers.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Path to a config file (defaults to ~/.lotscout/lotscout.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

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
    /// Discover live auctions and replace the stored lot set.
    Parse,

    /// Re-check stored lots for buy-now offers and dispatch the result.
    Refresh,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
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
        0 => "lotscout=info",
        1 => "lotscout=debug",
        _ => "lotscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Parse => cmd_parse(&config).await,
        Command::Refresh => cmd_refresh(&config).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

/// Build pipeline options from config.
fn pipeline_options(config: &AppConfig) -> Result<PipelineOptions> {
    let calendar_url = Url::parse(&config.site.calendar_url)
        .map_err(|e| eyre!("invalid calendar_url '{}': {e}", config.site.calendar_url))?;

    Ok(PipelineOptions {
        calendar_url,
        pool: PoolOptions {
            worker_count: worker_count(config.extract.worker_multiplier),
            min_model_year: config.extract.min_model_year,
        },
        dispatch: config.refresh.dispatch,
    })
}

/// Launch the browser and open storage; the shared plumbing of both flows.
async fn build_stages(
    config: &AppConfig,
    cancel: &CancellationToken,
) -> Result<(Arc<BrowserExtractor>, Storage)> {
    let browser_opts = BrowserOptions {
        wait_timeout: Duration::from_secs(config.extract.wait_timeout_secs),
    };
    let browser = BrowserExtractor::launch(&browser_opts, cancel.child_token()).await?;

    let db_path = config.database.resolved_path()?;
    let storage = Storage::open(&db_path).await?;

    Ok((Arc::new(browser), storage))
}

async fn cmd_parse(config: &AppConfig) -> Result<()> {
    let options = pipeline_options(config)?;
    info!(
        calendar = %options.calendar_url,
        workers = options.pool.worker_count,
        "starting full scrape"
    );

    let cancel = CancellationToken::new();
    let (browser, storage) = build_stages(config, &cancel).await?;
    let extractor: Arc<dyn PageExtractor> = browser.clone();

    let pipeline = Pipeline::new(extractor, storage, options, cancel);

    let reporter = CliProgress::new();
    let result = pipeline.run_parse(&reporter).await;
    browser.shutdown().await;
    let summary = result?;

    println!();
    println!("  Scrape complete!");
    println!("  Auctions: {}", summary.auctions);
    println!("  Lots:     {}", summary.lots_out);
    println!("  Time:     {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_refresh(config: &AppConfig) -> Result<()> {
    let options = pipeline_options(config)?;
    info!(
        workers = options.pool.worker_count,
        dispatch = ?options.dispatch,
        "starting buy-now refresh"
    );

    let cancel = CancellationToken::new();
    let (browser, storage) = build_stages(config, &cancel).await?;
    let extractor: Arc<dyn PageExtractor> = browser.clone();

    let mut pipeline = Pipeline::new(extractor, storage, options, cancel);
    if config.refresh.dispatch == Dispatch::Telegram {
        pipeline = pipeline.with_notifier(Arc::new(telegram_notifier(config)?));
    }

    let reporter = CliProgress::new();
    let result = pipeline.run_refresh(&reporter).await;
    browser.shutdown().await;
    let summary = result?;

    println!();
    println!("  Refresh complete!");
    println!("  Checked: {}", summary.lots_in);
    println!("  Kept:    {}", summary.lots_out);
    println!("  Time:    {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

/// Build the Telegram notifier. The bot token is read from the env var
/// named in config, never from the config file itself.
fn telegram_notifier(config: &AppConfig) -> Result<TelegramNotifier> {
    let env_var = &config.telegram.bot_token_env;
    let token = std::env::var(env_var)
        .map_err(|_| eyre!("telegram bot token env var '{env_var}' is not set"))?;
    Ok(TelegramNotifier::new(token, config.telegram.chat_id.clone())?)
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl Progress for CliProgress {
    fn stage(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn unit_done(&self, current: usize, total: usize) {
        self.spinner.set_message(format!("[{current}/{total}]"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
