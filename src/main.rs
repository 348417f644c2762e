use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use store_watcher::config::{AppConfig, LoggingConfig};
use store_watcher::plugins::PluginManager;
use store_watcher::scheduler::{WatchScheduler, WatchSettings};
use store_watcher::session::HttpSession;
use store_watcher::store::{self, RecordStore};

const STATE_PREVIEW: usize = 20;

#[derive(Parser)]
#[command(name = "store-watcher", version, about = "Watch a store listing for new and restocked items")]
struct Cli {
    /// Extra configuration file layered over config/default, config/{RUN_MODE} and config/local
    #[arg(long, global = true, env = "STORE_WATCHER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the target listing and notify on new or restocked items
    Watch(WatchArgs),
    /// Inspect or reset the stored records
    State {
        #[arg(value_enum)]
        action: StateAction,
    },
}

#[derive(Args)]
struct WatchArgs {
    /// Site adapter to use (sfcc, disneystore)
    #[arg(long)]
    site: Option<String>,

    /// Listing URL; overrides watch.target_url and the target section
    #[arg(long)]
    url: Option<String>,

    /// Seconds between ticks
    #[arg(short = 'e', long)]
    every: Option<u64>,

    /// Hours an item must be absent before its return counts as a restock
    #[arg(short = 'r', long)]
    restock: Option<u64>,

    #[arg(long)]
    include_re: Option<String>,

    #[arg(long)]
    exclude_re: Option<String>,

    /// Run a single tick and exit
    #[arg(long)]
    once: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum StateAction {
    Show,
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Command::Watch(args) = &cli.command {
        apply_watch_args(&mut config, args);
    }

    let _guard = init_tracing(&config.logging)?;
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Command::Watch(args) => run_watch(config, args).await,
        Command::State { action } => run_state(config, action).await,
    }
}

fn apply_watch_args(config: &mut AppConfig, args: &WatchArgs) {
    if let Some(site) = &args.site {
        config.watch.site = site.clone();
    }
    if let Some(every) = args.every {
        config.watch.interval_secs = every;
    }
    if let Some(restock) = args.restock {
        config.watch.restock_hours = restock;
    }
    if let Some(include) = &args.include_re {
        config.watch.include_re = Some(include.clone());
    }
    if let Some(exclude) = &args.exclude_re {
        config.watch.exclude_re = Some(exclude.clone());
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("store_watcher={}", logging.level))
            .context("Invalid logging.level")?,
    };
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match logging.directory.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "store-watcher.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}

async fn run_watch(config: AppConfig, args: WatchArgs) -> Result<()> {
    let target_url = config
        .resolve_target_url(args.url.as_deref())
        .context("No usable target URL")?;

    let plugins = PluginManager::with_default_adapters().await;
    plugins
        .register_notifiers_from_config(&config.notifications)
        .await
        .context("Failed to set up notifiers")?;

    let session = HttpSession::new(&config.http)?;
    let store = store::open(&config.store).await.context("Failed to open record store")?;
    let settings = WatchSettings::from_config(&config, target_url)?;

    info!(
        notifiers = ?plugins.list_notifiers().await,
        restock_hours = settings.restock_hours,
        include = ?config.watch.include_re,
        exclude = ?config.watch.exclude_re,
        "Starting store watcher"
    );

    let mut watcher = WatchScheduler::new(plugins, &config.watch.site, session, store, settings)
        .await
        .context("Failed to start watcher")?;

    if args.once {
        watcher.tick().await.context("Tick failed")?;
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down...");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "Unable to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        }
    });

    watcher.run(shutdown_rx).await;
    Ok(())
}

async fn run_state(config: AppConfig, action: StateAction) -> Result<()> {
    let store = store::open(&config.store).await.context("Failed to open record store")?;

    match action {
        StateAction::Show => {
            let records = store.load().await?;
            println!("Items: {}", records.len());
            for record in records.values().take(STATE_PREVIEW) {
                println!(
                    "{}  {:<7}  since {}  {}  {}",
                    record.key,
                    record.status.to_string(),
                    record.status_since.to_rfc3339(),
                    record.name,
                    record.short_url()
                );
            }
            if records.len() > STATE_PREVIEW {
                println!("... ({} more)", records.len() - STATE_PREVIEW);
            }
        }
        StateAction::Clear => {
            if let Err(e) = store.clear().await {
                error!(store = %store.describe(), error = %e, "Failed to clear records");
                return Err(e.into());
            }
            println!("Cleared {}", store.describe());
        }
    }
    Ok(())
}
