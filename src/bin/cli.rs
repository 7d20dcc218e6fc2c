//! stockwatch CLI
//!
//! Watches one product page and sends a Telegram message when it comes
//! back in stock.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use stockwatch::{
    error::{AppError, Result},
    models::Config,
    pipeline::{announce_startup, CommandListener, RetryPolicy, Scheduler},
    services::{
        live_inspector, AvailabilityProber, InMemoryInspector, Notifier, TelegramBot,
        TelegramNotifier,
    },
    utils::{http, shutdown, Clock, SystemClock},
};

/// stockwatch - Product restock watcher
#[derive(Parser, Debug)]
#[command(
    name = "stockwatch",
    version,
    about = "Watches a product page and notifies once when it is back in stock"
)]

struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the product and send notifications (default)
    Run,

    /// Check availability once and print the result
    Check {
        /// Judge a saved HTML page instead of fetching the live one
        #[arg(long)]
        html: Option<PathBuf>,
    },

    /// Validate configuration
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Ok(path) = dotenvy::dotenv() {
        log::debug!("Loaded environment from {}", path.display());
    }

    let mut config = Config::load_or_default(&cli.config);
    config.apply_process_env()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_monitor(config).await?,
        Command::Check { html } => run_check(config, html).await?,
        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK (product {})", config.product_id());
        }
    }

    Ok(())
}

/// Run the scheduler and the command listener until Ctrl-C.
async fn run_monitor(config: Config) -> Result<()> {
    config.validate()?;
    let chat_id = config
        .telegram
        .chat_id
        .ok_or_else(|| AppError::config("telegram.chat_id is missing"))?;

    log::info!("Starting stock monitor...");
    log::info!("Product: {} | Chat: {}", config.product_id(), chat_id);
    log::info!("Rendering with {:?}", config.render.engine);

    let client = http::create_async_client(&config.http)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let bot = TelegramBot::new(client, &config.telegram);
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(bot.clone(), chat_id));

    let prober = AvailabilityProber::from_config(live_inspector(&config)?, &config);
    let scheduler = Scheduler::new(&config, prober, Arc::clone(&notifier), Arc::clone(&clock));
    let status = scheduler.status_handle();

    if config.telegram.announce_startup {
        announce_startup(
            notifier.as_ref(),
            &config.messages,
            &config.product_id(),
            clock.as_ref(),
        )
        .await;
    }

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Shutdown requested");
                trigger.trigger();
            }
            Err(e) => log::error!("Cannot listen for Ctrl-C: {}", e),
        }
    });

    let listener = async {
        if config.telegram.commands_enabled {
            CommandListener::new(
                Arc::new(bot),
                status,
                config.messages.clone(),
                config.product_id(),
                Arc::clone(&clock),
                config.telegram.poll_timeout_secs,
            )
            .run(shutdown.clone())
            .await;
        }
    };

    let (final_status, ()) = tokio::join!(scheduler.run(shutdown.clone()), listener);
    log::info!(
        "Done: {} checks, {} notifications, {} failed deliveries",
        final_status.ticks,
        final_status.notifications_sent,
        final_status.delivery_failures
    );

    Ok(())
}

/// Probe once, live or from a saved page.
async fn run_check(config: Config, html: Option<PathBuf>) -> Result<()> {
    config.validate_probe()?;
    let product_id = config.product_id();

    let state = match html {
        Some(path) => {
            log::info!("Judging saved page {}", path.display());
            let page = std::fs::read_to_string(&path)?;
            let inspector = InMemoryInspector::new().with_page(config.product_url(), page);
            AvailabilityProber::from_config(Arc::new(inspector), &config)
                .probe(&product_id)
                .await?
        }
        None => {
            let prober = AvailabilityProber::from_config(live_inspector(&config)?, &config);
            let (_trigger, mut shutdown) = shutdown::channel();
            RetryPolicy::from_config(&config.retry)
                .run(&SystemClock, &mut shutdown, |_| prober.probe(&product_id))
                .await
        }
    };

    log::info!("Product {} is {}", product_id, state);
    Ok(())
}
