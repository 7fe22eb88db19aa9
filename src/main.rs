//! useraction agent entry point.
//!
//! Runs in the background, one instance per machine, until Ctrl+C, a
//! termination signal, or the host asks it to stop.

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use useraction::config::{OutboxSettings, Settings};
use useraction::connection::{Connection, Outbox};
use useraction::error::AgentError;
use useraction::feature::default_features;
use useraction::instance::InstanceLock;
use useraction::notification;
use useraction::rules::RuleSet;
use useraction::scheduler::{RunSummary, WatchScheduler};
use useraction::system::current_identity;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("useraction=info")),
        )
        .init();

    // run() owns the instance lock, so it is released before exit.
    let code = match run() {
        Ok(summary) => {
            tracing::info!(
                watch_cycles = summary.watch_cycles,
                delivered = summary.delivered,
                spooled = summary.spooled,
                "Agent exited"
            );
            0
        }
        Err(e) => {
            tracing::error!(error = %e, code = e.exit_code(), "Agent failed");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<RunSummary, AgentError> {
    let _lock = InstanceLock::acquire(&InstanceLock::default_path())?;

    let settings = Settings::load(&Settings::default_path()?)?;
    let connection = Connection::from_settings(&settings.server)?;
    let rules = RuleSet::from_settings(&settings);
    let outbox = open_outbox(&settings.outbox);

    let (notifier, notifications) = notification::channel();

    let ctrlc_notifier = notifier.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received");
        ctrlc_notifier.shutdown();
    })?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AgentError::Runtime)?;

    runtime.block_on(async {
        let mut scheduler = WatchScheduler::initialize(
            connection,
            rules,
            default_features(),
            &notifier,
            current_identity(),
            outbox,
        )
        .await;
        scheduler.run(notifications).await
    })
}

/// Opens the outbox if enabled. Failure leaves the agent running without
/// persistence for undelivered actions.
fn open_outbox(settings: &OutboxSettings) -> Option<Outbox> {
    if !settings.enabled {
        tracing::info!("Outbox disabled");
        return None;
    }

    match Outbox::open(&Outbox::default_path(), settings.max_records) {
        Ok(outbox) => Some(outbox),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to open outbox, undelivered actions will be lost");
            None
        }
    }
}
