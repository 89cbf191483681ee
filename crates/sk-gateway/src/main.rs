//! `sk-gateway` — process entry point. Loads config, wires C1-C7, drives
//! the scheduler tick loop, the reminder delivery loop, and the Telegram
//! long-polling dispatcher as independently cancellable tasks sharing one
//! `tokio::sync::watch` shutdown flag (§5), matching
//! `skynet-scheduler/src/engine.rs`'s `run(self, shutdown)` idiom and
//! `skynet-gateway/src/main.rs`'s `#[tokio::main]`/`tracing_subscriber::fmt`
//! startup shape.

use std::path::Path;
use std::sync::{Arc, RwLock};

use rusqlite::Connection;
use tracing::{info, warn};

use sk_agent::{ContextAssembler, HttpKnowledgeClient, HttpMemoryClient, Invoker, KnowledgeSource, MemorySource};
use sk_channels::{Channel, Serialiser};
use sk_core::config::SkynetConfig;
use sk_gateway::{Core, GatewayJobExecutor, GatewayReminderDeliverer, GatewaySink};
use sk_reminders::ReminderStore;
use sk_scheduler::{QuietHours, SchedulerEngine};
use sk_skills::SkillRegistry;
use sk_telegram::TelegramAdapter;

fn parse_hhmm(s: &str) -> (u8, u8) {
    let mut parts = s.splitn(2, ':');
    let hh = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let mm = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    (hh, mm)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "sk_gateway=info".into()),
        )
        .init();

    let config_path = std::env::var("SKYNET_CONFIG").ok();
    let config = SkynetConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        SkynetConfig::default()
    });

    let serialiser = Arc::new(Serialiser::new());

    let memory: Option<Box<dyn MemorySource>> = config
        .memory
        .base_url
        .as_ref()
        .map(|url| Box::new(HttpMemoryClient::new(url.clone(), config.memory.timeout_ms)) as Box<dyn MemorySource>);
    let knowledge: Option<Box<dyn KnowledgeSource>> = config
        .knowledge
        .base_url
        .as_ref()
        .map(|url| Box::new(HttpKnowledgeClient::new(url.clone(), config.knowledge.timeout_ms)) as Box<dyn KnowledgeSource>);
    let assembler = Arc::new(ContextAssembler::new(memory, knowledge));

    let invoker = Arc::new(Invoker::new(&config.agent));

    let skills = sk_skills::load_from_dirs(&[Path::new(&config.skills.skills_dir)]);
    info!(count = skills.len(), dir = %config.skills.skills_dir, "loaded skills");
    let skill_registry = SkillRegistry::new(skills);

    let telegram_config = config.channels.telegram.clone().expect("channels.telegram must be configured");
    let adapter = TelegramAdapter::new(telegram_config);
    let channel: Arc<dyn Channel> = Arc::new(adapter.clone());

    let core = Arc::new(Core {
        serialiser,
        assembler,
        invoker,
        skills: RwLock::new(Arc::new(skill_registry)),
        channel: Arc::clone(&channel),
        model: config.agent.model.clone(),
        timeout_secs: config.agent.timeout_secs,
    });

    let job_executor = Arc::new(GatewayJobExecutor { core: Arc::clone(&core) });
    let scheduler_conn = Connection::open(&config.database.path)?;
    let quiet_hours = QuietHours {
        from: parse_hhmm(&config.scheduler.quiet_hours_start),
        to: parse_hhmm(&config.scheduler.quiet_hours_end),
        tz: config.scheduler.timezone.clone(),
    };
    let scheduler = Arc::new(SchedulerEngine::new(scheduler_conn, job_executor, quiet_hours)?);

    match std::fs::read_to_string(&config.scheduler.schedule_path) {
        Ok(doc) => {
            let report = scheduler.reload(&doc);
            info!(added = report.added, kept = report.kept, rejected = report.rejected_rows.len(), "initial schedule loaded");
        }
        Err(e) => warn!(path = %config.scheduler.schedule_path, error = %e, "no schedule document at startup"),
    }

    let reminders_conn = Connection::open(&config.database.path)?;
    let reminder_store = Arc::new(ReminderStore::new(reminders_conn)?);
    let reminder_deliverer = Arc::new(GatewayReminderDeliverer { channel: Arc::clone(&channel) });

    let sink = Arc::new(GatewaySink {
        core: Arc::clone(&core),
        scheduler: Arc::clone(&scheduler),
        schedule_path: config.scheduler.schedule_path.clone(),
        skills_dir: config.skills.skills_dir.clone(),
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let scheduler_task = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx.clone()));
    let reminders_task = tokio::spawn(Arc::clone(&reminder_store).run_delivery_loop(
        reminder_deliverer,
        std::time::Duration::from_secs(config.reminders.poll_interval_secs),
        shutdown_rx.clone(),
    ));
    let mut telegram_task = tokio::spawn(adapter.run(sink));

    info!("sk-gateway started");
    tokio::signal::ctrl_c().await?;
    info!(grace_secs = config.shutdown_grace_secs, "shutdown signal received, draining");
    let _ = shutdown_tx.send(true);

    let _ = scheduler_task.await;
    let _ = reminders_task.await;

    // The Telegram dispatcher has no shutdown channel of its own — it's
    // draining in-flight channel leases via the serialiser, not a watch
    // loop — so give it `shutdown_grace_secs` to finish on its own before
    // force-cancelling (§5).
    let grace = std::time::Duration::from_secs(config.shutdown_grace_secs);
    tokio::select! {
        _ = &mut telegram_task => {}
        _ = tokio::time::sleep(grace) => {
            warn!("shutdown grace period elapsed, force-cancelling Telegram dispatcher");
            telegram_task.abort();
        }
    }

    Ok(())
}
