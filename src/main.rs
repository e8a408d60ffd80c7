use std::sync::Arc;

use leader_workers::clock::{CLOCK_ENTITY_TYPE, CURRENT_TIME_FIELD, ClockWorker};
use leader_workers::config::AppConfig;
use leader_workers::election::LeaderElectionWorker;
use leader_workers::email::worker::{CONTEXT_FIELDS, SEND_TRIGGER_FIELD, SMTP_ENTITY_TYPE};
use leader_workers::email::{SmtpMailTransport, SmtpWorker};
use leader_workers::error::Result;
use leader_workers::schema::SchemaValidator;
use leader_workers::store::{InMemoryStore, ValueKind};
use leader_workers::worker::{QuitSignal, WorkerScheduler};

const ROOT_ENTITY_TYPE: &str = "Root";
const SCHEMA_UPDATE_TRIGGER_FIELD: &str = "SchemaUpdateTrigger";

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    eprintln!("leader-workers v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Store: {} (in-process)", config.store_addr);
    eprintln!("   Tick: {:?}", config.tick_interval);
    eprintln!("   Clock interval: {:?}", config.clock.update_interval);

    // ── Store ───────────────────────────────────────────────────────────
    let store = InMemoryStore::new();
    seed_store(&store).await?;

    let quit = QuitSignal::new();

    // ── Workers ─────────────────────────────────────────────────────────
    let mut validator = SchemaValidator::new(store.clone());
    validator
        .add_entity(ROOT_ENTITY_TYPE, &[SCHEMA_UPDATE_TRIGGER_FIELD])
        .add_entity(CLOCK_ENTITY_TYPE, &[CURRENT_TIME_FIELD]);

    let clock = Arc::new(ClockWorker::new(store.clone(), &config.clock));

    let smtp = match config.smtp {
        Some(smtp_config) => {
            eprintln!(
                "   SMTP: enabled ({}:{}, from {})",
                smtp_config.host, smtp_config.port, smtp_config.email_address
            );
            let mut fields = vec![SEND_TRIGGER_FIELD];
            fields.extend(CONTEXT_FIELDS);
            validator.add_entity(SMTP_ENTITY_TYPE, &fields);

            Some(Arc::new(SmtpWorker::new(
                store.clone(),
                smtp_config.email_address.clone(),
                Arc::new(SmtpMailTransport::new(smtp_config)),
                quit.clone(),
            )))
        }
        None => {
            eprintln!("   SMTP: disabled (SMTP_HOST not set)");
            None
        }
    };

    let validator = Arc::new(validator);

    let mut election = LeaderElectionWorker::new();
    {
        let validator = Arc::clone(&validator);
        election.add_availability_criteria(move || validator.is_valid());
    }
    election.add_listener(clock.clone());
    if let Some(smtp) = &smtp {
        election.add_listener(smtp.clone());
    }

    let mut scheduler = WorkerScheduler::new(config.tick_interval, quit.clone());
    scheduler
        .register(validator)
        .register(Arc::new(election))
        .register(clock);
    if let Some(smtp) = smtp {
        scheduler.register(smtp);
    }
    eprintln!("   Workers: {}\n", scheduler.worker_count());

    // ── Shutdown on OS signal ───────────────────────────────────────────
    {
        let quit = quit.clone();
        tokio::spawn(async move {
            match wait_for_shutdown_signal().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                    quit.shutdown();
                }
                Err(e) => tracing::error!(error = %e, "Failed to install signal handlers"),
            }
        });
    }

    let reason = scheduler.run().await;
    if reason.is_failure() {
        tracing::error!(%reason, "Exiting after failure; expecting a supervised restart");
        std::process::exit(1);
    }

    Ok(())
}

/// Define the schema the workers need and create one entity of each type.
async fn seed_store(store: &InMemoryStore) -> Result<()> {
    store
        .define_entity_type(
            ROOT_ENTITY_TYPE,
            &[(SCHEMA_UPDATE_TRIGGER_FIELD, ValueKind::Int)],
        )
        .await;
    store
        .define_entity_type(CLOCK_ENTITY_TYPE, &[(CURRENT_TIME_FIELD, ValueKind::Timestamp)])
        .await;

    let mut smtp_fields = vec![(SEND_TRIGGER_FIELD, ValueKind::Int)];
    smtp_fields.extend(CONTEXT_FIELDS.map(|field| (field, ValueKind::String)));
    store.define_entity_type(SMTP_ENTITY_TYPE, &smtp_fields).await;

    for entity_type in [ROOT_ENTITY_TYPE, CLOCK_ENTITY_TYPE, SMTP_ENTITY_TYPE] {
        store.create_entity(entity_type).await?;
    }
    Ok(())
}

/// Completes when the process receives SIGINT, SIGTERM or SIGQUIT.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
