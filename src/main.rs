use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use jobaggregator::collectors::build_collectors;
use jobaggregator::collectors::runner::Runner;
use jobaggregator::collectors::scheduler::{RunStatus, Scheduler, log_outcome, run_with_deadline};
use jobaggregator::config::{Command, Config, LogFormat};
use jobaggregator::db;
use jobaggregator::routes::{self, AppState};
use jobaggregator::sink::PgJobSink;

fn init_tracing(format: LogFormat) {
    let subscriber = tracing_subscriber::fmt().with_env_filter(
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("jobaggregator=info,tower_http=info")),
    );
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        db::run_migrations(&pool).await?;
        tracing::info!("Migrations complete");
    }

    let collectors = build_collectors(
        &config.collectors,
        config.rapidapi_key.as_deref(),
        config.request_timeout(),
        config.page_delay(),
    )?;
    if collectors.is_empty() {
        anyhow::bail!("No collectors available, check --collectors and RAPIDAPI_KEY");
    }

    let sink = Arc::new(PgJobSink::new(pool.clone()));
    let runner = Arc::new(Runner::new(collectors, sink));

    match config.resolved_command() {
        Command::RunOnce => {
            let options = config.fetch_plan().options_at(Utc::now());
            let outcome = run_with_deadline(runner, options, config.run_timeout()).await;
            log_outcome(&outcome);
            outcome?;
        }
        Command::Serve {
            listen_addr,
            interval_hours,
            align_to_midnight,
        } => {
            let status = Arc::new(RunStatus::default());
            let scheduler = Scheduler::new(
                runner,
                config.fetch_plan(),
                config.schedule(interval_hours, align_to_midnight),
                Arc::clone(&status),
            );

            let (shutdown_tx, shutdown_rx) = watch::channel(());
            tokio::spawn(async move {
                shutdown_signal().await;
                let _ = shutdown_tx.send(());
            });

            let mut scheduler_rx = shutdown_rx.clone();
            let scheduler_task = tokio::spawn(scheduler.run(async move {
                let _ = scheduler_rx.changed().await;
            }));

            let app = routes::router(AppState { pool, status });
            let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
            tracing::info!("Listening on {listen_addr}");

            let mut server_rx = shutdown_rx;
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_rx.changed().await;
                })
                .await?;

            scheduler_task.await?;
            tracing::info!("Shutdown complete");
        }
    }

    Ok(())
}
