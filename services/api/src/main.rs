use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use api::{
    AppState,
    config::{AppConfig, MailTransport, StorageBackend},
    create_router,
    models::now_unix,
    notifications::NotificationScheduler,
    repositories::{MemoryStore, PgStore, Store},
};
use common::{
    database::{DatabaseConfig, health_check, init_pool},
    mail::{LogMailer, MailConfig, Mailer, SmtpMailer},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting TODO API service");

    let config = AppConfig::load().context("Failed to load configuration")?;

    let store: Arc<dyn Store> = match config.storage {
        StorageBackend::Postgres => {
            let db_config = DatabaseConfig::from_env()?;
            let pool = init_pool(&db_config).await?;

            if health_check(&pool).await? {
                info!("Database connection successful");
            } else {
                anyhow::bail!("Failed to connect to database");
            }

            let store = PgStore::new(pool);
            store.migrate().await.context("Failed to run migrations")?;
            Arc::new(store)
        }
        StorageBackend::Memory => {
            warn!("Using the in-memory store; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let mailer: Arc<dyn Mailer> = match config.mail_transport {
        MailTransport::Smtp => Arc::new(SmtpMailer::new(&MailConfig::from_env()?)?),
        MailTransport::Log => Arc::new(LogMailer),
    };

    let bind_addr = config.bind_addr.clone();
    let grace = Duration::from_secs(config.shutdown_grace_secs);
    let state = AppState::new(store.clone(), mailer.clone(), config);

    if state.verification_enabled() {
        state
            .deletions
            .restore(now_unix())
            .await
            .context("Failed to restore pending deletions")?;
    }

    let mut scheduler = if state.config.notifications.enabled {
        let notifier = NotificationScheduler::new(
            store,
            mailer,
            state.config.verification.sender.clone(),
            state.config.notifications.window_secs,
        );
        let interval = Duration::from_secs(state.config.notifications.interval_secs);
        Some(notifier.start(interval).await?)
    } else {
        info!("Due-date notifications are disabled");
        None
    };

    let app = create_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("API service listening on {}", bind_addr);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            // the server stopped on its own
            match result {
                Ok(Ok(())) => info!("Server stopped"),
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task failed: {}", e),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, draining requests for up to {:?}", grace);
            let _ = shutdown_tx.send(true);

            match tokio::time::timeout(grace, &mut server).await {
                Ok(Ok(Ok(()))) => info!("All in-flight requests finished"),
                Ok(Ok(Err(e))) => error!("Server error during shutdown: {}", e),
                Ok(Err(e)) => error!("Server task failed during shutdown: {}", e),
                Err(_) => {
                    warn!("Grace period elapsed, dropping remaining requests");
                    server.abort();
                }
            }
        }
    }

    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(e) = scheduler.shutdown().await {
            error!("Failed to stop notification scheduler: {}", e);
        }
    }

    info!("TODO API service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
