use std::{process, sync::Arc, time::Duration};

use monsterdex::{
    application::{
        catalog::CatalogService,
        error::AppError,
        monsters::MonsterWriteService,
        repos::{MonstersRepo, MonstersWriteRepo, ReferenceRepo},
    },
    cache::{CacheConfig, CacheTrigger, TtlCache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState, RouterState},
        storage::build_object_store,
        telemetry,
    },
};
use sqlx::PgPool;
use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_and_migrate(&settings).await?;
    pool.close().await;
    info!(target: "monsterdex::migrate", "Migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_and_migrate(&settings).await?;
    let repositories = Arc::new(
        PostgresRepositories::new(pool).with_operation_timeout(settings.database.operation_timeout),
    );
    let blobs = build_object_store(&settings.storage).map_err(AppError::from)?;

    let cache = Arc::new(TtlCache::new());
    let (trigger, cache_handle) =
        CacheTrigger::start(&CacheConfig::from(&settings.cache), Arc::clone(&cache));

    let monsters_repo: Arc<dyn MonstersRepo> = repositories.clone();
    let monsters_write_repo: Arc<dyn MonstersWriteRepo> = repositories.clone();
    let reference_repo: Arc<dyn ReferenceRepo> = repositories.clone();

    let catalog = Arc::new(CatalogService::new(
        monsters_repo.clone(),
        reference_repo,
        cache,
        trigger.clone(),
    ));
    let monsters = Arc::new(
        MonsterWriteService::new(monsters_repo, monsters_write_repo, blobs, trigger.clone())
            .with_blob_timeout(settings.storage.timeout),
    );

    let state = RouterState {
        api: ApiState {
            catalog,
            monsters,
            max_image_bytes: usize::try_from(settings.uploads.max_request_bytes.get())
                .unwrap_or(usize::MAX),
        },
        health: repositories,
    };

    let result = serve_http(&settings, state).await;

    trigger.flush().await;
    drop(trigger);
    if let Err(err) = cache_handle.await {
        warn!(error = %err, "cache worker ended abnormally");
    }

    result
}

async fn connect_and_migrate(settings: &config::Settings) -> Result<PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(pool)
}

async fn serve_http(settings: &config::Settings, state: RouterState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "HTTP server listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!("HTTP server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, then allows in-flight requests `grace` to drain.
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
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

    info!(grace_ms = grace.as_millis() as u64, "Shutdown requested");
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!("Graceful shutdown window elapsed; exiting");
        process::exit(0);
    });
}
