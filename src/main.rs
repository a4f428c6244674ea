use std::{process, sync::Arc};

use rendercache::{
    application::{error::AppError, renderer::PageRenderer},
    cache::{CacheConfig, DurableStore, MemoryDurableStore, PageCache, normalize},
    config::{self, StoreBackend},
    infra::{
        db::{self, PostgresDurableStore},
        error::InfraError,
        http::{self, AdminState, HttpState},
        render::UpstreamRenderer,
        telemetry,
    },
};
use tokio::{sync::watch, try_join};
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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Purge(args) => run_purge(settings, args).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store = init_store(&settings).await?;
    let renderer = init_renderer(&settings)?;

    let cache_config = CacheConfig {
        base_href: settings.render.base_href.clone(),
        ..CacheConfig::from(&settings.cache)
    };
    info!(
        backend = ?settings.store.backend,
        single_flight = cache_config.single_flight,
        durable_write_mode = ?cache_config.durable_write_mode,
        "page cache ready"
    );
    let cache = Arc::new(PageCache::new(cache_config, store));

    let http_state = HttpState {
        cache: cache.clone(),
        renderer,
    };
    let admin_state = AdminState {
        cache: cache.clone(),
    };

    let result = serve_http(&settings, http_state, admin_state).await;

    if tokio::time::timeout(settings.server.graceful_shutdown, cache.flush())
        .await
        .is_err()
    {
        warn!("pending durable writes not flushed before shutdown deadline");
    }

    result
}

async fn run_purge(settings: config::Settings, args: config::PurgeArgs) -> Result<(), AppError> {
    if settings.store.backend != StoreBackend::Postgres {
        return Err(AppError::validation(
            "purge operates on the durable tier and requires the postgres backend",
        ));
    }
    let store = PostgresDurableStore::new(connect_database(&settings).await?);

    let mut keys = Vec::new();
    if let Some(url) = args.url.as_deref() {
        keys.push(normalize(url));
    }
    if let Some(pattern) = args.pattern.as_deref() {
        if pattern.is_empty() {
            return Err(AppError::validation("--pattern must not be empty"));
        }
        keys.extend(store.scan_keys(pattern).await?);
    }

    let mut failures = 0usize;
    for key in &keys {
        if let Err(err) = store.delete(key).await {
            failures += 1;
            warn!(key = %key, error = %err, "durable delete failed");
        }
    }

    info!(
        target = "rendercache::purge",
        keys = keys.len(),
        failures,
        "purge completed"
    );

    if failures > 0 {
        return Err(AppError::unexpected(format!(
            "{failures} of {} deletions failed",
            keys.len()
        )));
    }
    Ok(())
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    // connect_database applies pending migrations.
    connect_database(&settings).await?;
    info!(target = "rendercache::migrate", "migrations applied");
    Ok(())
}

async fn connect_database(settings: &config::Settings) -> Result<sqlx::PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = db::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    db::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    Ok(pool)
}

async fn init_store(settings: &config::Settings) -> Result<Arc<dyn DurableStore>, AppError> {
    match settings.store.backend {
        StoreBackend::Postgres => {
            let pool = connect_database(settings).await?;
            Ok(Arc::new(PostgresDurableStore::new(pool)))
        }
        StoreBackend::Memory => {
            warn!("using the in-memory durable store; entries are lost on restart");
            Ok(Arc::new(MemoryDurableStore::new()))
        }
    }
}

fn init_renderer(settings: &config::Settings) -> Result<Arc<dyn PageRenderer>, AppError> {
    let upstream = settings
        .render
        .upstream_url
        .clone()
        .ok_or_else(|| InfraError::configuration("render.upstream_url is not configured"))?;

    let renderer = UpstreamRenderer::new(upstream, settings.render.timeout)?;
    Ok(Arc::new(renderer))
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_router(http_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(InfraError::from)?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(InfraError::from)?;

    info!(
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx));

    let servers = async { try_join!(public_server, admin_server).map(|_| ()) };
    tokio::pin!(servers);

    tokio::select! {
        result = &mut servers => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, draining connections");
            let _ = shutdown_tx.send(true);
            match tokio::time::timeout(settings.server.graceful_shutdown, &mut servers).await {
                Ok(result) => {
                    result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
                }
                Err(_) => warn!("graceful shutdown deadline exceeded"),
            }
        }
    }

    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
