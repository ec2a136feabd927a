use std::{
    process,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use edgecache::{
    application::{context::CollectionContext, error::AppError},
    cache::{CacheConfig, CacheConsistencyEngine},
    config::{self, CacheBackend},
    domain::error::DomainError,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry, wiring,
    },
};
use futures::stream::{self, TryStreamExt};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const REFRESH_CONCURRENCY: usize = 4;

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

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Refresh(args) => run_refresh(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let backing = wiring::build_backing(&settings)?;
    let registry = wiring::build_registry(&settings, backing)?;
    let engine = CacheConsistencyEngine::new(CacheConfig::from(&settings.cache));

    info!(
        addr = %settings.server.addr,
        collections = ?registry.names(),
        populate = settings.cache.populate.as_str(),
        "starting edgecache"
    );

    let router = http::build_router(HttpState::new(engine), &registry);
    serve_http(&settings, router).await
}

async fn run_refresh(settings: config::Settings, args: config::RefreshArgs) -> Result<(), AppError> {
    if settings.cache.backend == CacheBackend::Memory {
        warn!("cache backend is `memory`; refreshed entries are discarded on exit");
    }

    let backing = wiring::build_backing(&settings)?;
    let registry = wiring::build_registry(&settings, backing)?;
    let engine = CacheConsistencyEngine::new(CacheConfig::from(&settings.cache));

    let contexts: Vec<CollectionContext> = if args.collections.is_empty() {
        registry.iter().cloned().collect()
    } else {
        args.collections
            .iter()
            .map(|name| {
                registry.get(name).cloned().ok_or_else(|| {
                    AppError::from(DomainError::validation(format!(
                        "collection `{name}` is not configured"
                    )))
                })
            })
            .collect::<Result<_, _>>()?
    };

    let refreshed = Arc::new(AtomicUsize::new(0));
    let engine = &engine;
    let counter = &refreshed;
    stream::iter(contexts.into_iter().map(Ok::<_, AppError>))
        .try_for_each_concurrent(Some(REFRESH_CONCURRENCY), |ctx| async move {
            let ack = engine
                .refresh_collection(&ctx)
                .await
                .map_err(|err| AppError::unexpected(format!("{}: {err}", ctx.name())))?;
            if !ack.cache_updated {
                return Err(AppError::unexpected(format!(
                    "{}: cache entry could not be written",
                    ctx.name()
                )));
            }
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .await?;

    info!(
        target = "edgecache::refresh",
        collections = refreshed.load(Ordering::Relaxed),
        "Refreshed collection entries"
    );
    Ok(())
}

async fn serve_http(settings: &config::Settings, router: axum::Router) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let shutdown = Arc::new(Notify::new());
    let notified = Arc::clone(&shutdown);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { notified.notified().await });
    let mut server = tokio::spawn(server.into_future());

    tokio::select! {
        result = &mut server => return flatten_server_result(result),
        () = shutdown_signal() => {
            info!(
                grace_seconds = settings.server.graceful_shutdown.as_secs(),
                "shutdown requested; draining connections"
            );
            shutdown.notify_one();
        }
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(result) => flatten_server_result(result),
        Err(_) => {
            warn!("graceful shutdown timed out; dropping open connections");
            Ok(())
        }
    }
}

fn flatten_server_result(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::from(InfraError::from(err))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
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
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
