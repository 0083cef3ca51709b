use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue};
use axum::Router;
use scale_logbook::backup::{BackupScheduler, SchedulerOptions, SystemClock};
use scale_logbook::config::Config;
use scale_logbook::logging::{init_tracing, LogConfig};
use scale_logbook::report::renderer_for;
use scale_logbook::routes::build_router;
use scale_logbook::services::TelegramChannel;
use scale_logbook::state::{AppState, Services};
use scale_logbook::store::Store;
use scale_logbook::workers::WorkerManager;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    init_tracing(&LogConfig::from(&config));
    tracing::info!("Starting scale-logbook");

    let store = Arc::new(Store::open(&config.sled_path).expect("Failed to open sled database"));
    store.run_migrations().expect("Failed to run migrations");

    let report_dir = PathBuf::from(&config.report.output_dir);
    std::fs::create_dir_all(&report_dir).expect("Failed to create report directory");

    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let channel = Arc::new(TelegramChannel::new(&config.telegram));
    if !channel.is_configured() {
        tracing::warn!("TELEGRAM_BOT_TOKEN is not set; backups and exports will fail until it is");
    }
    let services = Services {
        renderer: renderer_for(
            config.report.format,
            report_dir.clone(),
            config.report.utc_offset(),
        ),
        channel,
        clock: Arc::new(SystemClock),
    };

    let scheduler = Arc::new(BackupScheduler::new(
        store.clone(),
        store.clone(),
        services.renderer.clone(),
        services.channel.clone(),
        services.clock.clone(),
        SchedulerOptions {
            poll_interval: Duration::from_secs(config.backup.poll_interval_secs.max(1)),
            delivery_timeout: Duration::from_secs(config.backup.delivery_timeout_secs),
            utc_offset: config.report.utc_offset(),
        },
    ));
    if config.backup.scheduler_enabled {
        scheduler.start();
    } else {
        tracing::info!("Backup scheduler disabled by configuration");
    }

    let state = AppState::new(store.clone(), scheduler.clone(), services, &config);

    if config.worker.is_leader {
        let workers = WorkerManager::new(
            store.clone(),
            report_dir,
            shutdown_tx.subscribe(),
            &config.worker,
        );
        tokio::spawn(async move {
            match workers.start().await {
                Ok(()) => tracing::info!("Housekeeping workers stopped"),
                Err(e) => {
                    tracing::error!(error = %e, "Housekeeping workers failed; HTTP server continues")
                }
            }
        });
    }

    let app = with_http_layers(build_router(state), &config);

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");

    let server_future = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()));

    if let Err(e) = server_future.await {
        tracing::error!(error = %e, "HTTP server crashed");
    }

    scheduler.shutdown().await;

    tracing::info!("Flushing store before exit");
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
    tracing::info!("Shutdown complete");
}

fn with_http_layers(router: Router, config: &Config) -> Router {
    let headers: [(HeaderName, &'static str); 3] = [
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_FRAME_OPTIONS, "DENY"),
        (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
    ];
    headers.into_iter().fold(
        router
            .layer(cors_layer(&config.cors_origin))
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::new()),
        |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::if_not_present(
                name,
                HeaderValue::from_static(value),
            ))
        },
    )
}

/// `*` allows any origin without credentials; anything else must be a single
/// valid origin.
fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_methods(Any);
    if origin.trim() == "*" {
        return layer.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(value),
        Err(e) => panic!("FATAL: CORS_ORIGIN '{origin}' is not a valid header value: {e}"),
    }
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
