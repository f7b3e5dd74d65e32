#![doc = include_str!("../README.md")]

mod server;

use std::{future::IntoFuture, sync::Arc};

use anyhow::Context;
use axum::Router;
use clap::Parser;
use docseq::{SequenceGenerator, SqliteStore};
use server::config::{CliArgs, ServerConfig};
use server::service::handler::{AppState, router};
use server::telemetry::init_telemetry;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let app = build_app(&config)?;
    let listener = TcpListener::bind(config.server_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr))?;
    log_startup_info(&config);

    let res = run_server(listener, app, &config).await;
    providers.shutdown();
    res
}

fn build_app(config: &ServerConfig) -> anyhow::Result<Router> {
    let mut store = SqliteStore::open(&config.database_path).with_context(|| {
        format!(
            "failed to open sequence database {}",
            config.database_path.display()
        )
    })?;
    for (sequence_type, table) in &config.business_tables {
        store = store.with_business_table(sequence_type.clone(), table.clone())?;
    }

    let generator = SequenceGenerator::new(store)
        .with_policy(config.policy)
        .with_timeouts(config.timeouts);
    let state = AppState::new(generator, config.factory_shipment_digits)?;

    Ok(router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        ))
}

async fn run_server(
    listener: TcpListener,
    app: Router,
    config: &ServerConfig,
) -> anyhow::Result<()> {
    // Fired once a signal arrives; bounds how long in-flight requests may
    // keep the process alive.
    let stopping = Arc::new(Notify::new());
    let serve = axum::serve(listener, app).with_graceful_shutdown({
        let stopping = Arc::clone(&stopping);
        async move {
            shutdown_signal().await;
            stopping.notify_one();
        }
    });

    let shutdown_timeout = config.shutdown_timeout;
    tokio::select! {
        res = serve.into_future() => res?,
        () = async {
            stopping.notified().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "In-flight requests did not finish within {:?}, exiting",
                shutdown_timeout
            );
        }
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(_config: &ServerConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting sequence service on {} with full config: {:#?}",
            _config.server_addr,
            _config
        );
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting sequence service on {} backed by {}",
            _config.server_addr,
            _config.database_path.display()
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to install SIGTERM handler: {:?}", _e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::error!("Failed to install Ctrl+C handler: {:?}", _e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, terminating gracefully...");
}
