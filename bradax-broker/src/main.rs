//! Broker entrypoint: load settings, assemble state, serve.

use std::net::SocketAddr;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use bradax_broker::app::AppState;
use bradax_broker::config::Settings;
use bradax_broker::http::build_router;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bradax_broker=info,bx_warden=info")),
        )
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(error) => {
            tracing::error!(%error, "configuration invalid, refusing to start");
            return ExitCode::FAILURE;
        }
    };
    let bind_addr = settings.bind_addr;
    let environment = settings.environment;

    let state = match AppState::build(settings) {
        Ok(state) => state,
        Err(error) => {
            tracing::error!(%error, "startup validation failed, refusing to start");
            return ExitCode::FAILURE;
        }
    };

    spawn_reload_handler(&state);

    let router = build_router(state);
    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, %bind_addr, "could not bind listener");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(%bind_addr, environment = environment.as_str(), "bradax broker listening");
    let serve = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(error) = serve.await {
        tracing::error!(%error, "server exited with error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// SIGHUP is the operator action for both reload paths: re-read the
/// guardrail rule file and re-create any stream file a log rotation moved.
#[cfg(unix)]
fn spawn_reload_handler(state: &AppState) {
    let state = state.clone();
    tokio::spawn(async move {
        let mut hup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        {
            Ok(hup) => hup,
            Err(error) => {
                tracing::error!(%error, "failed to install SIGHUP handler");
                return;
            }
        };
        while hup.recv().await.is_some() {
            match state.rules.reload() {
                Ok(()) => tracing::info!("guardrail rules reloaded on SIGHUP"),
                Err(error) => {
                    tracing::error!(%error, "rule reload failed, keeping previous snapshot");
                }
            }
            if let Err(error) = state.telemetry.reload() {
                tracing::error!(%error, "telemetry stream reopen failed");
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_handler(_state: &AppState) {}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to install shutdown handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
