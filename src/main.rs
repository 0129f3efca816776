use std::sync::Arc;
use std::time::Duration;

use ride_orchestrator::api;
use ride_orchestrator::config;
use ride_orchestrator::engine;
use ride_orchestrator::error;
use ride_orchestrator::geo::http::HttpGeoRouting;
use ride_orchestrator::state;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let geo = HttpGeoRouting::new(
        &config.nominatim_url,
        &config.osrm_url,
        &config.geo_user_agent,
        Duration::from_millis(config.provider_timeout_ms),
    )?;
    let shared_state = Arc::new(state::AppState::new(&config, Arc::new(geo))?);

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(engine::expiry::run_acceptance_expiry(
        shared_state.dispatcher.clone(),
        Duration::from_secs(config.accept_timeout_secs),
        Duration::from_secs(config.expiry_sweep_secs),
    ));
    tokio::spawn(prune_sessions(
        shared_state.clone(),
        Duration::from_secs(config.expiry_sweep_secs),
    ));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        nominatim = %config.nominatim_url,
        osrm = %config.osrm_url,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn prune_sessions(state: Arc<state::AppState>, every: Duration) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let pruned = state.prune_finished_sessions();
        if pruned > 0 {
            tracing::info!(pruned, "pruned finished sessions");
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
