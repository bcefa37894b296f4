//! VRF Requester
//!
//! Service that keeps one client state drawing verified random results. Runs
//! two concurrent subsystems:
//!
//! - **Draw loop**: initialises the client state if needed, then requests,
//!   awaits and records one result per interval.
//! - **HTTP server**: Liveness (`/health`) and readiness (`/status`) checks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::Context;
use solana_sdk::signature::Signer;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use vrf_requester::client::ClientStatus;
use vrf_requester::config::AppConfig;
use vrf_requester::metrics::Metrics;
use vrf_requester::rpc::RpcNetwork;
use vrf_requester::{RequestManager, RequesterError};

/// Shared application state accessible from HTTP handlers.
struct AppState {
    metrics: Arc<Metrics>,
    /// Whether a request is currently awaiting its result.
    in_flight: Arc<AtomicBool>,
}

/// Liveness check, returns 200 if the process is running.
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Readiness / status check, reports request metrics.
async fn status(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "running",
        "request_in_flight": data.in_flight.load(Ordering::Relaxed),
        "metrics": data.metrics.to_json(),
    }))
}

async fn run_draws(
    config: AppConfig,
    manager: RequestManager<RpcNetwork>,
    metrics: Arc<Metrics>,
    in_flight: Arc<AtomicBool>,
) {
    match manager.status().await {
        Ok(ClientStatus::Uninitialized) => match manager.init_client(config.max_result).await {
            Ok(state) => info!(client_state = %state, "Client state created"),
            Err(e) => {
                error!(error = %e, "Failed to initialize client state, stopping draws");
                return;
            }
        },
        Ok(status) => info!(?status, "Client state found"),
        Err(e) => {
            error!(error = %e, "Failed to read client state, stopping draws");
            return;
        }
    }

    let poll = config.poll_config();
    loop {
        match manager.request_randomness().await {
            Ok(ticket) => {
                metrics.record_submission();
                in_flight.store(true, Ordering::Relaxed);
                info!(
                    expected_counter = ticket.expected_counter,
                    explorer = %config.explorer_url(&ticket.signature),
                    "Request submitted"
                );
                match manager.await_result(&ticket, &poll).await {
                    Ok(result) => {
                        let latency_ms = ticket.submitted_at.elapsed().as_millis() as u64;
                        metrics.record_fulfillment(result.counter, result.value, latency_ms);
                        info!(counter = result.counter, value = result.value, latency_ms, "Result consumed");
                    }
                    Err(e) => {
                        metrics.record_error(&e);
                        warn!(error = %e, kind = ?e.kind(), "No result for request");
                    }
                }
                in_flight.store(false, Ordering::Relaxed);
            }
            Err(e @ RequesterError::RequestInFlight { .. }) => {
                warn!(error = %e, "Previous request fulfilled but not yet consumed");
            }
            Err(e) => {
                metrics.record_error(&e);
                error!(error = %e, kind = ?e.kind(), "Request refused");
            }
        }
        sleep(config.draw_interval).await;
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,solana_client=warn,solana_rpc_client=warn,hyper=warn")),
        )
        .with_target(true)
        .with_ansi(true)
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    info!(
        client_program = %config.client_program_id,
        oracle_program = %config.oracle_program_id,
        vrf = %config.vrf_account,
        payer = %config.payer_keypair.pubkey(),
        "Starting VRF requester"
    );
    info!(rpc = %config.rpc_url, queue = %config.oracle_queue, "Endpoints configured");

    let network = Arc::new(RpcNetwork::new(config.rpc_url.clone(), config.retry_policy()));
    let manager = RequestManager::new(network, config.binding(), config.payer_keypair.clone())?
        .fund_up_to(config.fund_up_to_lamports);
    info!(client_state = %manager.client_state(), "Client state derived");

    let metrics = Arc::new(Metrics::new());
    let in_flight = Arc::new(AtomicBool::new(false));

    // Background: request, await and record one result per interval.
    tokio::spawn(run_draws(config.clone(), manager, metrics.clone(), in_flight.clone()));

    let state = web::Data::new(AppState { metrics, in_flight });
    let addr = ("0.0.0.0", config.http_port);
    info!(port = config.http_port, "Starting HTTP server");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health))
            .route("/status", web::get().to(status))
    })
    .bind(addr)?
    .run()
    .await?;
    Ok(())
}
