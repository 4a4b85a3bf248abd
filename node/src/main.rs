mod api;
mod config;
mod error;
mod file_service;
mod identifier;
#[cfg(test)]
mod integration_tests;
mod node;
mod ring_service;
mod storage;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Settings;
use file_service::FileService;
use ring_service::RingService;
use storage::{LocalFsStorage, Storage};
use transport::HttpTransport;

pub struct AppState {
    ring: Arc<RingService>,
    file_service: Arc<FileService>,
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = Settings::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr = settings.address();
    info!(node = %addr.label(), m_bits = settings.m_bits, "starting chord dfs node");

    let storage: Arc<dyn Storage> = Arc::new(LocalFsStorage::new(settings.storage_path.clone()));
    storage.initialize().await.expect("failed to initialize storage directory");

    let transport = Arc::new(HttpTransport::new(seconds(settings.rpc_timeout)));

    let ring = Arc::new(RingService::new(
        addr.clone(),
        settings.m_bits,
        transport.clone(),
        seconds(settings.stabilize_interval),
        seconds(settings.join_retry_interval),
    ));

    let file_service = Arc::new(FileService::new(ring.clone(), storage, transport, settings.m_bits));

    let state = web::Data::new(AppState { ring: ring.clone(), file_service });

    if let Some(bootstrap) = settings.bootstrap_address() {
        ring.join_ring(bootstrap).await;
    } else {
        info!("no bootstrap peer configured, starting a new ring");
    }
    ring.spawn_stabilize_loop();

    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(api::configure))
        .bind((addr.host.as_str(), addr.port))?
        .run();

    let server_handle = server.handle();
    let ring_for_shutdown = ring.clone();
    actix_rt::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown requested, leaving ring");
        ring_for_shutdown.stop();
        ring_for_shutdown.leave_ring().await;
        server_handle.stop(true).await;
    });

    server.await
}
