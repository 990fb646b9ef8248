use std::sync::Arc;

use hawker::config::Config;
use hawker::probe::Prober;
use hawker::provider::ProviderClient;
use hawker::scheduler::Scheduler;
use hawker::sync::Reconciler;
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cfg = Config::from_env();
    let pool = hawker_core::new_pool().await.expect("Error creating db pool");

    let provider = Arc::new(
        ProviderClient::new(
            cfg.provider_base_url.clone(),
            cfg.provider_token.clone(),
            cfg.provider_timeout,
        )
        .expect("Error building provider client"),
    );
    let prober = Arc::new(Prober::new(
        cfg.check_url.clone(),
        cfg.probe_timeout,
        cfg.probe_concurrency,
        cfg.pptp_port,
    ));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&provider),
        cfg.sync_page_size,
        cfg.sync_page_cap,
    ));

    let mut scheduler = Scheduler::new(
        pool,
        reconciler,
        prober,
        cfg.sync_interval,
        cfg.refund_sweep_interval,
        cfg.refund_window_minutes,
    );
    scheduler.start();
    info!("hawker engine running");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    scheduler.stop();
}
