//! Process roles: wires the store, gateway, dispatcher, and HTTP server.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::cli::{Command, HttpArgs};
use crate::network::NetworkModule;
use crate::service::{
    BackgroundWorker, Dispatcher, ServiceConfig, SimulatedExecutor, SubmissionGateway,
};
use crate::storage::{open_store, StoreBackend};
use crate::traits::SharedStore;

/// Runs the role selected by `command` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the listener bound.
pub async fn run(
    command: Command,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let config = command.service_config();
    let backend = command.store_backend();

    let store = open_store(&backend).await?;
    store.ping().await?;
    info!(store = %backend, "shared store connected");

    match command {
        Command::Gateway(args) => {
            if backend == StoreBackend::Memory {
                warn!("gateway on a memory store: no dispatcher can see its queues");
            }
            serve_gateway(&args.http, &config, store, None, shutdown).await
        }
        Command::Dispatcher(_) => {
            if backend == StoreBackend::Memory {
                warn!("dispatcher on a memory store: no gateway can feed its queues");
            }
            let mut worker = start_dispatcher(store, &config);
            shutdown.await;
            info!("shutdown signal received, stopping dispatcher");
            worker.stop().await;
            Ok(())
        }
        Command::Standalone(args) => {
            let mut worker = start_dispatcher(Arc::clone(&store), &config);
            let served = serve_gateway(&args.http, &config, store, worker.sender(), shutdown).await;
            worker.stop().await;
            served
        }
    }
}

fn start_dispatcher(
    store: Arc<dyn SharedStore>,
    config: &ServiceConfig,
) -> BackgroundWorker<Dispatcher> {
    let executor = Arc::new(SimulatedExecutor::new(config.execution_duration()));
    let dispatcher = Dispatcher::new(store, executor, config);
    info!(
        dispatcher = %dispatcher.id(),
        idle_poll_ms = config.idle_poll_interval_ms,
        max_in_flight = config.max_in_flight,
        "dispatcher started"
    );
    BackgroundWorker::start(dispatcher, config.idle_poll_interval())
}

async fn serve_gateway(
    http: &HttpArgs,
    config: &ServiceConfig,
    store: Arc<dyn SharedStore>,
    wake: Option<tokio::sync::mpsc::Sender<crate::service::DispatchTask>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let mut gateway = SubmissionGateway::new(store, config);
    if let Some(wake) = wake {
        gateway = gateway.with_dispatcher(wake);
    }

    let network = http
        .network_config()
        .covering_sync_budget(config.sync_wait_budget());
    let mut module = NetworkModule::new(network, gateway);
    let port = module.start().await?;
    info!(
        port,
        max_requests = config.max_requests,
        sync_wait_ms = config.sync_wait_budget_ms,
        "gateway listening"
    );
    module.serve(shutdown).await
}
