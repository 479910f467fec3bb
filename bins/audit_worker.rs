use std::sync::Arc;

use dotenvy::dotenv;
use service::audit::{
    AuditConsumer, ConsumerSettings, FileShareMirror, MessageProcessor, ProcessorChain, TracingProcessor,
};
use service::storage::StorageAccount;
use tracing::{error, info, warn};
use uuid::Uuid;

fn init_logging() {
    // load .env first so RUST_LOG applies
    dotenv().ok();
    common::utils::logging::init_logging(common::utils::logging::LogFormat::from_env());
    info!(service = "audit-worker", event = "logger_init", "tracing subscriber initialized");
}

async fn run(service_id: Uuid) -> anyhow::Result<()> {
    let cfg = configs::AppConfig::load_and_validate()?;
    common::env::ensure_env(cfg.storage.data_dir.as_deref()).await?;

    let account = Arc::new(StorageAccount::from_config(&cfg.storage));
    account.ensure_table(&cfg.storage.table_name).await?;
    let queue = account.queue(&cfg.storage.queue_name);
    queue.ensure_queue().await?;

    let mut chain = ProcessorChain::new().with(Arc::new(TracingProcessor));
    if cfg.audit.mirror_to_share {
        match account.file_share(&cfg.storage.share_name) {
            Ok(share) => {
                share.initialize().await?;
                chain = chain.with(Arc::new(FileShareMirror::new(share, &cfg.storage.queue_name)));
            }
            Err(e) => warn!(service = "audit-worker", error = %e, "file share mirror disabled"),
        }
    }
    let processor: Arc<dyn MessageProcessor> = Arc::new(chain);

    let admin = match &cfg.admin.addr {
        Some(addr) => {
            let (bound, task) = common::admin_http::spawn_admin_server(addr, service::observability::encode_metrics).await?;
            info!(service = "audit-worker", event = "admin_ready", addr = %bound, "admin endpoint ready");
            Some(task)
        }
        None => None,
    };

    let consumer = AuditConsumer::new(queue, processor, ConsumerSettings::from(&cfg.audit));
    let handle = consumer.spawn();
    info!(
        service = "audit-worker",
        event = "consumer_started",
        %service_id,
        queue = %cfg.storage.queue_name,
        pending = account.queue(&cfg.storage.queue_name).count().await,
        "audit consumer running"
    );

    tokio::signal::ctrl_c().await?;
    info!(service = "audit-worker", event = "shutdown_signal", %service_id, "received Ctrl+C, shutting down");
    handle.shutdown().await;
    if let Some(admin) = admin {
        admin.abort();
    }
    Ok(())
}

fn main() -> std::process::ExitCode {
    init_logging();

    let service_id = Uuid::new_v4();
    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");

    std::panic::set_hook(Box::new(move |info| {
        error!(
            service = "audit-worker",
            event = "panic",
            %service_id,
            pid,
            message = %info,
            "unhandled panic occurred"
        );
    }));

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "audit-worker", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return std::process::ExitCode::FAILURE;
        }
    };

    info!(service = "audit-worker", event = "start", %service_id, pid, version, "audit worker starting");

    rt.block_on(async move {
        match run(service_id).await {
            Ok(()) => {
                info!(service = "audit-worker", event = "stop", %service_id, pid, "audit worker stopped normally");
                std::process::ExitCode::SUCCESS
            }
            Err(e) => {
                error!(service = "audit-worker", event = "run_failed", error = %e, "audit worker failed");
                std::process::ExitCode::FAILURE
            }
        }
    })
}
