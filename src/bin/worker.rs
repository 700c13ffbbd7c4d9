//! Pipeline worker process (C6/C7): leases jobs and runs their handlers.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use triage_engine::config::{LlmRuntimeMode, Settings};
use triage_engine::llm::{DeterministicLlmClient, Llm1Service, Llm2Service, LlmClientPort, OpenAiLlmClient};
use triage_engine::store::{run_pending_migrations, JobQueue, PgStore};
use triage_engine::summary::SummaryScheduler;
use triage_engine::worker::{WorkerHandlers, WorkerLoop};

#[derive(Parser, Debug)]
#[command(about = "Pipeline job worker")]
struct Args {
    /// Terminal attempt count before a job is failed outright.
    #[arg(long, env = "WORKER_MAX_ATTEMPTS", default_value_t = 8)]
    max_attempts: i32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let settings = Arc::new(Settings::from_env()?);
    triage_engine::logging::init(&settings.log_level);

    let store = Arc::new(PgStore::connect(&settings.database).await?);
    run_pending_migrations(&store.pool()).await?;

    let reconciled = store.reconcile_running_jobs().await?;
    if reconciled > 0 {
        warn!(reconciled, "worker_boot_reconciled_running_jobs");
    }

    let llm_client: Arc<dyn LlmClientPort> = match settings.llm_runtime_mode {
        LlmRuntimeMode::Deterministic => Arc::new(DeterministicLlmClient::new("{}")),
        LlmRuntimeMode::Provider => {
            let api_key = settings
                .openai_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY required for LLM_RUNTIME_MODE=provider"))?;
            Arc::new(OpenAiLlmClient::new(api_key, "gpt-4o-mini"))
        }
    };

    let chat: Arc<dyn triage_engine::chat::ChatGateway> = Arc::new(
        triage_engine::chat::MatrixChatGateway::new(
            settings.matrix_homeserver_url.clone(),
            settings.matrix_access_token.clone(),
        ),
    );

    let handlers = Arc::new(WorkerHandlers::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        chat.clone(),
        Arc::new(triage_engine::pdf::PdfExtractTextExtractor),
        Arc::new(Llm1Service::new(llm_client.clone())),
        Arc::new(Llm2Service::new(llm_client)),
        settings.room2_id.clone(),
        settings.room3_id.clone(),
    ));

    let summary_scheduler = Arc::new(SummaryScheduler::new(
        &settings.summary_cron_expression,
        store.clone(),
        chat,
        settings.room4_id.clone(),
    )?);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let (summary_shutdown_tx, summary_shutdown_rx) = tokio::sync::watch::channel(false);
    let poll_interval = Duration::from_secs_f64(settings.worker_poll_interval_seconds);
    let loop_ = WorkerLoop::new(store.clone(), handlers, poll_interval, args.max_attempts);

    let run_handle = tokio::spawn(async move { loop_.run(shutdown_rx).await });
    let summary_handle = tokio::spawn(async move { summary_scheduler.run(summary_shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    info!("worker_shutdown_signal_received");
    shutdown_tx.send(true).ok();
    summary_shutdown_tx.send(true).ok();
    run_handle.await?;
    summary_handle.await?;

    Ok(())
}
