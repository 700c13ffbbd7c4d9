//! Chat-gateway webhook receiver process (C5 trigger surface): hosts the
//! route the bridge in front of the homeserver posts room events to.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use triage_engine::chat::MatrixChatGateway;
use triage_engine::config::Settings;
use triage_engine::http::webhook::{router, WebhookState};
use triage_engine::intake::Room1IntakeService;
use triage_engine::llm::{DeterministicLlmClient, Llm1Service, Llm2Service, LlmClientPort, OpenAiLlmClient};
use triage_engine::store::{run_pending_migrations, PgStore};
use triage_engine::worker::WorkerHandlers;

#[derive(Parser, Debug)]
#[command(about = "Chat-gateway webhook receiver")]
struct Args {
    /// Port the webhook route listens on.
    #[arg(long, env = "LISTENER_PORT", default_value_t = 8081)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let settings = Arc::new(Settings::from_env()?);
    triage_engine::logging::init(&settings.log_level);

    let store = Arc::new(PgStore::connect(&settings.database).await?);
    run_pending_migrations(&store.pool()).await?;

    let llm_client: Arc<dyn LlmClientPort> = match settings.llm_runtime_mode {
        triage_engine::config::LlmRuntimeMode::Deterministic => Arc::new(DeterministicLlmClient::new("{}")),
        triage_engine::config::LlmRuntimeMode::Provider => {
            let api_key = settings
                .openai_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY required for LLM_RUNTIME_MODE=provider"))?;
            Arc::new(OpenAiLlmClient::new(api_key, "gpt-4o-mini"))
        }
    };

    let chat: Arc<dyn triage_engine::chat::ChatGateway> = Arc::new(MatrixChatGateway::new(
        settings.matrix_homeserver_url.clone(),
        settings.matrix_access_token.clone(),
    ));

    let intake = Arc::new(Room1IntakeService::new(store.clone(), store.clone(), store.clone(), chat.clone()));

    let worker = Arc::new(WorkerHandlers::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        chat,
        Arc::new(triage_engine::pdf::PdfExtractTextExtractor),
        Arc::new(Llm1Service::new(llm_client.clone())),
        Arc::new(Llm2Service::new(llm_client)),
        settings.room2_id.clone(),
        settings.room3_id.clone(),
    ));

    let state = WebhookState {
        intake,
        worker,
        journal: store.clone(),
        bot_user_id: settings.matrix_bot_user_id.clone(),
        room1_id: settings.room1_id.clone(),
        room2_id: settings.room2_id.clone(),
        room3_id: settings.room3_id.clone(),
        hmac_secret: settings.webhook_hmac_secret.clone(),
    };

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, public_url = %settings.webhook_public_url, "listener_webhook_listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("listener_shutdown_signal_received");
            shutdown_tx.send(()).ok();
        }
    });

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        })
        .await?;

    Ok(())
}
