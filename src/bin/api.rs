//! Monitoring/auth/widget HTTP API process (C11/C18).

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use triage_engine::auth::{AuthGuard, AuthService, BcryptPasswordHasher, TokenService};
use triage_engine::config::Settings;
use triage_engine::http::{router, AppState};
use triage_engine::llm::{DeterministicLlmClient, Llm1Service, Llm2Service, LlmClientPort, OpenAiLlmClient};
use triage_engine::monitoring::CaseMonitoringService;
use triage_engine::store::{run_pending_migrations, JobQueue, PgStore};
use triage_engine::worker::WorkerHandlers;

#[derive(Parser, Debug)]
#[command(about = "Monitoring, admin, and widget HTTP API")]
struct Args {
    /// Port the API listens on.
    #[arg(long, env = "API_PORT", default_value_t = 8080)]
    port: u16,

    /// Bearer token TTL, in hours.
    #[arg(long, env = "AUTH_TOKEN_TTL_HOURS", default_value_t = 24)]
    auth_token_ttl_hours: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let settings = Arc::new(Settings::from_env()?);
    triage_engine::logging::init(&settings.log_level);

    let store = Arc::new(PgStore::connect(&settings.database).await?);
    run_pending_migrations(&store.pool()).await?;

    let hasher = Arc::new(BcryptPasswordHasher::new());
    let user_store: Arc<dyn triage_engine::store::UserStore> = store.clone();
    let password_hasher: Arc<dyn triage_engine::auth::PasswordHasher> = hasher.clone();
    if let Some(bootstrap) = &settings.bootstrap_admin {
        let outcome =
            triage_engine::auth::ensure_initial_admin_user(&user_store, &password_hasher, bootstrap).await?;
        info!(?outcome, "admin_bootstrap_checked");
    }

    let reconciled = store.reconcile_running_jobs().await?;
    if reconciled > 0 {
        warn!(reconciled, "api_boot_reconciled_running_jobs");
    }

    let llm_client: Arc<dyn LlmClientPort> = match settings.llm_runtime_mode {
        triage_engine::config::LlmRuntimeMode::Deterministic => {
            Arc::new(DeterministicLlmClient::new("{}"))
        }
        triage_engine::config::LlmRuntimeMode::Provider => {
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

    let tokens = Arc::new(TokenService::new(store.clone(), Duration::from_secs(args.auth_token_ttl_hours as u64 * 3600)));
    let guard = Arc::new(AuthGuard::new(store.clone(), store.clone()));
    let auth = Arc::new(AuthService::new(store.clone(), store.clone(), hasher.clone(), tokens));
    let users = Arc::new(triage_engine::auth::UserManagementService::new(store.clone(), store.clone(), hasher));
    let monitoring = Arc::new(CaseMonitoringService::new(store.clone(), store.clone()));

    let state = AppState { guard, auth, monitoring, users, cases: store.clone(), worker };

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "api_listening");
    axum::serve(listener, router(state)).await?;

    Ok(())
}
