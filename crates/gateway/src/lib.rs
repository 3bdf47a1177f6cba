//! HTTP gateway for ShopDesk.
//!
//! Exposes `POST /chat`, `GET /health` and `GET /tools`. Startup wires the
//! provider, the knowledge base and the tool sidecar into one
//! [`Orchestrator`]; the sidecar is shut down after the server drains.

pub mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, header};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use shopdesk_agent::{IntentMatcher, Orchestrator, TurnSettings};
use shopdesk_config::AppConfig;
use shopdesk_core::provider::Provider;
use shopdesk_core::tool::ToolGateway;
use shopdesk_knowledge::ChromaClient;
use shopdesk_providers::DashScopeProvider;
use shopdesk_tools::Sidecar;

/// Shared application state.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub tools: Arc<dyn ToolGateway>,
}

pub type SharedState = Arc<AppState>;

/// Build the router with all routes and layers.
pub fn build_router(state: SharedState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/chat", post(handlers::chat))
        .route("/health", get(handlers::health))
        .route("/tools", get(handlers::tools))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway and block until shutdown.
///
/// Fails before listening if the API key is missing or the tool sidecar
/// cannot be started and initialized.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let api_key = config.require_api_key()?;
    let provider: Arc<dyn Provider> = Arc::new(DashScopeProvider::from_config(api_key, &config.provider)?);
    let retriever = Arc::new(ChromaClient::new(
        &config.knowledge,
        provider.clone(),
        config.provider.embedding_model.clone(),
    )?);

    let sidecar = Arc::new(Sidecar::spawn(&config.sidecar).await?);

    let served = serve(&config, provider, retriever, sidecar.clone()).await;
    sidecar.shutdown().await;
    served
}

async fn serve(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    retriever: Arc<ChromaClient>,
    sidecar: Arc<Sidecar>,
) -> Result<(), Box<dyn std::error::Error>> {
    let definitions = match sidecar.list_tools().await {
        Ok(definitions) => {
            let names: Vec<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
            info!(tools = ?names, "Tool sidecar ready");
            definitions
        }
        Err(e) => {
            warn!(error = %e, "Listing sidecar tools failed");
            Vec::new()
        }
    };

    let mut orchestrator = Orchestrator::new(provider, sidecar.clone(), TurnSettings::from_config(config))
        .with_retriever(retriever)
        .with_tool_definitions(definitions);
    if let Some(prompt) = &config.assistant.system_prompt {
        orchestrator = orchestrator.with_system_prompt(prompt);
    }
    if config.assistant.keyword_fallback {
        orchestrator = orchestrator.with_keyword_fallback(IntentMatcher::new()?);
    }

    let state = Arc::new(AppState {
        orchestrator,
        tools: sidecar,
    });
    let app = build_router(state, config.gateway.max_body_bytes);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        addr = %addr,
        model = %config.provider.chat_model,
        mode = ?config.assistant.mode,
        "Gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
