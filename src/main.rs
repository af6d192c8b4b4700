//! Mistral OCR Web - upload PDFs or images, extract text, download it.

mod batch;
mod config;
mod document;
mod error;
mod ocr;
mod poller;
mod routes;
mod store;

use anyhow::Context;
use config::AppConfig;
use ocr::mistral::MistralClient;
use ocr::OcrApi;
use poller::PollSettings;
use routes::AppState;
use std::sync::Arc;
use store::ResultStore;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "mistral_ocr_web=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let api: Option<Arc<dyn OcrApi>> = match MistralClient::from_config(http, &config) {
        Some(client) => {
            info!("Mistral client initialized ({}, model={})", config.api_url, config.ocr_model);
            Some(Arc::new(client))
        }
        None => {
            error!("MISTRAL_API_KEY not found in environment. OCR requests will be rejected.");
            None
        }
    };

    let state = AppState {
        api,
        store: ResultStore::with_capacity(config.max_stored_entries),
        poll: PollSettings {
            interval: config.poll_interval,
            max_wait: config.max_wait,
        },
        ocr_model: config.ocr_model.clone(),
    };
    let app = routes::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
