use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use vigil_core::{build_backend, BackendConfig};
use vigil_store::IdentityStore;
use vigild::{routes, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("vigild starting");

    let config = Config::from_env();

    let (localizer, encoder) = build_backend(&BackendConfig::Onnx {
        detector_model: config.detector_model_path(),
        recognizer_model: config.recognizer_model_path(),
    })
    .context("failed to initialize face backend")?;

    let identities = IdentityStore::open(&config.db_path, encoder.embedding_dim())
        .await
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;

    let state = AppState::new(identities, localizer, encoder);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "vigild listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("vigild shutting down");
        })
        .await?;

    Ok(())
}
