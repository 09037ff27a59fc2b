use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use vigil_core::{build_backend, BackendConfig, ChangeDetector, Metric};
use vigil_store::{BackgroundStore, IdentityStore};

mod camera;
mod config;
mod pipeline;
mod report;

use camera::DirectorySource;
use config::Config;
use pipeline::{initialize_baseline, Pipeline};
use report::CoordinatorClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("vigil-agent starting");

    let config = Config::from_env();

    let mut source = DirectorySource::open(&config.frame_dir)
        .with_context(|| format!("failed to open frame source {}", config.frame_dir.display()))?;

    let (localizer, encoder) = build_backend(&BackendConfig::Onnx {
        detector_model: config.detector_model_path(),
        recognizer_model: config.recognizer_model_path(),
    })
    .context("failed to initialize face backend")?;

    let backgrounds = BackgroundStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;
    let identities = IdentityStore::open(&config.db_path, encoder.embedding_dim())
        .await
        .context("failed to open identity store")?;

    let reference = if config.refresh_baseline {
        initialize_baseline(&mut source, &backgrounds, config.baseline_frames).await?
    } else {
        match backgrounds.load().await? {
            Some(stored) => {
                tracing::info!("reusing stored background reference");
                stored
            }
            None => initialize_baseline(&mut source, &backgrounds, config.baseline_frames).await?,
        }
    };

    // An explicit threshold override keeps the encoder's score direction
    let metric = match config.match_threshold {
        Some(threshold) => Metric {
            direction: encoder.metric().direction,
            threshold,
        },
        None => encoder.metric(),
    };
    tracing::info!(policy = ?config.match_policy, ?metric, "matching configured");

    let pipeline = Pipeline {
        source,
        change: ChangeDetector::with_baseline(reference, config.change_threshold),
        localizer,
        encoder: Arc::clone(&encoder),
        policy: config.match_policy,
        metric,
        identities,
    };

    let client = CoordinatorClient::new(&config.coordinator_url);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(pipeline.run(
        client,
        Duration::from_millis(config.tick_delay_ms),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("vigil-agent shutting down");
    let _ = shutdown_tx.send(true);

    handle.await??;
    Ok(())
}
