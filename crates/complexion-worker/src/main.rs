use anyhow::Result;
use complexion_core::{AnalysisPipeline, TensorRuntime};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
#[cfg(test)]
mod fixtures;
mod protocol;
mod service;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries protocol frames only.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = config::Config::load()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        canonical_size = config.canonical_size,
        queue_depth = config.queue_depth,
        config_path = ?config.config_path,
        "complexion-worker starting"
    );

    let pipeline = AnalysisPipeline::new(
        config.quality.clone(),
        TensorRuntime::new(config.canonical_size),
    );
    let engine = engine::spawn_engine(pipeline, config.queue_depth)?;

    service::serve(
        engine,
        tokio::io::stdin(),
        tokio::io::stdout(),
        config.queue_depth,
    )
    .await?;

    tracing::info!("input closed, complexion-worker shutting down");
    Ok(())
}
