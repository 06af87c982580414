use foldhost::core::FoldhostResult;
use foldhost::pipeline::FoldPipeline;
use std::path::Path;
use tracing::info;

pub async fn run(config_path: Option<&Path>) -> FoldhostResult<()> {
    let (_, config) = super::load_config(config_path)?;
    let pipeline = FoldPipeline::from_config(&config);
    let Some(reaper) = pipeline.reaper() else {
        return Ok(());
    };

    info!(signatures = ?reaper.signatures(), "Looking for stale backend processes");
    let count = reaper.reap().await?;
    println!("Terminated {} stale backend process(es)", count);
    Ok(())
}
