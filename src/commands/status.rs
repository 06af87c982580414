use foldhost::config::ConfigSource;
use foldhost::core::types::Quantity;
use foldhost::core::FoldhostResult;
use foldhost::monitoring::{MeminfoMonitor, ResourceMonitor};
use foldhost::pipeline::FoldPipeline;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> FoldhostResult<()> {
    let (source, config) = super::load_config(config_path)?;
    let pipeline = FoldPipeline::from_config(&config);

    let origin = match &source {
        ConfigSource::Explicit(path) => format!("{}", path.display()),
        ConfigSource::Default(path) if path.exists() => format!("{}", path.display()),
        ConfigSource::Default(path) => format!("defaults ({} not found)", path.display()),
    };
    println!("config:   {}", origin);

    let backend = pipeline.backend();
    match backend.availability() {
        Ok(detail) => println!("backend:  {} ({})", backend.name(), detail),
        Err(reason) => println!("backend:  {} unavailable: {}", backend.name(), reason),
    }

    match MeminfoMonitor::new().available_memory() {
        Ok(bytes) => println!(
            "memory:   {} available, {} required to fold",
            Quantity(bytes),
            Quantity(pipeline.settings().preflight_min)
        ),
        Err(e) => println!("memory:   unknown ({})", e),
    }

    let mut shown = config.clone();
    for key in [
        &mut shown.summary.anthropic_api_key,
        &mut shown.summary.openai_api_key,
    ] {
        if !key.is_empty() {
            *key = "<redacted>".to_string();
        }
    }
    match toml::to_string_pretty(&shown) {
        Ok(text) => println!("\n{}", text),
        Err(e) => println!("\n(cannot render configuration: {})", e),
    }
    Ok(())
}
