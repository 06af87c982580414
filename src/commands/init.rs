use crate::cli::InitArgs;
use foldhost::config::{self, ConfigSource};
use foldhost::core::FoldhostResult;
use std::path::Path;

pub async fn run(args: InitArgs, config_path: Option<&Path>) -> FoldhostResult<()> {
    let source = config::locate(config_path)?;
    let path = match &source {
        ConfigSource::Explicit(path) | ConfigSource::Default(path) => path,
    };
    config::write_default(path, args.force)?;
    println!("Wrote {}", path.display());
    Ok(())
}
