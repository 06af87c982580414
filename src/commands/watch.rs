use crate::cli::WatchArgs;
use foldhost::config::validate;
use foldhost::core::FoldhostResult;
use foldhost::pipeline::{FoldPipeline, SkipFlags};
use foldhost::queue::{PipelineRunner, ProcessedPolicy, QueueSettings, WatchQueue};
use foldhost::signals::spawn_signal_listener;
use std::path::Path;
use std::sync::Arc;

pub async fn run(args: WatchArgs, config_path: Option<&Path>) -> FoldhostResult<()> {
    let (_, mut config) = super::load_config(config_path)?;
    if let Some(output) = &args.output {
        config.output.results_dir = output.clone();
    }
    if let Some(interval) = args.interval {
        config.watch.poll_interval = interval;
    }
    if args.marker {
        config.watch.archive_processed = false;
    }
    validate(&config)?;

    let mut settings = QueueSettings::from_config(&config, args.dir.clone());
    settings.skip = SkipFlags::from(args.skip);
    if args.marker {
        settings.policy = ProcessedPolicy::Marker;
    }

    // Fail on an unreadable directory up front rather than on every tick
    foldhost::queue::scan(&settings.dir, &settings.extensions, &Default::default())?;

    let pipeline = Arc::new(FoldPipeline::from_config(&config));
    super::reap_on_startup(&config, &pipeline).await;

    let signals = spawn_signal_listener()?;
    let runner = PipelineRunner::new(pipeline);
    let mut queue = WatchQueue::new(settings);
    queue.run(&runner, signals.drain, signals.abort).await;
    Ok(())
}
