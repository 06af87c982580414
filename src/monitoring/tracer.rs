/*!
 * Structured Tracing
 * Subscriber setup and spans for pipeline runs and stages
 *
 * Environment variables:
 * - RUST_LOG: filter directives (default derived from -v/-q)
 * - FOLDHOST_TRACE_JSON: JSON lines output when "1" or "true"
 */

use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, span, warn, Level, Span};
use tracing_subscriber::{
    filter::LevelFilter, fmt, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt, EnvFilter, Layer,
};

/// Stage durations above this are logged as slow
const SLOW_STAGE_MS: u128 = 30 * 60 * 1000;

#[derive(Debug, Clone, Default)]
pub struct TracingOptions {
    /// -v count: 0 info, 1 debug, 2+ trace
    pub verbosity: u8,
    /// Only errors
    pub quiet: bool,
    /// Additional plain-text log file
    pub log_file: Option<PathBuf>,
}

impl TracingOptions {
    fn default_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::ERROR;
        }
        match self.verbosity {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

/// Install the global subscriber. Call once, from the binary.
pub fn init_tracing(options: &TracingOptions) -> std::io::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(options.default_level().into())
        .from_env_lossy();

    let use_json = std::env::var("FOLDHOST_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let console = if use_json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true)
            .with_span_list(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_span_events(FmtSpan::NONE)
            .compact()
            .boxed()
    };

    let file_layer = match &options.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = File::options().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_thread_ids(true)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file_layer)
        .init();

    debug!(json = use_json, "Tracing initialized");
    Ok(())
}

/// Root span for one pipeline run
pub fn span_run(job: &str, run_id: &str) -> Span {
    span!(Level::INFO, "run", job = job, run_id = run_id)
}

/// Timed span for one pipeline stage
pub struct StageSpan {
    span: Span,
    start: Instant,
    stage: &'static str,
}

impl StageSpan {
    pub fn new(stage: &'static str) -> Self {
        let span = span!(
            Level::INFO,
            "stage",
            stage = stage,
            result = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            stage,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Record the stage status ("succeeded", "failed", "skipped")
    pub fn record_result(&self, result: &str) {
        self.span.record("result", result);
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Drop for StageSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_ms", duration.as_millis() as u64);
        let _entered = self.span.enter();
        if duration.as_millis() > SLOW_STAGE_MS {
            warn!(stage = self.stage, duration_ms = duration.as_millis() as u64, "Slow stage");
        } else {
            info!(stage = self.stage, duration_ms = duration.as_millis() as u64, "Stage finished");
        }
    }
}
