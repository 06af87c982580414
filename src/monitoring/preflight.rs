/*!
 * Preflight Gate
 * One-shot admission check before committing memory to a fold
 */

use super::resource::{MonitorError, ResourceMonitor};
use crate::core::types::{Bytes, Quantity};
use crate::process::StaleProcessReaper;
use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Admission rejection
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum PreflightError {
    #[error("Insufficient memory: {required} required, {available} available")]
    #[diagnostic(
        code(preflight::insufficient_resources),
        help("Close other memory-heavy programs or lower resources.preflight_min_gib.")
    )]
    InsufficientResources {
        required: Quantity,
        available: Quantity,
    },

    #[error("Available memory unknown ({0}), refusing to start")]
    #[diagnostic(code(preflight::resource_query))]
    ResourceQuery(#[from] MonitorError),
}

pub struct PreflightGate {
    monitor: Arc<dyn ResourceMonitor>,
    reaper: Option<Arc<StaleProcessReaper>>,
}

impl PreflightGate {
    pub fn new(monitor: Arc<dyn ResourceMonitor>) -> Self {
        Self {
            monitor,
            reaper: None,
        }
    }

    /// Reap stale backend processes and retry once when the first check fails
    #[must_use]
    pub fn with_reaper(mut self, reaper: Arc<StaleProcessReaper>) -> Self {
        self.reaper = Some(reaper);
        self
    }

    /// Admit the fold if at least `min_required` bytes are available.
    /// A sensor failure is a rejection.
    pub async fn check(&self, min_required: Bytes) -> Result<Bytes, PreflightError> {
        match self.sample(min_required) {
            Ok(available) => Ok(available),
            Err(rejection) => {
                let Some(reaper) = &self.reaper else {
                    return Err(rejection);
                };
                match reaper.reap().await {
                    Ok(0) => Err(rejection),
                    Ok(count) => {
                        info!(count, "Reclaimed memory from stale processes, re-checking");
                        self.sample(min_required)
                    }
                    Err(e) => {
                        warn!(error = %e, "Reaping before preflight retry failed");
                        Err(rejection)
                    }
                }
            }
        }
    }

    fn sample(&self, min_required: Bytes) -> Result<Bytes, PreflightError> {
        let available = self.monitor.available_memory()?;
        if available < min_required {
            warn!(
                available_bytes = available,
                required_bytes = min_required,
                "Preflight rejected fold"
            );
            return Err(PreflightError::InsufficientResources {
                required: Quantity(min_required),
                available: Quantity(available),
            });
        }
        info!(
            available = %Quantity(available),
            required = %Quantity(min_required),
            "Preflight passed"
        );
        Ok(available)
    }
}
