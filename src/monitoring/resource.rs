/*!
 * Resource Sensor
 * Fresh, uncached readings of available system memory
 */

use crate::core::limits::MEMINFO_PATH;
use crate::core::types::{Bytes, KIB};
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Sensor result
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Sensor errors. Callers treat every variant as "unknown, assume unsafe".
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum MonitorError {
    #[error("Failed to read {path}: {reason}", path = path.display())]
    #[diagnostic(
        code(monitor::unreadable),
        help("Available memory is read from /proc/meminfo; this host may not expose it.")
    )]
    Unreadable { path: PathBuf, reason: String },

    #[error("MemAvailable not reported by {0}")]
    #[diagnostic(code(monitor::field_missing))]
    FieldMissing(PathBuf),
}

/// Memory sensor
#[cfg_attr(test, mockall::automock)]
pub trait ResourceMonitor: Send + Sync {
    /// Currently available memory in bytes, sampled fresh on every call
    fn available_memory(&self) -> MonitorResult<Bytes>;
}

/// Linux sensor backed by `MemAvailable` in /proc/meminfo
#[derive(Debug, Clone)]
pub struct MeminfoMonitor {
    path: PathBuf,
}

impl MeminfoMonitor {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from(MEMINFO_PATH),
        }
    }

    /// Read from an alternate meminfo-formatted file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for MeminfoMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceMonitor for MeminfoMonitor {
    fn available_memory(&self) -> MonitorResult<Bytes> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| MonitorError::Unreadable {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        parse_mem_available(&text).ok_or_else(|| MonitorError::FieldMissing(self.path.clone()))
    }
}

/// Extract `MemAvailable` (reported in kB) as bytes
pub fn parse_mem_available(meminfo: &str) -> Option<Bytes> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix("MemAvailable:")?;
        let kib = rest.split_whitespace().next()?.parse::<Bytes>().ok()?;
        kib.checked_mul(KIB)
    })
}
