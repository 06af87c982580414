/*!
 * Resource Monitoring
 * Memory sensing, admission control, the fold watchdog and tracing setup
 */

pub mod preflight;
pub mod resource;
mod tracer;
pub mod watchdog;

pub use preflight::{PreflightError, PreflightGate};
pub use resource::{MeminfoMonitor, MonitorError, MonitorResult, ResourceMonitor};
pub use tracer::{init_tracing, span_run, StageSpan, TracingOptions};
pub use watchdog::{MemoryWatchdog, WatchdogReport, WatchdogSettings, WatchdogState};
