/*!
 * Watch Queue
 * Directory polling: discover, order, run and dispose of input files
 */

mod disposal;
pub mod naming;
pub mod order;
mod scan;
pub mod types;
mod watcher;

pub use disposal::dispose;
pub use naming::parse_name;
pub use order::{compare, sort_entries};
pub use scan::{marker_path, scan, ScanOutcome};
pub use types::{
    EntryState, NameError, ParsedName, ProcessedPolicy, QueueEntry, QueueError, QueueResult,
    QueueSettings, TickReport,
};
pub use watcher::{JobRunner, PipelineRunner, WatchQueue};
