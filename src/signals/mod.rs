/*!
 * Signals Module
 * Cancellation tokens and OS shutdown signal handling
 */

mod cancel;
mod os;

pub use cancel::{CancelSource, CancelToken};
pub use os::{spawn_signal_listener, ShutdownTokens};
