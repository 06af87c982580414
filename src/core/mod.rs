/*!
 * Core Module
 * Shared primitive types, tuning constants and the top-level error
 */

pub mod errors;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use errors::{FoldhostError, FoldhostResult};
pub use types::*;
