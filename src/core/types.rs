/*!
 * Core Types
 * Common types used across the supervisor, pipeline and queue
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// OS process ID
pub type Pid = i32;

/// OS process group ID
pub type Pgid = i32;

/// Memory quantity in bytes
pub type Bytes = u64;

/// One gibibyte
pub const GIB: Bytes = 1024 * 1024 * 1024;

/// One kibibyte (the unit /proc/meminfo reports in)
pub const KIB: Bytes = 1024;

/// Convert a (possibly fractional) GiB figure from configuration into bytes
#[inline]
pub fn gib_to_bytes(gib: f64) -> Bytes {
    if gib <= 0.0 {
        return 0;
    }
    (gib * GIB as f64) as Bytes
}

/// Human-readable byte quantity used in logs and error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(pub Bytes);

impl Quantity {
    #[inline]
    pub fn bytes(self) -> Bytes {
        self.0
    }

    #[inline]
    pub fn as_gib(self) -> f64 {
        self.0 as f64 / GIB as f64
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} GiB", self.as_gib())
    }
}

impl From<Bytes> for Quantity {
    fn from(value: Bytes) -> Self {
        Quantity(value)
    }
}
