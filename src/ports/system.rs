//! Ports for ambient system state: time and fresh identifiers.

use chrono::{DateTime, Utc};

/// Source of record and document timestamps.
pub trait Clock: Send + Sync {
    /// Current time in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Source of the unique suffix in workspace directory names, so two runs
/// never share a checkout.
pub trait IdGenerator: Send + Sync {
    /// A fresh identifier, safe to use in a file name.
    fn generate_id(&self) -> String;
}
