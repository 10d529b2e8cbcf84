//! Per-operation timeout configuration for resource adapters.
//!
//! Adapters expose a `timeouts` block so users can stretch the budget of a
//! slow create or delete without touching code. The block is plain data;
//! the adapter resolves the timeout for the operation it is running and
//! passes it to a [`WaitSpec`](crate::WaitSpec) or
//! [`RetrySpec`](crate::RetrySpec).
//!
//! ```rust
//! use converge_core::timeouts::{Operation, ResourceTimeouts};
//! use std::time::Duration;
//!
//! let timeouts: ResourceTimeouts = toml::from_str(r#"
//!     create = "40m"
//!     delete = "1h30m"
//! "#).unwrap();
//!
//! assert_eq!(timeouts.get(Operation::Create), Some(Duration::from_secs(40 * 60)));
//! assert_eq!(
//!     timeouts.resolve(Operation::Update, Duration::from_secs(600)),
//!     Duration::from_secs(600),
//! );
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::time::Duration;

/// The CRUD operation a timeout applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Resource creation.
    Create,
    /// Resource read / refresh.
    Read,
    /// In-place update.
    Update,
    /// Resource deletion.
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// User-supplied timeouts, one optional value per operation plus a
/// fallback for operations without their own entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceTimeouts {
    /// Timeout for create.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub create: Option<Duration>,
    /// Timeout for read.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub read: Option<Duration>,
    /// Timeout for update.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub update: Option<Duration>,
    /// Timeout for delete.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub delete: Option<Duration>,
    /// Fallback for operations without an entry.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub default: Option<Duration>,
}

impl ResourceTimeouts {
    /// Set the timeout for one operation.
    pub fn with(mut self, operation: Operation, timeout: Duration) -> Self {
        *self.slot(operation) = Some(timeout);
        self
    }

    /// Set the fallback timeout.
    pub fn with_default(mut self, timeout: Duration) -> Self {
        self.default = Some(timeout);
        self
    }

    /// The configured timeout for `operation`, falling back to `default`.
    pub fn get(&self, operation: Operation) -> Option<Duration> {
        let specific = match operation {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        };
        specific.or(self.default)
    }

    /// The configured timeout for `operation`, or the adapter's own
    /// `fallback` when the user configured nothing.
    pub fn resolve(&self, operation: Operation, fallback: Duration) -> Duration {
        self.get(operation).unwrap_or(fallback)
    }

    fn slot(&mut self, operation: Operation) -> &mut Option<Duration> {
        match operation {
            Operation::Create => &mut self.create,
            Operation::Read => &mut self.read,
            Operation::Update => &mut self.update,
            Operation::Delete => &mut self.delete,
        }
    }
}

/// Parse a duration string such as `"30s"`, `"10m"`, `"1h30m"`, `"1.5h"`
/// or `"250ms"`.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `"0"` is zero.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(input.to_string());
    let mut rest = input.trim();

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos = 0.0_f64;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(number_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);

        let value: f64 = number.parse().map_err(|_| invalid())?;
        let nanos_per_unit = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };

        total_nanos += value * nanos_per_unit;
        rest = tail;
    }

    if !total_nanos.is_finite() || total_nanos >= u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}
