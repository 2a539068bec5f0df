//! Tracker configuration.

use std::env;
use std::str::FromStr;

use thiserror::Error;

use crate::core::registry::MAX_CAPACITY;
use crate::diagnostics::strict::StrictMode;

/// Environment variable overriding [`TrackerConfig::registry_capacity`].
pub const ENV_CAPACITY: &str = "HEAPWATCH_CAPACITY";

/// Environment variable overriding [`TrackerConfig::full_policy`].
pub const ENV_FULL_POLICY: &str = "HEAPWATCH_FULL_POLICY";

/// Environment variable overriding [`TrackerConfig::strict`].
pub const ENV_STRICT: &str = "HEAPWATCH_STRICT";

/// What to do when an allocation succeeds but the registry has no room.
///
/// Either way the caller gets its memory; only tracking is affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullPolicy {
    /// Leave the new block untracked and count it.
    #[default]
    Degrade,

    /// Stop tracking the oldest live block to make room for the new one.
    EvictOldest,
}

impl FromStr for FullPolicy {
    type Err = ParseConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "degrade" | "drop" => Ok(FullPolicy::Degrade),
            "evict" | "evict-oldest" | "evict_oldest" => Ok(FullPolicy::EvictOldest),
            _ => Err(ParseConfigError::new("full policy", value)),
        }
    }
}

/// A configuration value that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised {what} `{value}`")]
pub struct ParseConfigError {
    what: &'static str,
    value: String,
}

impl ParseConfigError {
    pub(crate) fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

/// Configuration for the tracking shim.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Maximum number of live allocations tracked at once (default: 1024,
    /// clamped to `MAX_CAPACITY`)
    pub registry_capacity: usize,

    /// Behaviour when the registry is full
    pub full_policy: FullPolicy,

    /// Dump a heap report to the sink when an allocation fails
    pub dump_on_failure: bool,

    /// Panic on anomaly diagnostics (for CI)
    pub strict: StrictMode,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            registry_capacity: 1024,
            full_policy: FullPolicy::Degrade,
            dump_on_failure: true,
            strict: StrictMode::Off,
        }
    }
}

impl TrackerConfig {
    /// Create a minimal config for tightly constrained targets.
    pub fn minimal() -> Self {
        Self {
            registry_capacity: 64,
            ..Self::default()
        }
    }

    /// Default config with `HEAPWATCH_*` environment overrides applied.
    ///
    /// Unparsable values are ignored and the default kept.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `HEAPWATCH_*` environment overrides on top of this config.
    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(capacity) = lookup(ENV_CAPACITY)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&capacity| capacity <= MAX_CAPACITY)
        {
            self.registry_capacity = capacity;
        }
        if let Some(policy) = lookup(ENV_FULL_POLICY).and_then(|v| v.parse().ok()) {
            self.full_policy = policy;
        }
        if let Some(strict) = lookup(ENV_STRICT).and_then(|v| v.parse().ok()) {
            self.strict = strict;
        }
        self
    }

    /// Builder pattern: set registry capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.registry_capacity = capacity;
        self
    }

    /// Builder pattern: set full-registry policy.
    pub fn with_full_policy(mut self, policy: FullPolicy) -> Self {
        self.full_policy = policy;
        self
    }

    /// Builder pattern: enable or disable the failure dump.
    pub fn with_dump_on_failure(mut self, enable: bool) -> Self {
        self.dump_on_failure = enable;
        self
    }

    /// Builder pattern: set strict mode.
    pub fn with_strict(mut self, strict: StrictMode) -> Self {
        self.strict = strict;
        self
    }
}
