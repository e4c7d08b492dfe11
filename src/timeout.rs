//! Per-invocation timeouts for external tools
//!
//! None of the external tools are under our control, so every child process
//! runs with a wall-clock bound. When the bound is exceeded the child is
//! killed and the invocation fails with `ToolError::TimedOut`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for any single timeout (one day)
pub const MAX_TIMEOUT_SECONDS: u64 = 86_400;

/// Timeout configuration, one bound per kind of invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Structured decompilation (default: 600)
    pub decompile_seconds: u64,

    /// Structured rebuild (default: 600)
    pub rebuild_seconds: u64,

    /// Signing key generation (default: 60)
    pub keygen_seconds: u64,

    /// Package signing (default: 300)
    pub sign_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            decompile_seconds: 600,
            rebuild_seconds: 600,
            keygen_seconds: 60,
            sign_seconds: 300,
        }
    }
}

impl TimeoutConfig {
    /// Every bound must be in (0, 86400]
    pub fn validate(&self) -> Result<(), TimeoutValidationError> {
        let fields = [
            ("decompile_seconds", self.decompile_seconds),
            ("rebuild_seconds", self.rebuild_seconds),
            ("keygen_seconds", self.keygen_seconds),
            ("sign_seconds", self.sign_seconds),
        ];

        for (field, value) in fields {
            if value == 0 || value > MAX_TIMEOUT_SECONDS {
                return Err(TimeoutValidationError::OutOfBounds { field, value });
            }
        }

        Ok(())
    }

    pub fn decompile(&self) -> Duration {
        Duration::from_secs(self.decompile_seconds)
    }

    pub fn rebuild(&self) -> Duration {
        Duration::from_secs(self.rebuild_seconds)
    }

    pub fn keygen(&self) -> Duration {
        Duration::from_secs(self.keygen_seconds)
    }

    pub fn sign(&self) -> Duration {
        Duration::from_secs(self.sign_seconds)
    }
}

/// Timeout validation errors
#[derive(Debug, thiserror::Error)]
pub enum TimeoutValidationError {
    #[error("{field} must be in (0, 86400], got {value}")]
    OutOfBounds { field: &'static str, value: u64 },
}
