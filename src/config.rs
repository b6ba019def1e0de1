use crate::error::{PayrollError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_FAILURE_REASON: &str = "Insufficient funds or bank error";

/// Upper bound for every timing setting: one day.
pub const MAX_TIMING_MS: u64 = 24 * 60 * 60 * 1000;

/// Timing and outcome settings for simulated batch execution.
///
/// Defaults reproduce the stock schedule: payees start 500ms apart, go in
/// transit after 2s and settle after 4s, with nine in ten payments succeeding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub stagger_ms: u64,
    pub transit_after_ms: u64,
    pub resolve_after_ms: u64,
    pub completion_grace_ms: u64,
    pub retry_transit_after_ms: u64,
    pub retry_resolve_after_ms: u64,
    pub success_rate: f64,
    pub failure_reason: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            stagger_ms: 500,
            transit_after_ms: 2000,
            resolve_after_ms: 4000,
            completion_grace_ms: 1000,
            retry_transit_after_ms: 1000,
            retry_resolve_after_ms: 3000,
            success_rate: 0.9,
            failure_reason: DEFAULT_FAILURE_REASON.to_string(),
        }
    }
}

impl ExecutionConfig {
    /// Loads a JSON config file. Missing fields fall back to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.success_rate) {
            return Err(PayrollError::ValidationError(format!(
                "success_rate must be within [0, 1], got {}",
                self.success_rate
            )));
        }
        let timings = [
            ("stagger_ms", self.stagger_ms),
            ("transit_after_ms", self.transit_after_ms),
            ("resolve_after_ms", self.resolve_after_ms),
            ("completion_grace_ms", self.completion_grace_ms),
            ("retry_transit_after_ms", self.retry_transit_after_ms),
            ("retry_resolve_after_ms", self.retry_resolve_after_ms),
        ];
        for (name, value) in timings {
            if value > MAX_TIMING_MS {
                return Err(PayrollError::ValidationError(format!(
                    "{name} must not exceed {MAX_TIMING_MS}ms, got {value}"
                )));
            }
        }
        if self.transit_after_ms > self.resolve_after_ms {
            return Err(PayrollError::ValidationError(
                "transit_after_ms must not exceed resolve_after_ms".to_string(),
            ));
        }
        if self.retry_transit_after_ms > self.retry_resolve_after_ms {
            return Err(PayrollError::ValidationError(
                "retry_transit_after_ms must not exceed retry_resolve_after_ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn transit_after(&self) -> Duration {
        Duration::from_millis(self.transit_after_ms)
    }

    pub fn resolve_after(&self) -> Duration {
        Duration::from_millis(self.resolve_after_ms)
    }

    /// Delay from execution start until the payee at `index` is initiated.
    pub fn start_offset(&self, index: usize) -> Duration {
        Duration::from_millis(self.stagger_ms.saturating_mul(index as u64))
    }

    /// Delay from execution start until the one-shot completion check for a
    /// batch of `payees` payees.
    pub fn completion_check_after(&self, payees: usize) -> Duration {
        self.start_offset(payees.saturating_sub(1))
            .saturating_add(self.resolve_after())
            .saturating_add(Duration::from_millis(self.completion_grace_ms))
    }

    pub fn retry_transit_after(&self) -> Duration {
        Duration::from_millis(self.retry_transit_after_ms)
    }

    pub fn retry_resolve_after(&self) -> Duration {
        Duration::from_millis(self.retry_resolve_after_ms)
    }
}
