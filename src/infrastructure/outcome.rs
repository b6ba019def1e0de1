//! Payment outcome policies.
//!
//! None of these talk to a payment provider. `RandomOutcome` reproduces the
//! stock behaviour of the simulator; the others make runs deterministic.

use crate::domain::payee::PayrollPayee;
use crate::domain::ports::{Outcome, PaymentOutcome};
use crate::error::{PayrollError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;

/// Succeeds with probability `success_rate`, otherwise fails with a fixed reason.
pub struct RandomOutcome {
    success_rate: f64,
    failure_reason: String,
    rng: Mutex<StdRng>,
}

impl RandomOutcome {
    pub fn new(success_rate: f64, failure_reason: &str) -> Result<Self> {
        Self::with_rng(success_rate, failure_reason, StdRng::from_entropy())
    }

    pub fn seeded(success_rate: f64, failure_reason: &str, seed: u64) -> Result<Self> {
        Self::with_rng(success_rate, failure_reason, StdRng::seed_from_u64(seed))
    }

    fn with_rng(success_rate: f64, failure_reason: &str, rng: StdRng) -> Result<Self> {
        if !(0.0..=1.0).contains(&success_rate) {
            return Err(PayrollError::ValidationError(format!(
                "success_rate must be within [0, 1], got {success_rate}"
            )));
        }
        Ok(Self {
            success_rate,
            failure_reason: failure_reason.to_string(),
            rng: Mutex::new(rng),
        })
    }
}

impl PaymentOutcome for RandomOutcome {
    fn resolve(&self, _payee: &PayrollPayee) -> Outcome {
        let roll: f64 = match self.rng.lock() {
            Ok(mut rng) => rng.r#gen(),
            Err(poisoned) => poisoned.into_inner().r#gen(),
        };
        if roll < self.success_rate {
            Outcome::Succeeded
        } else {
            Outcome::Failed(self.failure_reason.clone())
        }
    }
}

/// Returns the same outcome for every payee.
#[derive(Debug, Clone)]
pub struct FixedOutcome(pub Outcome);

impl FixedOutcome {
    pub fn succeed() -> Self {
        Self(Outcome::Succeeded)
    }

    pub fn fail(reason: &str) -> Self {
        Self(Outcome::Failed(reason.to_string()))
    }
}

impl PaymentOutcome for FixedOutcome {
    fn resolve(&self, _payee: &PayrollPayee) -> Outcome {
        self.0.clone()
    }
}

/// Per-worker outcomes; workers without an entry get `default`.
#[derive(Debug, Clone)]
pub struct ScriptedOutcome {
    outcomes: HashMap<String, Outcome>,
    default: Outcome,
}

impl ScriptedOutcome {
    pub fn new(default: Outcome) -> Self {
        Self {
            outcomes: HashMap::new(),
            default,
        }
    }

    pub fn with(mut self, worker_id: &str, outcome: Outcome) -> Self {
        self.outcomes.insert(worker_id.to_string(), outcome);
        self
    }
}

impl PaymentOutcome for ScriptedOutcome {
    fn resolve(&self, payee: &PayrollPayee) -> Outcome {
        self.outcomes
            .get(&payee.worker_id)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}
