use super::money::{Money, Rate};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One provider's offer to convert `pair` (e.g. `"USD/EUR"`).
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct FxQuote {
    pub provider: String,
    pub pair: String,
    pub rate: Rate,
    pub fee: Money,
}

/// A captured set of FX quotes, optionally locked for a time window.
///
/// The lock is informational: the remaining time is shown to approvers but
/// nothing refuses to execute against an expired quote.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct FxSnapshot {
    pub quotes: Vec<FxQuote>,
    pub locked_at: Option<DateTime<Utc>>,
    pub ttl_secs: Option<u64>,
}

impl FxSnapshot {
    pub fn new(quotes: Vec<FxQuote>) -> Self {
        Self {
            quotes,
            locked_at: None,
            ttl_secs: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }

    pub fn lock(&mut self, now: DateTime<Utc>, ttl_secs: u64) {
        self.locked_at = Some(now);
        self.ttl_secs = Some(ttl_secs);
    }

    /// Seconds left on the lock, saturating at zero. `None` when unlocked.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<u64> {
        let (locked_at, ttl) = (self.locked_at?, self.ttl_secs?);
        let expires = i64::try_from(ttl)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|d| locked_at.checked_add_signed(d));
        match expires {
            Some(expires) => Some((expires - now).num_seconds().max(0) as u64),
            // TTL beyond the representable range never runs out.
            None => Some(u64::MAX),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now) == Some(0)
    }

    /// The quote for `pair` with the highest rate; fee breaks ties.
    pub fn best_quote(&self, pair: &str) -> Option<&FxQuote> {
        self.quotes.iter().filter(|q| q.pair == pair).max_by(|a, b| {
            a.rate
                .value()
                .cmp(&b.rate.value())
                .then_with(|| b.fee.cmp(&a.fee))
        })
    }
}
