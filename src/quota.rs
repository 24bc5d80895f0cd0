//! Monthly OCR quota accounting.
//!
//! The ledger keeps one counter per period key. Reservations are a single
//! conditional write against the backing store, so concurrent invocations can
//! race on the same period without overshooting the ceiling.

use chrono::{DateTime, Utc};

/// Shared, storage-backed usage counter with a hard ceiling.
#[async_trait::async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Add `amount` to the period's counter if the result stays within
    /// `ceiling`. Returns `false`, leaving the counter untouched, otherwise.
    ///
    /// `Err` is reserved for store failures; an exhausted quota is `Ok(false)`.
    async fn try_reserve(&self, period_key: &str, amount: u64, ceiling: u64)
        -> anyhow::Result<bool>;

    /// Current usage for a period (zero when nothing was reserved yet).
    async fn usage(&self, period_key: &str) -> anyhow::Result<u64>;
}

/// Conditional increment parameters for one reservation.
///
/// The backing store applies `used + amount` only when the counter is absent
/// or `used <= headroom`, which is `used + amount <= ceiling` without
/// overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub amount: u64,
    pub headroom: u64,
}

impl Reservation {
    /// `None` when `amount` alone exceeds the ceiling; such a request can never
    /// be granted and never reaches the store.
    pub fn new(amount: u64, ceiling: u64) -> Option<Self> {
        ceiling
            .checked_sub(amount)
            .map(|headroom| Self { amount, headroom })
    }

    /// Whether the condition holds for the current counter value.
    pub fn admits(&self, used: Option<u64>) -> bool {
        used.map_or(true, |used| used <= self.headroom)
    }
}

/// Source of the accounting period for "now".
pub trait PeriodKeyProvider: Send + Sync {
    fn current_period(&self) -> String;
}

impl<F> PeriodKeyProvider for F
where
    F: Fn() -> String + Send + Sync,
{
    fn current_period(&self) -> String {
        self()
    }
}

/// Calendar months in UTC, keyed `YYYY-MM`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonthlyPeriods;

impl PeriodKeyProvider for MonthlyPeriods {
    fn current_period(&self) -> String {
        period_key_for(Utc::now())
    }
}

pub fn period_key_for(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}
