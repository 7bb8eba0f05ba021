use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::bucket::{Bucket, BucketError};
use crate::types::BucketIndex;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortfolioError {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(f64),
    #[error("deposit of {amount} exceeds remaining capacity: {unplaced} could not be placed")]
    DepositOverflow { amount: f64, unplaced: f64 },
    #[error("withdrawal of {amount} exceeds available funds: {outstanding} outstanding")]
    InsufficientFunds { amount: f64, outstanding: f64 },
    #[error("portfolio needs at least one bucket")]
    Empty,
    #[error("duplicate bucket name {0:?}")]
    DuplicateName(String),
    #[error(transparent)]
    InvalidBucket(#[from] BucketError),
}

/// Value copy of every bucket balance at one point in time, in priority order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub balances: Vec<f64>,
}

impl Snapshot {
    pub fn total(&self) -> f64 {
        self.balances.iter().sum()
    }
}

/// Ordered chain of buckets. Index order is strict priority: deposits fill and
/// withdrawals drain from index 0 downwards.
///
/// `deposit` and `withdraw` are atomic: on error every balance is restored to
/// its value before the call, so the portfolio stays usable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    buckets: Vec<Bucket>,
}

impl Portfolio {
    pub fn new(buckets: Vec<Bucket>) -> Result<Self, PortfolioError> {
        if buckets.is_empty() {
            return Err(PortfolioError::Empty);
        }
        let mut seen = HashSet::new();
        for bucket in &buckets {
            bucket.validate()?;
            if !seen.insert(bucket.name.as_str()) {
                return Err(PortfolioError::DuplicateName(bucket.name.clone()));
            }
        }
        Ok(Portfolio { buckets })
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn bucket(&self, index: BucketIndex) -> Option<&Bucket> {
        self.buckets.get(index.0)
    }

    pub fn names(&self) -> Vec<String> {
        self.buckets.iter().map(|b| b.name.clone()).collect()
    }

    pub fn balances(&self) -> Vec<f64> {
        self.buckets.iter().map(Bucket::balance).collect()
    }

    pub fn total(&self) -> f64 {
        self.buckets.iter().map(Bucket::balance).sum()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot { balances: self.balances() }
    }

    /// Deposit `amount` through the cascade, then rebalance.
    pub fn deposit(&mut self, amount: f64) -> Result<(), PortfolioError> {
        self.deposit_with(amount, true)
    }

    /// Deposit `amount` through the cascade, optionally skipping the rebalance.
    pub fn deposit_with(&mut self, amount: f64, rebalance: bool) -> Result<(), PortfolioError> {
        if !(amount > 0.0) {
            return Err(PortfolioError::InvalidAmount(amount));
        }
        let saved = self.balances();
        let unplaced = cascade(&mut self.buckets, amount);
        if unplaced > 0.0 {
            self.restore(&saved);
            return Err(PortfolioError::DepositOverflow { amount, unplaced });
        }
        if rebalance {
            self.rebalance();
        }
        Ok(())
    }

    /// Withdraw `amount`, draining buckets in priority order. Returns the
    /// deepest bucket that held funds when the cascade reached it.
    pub fn withdraw(&mut self, amount: f64) -> Result<BucketIndex, PortfolioError> {
        if !(amount > 0.0) {
            return Err(PortfolioError::InvalidAmount(amount));
        }
        let saved = self.balances();
        let mut outstanding = amount;
        let mut surplus = 0.0;
        let mut deepest = None;

        for (i, bucket) in self.buckets.iter_mut().enumerate() {
            if outstanding <= 0.0 {
                break;
            }
            if bucket.balance() <= 0.0 {
                continue;
            }
            deepest = Some(BucketIndex(i));
            let w = bucket.withdraw(outstanding);
            outstanding = w.unsatisfied;
            surplus += w.surplus;
        }

        let deepest = match deepest {
            Some(d) if outstanding <= 0.0 => d,
            _ => {
                self.restore(&saved);
                return Err(PortfolioError::InsufficientFunds { amount, outstanding });
            }
        };

        // Transactional over-withdrawal goes back in from the top.
        if surplus > 0.0 {
            let unplaced = cascade(&mut self.buckets, surplus);
            if unplaced > 0.0 {
                self.restore(&saved);
                return Err(PortfolioError::DepositOverflow { amount: surplus, unplaced });
            }
            self.rebalance();
        }
        Ok(deepest)
    }

    /// Push every non-transactional bucket's above-reserve excess towards
    /// deeper buckets. Repeats passes until nothing moves, so a second call is
    /// always a no-op.
    pub fn rebalance(&mut self) {
        let max_passes = 2 * self.buckets.len() + 1;
        for _ in 0..max_passes {
            if !rebalance_pass(&mut self.buckets) {
                break;
            }
        }
    }

    fn restore(&mut self, saved: &[f64]) {
        for (bucket, &balance) in self.buckets.iter_mut().zip(saved) {
            bucket.set_balance(balance);
        }
    }
}

/// Offer `amount` to each bucket in turn. Returns what no bucket would take.
fn cascade(buckets: &mut [Bucket], amount: f64) -> f64 {
    let mut remaining = amount;
    for bucket in buckets.iter_mut() {
        remaining = bucket.deposit(remaining);
        if remaining <= 0.0 {
            return 0.0;
        }
    }
    remaining
}

/// One priority-ordered rebalance sweep. Returns whether any funds moved.
fn rebalance_pass(buckets: &mut [Bucket]) -> bool {
    let mut moved = false;
    for src in 0..buckets.len() {
        let source = &buckets[src];
        if source.is_transactional() {
            continue;
        }
        let reserve = source.min_reserve;
        let excess = source.balance() - reserve;
        if !(excess > 0.0) {
            continue;
        }

        let mut remaining = excess;
        for dst in src + 1..buckets.len() {
            let dest = &mut buckets[dst];
            // A sub-minimum offer to a transactional bucket that still has room
            // stops here; skipping past it would break priority order.
            if dest.is_transactional() && !dest.is_full() && !dest.meets_minimum(remaining) {
                trace!(source = src, dest = dst, remaining, "rebalance halted at transactional bucket");
                break;
            }
            remaining = dest.deposit(remaining);
            if remaining <= 0.0 {
                remaining = 0.0;
                break;
            }
        }

        if remaining < excess {
            buckets[src].set_balance(reserve + remaining);
            moved = true;
        }
    }
    moved
}
