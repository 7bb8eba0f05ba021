use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BucketError {
    #[error("bucket {name}: min_reserve must be finite and >= 0, got {value}")]
    InvalidReserve { name: String, value: f64 },
    #[error("bucket {name}: max_capacity must be finite and > 0, got {value}")]
    InvalidCapacity { name: String, value: f64 },
    #[error("bucket {name}: min_transaction must be in (0, max_capacity], got {value}")]
    InvalidMinTransaction { name: String, value: f64 },
    #[error("bucket {name}: balance {balance} outside [0, {ceiling}]")]
    InvalidBalance { name: String, balance: f64, ceiling: f64 },
}

/// Variant-specific constraints of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BucketKind {
    /// Sink with no ceiling; accepts every deposit in full.
    Unbounded,
    /// Caps its balance at `max_capacity`; overflow is handed back.
    Bounded { max_capacity: f64 },
    /// Bounded, and every movement in or out must be at least `min_transaction`
    /// (e.g. a bond ladder that is only bought or sold in lots).
    Transactional { max_capacity: f64, min_transaction: f64 },
}

/// Result of a single-bucket withdrawal.
///
/// `unsatisfied` is what the bucket could not provide. `surplus` is what a
/// transactional bucket took out beyond the request to honour its minimum
/// transaction size; it is non-zero only when `unsatisfied` is zero and must be
/// put back into the portfolio by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Withdrawal {
    pub unsatisfied: f64,
    pub surplus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    /// Balance kept back before rebalancing forwards excess to deeper buckets.
    pub min_reserve: f64,
    pub kind: BucketKind,
    balance: f64,
}

impl Bucket {
    pub fn unbounded(name: impl Into<String>, min_reserve: f64) -> Self {
        Bucket { name: name.into(), min_reserve, kind: BucketKind::Unbounded, balance: 0.0 }
    }

    pub fn bounded(name: impl Into<String>, min_reserve: f64, max_capacity: f64) -> Self {
        Bucket {
            name: name.into(),
            min_reserve,
            kind: BucketKind::Bounded { max_capacity },
            balance: 0.0,
        }
    }

    pub fn transactional(
        name: impl Into<String>,
        min_reserve: f64,
        min_transaction: f64,
        max_capacity: f64,
    ) -> Self {
        Bucket {
            name: name.into(),
            min_reserve,
            kind: BucketKind::Transactional { max_capacity, min_transaction },
            balance: 0.0,
        }
    }

    /// Start the bucket with funds already in it. Checked by `validate`.
    pub fn with_balance(mut self, balance: f64) -> Self {
        self.balance = balance;
        self
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn max_capacity(&self) -> Option<f64> {
        match self.kind {
            BucketKind::Unbounded => None,
            BucketKind::Bounded { max_capacity }
            | BucketKind::Transactional { max_capacity, .. } => Some(max_capacity),
        }
    }

    pub fn min_transaction(&self) -> Option<f64> {
        match self.kind {
            BucketKind::Transactional { min_transaction, .. } => Some(min_transaction),
            _ => None,
        }
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self.kind, BucketKind::Transactional { .. })
    }

    /// Check parameters and the starting balance.
    pub fn validate(&self) -> Result<(), BucketError> {
        if !self.min_reserve.is_finite() || self.min_reserve < 0.0 {
            return Err(BucketError::InvalidReserve {
                name: self.name.clone(),
                value: self.min_reserve,
            });
        }
        if let Some(cap) = self.max_capacity()
            && (!cap.is_finite() || cap <= 0.0)
        {
            return Err(BucketError::InvalidCapacity { name: self.name.clone(), value: cap });
        }
        if let BucketKind::Transactional { max_capacity, min_transaction } = self.kind
            && (!min_transaction.is_finite()
                || min_transaction <= 0.0
                || min_transaction > max_capacity)
        {
            return Err(BucketError::InvalidMinTransaction {
                name: self.name.clone(),
                value: min_transaction,
            });
        }
        let ceiling = self.max_capacity().unwrap_or(f64::INFINITY);
        if !self.balance.is_finite() || self.balance < 0.0 || self.balance > ceiling {
            return Err(BucketError::InvalidBalance {
                name: self.name.clone(),
                balance: self.balance,
                ceiling,
            });
        }
        Ok(())
    }

    /// True when the bucket cannot take any further deposit. A transactional
    /// bucket whose free room is below its minimum transaction counts as full.
    pub fn is_full(&self) -> bool {
        match self.kind {
            BucketKind::Unbounded => false,
            BucketKind::Bounded { max_capacity } => self.balance >= max_capacity,
            BucketKind::Transactional { max_capacity, min_transaction } => {
                self.balance >= max_capacity || max_capacity - self.balance < min_transaction
            }
        }
    }

    /// Whether `amount` is large enough to be moved in one transaction.
    pub fn meets_minimum(&self, amount: f64) -> bool {
        match self.kind {
            BucketKind::Transactional { min_transaction, .. } => amount >= min_transaction,
            _ => true,
        }
    }

    /// Place as much of `amount` as the bucket's rules allow and return the
    /// unplaced remainder, always in `[0, amount]`.
    pub fn deposit(&mut self, amount: f64) -> f64 {
        if !(amount > 0.0) {
            return 0.0;
        }
        match self.kind {
            BucketKind::Unbounded => {
                self.balance += amount;
                0.0
            }
            BucketKind::Bounded { max_capacity } => self.fill_up_to(amount, max_capacity),
            BucketKind::Transactional { max_capacity, min_transaction } => {
                if amount < min_transaction {
                    return amount;
                }
                let room = (max_capacity - self.balance).max(0.0);
                // Refuse rather than leave a sub-minimum fragment behind.
                if amount.min(room) < min_transaction {
                    return amount;
                }
                self.fill_up_to(amount, max_capacity)
            }
        }
    }

    fn fill_up_to(&mut self, amount: f64, max_capacity: f64) -> f64 {
        let room = (max_capacity - self.balance).max(0.0);
        if amount >= room {
            self.balance = max_capacity.max(self.balance);
            amount - room
        } else {
            self.balance += amount;
            0.0
        }
    }

    /// Take up to `amount` out of the bucket.
    pub fn withdraw(&mut self, amount: f64) -> Withdrawal {
        if !(amount > 0.0) {
            return Withdrawal::default();
        }
        match self.kind {
            BucketKind::Unbounded | BucketKind::Bounded { .. } => {
                let taken = amount.min(self.balance);
                self.balance -= taken;
                Withdrawal { unsatisfied: amount - taken, surplus: 0.0 }
            }
            BucketKind::Transactional { min_transaction, .. } => {
                if self.balance < min_transaction {
                    return Withdrawal { unsatisfied: amount, surplus: 0.0 };
                }
                let taken = amount.max(min_transaction).min(self.balance);
                self.balance -= taken;
                let delivered = taken.min(amount);
                Withdrawal { unsatisfied: amount - delivered, surplus: taken - delivered }
            }
        }
    }

    /// Overwrite the balance, bypassing transaction rules. Rebalancing settles a
    /// source at exactly `min_reserve + unplaced excess` through this.
    pub(crate) fn set_balance(&mut self, balance: f64) {
        self.balance = balance;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::{prop_assert, proptest};

    use super::*;

    fn bonds() -> Bucket {
        Bucket::transactional("Bonds", 4_000.0, 1_000.0, 5_000.0)
    }

    // ── Unbounded ────────────────────────────────────────────────────────────

    #[test]
    fn unbounded_absorbs_everything() {
        let mut b = Bucket::unbounded("ETF", 0.0);
        assert_eq!(b.deposit(1e9), 0.0);
        assert_eq!(b.balance(), 1e9);
        assert!(!b.is_full());
    }

    #[test]
    fn non_positive_amounts_are_no_ops() {
        let mut b = Bucket::bounded("Liquidity", 0.0, 100.0).with_balance(50.0);
        assert_eq!(b.deposit(0.0), 0.0);
        assert_eq!(b.deposit(-5.0), 0.0);
        assert_eq!(b.deposit(f64::NAN), 0.0);
        assert_eq!(b.withdraw(-1.0), Withdrawal::default());
        assert_eq!(b.balance(), 50.0);
    }

    // ── Bounded ──────────────────────────────────────────────────────────────

    #[test]
    fn bounded_returns_overflow() {
        let mut b = Bucket::bounded("Liquidity", 2_500.0, 2_500.0).with_balance(2_000.0);
        assert_eq!(b.deposit(600.0), 100.0);
        assert_eq!(b.balance(), 2_500.0);
        assert!(b.is_full());
        assert_eq!(b.deposit(10.0), 10.0);
    }

    #[test]
    fn bounded_withdraw_reports_shortfall() {
        let mut b = Bucket::bounded("Liquidity", 0.0, 2_500.0).with_balance(300.0);
        let w = b.withdraw(500.0);
        assert_eq!(w.unsatisfied, 200.0);
        assert_eq!(w.surplus, 0.0);
        assert_eq!(b.balance(), 0.0);
    }

    // ── Transactional ────────────────────────────────────────────────────────

    #[test]
    fn transactional_rejects_small_deposit() {
        let mut b = bonds();
        assert_eq!(b.deposit(999.0), 999.0);
        assert_eq!(b.balance(), 0.0);
    }

    /// 4_500 held, 500 room: a 2_000 offer would place a 500 fragment.
    #[test]
    fn transactional_rejects_fragment_at_capacity() {
        let mut b = bonds().with_balance(4_500.0);
        assert_eq!(b.deposit(2_000.0), 2_000.0);
        assert_eq!(b.balance(), 4_500.0);
        assert!(b.is_full(), "room below min_transaction counts as full");
    }

    #[test]
    fn transactional_places_up_to_capacity() {
        let mut b = bonds().with_balance(3_000.0);
        assert_eq!(b.deposit(2_500.0), 500.0);
        assert_eq!(b.balance(), 5_000.0);
    }

    #[test]
    fn transactional_withdraw_rejected_below_minimum_balance() {
        let mut b = bonds().with_balance(900.0);
        let w = b.withdraw(100.0);
        assert_eq!(w, Withdrawal { unsatisfied: 100.0, surplus: 0.0 });
        assert_eq!(b.balance(), 900.0);
    }

    #[test]
    fn transactional_over_withdraws_to_minimum() {
        let mut b = bonds().with_balance(3_000.0);
        let w = b.withdraw(250.0);
        assert_eq!(w.unsatisfied, 0.0);
        assert_eq!(w.surplus, 750.0);
        assert_eq!(b.balance(), 2_000.0);
    }

    #[test]
    fn transactional_large_withdraw_has_no_surplus() {
        let mut b = bonds().with_balance(1_500.0);
        let w = b.withdraw(4_000.0);
        assert_eq!(w.unsatisfied, 2_500.0);
        assert_eq!(w.surplus, 0.0);
        assert_eq!(b.balance(), 0.0);
    }

    // ── Validation ───────────────────────────────────────────────────────────

    #[test]
    fn validate_rejects_bad_parameters() {
        assert!(Bucket::unbounded("a", -1.0).validate().is_err());
        assert!(Bucket::bounded("a", 0.0, 0.0).validate().is_err());
        assert!(Bucket::transactional("a", 0.0, 6_000.0, 5_000.0).validate().is_err());
        assert!(Bucket::bounded("a", 0.0, 10.0).with_balance(11.0).validate().is_err());
        assert!(bonds().validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_deposit_and_withdraw_stay_in_bounds(
            kind in 0u8..3,
            start_pct in 0u32..=100,
            ops in proptest::collection::vec((proptest::bool::ANY, 0u32..8_000), 1..40)
        ) {
            let cap = 5_000.0;
            let start = cap * start_pct as f64 / 100.0;
            let mut b = match kind {
                0 => Bucket::unbounded("u", 0.0),
                1 => Bucket::bounded("b", 0.0, cap),
                _ => Bucket::transactional("t", 0.0, 1_000.0, cap),
            }
            .with_balance(start);

            for (is_deposit, amount) in ops {
                let amount = amount as f64;
                if is_deposit {
                    let left = b.deposit(amount);
                    prop_assert!((0.0..=amount).contains(&left));
                } else {
                    let w = b.withdraw(amount);
                    prop_assert!((0.0..=amount).contains(&w.unsatisfied));
                    prop_assert!(w.surplus >= 0.0);
                    prop_assert!(w.surplus == 0.0 || w.unsatisfied == 0.0);
                }
                prop_assert!(b.balance() >= 0.0);
                if let Some(cap) = b.max_capacity() {
                    prop_assert!(b.balance() <= cap);
                }
            }
        }
    }
}
