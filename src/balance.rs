//! Running-balance calculation.
//!
//! Pure functions over ordered sequences of net flows. The coordinator feeds
//! them a customer's entries sorted by `(occurred_at, id)` and writes back the
//! results; nothing here touches the store.

use crate::decimal::Quantity;
use crate::unit::Unit;
use std::fmt;
use thiserror::Error;

/// A value that can be accumulated into a running balance.
///
/// Implemented by single-commodity quantities and by the two-leg trade
/// balance, whose legs are summed together so they always cover the same
/// prefix of records.
pub trait RunningTotal: Copy + PartialEq + fmt::Debug + fmt::Display {
    fn zero() -> Self;

    /// Adds `rhs`, returning `None` on overflow.
    fn checked_add(self, rhs: Self) -> Option<Self>;
}

impl<U: Unit> RunningTotal for Quantity<U> {
    fn zero() -> Self {
        Quantity::ZERO
    }

    fn checked_add(self, rhs: Self) -> Option<Self> {
        Quantity::checked_add(self, rhs)
    }
}

/// Failures of the prefix-sum computation or check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("running balance overflows at position {position}")]
    Overflow { position: usize },

    #[error("balance at position {position} is {found}, expected {expected}")]
    Mismatch {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("{nets} flows but {balances} balances")]
    LengthMismatch { nets: usize, balances: usize },
}

/// Computes the running balance after each net flow.
///
/// Output has the same length and order as the input; element `i` is the sum
/// of nets `0..=i`.
pub fn running_balances<T, I>(nets: I) -> Result<Vec<T>, BalanceError>
where
    T: RunningTotal,
    I: IntoIterator<Item = T>,
{
    let mut running = T::zero();
    let mut balances = Vec::new();

    for (position, net) in nets.into_iter().enumerate() {
        running = running
            .checked_add(net)
            .ok_or(BalanceError::Overflow { position })?;
        balances.push(running);
    }

    Ok(balances)
}

/// Checks that `balances` is exactly the prefix sum of `nets`.
pub fn verify<T: RunningTotal>(nets: &[T], balances: &[T]) -> Result<(), BalanceError> {
    if nets.len() != balances.len() {
        return Err(BalanceError::LengthMismatch {
            nets: nets.len(),
            balances: balances.len(),
        });
    }

    let expected = running_balances(nets.iter().copied())?;
    for (position, (want, got)) in expected.iter().zip(balances).enumerate() {
        if want != got {
            return Err(BalanceError::Mismatch {
                position,
                expected: want.to_string(),
                found: got.to_string(),
            });
        }
    }

    Ok(())
}
