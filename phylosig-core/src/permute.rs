//! Permutation sources for Monte Carlo tests.
//!
//! The permutation engine never reaches for an ambient random source; it is
//! handed a [`Permuter`]. [`RngPermuter`] shuffles uniformly with any
//! [`rand::Rng`], and [`FixedPermuter`] replays a caller-supplied list of
//! index orders, which makes null distributions exactly reproducible in
//! tests.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::{Result, SignalError};

/// A source of permutations of a trait vector.
pub trait Permuter {
    /// Reorder `values` in place.
    fn permute(&mut self, values: &mut [f64]) -> Result<()>;
}

impl<P: Permuter + ?Sized> Permuter for &mut P {
    fn permute(&mut self, values: &mut [f64]) -> Result<()> {
        (**self).permute(values)
    }
}

// ── Random permutations ─────────────────────────────────────────────────────

/// Uniform random permutations (Fisher-Yates) driven by a [`rand::Rng`].
///
/// Every ordering is equally likely and values are drawn without
/// replacement.
#[derive(Debug, Clone)]
pub struct RngPermuter<R> {
    rng: R,
}

impl<R: Rng> RngPermuter<R> {
    /// Wrap an existing random number generator.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Recover the wrapped generator.
    pub fn into_inner(self) -> R {
        self.rng
    }
}

impl RngPermuter<StdRng> {
    /// A reproducible permuter seeded from `seed`.
    ///
    /// ```
    /// use phylosig_core::{Permuter, RngPermuter};
    ///
    /// let mut a = vec![1.0, 2.0, 3.0, 4.0, 5.0];
    /// let mut b = a.clone();
    /// RngPermuter::seeded(7).permute(&mut a).unwrap();
    /// RngPermuter::seeded(7).permute(&mut b).unwrap();
    /// assert_eq!(a, b);
    /// ```
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Permuter for RngPermuter<R> {
    fn permute(&mut self, values: &mut [f64]) -> Result<()> {
        values.shuffle(&mut self.rng);
        Ok(())
    }
}

// ── Scripted permutations ───────────────────────────────────────────────────

/// Replays a fixed cycle of index orders.
///
/// Applying order `o` to `values` yields `values[o[0]], values[o[1]], ...`.
/// Orders are used round-robin, so a single identity order repeats forever.
#[derive(Debug, Clone)]
pub struct FixedPermuter {
    orders: Vec<Vec<usize>>,
    next: usize,
    scratch: Vec<f64>,
}

impl FixedPermuter {
    /// Build a permuter from explicit index orders.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::InvalidInput`] if no orders are given, if the
    /// orders have different lengths, or if any order is not a permutation
    /// of `0..n`.
    pub fn new(orders: Vec<Vec<usize>>) -> Result<Self> {
        let Some(first) = orders.first() else {
            return Err(SignalError::InvalidInput(
                "FixedPermuter: at least one order is required".into(),
            ));
        };
        let n = first.len();
        for (k, order) in orders.iter().enumerate() {
            if order.len() != n {
                return Err(SignalError::InvalidInput(format!(
                    "FixedPermuter: order {} has length {}, expected {}",
                    k,
                    order.len(),
                    n
                )));
            }
            let mut seen = vec![false; n];
            for &idx in order {
                if idx >= n || seen[idx] {
                    return Err(SignalError::InvalidInput(format!(
                        "FixedPermuter: order {} is not a permutation of 0..{}",
                        k, n
                    )));
                }
                seen[idx] = true;
            }
        }
        Ok(Self {
            orders,
            next: 0,
            scratch: Vec::with_capacity(n),
        })
    }

    /// A permuter that always returns the input unchanged.
    pub fn identity(n: usize) -> Self {
        Self {
            orders: vec![(0..n).collect()],
            next: 0,
            scratch: Vec::with_capacity(n),
        }
    }
}

impl Permuter for FixedPermuter {
    fn permute(&mut self, values: &mut [f64]) -> Result<()> {
        let order = &self.orders[self.next];
        if order.len() != values.len() {
            return Err(SignalError::DimensionMismatch(format!(
                "FixedPermuter: order length ({}) != vector length ({})",
                order.len(),
                values.len()
            )));
        }
        self.scratch.clear();
        self.scratch.extend(order.iter().map(|&i| values[i]));
        values.copy_from_slice(&self.scratch);
        self.next = (self.next + 1) % self.orders.len();
        Ok(())
    }
}
