//! Monte Carlo permutation engine.
//!
//! Every permutation test in this crate follows the same protocol:
//!
//! 1. evaluate the statistic once on the observed trait vector,
//! 2. evaluate it again on `reps` independent permutations of that vector,
//!    always against the same fixed structure matrix,
//! 3. rank the observed value within the resulting null distribution.
//!
//! The p-value carries the add-one correction,
//! `(exceedances + 1) / (reps + 1)`, so it is never zero. Tests are
//! right-tailed unless a different [`Tail`] is configured; a statistic that
//! signals structure by being *small* needs [`Tail::Left`], not a sign flip.

use phylosig_core::linalg;
use phylosig_core::{Permuter, Result, RngPermuter, Scored, SignalError, Summarizable};

/// A statistic that can be evaluated for any arrangement of a trait vector
/// against a fixed structure matrix.
///
/// Implementors hold the structure matrix and whatever they precompute from
/// it (inverses, sums, expected ratios); `evaluate` only sees the trait.
pub trait SignalStatistic {
    /// Human-readable method name, used in results and log lines.
    fn name(&self) -> &'static str;

    /// Number of units the structure matrix describes.
    fn dim(&self) -> usize;

    /// Evaluate the statistic for one arrangement of the trait vector.
    fn evaluate(&self, x: &[f64]) -> Result<f64>;
}

// ── Configuration ───────────────────────────────────────────────────────────

/// Which side of the null distribution counts as "at least as extreme".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Tail {
    /// Count null values `>=` the observed statistic.
    #[default]
    Right,
    /// Count null values `<=` the observed statistic.
    Left,
    /// Twice the smaller one-tailed p-value, capped at 1.
    TwoSided,
}

/// Settings for a permutation test.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PermutationConfig {
    /// Number of permutations (must be at least 1).
    pub reps: usize,
    /// Seed for [`PermutationTest::run_seeded`].
    pub seed: u64,
    /// Tail of the null distribution used for the p-value.
    pub tail: Tail,
}

impl Default for PermutationConfig {
    fn default() -> Self {
        Self {
            reps: 999,
            seed: 42,
            tail: Tail::Right,
        }
    }
}

impl PermutationConfig {
    /// Default settings with `reps` permutations.
    pub fn new(reps: usize) -> Self {
        Self {
            reps,
            ..Self::default()
        }
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the tail.
    pub fn with_tail(mut self, tail: Tail) -> Self {
        self.tail = tail;
        self
    }

    /// Check the settings before any computation runs.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::InvalidRepetitions`] if `reps` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.reps == 0 {
            return Err(SignalError::InvalidRepetitions(self.reps));
        }
        Ok(())
    }
}

// ── Result ──────────────────────────────────────────────────────────────────

/// Result of a permutation test.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PermutationResult {
    /// Observed value of the statistic.
    pub statistic: f64,
    /// Monte Carlo p-value, in `[1 / (reps + 1), 1]`.
    pub p_value: f64,
    /// Number of permutations performed.
    pub n_permutations: usize,
    /// Statistic value for each permutation, in trial order.
    pub null_distribution: Vec<f64>,
    /// Tail used for the p-value.
    pub tail: Tail,
    /// Method name.
    pub method: String,
}

impl Scored for PermutationResult {
    fn score(&self) -> f64 {
        self.p_value
    }
}

impl Summarizable for PermutationResult {
    fn summary(&self) -> String {
        format!(
            "{}: statistic={:.4}, p={:.6} ({} permutations, {:?} tail)",
            self.method, self.statistic, self.p_value, self.n_permutations, self.tail,
        )
    }
}

// ── p-value ─────────────────────────────────────────────────────────────────

/// Monte Carlo p-value of `observed` within `null`, with add-one correction.
///
/// # Errors
///
/// Returns [`SignalError::InvalidRepetitions`] for an empty null distribution.
///
/// # Example
///
/// ```
/// use phylosig_stats::permutation::{monte_carlo_p_value, Tail};
///
/// // one of four null values reaches the observed 2.0
/// let p = monte_carlo_p_value(2.0, &[0.0, 1.0, 3.0, -1.0], Tail::Right).unwrap();
/// assert!((p - 0.4).abs() < 1e-12);
/// ```
pub fn monte_carlo_p_value(observed: f64, null: &[f64], tail: Tail) -> Result<f64> {
    if null.is_empty() {
        return Err(SignalError::InvalidRepetitions(0));
    }
    let reps = null.len() as f64;
    let right = || (null.iter().filter(|&&v| v >= observed).count() as f64 + 1.0) / (reps + 1.0);
    let left = || (null.iter().filter(|&&v| v <= observed).count() as f64 + 1.0) / (reps + 1.0);

    let p = match tail {
        Tail::Right => right(),
        Tail::Left => left(),
        Tail::TwoSided => (2.0 * right().min(left())).min(1.0),
    };
    Ok(p)
}

// ── Engine ──────────────────────────────────────────────────────────────────

/// A permutation test of one [`SignalStatistic`].
///
/// # Example
///
/// ```
/// use phylosig_stats::moran::MoranI;
/// use phylosig_stats::permutation::{PermutationConfig, PermutationTest};
///
/// let weights = vec![
///     vec![0.0, 1.0, 0.0, 0.0],
///     vec![1.0, 0.0, 1.0, 0.0],
///     vec![0.0, 1.0, 0.0, 1.0],
///     vec![0.0, 0.0, 1.0, 0.0],
/// ];
/// let test = PermutationTest::new(MoranI::new(&weights).unwrap(), PermutationConfig::new(99));
/// let result = test.run_seeded(&[1.0, 2.0, 3.0, 4.0]).unwrap();
/// assert_eq!(result.null_distribution.len(), 99);
/// assert!(result.p_value > 0.0 && result.p_value <= 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct PermutationTest<S> {
    statistic: S,
    config: PermutationConfig,
}

impl<S: SignalStatistic> PermutationTest<S> {
    /// Pair a statistic with its test settings.
    pub fn new(statistic: S, config: PermutationConfig) -> Self {
        Self { statistic, config }
    }

    /// The statistic under test.
    pub fn statistic(&self) -> &S {
        &self.statistic
    }

    /// The test settings.
    pub fn config(&self) -> &PermutationConfig {
        &self.config
    }

    /// Evaluate the statistic on `x` without permuting.
    pub fn observed(&self, x: &[f64]) -> Result<f64> {
        linalg::ensure_len(x, self.statistic.dim(), self.statistic.name())?;
        self.statistic.evaluate(x)
    }

    /// Run the test, drawing permutations from `permuter`.
    ///
    /// Each trial permutes a fresh copy of `x`. The first error from any
    /// trial aborts the run.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::InvalidRepetitions`] or
    /// [`SignalError::DimensionMismatch`] before anything is evaluated, and
    /// otherwise whatever the statistic reports.
    pub fn run<P: Permuter + ?Sized>(
        &self,
        x: &[f64],
        permuter: &mut P,
    ) -> Result<PermutationResult> {
        self.config.validate()?;
        let observed = self.observed(x)?;
        log::debug!(
            "{}: observed={:.6}, n={}, running {} permutations",
            self.statistic.name(),
            observed,
            x.len(),
            self.config.reps
        );

        let mut working = x.to_vec();
        let mut null = Vec::with_capacity(self.config.reps);
        for _ in 0..self.config.reps {
            working.copy_from_slice(x);
            permuter.permute(&mut working)?;
            null.push(self.statistic.evaluate(&working)?);
        }

        self.finish(observed, null)
    }

    /// Run the test with a [`RngPermuter`] seeded from the configured seed.
    pub fn run_seeded(&self, x: &[f64]) -> Result<PermutationResult> {
        let mut permuter = RngPermuter::seeded(self.config.seed);
        self.run(x, &mut permuter)
    }

    /// Run the trials on the rayon thread pool.
    ///
    /// Trial `i` permutes with its own generator seeded from
    /// `seed + i`, so the null distribution depends only on the seed and
    /// not on how trials are scheduled. It differs from the one
    /// [`run_seeded`](Self::run_seeded) produces for the same seed.
    #[cfg(feature = "parallel")]
    pub fn run_parallel(&self, x: &[f64]) -> Result<PermutationResult>
    where
        S: Sync,
    {
        use rayon::prelude::*;

        self.config.validate()?;
        let observed = self.observed(x)?;
        log::debug!(
            "{}: observed={:.6}, n={}, running {} permutations in parallel",
            self.statistic.name(),
            observed,
            x.len(),
            self.config.reps
        );

        let seed = self.config.seed;
        let null = (0..self.config.reps)
            .into_par_iter()
            .map(|i| {
                let mut permuter = RngPermuter::seeded(seed.wrapping_add(i as u64));
                let mut working = x.to_vec();
                permuter.permute(&mut working)?;
                self.statistic.evaluate(&working)
            })
            .collect::<Result<Vec<f64>>>()?;

        self.finish(observed, null)
    }

    fn finish(&self, observed: f64, null: Vec<f64>) -> Result<PermutationResult> {
        let p_value = monte_carlo_p_value(observed, &null, self.config.tail)?;
        log::debug!(
            "{}: p={:.6} over {} permutations",
            self.statistic.name(),
            p_value,
            null.len()
        );
        Ok(PermutationResult {
            statistic: observed,
            p_value,
            n_permutations: null.len(),
            null_distribution: null,
            tail: self.config.tail,
            method: self.statistic.name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phylosig_core::FixedPermuter;

    const TOL: f64 = 1e-12;

    /// Statistic that reads the first element, so permutations are easy
    /// to reason about.
    pub(super) struct FirstValue(pub(super) usize);

    impl SignalStatistic for FirstValue {
        fn name(&self) -> &'static str {
            "first value"
        }

        fn dim(&self) -> usize {
            self.0
        }

        fn evaluate(&self, x: &[f64]) -> Result<f64> {
            Ok(x[0])
        }
    }

    /// Statistic that fails on a particular arrangement.
    struct FailsWhenFirstIs(f64);

    impl SignalStatistic for FailsWhenFirstIs {
        fn name(&self) -> &'static str {
            "fails"
        }

        fn dim(&self) -> usize {
            3
        }

        fn evaluate(&self, x: &[f64]) -> Result<f64> {
            if x[0] == self.0 {
                return Err(SignalError::Degenerate("boom".into()));
            }
            Ok(x[0])
        }
    }

    // ── p-value ──────────────────────────────────────────────────────

    #[test]
    fn p_value_right_tail_counts_ties() {
        let p = monte_carlo_p_value(1.0, &[1.0, 0.0, 0.0, 0.0], Tail::Right).unwrap();
        assert!((p - 2.0 / 5.0).abs() < TOL, "p={}", p);
    }

    #[test]
    fn p_value_minimum_is_add_one() {
        let null = vec![0.0; 99];
        let p = monte_carlo_p_value(5.0, &null, Tail::Right).unwrap();
        assert!((p - 1.0 / 100.0).abs() < TOL);
    }

    #[test]
    fn p_value_maximum_is_one() {
        let null = vec![10.0; 19];
        let p = monte_carlo_p_value(5.0, &null, Tail::Right).unwrap();
        assert!((p - 1.0).abs() < TOL);
    }

    #[test]
    fn p_value_left_tail() {
        let null = [0.0, 1.0, 2.0, 3.0];
        let p = monte_carlo_p_value(0.5, &null, Tail::Left).unwrap();
        assert!((p - 2.0 / 5.0).abs() < TOL, "p={}", p);
    }

    #[test]
    fn p_value_two_sided_doubles_smaller_tail() {
        let null: Vec<f64> = (0..9).map(|i| i as f64).collect();
        // right: (1 + 1) / 10 = 0.2, left: (9 + 1) / 10 = 1.0
        let p = monte_carlo_p_value(8.0, &null, Tail::TwoSided).unwrap();
        assert!((p - 0.4).abs() < TOL, "p={}", p);
        // capped at 1
        let p = monte_carlo_p_value(4.0, &null, Tail::TwoSided).unwrap();
        assert!((p - 1.0).abs() < TOL, "p={}", p);
    }

    #[test]
    fn p_value_empty_null_is_error() {
        assert!(matches!(
            monte_carlo_p_value(1.0, &[], Tail::Right),
            Err(SignalError::InvalidRepetitions(0))
        ));
    }

    #[test]
    fn p_value_stable_for_fixed_exceedance_proportion() {
        // a third of the null exceeds the observed value at every size
        let mut previous = None;
        for reps in [9usize, 99, 999, 9999] {
            let exceed = reps / 3;
            let null: Vec<f64> = (0..reps)
                .map(|i| if i < exceed { 2.0 } else { 0.0 })
                .collect();
            let p = monte_carlo_p_value(1.0, &null, Tail::Right).unwrap();
            let expected = (exceed as f64 + 1.0) / (reps as f64 + 1.0);
            assert!((p - expected).abs() < TOL);
            assert!(p > 0.3 && p < 0.45, "reps={} p={}", reps, p);
            if let Some(prev) = previous {
                assert!(p <= prev, "p should shrink toward 1/3: {} > {}", p, prev);
            }
            previous = Some(p);
        }
    }

    // ── Config ───────────────────────────────────────────────────────

    #[test]
    fn config_defaults_and_builders() {
        let cfg = PermutationConfig::default();
        assert_eq!(cfg.reps, 999);
        assert_eq!(cfg.tail, Tail::Right);

        let cfg = PermutationConfig::new(10).with_seed(7).with_tail(Tail::Left);
        assert_eq!(cfg.reps, 10);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.tail, Tail::Left);
    }

    #[test]
    fn config_zero_reps_rejected() {
        assert!(matches!(
            PermutationConfig::new(0).validate(),
            Err(SignalError::InvalidRepetitions(0))
        ));
    }

    // ── Engine ───────────────────────────────────────────────────────

    #[test]
    fn test_exposes_statistic_and_config() {
        let cfg = PermutationConfig::new(12).with_tail(Tail::TwoSided);
        let test = PermutationTest::new(FirstValue(4), cfg.clone());
        assert_eq!(test.config(), &cfg);
        assert_eq!(test.statistic().dim(), 4);
        assert_eq!(test.statistic().name(), "first value");
    }

    #[test]
    fn run_null_distribution_has_reps_values() {
        let test = PermutationTest::new(FirstValue(5), PermutationConfig::new(37));
        let result = test.run_seeded(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(result.null_distribution.len(), 37);
        assert_eq!(result.n_permutations, 37);
        assert!(result.p_value >= 1.0 / 38.0 && result.p_value <= 1.0);
    }

    #[test]
    fn run_identity_permutation_reproduces_observed() {
        let test = PermutationTest::new(FirstValue(3), PermutationConfig::new(5));
        let mut permuter = FixedPermuter::identity(3);
        let result = test.run(&[3.0, 1.0, 2.0], &mut permuter).unwrap();
        assert_eq!(result.statistic, 3.0);
        assert!(result.null_distribution.iter().all(|&v| v == 3.0));
        // every trial ties the observed value
        assert!((result.p_value - 1.0).abs() < TOL);
    }

    #[test]
    fn run_scripted_permutations_exact_p_value() {
        // observed first value 3.0; the orders bring 1.0, 2.0, 3.0 to the front
        let orders = vec![vec![1, 0, 2], vec![2, 1, 0], vec![0, 1, 2]];
        let mut permuter = FixedPermuter::new(orders).unwrap();
        let test = PermutationTest::new(FirstValue(3), PermutationConfig::new(3));
        let result = test.run(&[3.0, 1.0, 2.0], &mut permuter).unwrap();
        assert_eq!(result.null_distribution, vec![1.0, 2.0, 3.0]);
        // one tie plus the add-one correction: (1 + 1) / (3 + 1)
        assert!((result.p_value - 0.5).abs() < TOL);
    }

    #[test]
    fn run_permutes_fresh_copy_each_trial() {
        // the same swap applied twice would restore the input if applied
        // cumulatively; applied to fresh copies it yields the same value
        let mut permuter = FixedPermuter::new(vec![vec![1, 0]]).unwrap();
        let test = PermutationTest::new(FirstValue(2), PermutationConfig::new(2));
        let result = test.run(&[5.0, 7.0], &mut permuter).unwrap();
        assert_eq!(result.null_distribution, vec![7.0, 7.0]);
    }

    #[test]
    fn run_seeded_is_reproducible() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let cfg = PermutationConfig::new(50).with_seed(123);
        let a = PermutationTest::new(FirstValue(10), cfg.clone()).run_seeded(&x).unwrap();
        let b = PermutationTest::new(FirstValue(10), cfg).run_seeded(&x).unwrap();
        assert_eq!(a.null_distribution, b.null_distribution);
        assert_eq!(a.p_value, b.p_value);
    }

    #[test]
    fn run_single_trial_has_two_outcomes() {
        for seed in 0..20 {
            let cfg = PermutationConfig::new(1).with_seed(seed);
            let result = PermutationTest::new(FirstValue(4), cfg)
                .run_seeded(&[1.0, 2.0, 3.0, 4.0])
                .unwrap();
            assert!(
                (result.p_value - 0.5).abs() < TOL || (result.p_value - 1.0).abs() < TOL,
                "p={}",
                result.p_value
            );
        }
    }

    #[test]
    fn run_rejects_zero_reps_before_evaluating() {
        let test = PermutationTest::new(FailsWhenFirstIs(1.0), PermutationConfig::new(0));
        // the statistic would fail on this input, but reps is checked first
        assert!(matches!(
            test.run_seeded(&[1.0, 2.0, 3.0]),
            Err(SignalError::InvalidRepetitions(0))
        ));
    }

    #[test]
    fn run_rejects_length_mismatch() {
        let test = PermutationTest::new(FirstValue(3), PermutationConfig::new(10));
        assert!(matches!(
            test.run_seeded(&[1.0, 2.0]),
            Err(SignalError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn run_aborts_on_trial_error() {
        let mut permuter = FixedPermuter::new(vec![vec![1, 0, 2]]).unwrap();
        let test = PermutationTest::new(FailsWhenFirstIs(2.0), PermutationConfig::new(5));
        assert!(matches!(
            test.run(&[1.0, 2.0, 3.0], &mut permuter),
            Err(SignalError::Degenerate(_))
        ));
    }

    #[test]
    fn left_tail_config_flows_into_result() {
        let cfg = PermutationConfig::new(3).with_tail(Tail::Left);
        let mut permuter = FixedPermuter::new(vec![vec![1, 0, 2], vec![2, 1, 0]]).unwrap();
        let result = PermutationTest::new(FirstValue(3), cfg)
            .run(&[1.0, 2.0, 3.0], &mut permuter)
            .unwrap();
        // observed 1.0 is the minimum: nothing in [2, 3, 2] is <= 1
        assert_eq!(result.tail, Tail::Left);
        assert!((result.p_value - 0.25).abs() < TOL, "p={}", result.p_value);
    }

    #[test]
    fn result_summary_and_score() {
        let test = PermutationTest::new(FirstValue(3), PermutationConfig::new(3));
        let result = test
            .run(&[1.0, 2.0, 3.0], &mut FixedPermuter::identity(3))
            .unwrap();
        assert_eq!(result.score(), result.p_value);
        assert!(result.summary().starts_with("first value: statistic=1.0000"));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn run_parallel_matches_shape_and_is_deterministic() {
        let x: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let cfg = PermutationConfig::new(64).with_seed(9);
        let test = PermutationTest::new(FirstValue(8), cfg);
        let a = test.run_parallel(&x).unwrap();
        let b = test.run_parallel(&x).unwrap();
        assert_eq!(a.null_distribution.len(), 64);
        assert_eq!(a.null_distribution, b.null_distribution);
    }
}
