//! Phylogenetic and spatial signal statistics.
//!
//! - **Moran's I** — spatial autocorrelation under a weight matrix ([`moran`])
//! - **Blomberg's K / K\*** — phylogenetic signal under a tree covariance ([`blomberg`])
//! - **Pagel's lambda** — log-likelihood of the lambda-transformed covariance ([`pagel`])
//! - **Mantel-type association** — weighted pairwise profile correlation ([`mantel`])
//! - **Permutation testing** — the shared Monte Carlo engine ([`permutation`])
//!
//! Significance for Moran's I and the Blomberg statistics comes from
//! shuffling trait values across units and recomputing the statistic with
//! the unit structure held fixed. Enable the `parallel` feature for
//! [`PermutationTest::run_parallel`](permutation::PermutationTest) and
//! `serde` for serializable configs and results.

pub mod blomberg;
pub mod mantel;
pub mod moran;
pub mod pagel;
pub mod permutation;

pub use blomberg::{blomberg_k, blomberg_k_star, k_star_test, k_test, BlombergK, BlombergKStar};
pub use mantel::mantel_statistic;
pub use moran::{moran_i, moran_test, MoranI};
pub use pagel::{lambda_transform, pagel_log_likelihood};
pub use permutation::{
    monte_carlo_p_value, PermutationConfig, PermutationResult, PermutationTest, SignalStatistic,
    Tail,
};
pub use phylosig_core::{Result, SignalError};
