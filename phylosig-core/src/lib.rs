//! Shared primitives for the phylosig signal statistics.
//!
//! `phylosig-core` provides the foundation the statistics crate builds on:
//!
//! - **Error types** — [`SignalError`] and [`Result`] for structured error handling
//! - **Traits** — [`Scored`] and [`Summarizable`] for result types
//! - **Linear algebra** — dense matrix helpers over `nalgebra` ([`linalg`])
//! - **Permutations** — injectable permutation sources ([`Permuter`])

pub mod error;
pub mod linalg;
pub mod permute;
pub mod traits;

pub use error::{Result, SignalError};
pub use permute::{FixedPermuter, Permuter, RngPermuter};
pub use traits::*;
