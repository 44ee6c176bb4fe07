//! Weighting - Composable per-row regression weights
//!
//! Each row's weight comes from the request configured for its tag
//! (force, gas force, energy, gas energy, stress). A request is either a
//! single method or a list of methods whose weights multiply:
//!
//! | ID | Formula | Params |
//! |---|---|---|
//! | A | `p0` | 1 |
//! | B | `p0 * max(cycle,1)^p1` | 2 |
//! | C | `p0 * exp(p1 * abs(value) / p2)` | 3 |
//! | D | `p0 * exp(p1 * (abs(value) - p2) / p3)` | 4 |
//! | E | `natoms^p` | 1 |
//!
//! # Example
//!
//! ```rust
//! use fit_core::{WeightRequest, WeightTerm};
//! use weighting::compute_weight;
//!
//! let request = WeightRequest::Single(WeightTerm::new("B", vec![2.0, 1.5]));
//! let w = compute_weight(&request, 0, -1.2, 8).unwrap();
//! assert_eq!(w, 2.0);
//! ```

mod engine;
mod generator;

pub use engine::compute_weight;
pub use generator::WeightEngine;
