//! Iterative numerical solvers

pub mod levmar;

pub use levmar::{levmar_fit, LevMarOptions, NoConvergence};
