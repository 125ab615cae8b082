//! Numerical helpers shared by the optimisers.

pub mod finite_difference;
pub mod linalg;

pub use finite_difference::{gradient, hessian, jacobian, jacobian_columns};
pub use linalg::solve_symmetric;
