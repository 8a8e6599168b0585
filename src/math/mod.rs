//! Numerical kernels: least-squares solves, bounded Levenberg–Marquardt, and
//! bounded scalar minimization.

pub mod lm;
pub mod minimize;
pub mod ols;

pub use lm::*;
pub use minimize::*;
pub use ols::*;
