pub mod problem;
pub mod solver;

pub use problem::{BaProblem, BaProblemBuilder, IntrinsicConfig, Observation};
pub use solver::{BundleSolver, LevenbergMarquardt};
