//! Mesh processing algorithms.
//!
//! - **Skeleton**: mean curvature flow contraction with edge collapse,
//!   triangle splitting and degeneracy detection ([`skeleton`])
//! - **Sparse**: CSR assembly and least-squares solvers ([`sparse`])
//! - **Progress**: callbacks for long-running operations ([`progress`])

pub mod progress;
pub mod skeleton;
pub mod sparse;

pub use progress::Progress;
