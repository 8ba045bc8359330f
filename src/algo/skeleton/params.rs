//! Contraction parameters.

use crate::error::{Result, SkeletonError};
use crate::mesh::{HalfEdgeMesh, MeshIndex};

/// Fraction of the bounding-box diagonal used as the default short-edge
/// threshold by [`ContractionParams::for_mesh`].
pub const EDGE_LENGTH_DIAGONAL_FACTOR: f64 = 0.002;

/// Tunable thresholds and weights of the contraction.
///
/// Fields are public for construction; [`ContractionParams::validate`] is
/// run by every consumer before the values are used, and the driver's
/// setters validate each value as it is changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractionParams {
    /// Weight of the Laplacian (smoothing) rows.
    pub omega_l: f64,

    /// Weight of the positional anchor rows.
    pub omega_h: f64,

    /// Edges shorter than this are collapsed. Absolute length.
    pub edge_length_threshold: f64,

    /// Areas below this count as zero.
    pub zero_threshold: f64,

    /// Triangles with an interior angle above this (degrees) get split.
    pub max_angle: f64,

    /// Upper bound on split passes per call.
    pub max_split_passes: usize,

    /// Upper bound on collapse batches per call.
    pub max_collapse_passes: usize,

    /// Relative area change under which the driver reports convergence.
    pub area_tolerance: f64,

    /// Upper bound on driver iterations.
    pub max_iterations: usize,

    /// Cotangent used for triangles whose area is below `zero_threshold`.
    pub degenerate_cotangent: f64,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for ContractionParams {
    fn default() -> Self {
        Self {
            omega_l: 1.0,
            omega_h: 0.1,
            edge_length_threshold: 0.0,
            zero_threshold: 1e-7,
            max_angle: 110.0,
            max_split_passes: 10,
            max_collapse_passes: 30,
            area_tolerance: 1e-4,
            max_iterations: 500,
            degenerate_cotangent: 0.0,
            parallel: true,
        }
    }
}

impl ContractionParams {
    /// Defaults with the edge threshold scaled to the mesh size.
    pub fn for_mesh<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Self {
        Self {
            edge_length_threshold: EDGE_LENGTH_DIAGONAL_FACTOR * mesh.bounding_box_diagonal(),
            ..Self::default()
        }
    }

    /// Set the Laplacian weight.
    pub fn with_omega_l(mut self, omega_l: f64) -> Self {
        self.omega_l = omega_l;
        self
    }

    /// Set the anchor weight.
    pub fn with_omega_h(mut self, omega_h: f64) -> Self {
        self.omega_h = omega_h;
        self
    }

    /// Set the absolute short-edge threshold.
    pub fn with_edge_length_threshold(mut self, threshold: f64) -> Self {
        self.edge_length_threshold = threshold;
        self
    }

    /// Set the zero-area tolerance.
    pub fn with_zero_threshold(mut self, threshold: f64) -> Self {
        self.zero_threshold = threshold;
        self
    }

    /// Set the split angle bound in degrees.
    pub fn with_max_angle(mut self, degrees: f64) -> Self {
        self.max_angle = degrees;
        self
    }

    /// Set the driver iteration cap.
    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Set the convergence tolerance on relative area change.
    pub fn with_area_tolerance(mut self, tolerance: f64) -> Self {
        self.area_tolerance = tolerance;
        self
    }

    /// Set the fallback cotangent for degenerate triangles.
    pub fn with_degenerate_cotangent(mut self, cotangent: f64) -> Self {
        self.degenerate_cotangent = cotangent;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create parameters for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Anchor weight of fixed vertices.
    #[inline]
    pub fn fixed_anchor_weight(&self) -> f64 {
        1.0 / self.zero_threshold
    }

    /// Largest split-free interior angle in radians.
    #[inline]
    pub fn max_angle_radians(&self) -> f64 {
        self.max_angle.to_radians()
    }

    /// Check every field against its valid range.
    pub fn validate(&self) -> Result<()> {
        check_omega_l(self.omega_l)?;
        check_omega_h(self.omega_h)?;
        check_edge_length_threshold(self.edge_length_threshold)?;
        check_zero_threshold(self.zero_threshold)?;

        if !(self.max_angle > 60.0 && self.max_angle < 180.0) {
            return Err(SkeletonError::config(
                "max_angle",
                self.max_angle,
                "must lie strictly between 60 and 180 degrees",
            ));
        }
        if self.max_split_passes == 0 {
            return Err(SkeletonError::config("max_split_passes", 0, "must be at least 1"));
        }
        if self.max_collapse_passes == 0 {
            return Err(SkeletonError::config("max_collapse_passes", 0, "must be at least 1"));
        }
        if !(self.area_tolerance.is_finite() && self.area_tolerance > 0.0) {
            return Err(SkeletonError::config(
                "area_tolerance",
                self.area_tolerance,
                "must be finite and positive",
            ));
        }
        if self.max_iterations == 0 {
            return Err(SkeletonError::config("max_iterations", 0, "must be at least 1"));
        }
        if !self.degenerate_cotangent.is_finite() {
            return Err(SkeletonError::config(
                "degenerate_cotangent",
                self.degenerate_cotangent,
                "must be finite",
            ));
        }
        Ok(())
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SkeletonError::config(name, value, "must be finite and non-negative"))
    }
}

pub(crate) fn check_omega_l(value: f64) -> Result<()> {
    check_non_negative("omega_l", value)
}

pub(crate) fn check_omega_h(value: f64) -> Result<()> {
    check_non_negative("omega_h", value)
}

pub(crate) fn check_edge_length_threshold(value: f64) -> Result<()> {
    check_non_negative("edge_length_threshold", value)
}

pub(crate) fn check_zero_threshold(value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SkeletonError::config("zero_threshold", value, "must be finite and positive"))
    }
}
