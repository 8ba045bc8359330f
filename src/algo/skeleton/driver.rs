//! The contraction driver.

use std::fmt;

use log::{debug, info};
use nalgebra::Point3;

use super::contract;
use super::degeneracy;
use super::params::{
    check_edge_length_threshold, check_omega_h, check_omega_l, check_zero_threshold,
};
use super::topology;
use super::weights::{CotangentWeight, EdgeWeight};
use super::ContractionParams;
use crate::algo::progress::Progress;
use crate::algo::sparse::{CholeskySolver, FactorDiagnostic, LeastSquaresSolver};
use crate::error::{Result, SkeletonError};
use crate::mesh::{HalfEdgeMesh, MeshIndex};

/// Why a contraction run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceReason {
    /// The relative area change fell below `area_tolerance`.
    AreaStalled,
    /// Every vertex is fixed.
    AllFixed,
    /// `max_iterations` steps were taken.
    IterationLimit,
}

impl fmt::Display for ConvergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceReason::AreaStalled => write!(f, "area change below tolerance"),
            ConvergenceReason::AllFixed => write!(f, "all vertices fixed"),
            ConvergenceReason::IterationLimit => write!(f, "iteration limit reached"),
        }
    }
}

/// Lifecycle of a [`MeanCurvatureSkeleton`].
#[derive(Debug, Clone, PartialEq)]
pub enum ContractionState {
    /// More steps may be taken.
    Running,
    /// Stopped normally.
    Converged(ConvergenceReason),
    /// Stopped on a numerical error; holds its message.
    Failed(String),
}

impl ContractionState {
    /// True for `Converged` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ContractionState::Running)
    }
}

/// Summary of one [`MeanCurvatureSkeleton::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    /// 1-based iteration number since the start or the last restart.
    pub iteration: usize,
    /// Surface area after the step.
    pub area: f64,
    /// `|previous area - area| / original area`.
    pub relative_area_change: f64,
    /// Edges collapsed in this step.
    pub collapsed: usize,
    /// Edges split in this step.
    pub split: usize,
    /// Vertices fixed in this step.
    pub newly_fixed: usize,
    /// Vertex count after the step.
    pub num_vertices: usize,
    /// Face count after the step.
    pub num_faces: usize,
    /// Solver diagnostic of the contraction.
    pub diagnostic: FactorDiagnostic,
    /// State after the step.
    pub state: ContractionState,
}

/// Iterative mean-curvature-flow contraction of a closed surface.
///
/// Each [`step`](Self::step) contracts the geometry, collapses short edges,
/// splits obtuse triangles and fixes degenerate vertices. Positions of fixed
/// vertices accumulate in [`fixed_points`](Self::fixed_points), which only
/// grows and seeds the curve skeleton.
///
/// # Example
///
/// ```no_run
/// use mcfskel::prelude::*;
///
/// let mesh: HalfEdgeMesh = mcfskel::io::load("model.obj").unwrap();
/// let mut skeleton = MeanCurvatureSkeleton::new(mesh).unwrap();
/// let reason = skeleton.contract().unwrap();
/// println!("{} fixed points ({})", skeleton.fixed_points().len(), reason);
/// ```
pub struct MeanCurvatureSkeleton<
    I: MeshIndex = u32,
    S: LeastSquaresSolver = CholeskySolver,
    W: EdgeWeight = CotangentWeight,
> {
    mesh: HalfEdgeMesh<I>,
    params: ContractionParams,
    solver: S,
    weighting: W,
    fixed_points: Vec<Point3<f64>>,
    state: ContractionState,
    iteration: usize,
    original_area: f64,
    previous_area: f64,
}

impl<I: MeshIndex> MeanCurvatureSkeleton<I> {
    /// Start a contraction with parameters derived from the mesh size.
    pub fn new(mesh: HalfEdgeMesh<I>) -> Result<Self> {
        let params = ContractionParams::for_mesh(&mesh);
        Self::with_params(mesh, params)
    }

    /// Start a contraction with explicit parameters.
    pub fn with_params(mesh: HalfEdgeMesh<I>, params: ContractionParams) -> Result<Self> {
        Self::with_components(mesh, params, CholeskySolver::new(), CotangentWeight)
    }
}

impl<I: MeshIndex, S: LeastSquaresSolver, W: EdgeWeight> MeanCurvatureSkeleton<I, S, W> {
    /// Start a contraction with a chosen solver and weighting.
    pub fn with_components(
        mesh: HalfEdgeMesh<I>,
        params: ContractionParams,
        solver: S,
        weighting: W,
    ) -> Result<Self> {
        params.validate()?;
        if mesh.num_faces() == 0 {
            return Err(SkeletonError::EmptyMesh);
        }
        if !mesh.is_manifold() {
            return Err(SkeletonError::topology("input mesh is not manifold"));
        }

        let area = mesh.surface_area();
        let fixed_points = mesh
            .vertices()
            .filter(|(_, v)| v.fixed)
            .map(|(_, v)| v.position)
            .collect();

        Ok(Self {
            mesh,
            params,
            solver,
            weighting,
            fixed_points,
            state: ContractionState::Running,
            iteration: 0,
            original_area: area,
            previous_area: area,
        })
    }

    /// Replace the solver, keeping all progress.
    pub fn with_solver<S2: LeastSquaresSolver>(self, solver: S2) -> MeanCurvatureSkeleton<I, S2, W> {
        MeanCurvatureSkeleton {
            mesh: self.mesh,
            params: self.params,
            solver,
            weighting: self.weighting,
            fixed_points: self.fixed_points,
            state: self.state,
            iteration: self.iteration,
            original_area: self.original_area,
            previous_area: self.previous_area,
        }
    }

    // ==================== Accessors ====================

    /// Current state.
    pub fn state(&self) -> &ContractionState {
        &self.state
    }

    /// The mesh being contracted.
    pub fn mesh(&self) -> &HalfEdgeMesh<I> {
        &self.mesh
    }

    /// Give back the contracted mesh.
    pub fn into_mesh(self) -> HalfEdgeMesh<I> {
        self.mesh
    }

    /// Positions of every vertex fixed so far, in the order they were fixed.
    pub fn fixed_points(&self) -> &[Point3<f64>] {
        &self.fixed_points
    }

    /// Current parameters.
    pub fn params(&self) -> &ContractionParams {
        &self.params
    }

    /// Steps taken since the start or the last restart.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Surface area of the input mesh.
    pub fn original_area(&self) -> f64 {
        self.original_area
    }

    /// Laplacian weight.
    pub fn omega_l(&self) -> f64 {
        self.params.omega_l
    }

    /// Anchor weight.
    pub fn omega_h(&self) -> f64 {
        self.params.omega_h
    }

    /// Short-edge threshold.
    pub fn edge_length_threshold(&self) -> f64 {
        self.params.edge_length_threshold
    }

    /// Zero-area tolerance.
    pub fn zero_threshold(&self) -> f64 {
        self.params.zero_threshold
    }

    // ==================== Parameters ====================

    /// Set the Laplacian weight. Rejected values leave the old one in place.
    pub fn set_omega_l(&mut self, value: f64) -> Result<()> {
        check_omega_l(value)?;
        self.params.omega_l = value;
        Ok(())
    }

    /// Set the anchor weight.
    pub fn set_omega_h(&mut self, value: f64) -> Result<()> {
        check_omega_h(value)?;
        self.params.omega_h = value;
        Ok(())
    }

    /// Set the short-edge threshold.
    pub fn set_edge_length_threshold(&mut self, value: f64) -> Result<()> {
        check_edge_length_threshold(value)?;
        self.params.edge_length_threshold = value;
        Ok(())
    }

    /// Set the zero-area tolerance.
    pub fn set_zero_threshold(&mut self, value: f64) -> Result<()> {
        check_zero_threshold(value)?;
        self.params.zero_threshold = value;
        Ok(())
    }

    /// Replace all parameters at once.
    pub fn set_params(&mut self, params: ContractionParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    // ==================== Phases ====================

    /// Run only the geometry contraction. A fatal error (see
    /// [`SkeletonError::is_fatal`]) moves the driver to `Failed`.
    pub fn contract_geometry(&mut self) -> Result<FactorDiagnostic> {
        let result =
            contract::contract_geometry(&mut self.mesh, &self.params, &self.weighting, &self.solver);
        if let Err(err) = &result {
            if err.is_fatal() {
                self.fail(err);
            }
        }
        result
    }

    /// Run only the short-edge collapse.
    pub fn collapse_short_edges(&mut self) -> Result<usize> {
        topology::collapse_short_edges(&mut self.mesh, &self.params)
    }

    /// Run only the obtuse-triangle split.
    pub fn iteratively_split_triangles(&mut self) -> Result<usize> {
        topology::iteratively_split_triangles(&mut self.mesh, &self.params)
    }

    /// Run only the degeneracy detection.
    pub fn detect_degeneracies(&mut self) -> usize {
        degeneracy::detect_degeneracies(&mut self.mesh, &self.params, &mut self.fixed_points)
    }

    // ==================== Iteration ====================

    /// Take one full iteration.
    ///
    /// Fails with `InvalidState` once the driver is terminal; use
    /// [`restart`](Self::restart) to continue after changing parameters.
    pub fn step(&mut self) -> Result<IterationReport> {
        if self.state.is_terminal() {
            return Err(SkeletonError::InvalidState(format!(
                "contraction already stopped: {:?}",
                self.state
            )));
        }
        self.iteration += 1;

        let diagnostic = self.contract_geometry()?;
        let collapsed = self.collapse_short_edges()?;
        let split = self.iteratively_split_triangles()?;
        let newly_fixed = self.detect_degeneracies();

        let area = self.mesh.surface_area();
        let relative_area_change = if self.original_area > 0.0 {
            (self.previous_area - area).abs() / self.original_area
        } else {
            0.0
        };
        self.previous_area = area;

        if self.mesh.num_fixed() == self.mesh.num_vertices() {
            self.converge(ConvergenceReason::AllFixed);
        } else if relative_area_change < self.params.area_tolerance {
            self.converge(ConvergenceReason::AreaStalled);
        } else if self.iteration >= self.params.max_iterations {
            self.converge(ConvergenceReason::IterationLimit);
        }

        debug!(
            "iteration {}: area {:.6e} (change {:.3e}), {} collapsed, {} split, {} fixed",
            self.iteration, area, relative_area_change, collapsed, split, newly_fixed
        );

        Ok(IterationReport {
            iteration: self.iteration,
            area,
            relative_area_change,
            collapsed,
            split,
            newly_fixed,
            num_vertices: self.mesh.num_vertices(),
            num_faces: self.mesh.num_faces(),
            diagnostic,
            state: self.state.clone(),
        })
    }

    /// Step until the driver stops.
    pub fn contract(&mut self) -> Result<ConvergenceReason> {
        self.contract_with_progress(&Progress::none())
    }

    /// Step until the driver stops, reporting after each iteration.
    pub fn contract_with_progress(&mut self, progress: &Progress) -> Result<ConvergenceReason> {
        let total = self.params.max_iterations;
        loop {
            let report = self.step()?;
            progress.report(
                report.iteration.min(total),
                total,
                &format!("{} fixed, area {:.3e}", self.fixed_points.len(), report.area),
            );
            if let ContractionState::Converged(reason) = report.state {
                return Ok(reason);
            }
        }
    }

    /// Return a stopped driver to `Running`, keeping the mesh and fixed
    /// points. The iteration counter starts over.
    pub fn restart(&mut self) {
        info!("restarting contraction after {} iterations", self.iteration);
        self.state = ContractionState::Running;
        self.iteration = 0;
        self.previous_area = self.mesh.surface_area();
    }

    fn converge(&mut self, reason: ConvergenceReason) {
        info!(
            "contraction converged after {} iterations ({}): {} fixed points",
            self.iteration,
            reason,
            self.fixed_points.len()
        );
        self.state = ContractionState::Converged(reason);
    }

    fn fail(&mut self, err: &SkeletonError) {
        info!("contraction failed after {} iterations: {}", self.iteration, err);
        self.state = ContractionState::Failed(err.to_string());
    }
}

impl<I: MeshIndex, S: LeastSquaresSolver, W: EdgeWeight> fmt::Debug for MeanCurvatureSkeleton<I, S, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeanCurvatureSkeleton")
            .field("state", &self.state)
            .field("iteration", &self.iteration)
            .field("vertices", &self.mesh.num_vertices())
            .field("fixed_points", &self.fixed_points.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::skeleton::tests::{icosahedron, tube};
    use crate::algo::sparse::ConjugateGradientSolver;

    fn exact_params() -> ContractionParams {
        ContractionParams::default().with_edge_length_threshold(0.0)
    }

    #[test]
    fn test_icosahedron_area_decreases_until_all_fixed() {
        let mut skeleton = MeanCurvatureSkeleton::with_params(icosahedron(), exact_params()).unwrap();
        let mut previous = skeleton.original_area();
        let mut fixed = 0;

        while !skeleton.state().is_terminal() {
            let report = skeleton.step().unwrap();
            assert!(report.area < previous, "area grew at iteration {}", report.iteration);
            assert!(skeleton.fixed_points().len() >= fixed);
            previous = report.area;
            fixed = skeleton.fixed_points().len();
            assert!(report.iteration < 10);
        }

        assert_eq!(
            skeleton.state(),
            &ContractionState::Converged(ConvergenceReason::AllFixed)
        );
        assert_eq!(skeleton.fixed_points().len(), 12);
    }

    #[test]
    fn test_step_after_convergence_is_invalid() {
        let mut skeleton = MeanCurvatureSkeleton::with_params(icosahedron(), exact_params()).unwrap();
        skeleton.contract().unwrap();
        let err = skeleton.step().unwrap_err();
        assert!(matches!(err, SkeletonError::InvalidState(_)));

        // Restart keeps everything and allows stepping again.
        let points = skeleton.fixed_points().len();
        skeleton.restart();
        assert_eq!(skeleton.state(), &ContractionState::Running);
        assert_eq!(skeleton.fixed_points().len(), points);
    }

    #[test]
    fn test_iteration_limit() {
        let params = exact_params().with_max_iterations(1);
        let mut skeleton = MeanCurvatureSkeleton::with_params(icosahedron(), params).unwrap();
        assert_eq!(skeleton.contract().unwrap(), ConvergenceReason::IterationLimit);
        assert_eq!(skeleton.iteration(), 1);
    }

    #[test]
    fn test_numerical_failure_is_terminal() {
        let params = exact_params().with_omega_h(0.0);
        let mut skeleton = MeanCurvatureSkeleton::with_params(icosahedron(), params).unwrap();

        let err = skeleton.step().unwrap_err();
        assert!(matches!(err, SkeletonError::Numerical { .. }));
        assert!(matches!(skeleton.state(), ContractionState::Failed(_)));
        assert!(skeleton.step().is_err());

        skeleton.set_omega_h(0.1).unwrap();
        skeleton.restart();
        assert!(skeleton.step().is_ok());
    }

    #[test]
    fn test_setters_validate() {
        let mut skeleton = MeanCurvatureSkeleton::new(icosahedron()).unwrap();
        assert!(skeleton.set_omega_l(-2.0).is_err());
        assert_eq!(skeleton.omega_l(), 1.0);
        assert!(skeleton.set_zero_threshold(0.0).is_err());
        assert_eq!(skeleton.zero_threshold(), 1e-7);

        skeleton.set_omega_h(0.5).unwrap();
        skeleton.set_edge_length_threshold(0.01).unwrap();
        assert_eq!(skeleton.omega_h(), 0.5);
        assert_eq!(skeleton.edge_length_threshold(), 0.01);
    }

    #[test]
    fn test_default_thresholds_converge() {
        let mut skeleton = MeanCurvatureSkeleton::new(icosahedron()).unwrap();
        skeleton.contract().unwrap();

        assert!(matches!(skeleton.state(), ContractionState::Converged(_)));
        assert!(!skeleton.fixed_points().is_empty());
        assert!(skeleton.mesh().is_manifold());
        assert!(skeleton.mesh().num_fixed() <= skeleton.fixed_points().len());
    }

    #[test]
    fn test_tube_contracts_with_cg() {
        let mesh = tube(6, 8, 4.0, 0.5);
        let params = ContractionParams::for_mesh(&mesh).with_max_iterations(3);
        let area = mesh.surface_area();
        let mut skeleton = MeanCurvatureSkeleton::with_params(mesh, params)
            .unwrap()
            .with_solver(ConjugateGradientSolver::default());

        let report = skeleton.step().unwrap();
        assert!(report.area < area);
        assert!(skeleton.mesh().is_manifold());
    }

    #[test]
    fn test_rejects_empty_mesh() {
        let result = MeanCurvatureSkeleton::new(HalfEdgeMesh::<u32>::new());
        assert!(matches!(result, Err(SkeletonError::EmptyMesh)));
    }
}
