//! mcfskel CLI - mean curvature flow skeleton seeding.
//!
//! Usage: mcfskel <COMMAND> [OPTIONS] <INPUT> [OUTPUT]
//!
//! Run `mcfskel --help` for available commands. Set `RUST_LOG=debug` to see
//! per-iteration diagnostics.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};

use mcfskel::algo::skeleton::{ContractionParams, MeanCurvatureSkeleton};
use mcfskel::algo::sparse::{CholeskySolver, ConjugateGradientSolver, LeastSquaresSolver};
use mcfskel::algo::Progress;
use mcfskel::io;
use mcfskel::mesh::HalfEdgeMesh;

#[derive(Parser)]
#[command(name = "mcfskel")]
#[command(author, version, about = "Mean curvature flow skeleton CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display mesh information
    Info {
        /// Input mesh file
        input: PathBuf,
    },

    /// Contract a mesh until it converges and write the skeleton seeds
    Skeletonize {
        /// Input mesh file
        input: PathBuf,

        /// Output point file (vertex-only OBJ)
        points: PathBuf,

        /// Also write the contracted mesh
        #[arg(long)]
        mesh_out: Option<PathBuf>,

        #[command(flatten)]
        contraction: ContractionArgs,
    },

    /// Run a single phase of one iteration
    Step {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file (use .ply to keep fixed flags)
        output: PathBuf,

        /// Phase to run
        #[arg(short, long, value_enum, default_value = "contract")]
        phase: Phase,

        #[command(flatten)]
        contraction: ContractionArgs,
    },
}

#[derive(Args)]
struct ContractionArgs {
    /// Laplacian (smoothing) weight
    #[arg(long)]
    omega_l: Option<f64>,

    /// Positional anchor weight
    #[arg(long)]
    omega_h: Option<f64>,

    /// Edges shorter than this are collapsed (default: 0.002 x bbox diagonal)
    #[arg(long)]
    edge_length: Option<f64>,

    /// Area below which a vertex neighbourhood counts as degenerate
    #[arg(long)]
    zero_threshold: Option<f64>,

    /// Maximum number of iterations
    #[arg(short, long)]
    max_iterations: Option<usize>,

    /// Linear solver
    #[arg(long, value_enum, default_value = "cholesky")]
    solver: SolverKind,

    /// Use single-threaded execution (for benchmarking)
    #[arg(long)]
    sequential: bool,
}

impl ContractionArgs {
    fn params(&self, mesh: &HalfEdgeMesh) -> ContractionParams {
        let mut params = ContractionParams::for_mesh(mesh).with_parallel(!self.sequential);
        if let Some(w) = self.omega_l {
            params = params.with_omega_l(w);
        }
        if let Some(w) = self.omega_h {
            params = params.with_omega_h(w);
        }
        if let Some(len) = self.edge_length {
            params = params.with_edge_length_threshold(len);
        }
        if let Some(th) = self.zero_threshold {
            params = params.with_zero_threshold(th);
        }
        if let Some(n) = self.max_iterations {
            params = params.with_max_iterations(n);
        }
        params
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SolverKind {
    /// Sparse Cholesky on the normal equations
    Cholesky,
    /// Jacobi-preconditioned conjugate gradient
    Cg,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Phase {
    /// Implicit curvature flow solve
    Contract,
    /// Collapse short edges
    Collapse,
    /// Split obtuse triangles
    Split,
    /// Fix degenerate vertices
    Degeneracy,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Info { input } => {
            cmd_info(&input)?;
        }

        Commands::Skeletonize {
            input,
            points,
            mesh_out,
            contraction,
        } => {
            let mesh: HalfEdgeMesh = io::load(&input)?;
            println!("Loaded: {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces());
            let params = contraction.params(&mesh);
            match contraction.solver {
                SolverKind::Cholesky => {
                    cmd_skeletonize(mesh, params, CholeskySolver::default(), &points, mesh_out.as_deref())?;
                }
                SolverKind::Cg => {
                    cmd_skeletonize(
                        mesh,
                        params,
                        ConjugateGradientSolver::default(),
                        &points,
                        mesh_out.as_deref(),
                    )?;
                }
            }
        }

        Commands::Step {
            input,
            output,
            phase,
            contraction,
        } => {
            let mesh: HalfEdgeMesh = io::load(&input)?;
            let params = contraction.params(&mesh);
            match contraction.solver {
                SolverKind::Cholesky => cmd_step(mesh, params, CholeskySolver::default(), phase, &output)?,
                SolverKind::Cg => cmd_step(mesh, params, ConjugateGradientSolver::default(), phase, &output)?,
            }
        }
    }

    Ok(())
}

/// Create a progress reporter that displays a progress bar on the terminal.
///
/// Contraction usually stops well before the iteration cap, so the bar
/// jumps to 100% when the run finishes.
fn create_progress() -> Progress {
    let max_percent = Arc::new(AtomicUsize::new(0));

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }

        let raw_percent = if current >= total {
            100
        } else {
            ((current * 100) + (total / 2)) / total
        };
        let percent = max_percent.fetch_max(raw_percent, Ordering::Relaxed).max(raw_percent);

        let bar_width = 30;
        let filled = (percent * bar_width) / 100;
        let bar = "=".repeat(filled);
        let space = " ".repeat(bar_width - filled);

        eprint!("\r[{}{}] {:3}% iter {} {}\x1b[K", bar, space, percent, current, message);
        let _ = std::io::stderr().flush();
    })
}

fn average_edge_length(mesh: &HalfEdgeMesh) -> f64 {
    if mesh.num_edges() == 0 {
        return 0.0;
    }
    mesh.edge_ids().map(|e| mesh.edge_length(e)).sum::<f64>() / mesh.num_edges() as f64
}

fn cmd_info(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mesh: HalfEdgeMesh = io::load(input)?;

    println!("File: {}", input.display());
    println!("Vertices: {} ({} fixed)", mesh.num_vertices(), mesh.num_fixed());
    println!("Faces: {}", mesh.num_faces());
    println!("Edges: {}", mesh.num_edges());

    let mut min_area = f64::MAX;
    let mut max_area = 0.0_f64;
    for fid in mesh.face_ids() {
        let area = mesh.face_area(fid);
        min_area = min_area.min(area);
        max_area = max_area.max(area);
    }
    println!("Surface area: {:.6}", mesh.surface_area());
    println!("Face area range: [{:.6e}, {:.6e}]", min_area, max_area);

    if let Some((min, max)) = mesh.bounding_box() {
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
        println!("Diagonal: {:.6}", (max - min).norm());
    }
    println!("Average edge length: {:.6}", average_edge_length(&mesh));

    let defaults = ContractionParams::for_mesh(&mesh);
    println!("Default collapse threshold: {:.6}", defaults.edge_length_threshold);

    let topology = match (mesh.is_manifold(), mesh.is_closed()) {
        (true, true) => "closed manifold (ready for contraction)",
        (true, false) => "open manifold",
        (false, _) => "non-manifold (contraction will refuse it)",
    };
    println!("Topology: {}", topology);

    Ok(())
}

fn cmd_skeletonize<S: LeastSquaresSolver>(
    mesh: HalfEdgeMesh,
    params: ContractionParams,
    solver: S,
    points: &Path,
    mesh_out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mode = if params.parallel { "parallel" } else { "sequential" };
    println!(
        "Contracting (omega_L={}, omega_H={}, edge length={:.6}, {})...",
        params.omega_l, params.omega_h, params.edge_length_threshold, mode
    );

    let mut skeleton = MeanCurvatureSkeleton::with_params(mesh, params)?.with_solver(solver);
    let progress = create_progress();

    let start = Instant::now();
    let result = skeleton.contract_with_progress(&progress);
    eprintln!();
    let reason = result?;
    let elapsed = start.elapsed();

    println!(
        "Stopped after {} iterations ({}): {} fixed points, {} vertices left",
        skeleton.iteration(),
        reason,
        skeleton.fixed_points().len(),
        skeleton.mesh().num_vertices()
    );
    println!(
        "Area: {:.6e} (from {:.6e})",
        skeleton.mesh().surface_area(),
        skeleton.original_area()
    );

    io::save_points(skeleton.fixed_points(), points)?;
    println!("Saved: {} ({:.2?})", points.display(), elapsed);
    if let Some(path) = mesh_out {
        io::save(skeleton.mesh(), path)?;
        println!("Saved: {}", path.display());
    }

    Ok(())
}

fn cmd_step<S: LeastSquaresSolver>(
    mesh: HalfEdgeMesh,
    params: ContractionParams,
    solver: S,
    phase: Phase,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loaded: {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces());
    let mut skeleton = MeanCurvatureSkeleton::with_params(mesh, params)?.with_solver(solver);

    let start = Instant::now();
    match phase {
        Phase::Contract => {
            let diagnostic = skeleton.contract_geometry()?;
            match diagnostic.log_determinant {
                Some(log_det) => println!("Contracted (log det of normal matrix: {:.4})", log_det),
                None => println!("Contracted"),
            }
        }
        Phase::Collapse => {
            let count = skeleton.collapse_short_edges()?;
            println!("Collapsed {} edges", count);
        }
        Phase::Split => {
            let count = skeleton.iteratively_split_triangles()?;
            println!("Split {} triangles", count);
        }
        Phase::Degeneracy => {
            let count = skeleton.detect_degeneracies();
            println!("Fixed {} vertices ({} total)", count, skeleton.mesh().num_fixed());
        }
    }
    let elapsed = start.elapsed();

    println!(
        "Result: {} vertices, {} faces, area {:.6e}",
        skeleton.mesh().num_vertices(),
        skeleton.mesh().num_faces(),
        skeleton.mesh().surface_area()
    );
    io::save(skeleton.mesh(), output)?;
    println!("Saved: {} ({:.2?})", output.display(), elapsed);

    Ok(())
}
