/////////////////////////////////////////////////////////////////////////////////////////////
//
// Repulsive surface energies: exact and block cluster tree accelerated tangent-point, Coulomb.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{
    accumulator,
    config::TpeParams,
    iterative_solvers::{conjugate_gradient, Solution},
    kernel::{CoulombKernelKind, TpeKernel},
    mesh::TriangleMesh,
    metric::{MetricKernel, MetricSolveParams, OperatorKind},
    progress::{ProgressMsg, ProgressSink},
};
use faer::{Mat, MatRef};
use rayon::{ThreadPool, ThreadPoolBuilder};
use repulsive_bct::{hierarchical_multiply, BctError, BlockClusterTree, ClusterTree, Descriptor};
use std::{fmt, sync::Arc};

/// Errors raised by the tangent-point energies.
#[derive(Debug)]
pub enum TpeError {
    /// A configuration value is outside its valid range.
    InvalidParameter { name: &'static str, value: f64 },

    /// The vertex matrix does not have three columns.
    VertexWidth { found: usize },

    /// Replacement vertices do not match the existing vertex count.
    VertexCount { expected: usize, found: usize },

    /// A vertex contains NaN or infinite coordinates.
    NonFiniteVertex { row: usize },

    /// A face references a vertex that does not exist.
    FaceIndex {
        face: usize,
        index: usize,
        num_vertices: usize,
    },

    /// A derivative buffer does not have one 7-wide row per face.
    DerivativeShape {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// The metric operator is not positive definite along a search direction.
    NotPositiveDefinite { iteration: usize },

    /// Building or using a cluster tree failed.
    Tree(BctError),

    /// The worker thread pool could not be created.
    ThreadPool(String),
}

impl fmt::Display for TpeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TpeError::InvalidParameter { name, value } => {
                write!(f, "Invalid value {} for parameter `{}`", value, name)
            }
            TpeError::VertexWidth { found } => {
                write!(f, "Vertex matrix must have 3 columns, found {}", found)
            }
            TpeError::VertexCount { expected, found } => write!(
                f,
                "Expected {} vertices to replace the mesh vertices, found {}",
                expected, found
            ),
            TpeError::NonFiniteVertex { row } => {
                write!(f, "Vertex at row {} contains non-finite coordinates", row)
            }
            TpeError::FaceIndex {
                face,
                index,
                num_vertices,
            } => write!(
                f,
                "Face {} references vertex {} but the mesh has {} vertices",
                face, index, num_vertices
            ),
            TpeError::DerivativeShape { expected, found } => write!(
                f,
                "Derivative buffer must have shape {:?}, found {:?}",
                expected, found
            ),
            TpeError::NotPositiveDefinite { iteration } => write!(
                f,
                "Metric operator is not positive definite (conjugate gradient iteration {})",
                iteration
            ),
            TpeError::Tree(e) => write!(f, "Cluster tree error: {}", e),
            TpeError::ThreadPool(message) => {
                write!(f, "Failed to build the worker thread pool: {}", message)
            }
        }
    }
}

impl std::error::Error for TpeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TpeError::Tree(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BctError> for TpeError {
    fn from(e: BctError) -> Self {
        TpeError::Tree(e)
    }
}

/// Common interface of the surface energies.
pub trait SurfaceEnergy {
    /// Rebuilds every geometry dependent structure for `mesh`.
    fn update(&mut self, mesh: &TriangleMesh) -> Result<(), TpeError>;

    /// Energy of the current geometry, including the weight.
    fn value(&self) -> f64;

    /// Derivative of the energy with respect to every vertex position, shape (V, 3).
    fn differential(&self) -> Result<Mat<f64>, TpeError>;

    /// The exponents `(alpha, beta)`.
    fn exponents(&self) -> (f64, f64);

    /// The cluster tree over the faces, when the energy uses one.
    fn cluster_tree(&self) -> Option<&ClusterTree>;

    /// The admissibility parameter, zero for exact energies.
    fn theta(&self) -> f64;
}

fn build_pool(params: &TpeParams) -> Result<ThreadPool, TpeError> {
    ThreadPoolBuilder::new()
        .num_threads(params.thread_count.unwrap_or(0))
        .build()
        .map_err(|e| TpeError::ThreadPool(e.to_string()))
}

/// Exact tangent-point energy summed over every pair of faces.
///
/// Intended as a reference for small meshes; cost grows quadratically with the number
/// of faces.
#[derive(Debug)]
pub struct AllPairsTpe {
    params: TpeParams,
    kernel: TpeKernel,
    pool: ThreadPool,
    mesh: TriangleMesh,
    descriptors: Vec<Descriptor>,
}

impl AllPairsTpe {
    pub fn new(mesh: &TriangleMesh, params: TpeParams) -> Result<Self, TpeError> {
        params.validate()?;
        Ok(Self {
            params,
            kernel: TpeKernel::new(&params),
            pool: build_pool(&params)?,
            mesh: mesh.clone(),
            descriptors: mesh.descriptors(),
        })
    }

    pub fn params(&self) -> &TpeParams {
        &self.params
    }

    /// Unweighted energy and per-face derivative buffer, shape (F, 7).
    fn face_derivatives(&self) -> (f64, Mat<f64>) {
        self.pool.install(|| match &self.kernel {
            TpeKernel::Integer(kernel) => {
                accumulator::all_pairs_derivatives(kernel, &self.descriptors)
            }
            TpeKernel::Real(kernel) => accumulator::all_pairs_derivatives(kernel, &self.descriptors),
        })
    }
}

impl SurfaceEnergy for AllPairsTpe {
    fn update(&mut self, mesh: &TriangleMesh) -> Result<(), TpeError> {
        self.mesh = mesh.clone();
        self.descriptors = mesh.descriptors();
        Ok(())
    }

    fn value(&self) -> f64 {
        let value = self.pool.install(|| match &self.kernel {
            TpeKernel::Integer(kernel) => accumulator::all_pairs_value(kernel, &self.descriptors),
            TpeKernel::Real(kernel) => accumulator::all_pairs_value(kernel, &self.descriptors),
        });
        self.params.weight * value
    }

    fn differential(&self) -> Result<Mat<f64>, TpeError> {
        let (_, derivatives) = self.face_derivatives();
        self.mesh
            .assemble_vertex_gradient(derivatives.as_ref(), self.params.weight)
    }

    fn exponents(&self) -> (f64, f64) {
        (self.params.alpha, self.params.beta)
    }

    fn cluster_tree(&self) -> Option<&ClusterTree> {
        None
    }

    fn theta(&self) -> f64 {
        0.0
    }
}

/// Tangent-point energy accelerated by a block cluster tree over the faces.
///
/// Near-field face pairs are summed exactly; admissible cluster pairs interact through
/// their aggregate area, centroid and normal. The trees are rebuilt from scratch on
/// every [`SurfaceEnergy::update`].
#[derive(Debug)]
pub struct HierarchicalTpe {
    params: TpeParams,
    kernel: TpeKernel,
    pool: ThreadPool,
    mesh: TriangleMesh,
    bct: BlockClusterTree,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl HierarchicalTpe {
    pub fn new(mesh: &TriangleMesh, params: TpeParams) -> Result<Self, TpeError> {
        Self::with_progress(mesh, params, None)
    }

    /// As [`HierarchicalTpe::new`], reporting tree rebuilds and metric solver
    /// iterations to `progress`.
    pub fn with_progress(
        mesh: &TriangleMesh,
        params: TpeParams,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<Self, TpeError> {
        params.validate()?;
        let pool = build_pool(&params)?;
        let bct = build_block_tree(mesh, &params, &pool, progress.as_ref())?;

        Ok(Self {
            params,
            kernel: TpeKernel::new(&params),
            pool,
            mesh: mesh.clone(),
            bct,
            progress,
        })
    }

    pub fn params(&self) -> &TpeParams {
        &self.params
    }

    pub fn block_cluster_tree(&self) -> &BlockClusterTree {
        &self.bct
    }

    /// Per-face derivative buffer (F, 7) and unweighted energy.
    fn face_derivatives(&self) -> Result<(f64, Mat<f64>), TpeError> {
        let derivatives = self.pool.install(|| match &self.kernel {
            TpeKernel::Integer(kernel) => accumulator::hierarchical_derivatives(kernel, &self.bct),
            TpeKernel::Real(kernel) => accumulator::hierarchical_derivatives(kernel, &self.bct),
        })?;
        Ok((derivatives.energy, derivatives.source))
    }

    /// Applies the metric operator of the given kind to `u`, shape (F, K) indexed by face.
    pub fn multiply(&self, u: MatRef<f64>, kind: OperatorKind) -> Result<Mat<f64>, TpeError> {
        metric_multiply(&self.pool, &self.bct, &self.params, u, kind)
    }

    /// Solves `(L + shift * diag(area)) x = b` for every column of `b`, shape (F, K),
    /// with conjugate gradient.
    ///
    /// Returns the solutions column by column together with the solver report of
    /// each column.
    pub fn solve_metric(
        &self,
        b: MatRef<f64>,
        settings: &MetricSolveParams,
    ) -> Result<(Mat<f64>, Vec<Solution>), TpeError> {
        if !(settings.shift.is_finite() && settings.shift > 0.0) {
            return Err(TpeError::InvalidParameter {
                name: "shift",
                value: settings.shift,
            });
        }
        if !(settings.tolerance > 0.0) {
            return Err(TpeError::InvalidParameter {
                name: "tolerance",
                value: settings.tolerance,
            });
        }

        let num_faces = self.mesh.num_faces();
        if b.nrows() != num_faces {
            return Err(BctError::VectorLength {
                expected: num_faces,
                found: b.nrows(),
            }
            .into());
        }

        let areas: Vec<f64> = (0..num_faces)
            .map(|f| self.mesh.face_geometry(f).area)
            .collect();

        let operator = |x: &MatRef<f64>| -> Result<Mat<f64>, TpeError> {
            let mut y = self.multiply(*x, settings.kind)?;
            for (i, area) in areas.iter().enumerate() {
                y[(i, 0)] += settings.shift * area * x[(i, 0)];
            }
            Ok(y)
        };

        // Jacobi preconditioner on the mass term.
        let preconditioner = |r: &MatRef<f64>| -> Result<Mat<f64>, TpeError> {
            Ok(Mat::from_fn(num_faces, 1, |i, _| {
                if areas[i] > 0.0 {
                    r[(i, 0)] / (settings.shift * areas[i])
                } else {
                    r[(i, 0)]
                }
            }))
        };

        let mut x = Mat::<f64>::zeros(num_faces, b.ncols());
        let mut reports = Vec::with_capacity(b.ncols());

        for column in 0..b.ncols() {
            let solution = conjugate_gradient(
                &operator,
                b.subcols(column, 1),
                Some(&preconditioner),
                None,
                settings.max_iterations,
                settings.tolerance,
                self.progress.clone(),
            )?;
            if !solution.converged {
                if let Some(sink) = &self.progress {
                    sink.emit(ProgressMsg::Message {
                        message: format!(
                            "Metric solve for column {} stopped at relative residual {:e}",
                            column, solution.residual
                        ),
                    });
                }
            }
            x.col_mut(column).copy_from(solution.x.col(0));
            reports.push(solution);
        }

        Ok((x, reports))
    }
}

fn metric_multiply(
    pool: &ThreadPool,
    bct: &BlockClusterTree,
    params: &TpeParams,
    u: MatRef<f64>,
    kind: OperatorKind,
) -> Result<Mat<f64>, TpeError> {
    let kernel = MetricKernel::new(kind, params.alpha, params.beta);
    Ok(pool.install(|| hierarchical_multiply(bct, &kernel, u))?)
}

fn build_block_tree(
    mesh: &TriangleMesh,
    params: &TpeParams,
    pool: &ThreadPool,
    progress: Option<&Arc<dyn ProgressSink>>,
) -> Result<BlockClusterTree, TpeError> {
    let primitives = mesh.primitive_data()?;
    let bct = pool.install(|| -> Result<BlockClusterTree, BctError> {
        let tree = ClusterTree::new(&primitives, params.split_threshold)?;
        BlockClusterTree::new(tree, params.theta)
    })?;

    if let Some(sink) = progress {
        let tree = bct.source_tree();
        sink.emit(ProgressMsg::TreeBuilt {
            num_primitives: tree.len(),
            num_clusters: tree.clusters().len(),
            depth: tree.depth(),
        });
        sink.emit(ProgressMsg::BlockTreeBuilt {
            near_pairs: bct.near_pair_count(),
            far_blocks: bct.far_field().len(),
        });
    }

    Ok(bct)
}

impl SurfaceEnergy for HierarchicalTpe {
    fn update(&mut self, mesh: &TriangleMesh) -> Result<(), TpeError> {
        let bct = build_block_tree(mesh, &self.params, &self.pool, self.progress.as_ref())?;
        self.bct = bct;
        self.mesh = mesh.clone();
        Ok(())
    }

    fn value(&self) -> f64 {
        let value = self.pool.install(|| match &self.kernel {
            TpeKernel::Integer(kernel) => accumulator::hierarchical_value(kernel, &self.bct),
            TpeKernel::Real(kernel) => accumulator::hierarchical_value(kernel, &self.bct),
        });
        self.params.weight * value
    }

    fn differential(&self) -> Result<Mat<f64>, TpeError> {
        let (_, derivatives) = self.face_derivatives()?;
        self.mesh
            .assemble_vertex_gradient(derivatives.as_ref(), self.params.weight)
    }

    fn exponents(&self) -> (f64, f64) {
        (self.params.alpha, self.params.beta)
    }

    fn cluster_tree(&self) -> Option<&ClusterTree> {
        Some(self.bct.source_tree())
    }

    fn theta(&self) -> f64 {
        self.params.theta
    }
}

/// Coulomb surface energy
///
/// ```text
/// E = sum_{i < j} a_i a_j / |x_j - x_i|^beta
/// ```
///
/// accelerated by the same block cluster tree as [`HierarchicalTpe`]. The normals play
/// no part, so nearby parallel sheets repel as strongly as nearby tangent ones. Only
/// `beta` enters the energy; `alpha` still sets the order of the metric operators.
#[derive(Debug)]
pub struct CoulombEnergy {
    params: TpeParams,
    kernel: CoulombKernelKind,
    pool: ThreadPool,
    mesh: TriangleMesh,
    bct: BlockClusterTree,
}

impl CoulombEnergy {
    pub fn new(mesh: &TriangleMesh, params: TpeParams) -> Result<Self, TpeError> {
        params.validate()?;
        let pool = build_pool(&params)?;
        let bct = build_block_tree(mesh, &params, &pool, None)?;

        Ok(Self {
            params,
            kernel: CoulombKernelKind::new(&params),
            pool,
            mesh: mesh.clone(),
            bct,
        })
    }

    pub fn params(&self) -> &TpeParams {
        &self.params
    }

    pub fn block_cluster_tree(&self) -> &BlockClusterTree {
        &self.bct
    }

    /// Applies the metric operator of the given kind to `u`, shape (F, K) indexed by face.
    pub fn multiply(&self, u: MatRef<f64>, kind: OperatorKind) -> Result<Mat<f64>, TpeError> {
        metric_multiply(&self.pool, &self.bct, &self.params, u, kind)
    }
}

impl SurfaceEnergy for CoulombEnergy {
    fn update(&mut self, mesh: &TriangleMesh) -> Result<(), TpeError> {
        let bct = build_block_tree(mesh, &self.params, &self.pool, None)?;
        self.bct = bct;
        self.mesh = mesh.clone();
        Ok(())
    }

    fn value(&self) -> f64 {
        let value = self.pool.install(|| match &self.kernel {
            CoulombKernelKind::Integer(kernel) => {
                accumulator::hierarchical_value(kernel, &self.bct)
            }
            CoulombKernelKind::Real(kernel) => accumulator::hierarchical_value(kernel, &self.bct),
        });
        self.params.weight * value
    }

    fn differential(&self) -> Result<Mat<f64>, TpeError> {
        let derivatives = self.pool.install(|| match &self.kernel {
            CoulombKernelKind::Integer(kernel) => {
                accumulator::hierarchical_derivatives(kernel, &self.bct)
            }
            CoulombKernelKind::Real(kernel) => {
                accumulator::hierarchical_derivatives(kernel, &self.bct)
            }
        })?;
        self.mesh
            .assemble_vertex_gradient(derivatives.source.as_ref(), self.params.weight)
    }

    fn exponents(&self) -> (f64, f64) {
        (self.params.alpha, self.params.beta)
    }

    fn cluster_tree(&self) -> Option<&ClusterTree> {
        Some(self.bct.source_tree())
    }

    fn theta(&self) -> f64 {
        self.params.theta
    }
}

/// A repulsive surface energy of any supported kind.
#[derive(Debug)]
pub enum TangentPointEnergy {
    AllPairs(AllPairsTpe),
    Hierarchical(HierarchicalTpe),
    Coulomb(CoulombEnergy),
}

impl TangentPointEnergy {
    pub fn all_pairs(mesh: &TriangleMesh, params: TpeParams) -> Result<Self, TpeError> {
        Ok(TangentPointEnergy::AllPairs(AllPairsTpe::new(mesh, params)?))
    }

    pub fn hierarchical(mesh: &TriangleMesh, params: TpeParams) -> Result<Self, TpeError> {
        Ok(TangentPointEnergy::Hierarchical(HierarchicalTpe::new(
            mesh, params,
        )?))
    }

    pub fn coulomb(mesh: &TriangleMesh, params: TpeParams) -> Result<Self, TpeError> {
        Ok(TangentPointEnergy::Coulomb(CoulombEnergy::new(mesh, params)?))
    }

    /// Applies a metric operator. Only available for the tree based energies.
    pub fn multiply(&self, u: MatRef<f64>, kind: OperatorKind) -> Result<Mat<f64>, TpeError> {
        match self {
            TangentPointEnergy::Hierarchical(energy) => energy.multiply(u, kind),
            TangentPointEnergy::Coulomb(energy) => energy.multiply(u, kind),
            TangentPointEnergy::AllPairs(_) => Err(BctError::AsymmetricOperator.into()),
        }
    }

    fn inner(&self) -> &dyn SurfaceEnergy {
        match self {
            TangentPointEnergy::AllPairs(energy) => energy,
            TangentPointEnergy::Hierarchical(energy) => energy,
            TangentPointEnergy::Coulomb(energy) => energy,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn SurfaceEnergy {
        match self {
            TangentPointEnergy::AllPairs(energy) => energy,
            TangentPointEnergy::Hierarchical(energy) => energy,
            TangentPointEnergy::Coulomb(energy) => energy,
        }
    }
}

impl SurfaceEnergy for TangentPointEnergy {
    fn update(&mut self, mesh: &TriangleMesh) -> Result<(), TpeError> {
        self.inner_mut().update(mesh)
    }

    fn value(&self) -> f64 {
        self.inner().value()
    }

    fn differential(&self) -> Result<Mat<f64>, TpeError> {
        self.inner().differential()
    }

    fn exponents(&self) -> (f64, f64) {
        self.inner().exponents()
    }

    fn cluster_tree(&self) -> Option<&ClusterTree> {
        self.inner().cluster_tree()
    }

    fn theta(&self) -> f64 {
        self.inner().theta()
    }
}
