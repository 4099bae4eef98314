/////////////////////////////////////////////////////////////////////////////////////////////
//
// Applies a non-local Laplacian-form operator through a block cluster tree.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{
    block_cluster_tree::{BctError, BlockClusterTree},
    cluster_tree::ClusterTree,
    traits::PairKernel,
    utils,
};
use faer::{linalg::matmul, Accum, Mat, MatRef, Par};
use rayon::prelude::*;

/// Applies the operator
///
/// ```text
/// (L u)_i = sum_{j != i} a_i a_j k(i, j) (u_i - u_j)
/// ```
///
/// to every column of `u`, where `a` are the primitive areas and `k` is the pair kernel.
///
/// Near-field blocks are multiplied densely. Each admissible block contributes through
/// the aggregate descriptors of its two clusters: the area weighted moments of `u` are
/// gathered upward through the tree, combined once per far block, and the resulting
/// coefficients are pushed back down to the primitives.
///
/// `u` has one row per primitive, in the original (not tree) order, and the result
/// uses the same layout. The kernel must be symmetric in its arguments and the block
/// tree must be paired with itself.
pub fn hierarchical_multiply<K: PairKernel>(
    bct: &BlockClusterTree,
    kernel: &K,
    u: MatRef<f64>,
) -> Result<Mat<f64>, BctError> {
    if !bct.is_symmetric() {
        return Err(BctError::AsymmetricOperator);
    }

    let tree = bct.source_tree();
    let u_tree = tree.to_tree_order(u)?;

    let mut out = near_field_product(bct, kernel, u_tree.as_ref());
    let far = far_field_product(bct, kernel, u_tree.as_ref());
    utils::add_assign(&mut out, &far);

    tree.from_tree_order(out.as_ref())
}

/// Exact contribution of the near-field blocks, in tree order.
fn near_field_product<K: PairKernel>(
    bct: &BlockClusterTree,
    kernel: &K,
    u: MatRef<f64>,
) -> Mat<f64> {
    let tree = bct.source_tree();
    let blocks = bct.near_field();
    let costs: Vec<usize> = blocks.iter().map(|&(a, b)| bct.block_cost(a, b)).collect();
    let ranges = utils::balanced_ranges(&costs, rayon::current_num_threads());

    let partials: Vec<Mat<f64>> = ranges
        .into_par_iter()
        .map(|range| {
            let mut out = Mat::<f64>::zeros(u.nrows(), u.ncols());
            for &(a, b) in &blocks[range] {
                near_block(tree, kernel, a, b, u, &mut out);
            }
            out
        })
        .collect();

    let mut out = Mat::<f64>::zeros(u.nrows(), u.ncols());
    for partial in &partials {
        utils::add_assign(&mut out, partial);
    }
    out
}

fn near_block<K: PairKernel>(
    tree: &ClusterTree,
    kernel: &K,
    a: usize,
    b: usize,
    u: MatRef<f64>,
    out: &mut Mat<f64>,
) {
    let rows = tree.cluster(a).range();
    let cols = tree.cluster(b).range();
    let nrhs = u.ncols();

    let weights = Mat::<f64>::from_fn(rows.len(), cols.len(), |i, j| {
        let p = rows.start + i;
        let q = cols.start + j;
        if p == q {
            return 0.0;
        }
        let dp = tree.primitive(p);
        let dq = tree.primitive(q);
        dp.area * dq.area * kernel.evaluate(dp, dq)
    });

    for i in 0..rows.len() {
        let row_sum: f64 = (0..cols.len()).map(|j| weights[(i, j)]).sum();
        for c in 0..nrhs {
            out[(rows.start + i, c)] += row_sum * u[(rows.start + i, c)];
        }
    }
    matmul::matmul(
        out.submatrix_mut(rows.start, 0, rows.len(), nrhs),
        Accum::Add,
        weights.as_ref(),
        u.submatrix(cols.start, 0, cols.len(), nrhs),
        -1.0,
        Par::Seq,
    );

    // A diagonal block already holds both orientations of each pair.
    if a == b {
        return;
    }

    for j in 0..cols.len() {
        let col_sum: f64 = (0..rows.len()).map(|i| weights[(i, j)]).sum();
        for c in 0..nrhs {
            out[(cols.start + j, c)] += col_sum * u[(cols.start + j, c)];
        }
    }
    matmul::matmul(
        out.submatrix_mut(cols.start, 0, cols.len(), nrhs),
        Accum::Add,
        weights.transpose(),
        u.submatrix(rows.start, 0, rows.len(), nrhs),
        -1.0,
        Par::Seq,
    );
}

/// Aggregate contribution of the far-field blocks, in tree order.
fn far_field_product<K: PairKernel>(
    bct: &BlockClusterTree,
    kernel: &K,
    u: MatRef<f64>,
) -> Mat<f64> {
    let tree = bct.source_tree();
    let clusters = tree.clusters();
    let nrhs = u.ncols();
    let mut out = Mat::<f64>::zeros(u.nrows(), nrhs);

    if bct.far_field().is_empty() {
        return out;
    }

    // Upward pass: area weighted moments of u per cluster.
    let mut moments = Mat::<f64>::zeros(clusters.len(), nrhs);
    for index in (0..clusters.len()).rev() {
        match clusters[index].children {
            None => {
                for p in clusters[index].range() {
                    let area = tree.primitive(p).area;
                    for c in 0..nrhs {
                        moments[(index, c)] += area * u[(p, c)];
                    }
                }
            }
            Some([left, right]) => {
                for c in 0..nrhs {
                    moments[(index, c)] = moments[(left, c)] + moments[(right, c)];
                }
            }
        }
    }

    let blocks = bct.far_field();
    let costs = vec![1usize; blocks.len()];
    let ranges = utils::balanced_ranges(&costs, rayon::current_num_threads());

    let partials: Vec<(Vec<f64>, Mat<f64>)> = ranges
        .into_par_iter()
        .map(|range| {
            let mut coefficients = vec![0.0; clusters.len()];
            let mut fields = Mat::<f64>::zeros(clusters.len(), nrhs);

            for &(a, b) in &blocks[range] {
                let da = &clusters[a].descriptor;
                let db = &clusters[b].descriptor;
                let k = kernel.evaluate(da, db);

                coefficients[a] += k * db.area;
                coefficients[b] += k * da.area;
                for c in 0..nrhs {
                    fields[(a, c)] += k * moments[(b, c)];
                    fields[(b, c)] += k * moments[(a, c)];
                }
            }
            (coefficients, fields)
        })
        .collect();

    let mut coefficients = vec![0.0; clusters.len()];
    let mut fields = Mat::<f64>::zeros(clusters.len(), nrhs);
    for (partial_coefficients, partial_fields) in &partials {
        for (total, value) in coefficients.iter_mut().zip(partial_coefficients) {
            *total += value;
        }
        utils::add_assign(&mut fields, partial_fields);
    }

    // Downward pass: parents precede children.
    for index in 0..clusters.len() {
        if let Some(children) = clusters[index].children {
            for child in children {
                coefficients[child] += coefficients[index];
                for c in 0..nrhs {
                    let inherited = fields[(index, c)];
                    fields[(child, c)] += inherited;
                }
            }
        }
    }

    for &leaf in tree.leaves() {
        for p in clusters[leaf].range() {
            let area = tree.primitive(p).area;
            for c in 0..nrhs {
                out[(p, c)] = area * (coefficients[leaf] * u[(p, c)] - fields[(leaf, c)]);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{Descriptor, PrimitiveData, DATA_DIM};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    struct InverseDistance;

    impl PairKernel for InverseDistance {
        fn evaluate(&self, target: &Descriptor, source: &Descriptor) -> f64 {
            let r = utils::norm(&utils::sub(&source.centroid, &target.centroid));
            if r == 0.0 {
                0.0
            } else {
                1.0 / r
            }
        }
    }

    fn build(n: usize, theta: f64, seed: u64) -> (PrimitiveData, BlockClusterTree) {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = Mat::from_fn(n, DATA_DIM, |_, j| match j {
            0 => rng.random_range(0.5..1.5),
            1..=3 => rng.random_range(-2.0..2.0),
            _ => 0.0,
        });
        let primitives = PrimitiveData::new(data, None, None).unwrap();
        let tree = ClusterTree::new(&primitives, 8).unwrap();
        let bct = BlockClusterTree::new(tree, theta).unwrap();
        (primitives, bct)
    }

    fn dense_multiply(primitives: &PrimitiveData, kernel: &InverseDistance, u: MatRef<f64>) -> Mat<f64> {
        let n = primitives.len();
        let mut out = Mat::<f64>::zeros(n, u.ncols());
        for i in 0..n {
            let di = primitives.descriptor(i);
            for j in 0..n {
                if i == j {
                    continue;
                }
                let dj = primitives.descriptor(j);
                let w = di.area * dj.area * kernel.evaluate(&di, &dj);
                for c in 0..u.ncols() {
                    out[(i, c)] += w * (u[(i, c)] - u[(j, c)]);
                }
            }
        }
        out
    }

    fn relative_error(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
        let mut diff = 0.0;
        let mut norm = 0.0;
        for j in 0..a.ncols() {
            for i in 0..a.nrows() {
                diff += (a[(i, j)] - b[(i, j)]).powi(2);
                norm += b[(i, j)].powi(2);
            }
        }
        (diff / norm).sqrt()
    }

    #[test]
    fn tiny_theta_matches_dense_product() {
        let (primitives, bct) = build(300, 1e-9, 17);
        let mut rng = StdRng::seed_from_u64(1);
        let u = Mat::from_fn(300, 2, |_, _| rng.random_range(-1.0..1.0));

        let fast = hierarchical_multiply(&bct, &InverseDistance, u.as_ref()).unwrap();
        let exact = dense_multiply(&primitives, &InverseDistance, u.as_ref());
        assert!(relative_error(&fast, &exact) < 1e-10);
    }

    #[test]
    fn approximation_is_close_at_moderate_theta() {
        let (primitives, bct) = build(2000, 0.5, 23);
        assert!(!bct.far_field().is_empty());

        let mut rng = StdRng::seed_from_u64(2);
        let u = Mat::from_fn(2000, 1, |i, _| {
            primitives.descriptor(i).centroid[0] + 0.1 * rng.random_range(-1.0..1.0)
        });

        let fast = hierarchical_multiply(&bct, &InverseDistance, u.as_ref()).unwrap();
        let exact = dense_multiply(&primitives, &InverseDistance, u.as_ref());
        assert!(relative_error(&fast, &exact) < 0.1);
    }

    #[test]
    fn operator_is_symmetric_and_annihilates_constants() {
        let (_, bct) = build(800, 0.6, 31);
        let mut rng = StdRng::seed_from_u64(3);
        let u = Mat::from_fn(800, 1, |_, _| rng.random_range(-1.0..1.0));
        let v = Mat::from_fn(800, 1, |_, _| rng.random_range(-1.0..1.0));

        let lu = hierarchical_multiply(&bct, &InverseDistance, u.as_ref()).unwrap();
        let lv = hierarchical_multiply(&bct, &InverseDistance, v.as_ref()).unwrap();
        let v_lu: f64 = (0..800).map(|i| v[(i, 0)] * lu[(i, 0)]).sum();
        let u_lv: f64 = (0..800).map(|i| u[(i, 0)] * lv[(i, 0)]).sum();
        assert!((v_lu - u_lv).abs() < 1e-9 * v_lu.abs().max(1.0));

        let ones = Mat::from_fn(800, 1, |_, _| 1.0);
        let l1 = hierarchical_multiply(&bct, &InverseDistance, ones.as_ref()).unwrap();
        let scale: f64 = lu.col(0).iter().map(|x| x.abs()).sum::<f64>();
        assert!(l1.col(0).iter().all(|x| x.abs() < 1e-10 * scale));
    }

    #[test]
    fn rejects_mismatched_or_asymmetric_input() {
        let (_, bct) = build(40, 0.5, 5);
        let u = Mat::<f64>::zeros(39, 1);
        assert!(matches!(
            hierarchical_multiply(&bct, &InverseDistance, u.as_ref()),
            Err(BctError::VectorLength { expected: 40, found: 39 })
        ));

        let (_, a) = build(20, 0.5, 6);
        let (_, b) = build(20, 0.5, 7);
        let pair = BlockClusterTree::new_pair(
            a.source_tree().clone(),
            b.source_tree().clone(),
            0.5,
        )
        .unwrap();
        let u = Mat::<f64>::zeros(20, 1);
        assert!(matches!(
            hierarchical_multiply(&pair, &InverseDistance, u.as_ref()),
            Err(BctError::AsymmetricOperator)
        ));
    }
}
