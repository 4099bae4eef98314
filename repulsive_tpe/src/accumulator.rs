/////////////////////////////////////////////////////////////////////////////////////////////
//
// Parallel reduction of pairwise energies and derivatives over pair lists.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::kernel::EnergyKernel;
use faer::Mat;
use rayon::prelude::*;
use repulsive_bct::{utils, BctError, BlockClusterTree, ClusterTree, Descriptor, DATA_DIM};

/// Energy and per-primitive derivative buffers.
///
/// Each buffer has shape (N, 7) in the original primitive order, with columns
/// `[d_area, d_centroid (x, y, z), d_normal (x, y, z)]`. `target` is only present for
/// block trees pairing two distinct cluster trees.
#[derive(Debug, Clone)]
pub struct PrimitiveDerivatives {
    pub energy: f64,
    pub source: Mat<f64>,
    pub target: Option<Mat<f64>>,
}

#[inline(always)]
fn add_row(buffer: &mut Mat<f64>, row: usize, values: &[f64; DATA_DIM]) {
    for (k, value) in values.iter().enumerate() {
        buffer[(row, k)] += value;
    }
}

/// Sums per-range partial results sequentially.
fn reduce(partials: Vec<(f64, Mat<f64>)>, rows: usize) -> (f64, Mat<f64>) {
    let mut energy = 0.0;
    let mut buffer = Mat::<f64>::zeros(rows, DATA_DIM);
    for (partial_energy, partial_buffer) in &partials {
        energy += partial_energy;
        utils::add_assign(&mut buffer, partial_buffer);
    }
    (energy, buffer)
}

/// Exact energy over every unordered pair of distinct primitives.
pub fn all_pairs_value<K: EnergyKernel>(
    kernel: &K,
    descriptors: &[Descriptor],
) -> f64 {
    let n = descriptors.len();
    let costs: Vec<usize> = (0..n).map(|i| n - 1 - i).collect();
    let ranges = utils::balanced_ranges(&costs, rayon::current_num_threads());

    ranges
        .into_par_iter()
        .map(|range| {
            let mut energy = 0.0;
            for i in range {
                for j in (i + 1)..n {
                    energy += kernel.pair_energy(&descriptors[i], &descriptors[j]);
                }
            }
            energy
        })
        .collect::<Vec<f64>>()
        .iter()
        .sum()
}

/// Exact energy and derivatives over every unordered pair of distinct primitives.
///
/// The returned buffer has shape (N, 7) in the order of `descriptors`.
pub fn all_pairs_derivatives<K: EnergyKernel>(
    kernel: &K,
    descriptors: &[Descriptor],
) -> (f64, Mat<f64>) {
    let n = descriptors.len();
    let costs: Vec<usize> = (0..n).map(|i| n - 1 - i).collect();
    let ranges = utils::balanced_ranges(&costs, rayon::current_num_threads());

    let partials: Vec<(f64, Mat<f64>)> = ranges
        .into_par_iter()
        .map(|range| {
            let mut energy = 0.0;
            let mut buffer = Mat::<f64>::zeros(n, DATA_DIM);
            for i in range {
                for j in (i + 1)..n {
                    let terms = kernel.pair_terms(&descriptors[i], &descriptors[j]);
                    energy += terms.energy;
                    add_row(&mut buffer, i, &terms.first);
                    add_row(&mut buffer, j, &terms.second);
                }
            }
            (energy, buffer)
        })
        .collect();

    reduce(partials, n)
}

/// Exact energy of the near-field primitive pairs.
pub fn near_field_value<K: EnergyKernel>(
    kernel: &K,
    bct: &BlockClusterTree,
) -> f64 {
    let source = bct.source_tree();
    let target = bct.target_tree();
    let blocks = bct.near_field();
    let costs: Vec<usize> = blocks.iter().map(|&(a, b)| bct.block_cost(a, b)).collect();
    let ranges = utils::balanced_ranges(&costs, rayon::current_num_threads());

    ranges
        .into_par_iter()
        .map(|range| {
            let mut energy = 0.0;
            for &(a, b) in &blocks[range] {
                for (p, q) in bct.block_pairs(a, b) {
                    energy += kernel.pair_energy(source.primitive(p), target.primitive(q));
                }
            }
            energy
        })
        .collect::<Vec<f64>>()
        .iter()
        .sum()
}

/// Approximate energy of the admissible cluster pairs, from cluster aggregates.
pub fn far_field_value<K: EnergyKernel>(
    kernel: &K,
    bct: &BlockClusterTree,
) -> f64 {
    let source = bct.source_tree();
    let target = bct.target_tree();
    let blocks = bct.far_field();
    let ranges = utils::balanced_ranges(&vec![1; blocks.len()], rayon::current_num_threads());

    ranges
        .into_par_iter()
        .map(|range| {
            blocks[range]
                .iter()
                .map(|&(a, b)| {
                    kernel.pair_energy(
                        &source.cluster(a).descriptor,
                        &target.cluster(b).descriptor,
                    )
                })
                .sum::<f64>()
        })
        .collect::<Vec<f64>>()
        .iter()
        .sum()
}

/// Near-field plus far-field energy of a block cluster tree.
pub fn hierarchical_value<K: EnergyKernel>(
    kernel: &K,
    bct: &BlockClusterTree,
) -> f64 {
    near_field_value(kernel, bct) + far_field_value(kernel, bct)
}

/// Row offset of the target tree inside a combined buffer: zero for a self pairing,
/// otherwise the target rows follow the source rows.
#[inline(always)]
fn target_offset(bct: &BlockClusterTree, source_rows: usize) -> usize {
    if bct.is_symmetric() {
        0
    } else {
        source_rows
    }
}

/// Near-field energy and derivatives in tree order, source rows first.
fn near_field_terms<K: EnergyKernel>(
    kernel: &K,
    bct: &BlockClusterTree,
) -> (f64, Mat<f64>) {
    let source = bct.source_tree();
    let target = bct.target_tree();
    let offset = target_offset(bct, source.len());
    let rows = offset + if bct.is_symmetric() { source.len() } else { target.len() };

    let blocks = bct.near_field();
    let costs: Vec<usize> = blocks.iter().map(|&(a, b)| bct.block_cost(a, b)).collect();
    let ranges = utils::balanced_ranges(&costs, rayon::current_num_threads());

    let partials: Vec<(f64, Mat<f64>)> = ranges
        .into_par_iter()
        .map(|range| {
            let mut energy = 0.0;
            let mut buffer = Mat::<f64>::zeros(rows, DATA_DIM);
            for &(a, b) in &blocks[range] {
                for (p, q) in bct.block_pairs(a, b) {
                    let terms = kernel.pair_terms(source.primitive(p), target.primitive(q));
                    energy += terms.energy;
                    add_row(&mut buffer, p, &terms.first);
                    add_row(&mut buffer, offset + q, &terms.second);
                }
            }
            (energy, buffer)
        })
        .collect();

    reduce(partials, rows)
}

/// Far-field energy and derivatives per cluster, source clusters first.
fn far_field_terms<K: EnergyKernel>(
    kernel: &K,
    bct: &BlockClusterTree,
) -> (f64, Mat<f64>) {
    let source = bct.source_tree();
    let target = bct.target_tree();
    let offset = target_offset(bct, source.clusters().len());
    let rows = offset
        + if bct.is_symmetric() {
            source.clusters().len()
        } else {
            target.clusters().len()
        };

    let blocks = bct.far_field();
    let ranges = utils::balanced_ranges(&vec![1; blocks.len()], rayon::current_num_threads());

    let partials: Vec<(f64, Mat<f64>)> = ranges
        .into_par_iter()
        .map(|range| {
            let mut energy = 0.0;
            let mut buffer = Mat::<f64>::zeros(rows, DATA_DIM);
            for &(a, b) in &blocks[range] {
                let terms = kernel.pair_terms(
                    &source.cluster(a).descriptor,
                    &target.cluster(b).descriptor,
                );
                energy += terms.energy;
                add_row(&mut buffer, a, &terms.first);
                add_row(&mut buffer, offset + b, &terms.second);
            }
            (energy, buffer)
        })
        .collect();

    reduce(partials, rows)
}

/// Pushes cluster derivatives down to every member primitive.
///
/// The derivative slots are additive over clusters, so each primitive receives the
/// sum of the derivatives of all its ancestors (and its own leaf).
fn push_to_primitives(
    tree: &ClusterTree,
    cluster_terms: &Mat<f64>,
    cluster_offset: usize,
    primitive_terms: &mut Mat<f64>,
    primitive_offset: usize,
) {
    let clusters = tree.clusters();
    let mut inherited = Mat::<f64>::zeros(clusters.len(), DATA_DIM);

    for index in 0..clusters.len() {
        for k in 0..DATA_DIM {
            inherited[(index, k)] += cluster_terms[(cluster_offset + index, k)];
        }
        if let Some(children) = clusters[index].children {
            for child in children {
                for k in 0..DATA_DIM {
                    let value = inherited[(index, k)];
                    inherited[(child, k)] += value;
                }
            }
        }
    }

    for &leaf in tree.leaves() {
        for p in clusters[leaf].range() {
            for k in 0..DATA_DIM {
                primitive_terms[(primitive_offset + p, k)] += inherited[(leaf, k)];
            }
        }
    }
}

/// Energy and derivatives of a block cluster tree, near field exact and far field from
/// cluster aggregates.
pub fn hierarchical_derivatives<K: EnergyKernel>(
    kernel: &K,
    bct: &BlockClusterTree,
) -> Result<PrimitiveDerivatives, BctError> {
    let source = bct.source_tree();
    let target = bct.target_tree();

    let (near_energy, mut primitive_terms) = near_field_terms(kernel, bct);
    let (far_energy, cluster_terms) = far_field_terms(kernel, bct);

    push_to_primitives(source, &cluster_terms, 0, &mut primitive_terms, 0);
    if !bct.is_symmetric() {
        push_to_primitives(
            target,
            &cluster_terms,
            source.clusters().len(),
            &mut primitive_terms,
            source.len(),
        );
    }

    let source_terms = source.from_tree_order(primitive_terms.subrows(0, source.len()))?;
    let target_terms = if bct.is_symmetric() {
        None
    } else {
        Some(target.from_tree_order(primitive_terms.subrows(source.len(), target.len()))?)
    };

    Ok(PrimitiveDerivatives {
        energy: near_energy + far_energy,
        source: source_terms,
        target: target_terms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::TangentPointKernel;
    use faer::MatRef;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use repulsive_bct::PrimitiveData;

    fn random_descriptors(n: usize, seed: u64, offset: f64) -> Vec<Descriptor> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let mut normal = [0.0; 3];
                for k in 0..3 {
                    normal[k] = rng.random_range(-1.0..1.0);
                }
                let length = utils::norm(&normal);
                Descriptor {
                    area: rng.random_range(0.05..0.2),
                    centroid: [
                        offset + rng.random_range(-3.0..3.0),
                        rng.random_range(-3.0..3.0),
                        rng.random_range(-3.0..3.0),
                    ],
                    normal: normal.map(|x| x / length),
                }
            })
            .collect()
    }

    fn tree_of(descriptors: &[Descriptor], split_threshold: usize) -> ClusterTree {
        let data = Mat::from_fn(descriptors.len(), DATA_DIM, |i, k| descriptors[i].to_array()[k]);
        let primitives = PrimitiveData::new(data, None, None).unwrap();
        ClusterTree::new(&primitives, split_threshold).unwrap()
    }

    fn max_abs_diff(a: MatRef<f64>, b: MatRef<f64>) -> f64 {
        let mut diff: f64 = 0.0;
        for j in 0..a.ncols() {
            for i in 0..a.nrows() {
                diff = diff.max((a[(i, j)] - b[(i, j)]).abs());
            }
        }
        diff
    }

    fn max_abs(a: MatRef<f64>) -> f64 {
        let mut m: f64 = 0.0;
        for j in 0..a.ncols() {
            for i in 0..a.nrows() {
                m = m.max(a[(i, j)].abs());
            }
        }
        m
    }

    #[test]
    fn all_pairs_value_matches_serial_sum() {
        let descriptors = random_descriptors(200, 1, 0.0);
        let kernel = TangentPointKernel::<i32>::new(6.0, 12.0);

        let mut expected = 0.0;
        for i in 0..200 {
            for j in (i + 1)..200 {
                expected += kernel.pair_energy(&descriptors[i], &descriptors[j]);
            }
        }

        let value = all_pairs_value(&kernel, &descriptors);
        let (energy, _) = all_pairs_derivatives(&kernel, &descriptors);
        assert!((value - expected).abs() <= 1e-12 * expected);
        assert!((energy - expected).abs() <= 1e-12 * expected);
    }

    #[test]
    fn single_leaf_tree_is_exact() {
        let descriptors = random_descriptors(150, 2, 0.0);
        let kernel = TangentPointKernel::<i32>::new(6.0, 12.0);
        let bct = BlockClusterTree::new(tree_of(&descriptors, 150), 0.5).unwrap();
        assert!(bct.far_field().is_empty());

        let (exact_energy, exact_terms) = all_pairs_derivatives(&kernel, &descriptors);
        let value = hierarchical_value(&kernel, &bct);
        let derivatives = hierarchical_derivatives(&kernel, &bct).unwrap();

        assert!((value - exact_energy).abs() <= 1e-10 * exact_energy);
        assert!((derivatives.energy - exact_energy).abs() <= 1e-10 * exact_energy);
        assert!(derivatives.target.is_none());
        assert!(
            max_abs_diff(derivatives.source.as_ref(), exact_terms.as_ref())
                <= 1e-10 * max_abs(exact_terms.as_ref())
        );
    }

    #[test]
    fn far_field_derivatives_reach_every_member() {
        let descriptors = random_descriptors(400, 3, 0.0);
        let kernel = TangentPointKernel::<f64>::new(6.0, 12.0);
        let bct = BlockClusterTree::new(tree_of(&descriptors, 4), 0.5).unwrap();
        assert!(!bct.far_field().is_empty());

        let derivatives = hierarchical_derivatives(&kernel, &bct).unwrap();
        let value = hierarchical_value(&kernel, &bct);
        assert!((derivatives.energy - value).abs() <= 1e-12 * value);

        // Doubling every area with fixed centroids and normals quadruples the energy.
        let scaled: Vec<Descriptor> = descriptors
            .iter()
            .map(|d| Descriptor {
                area: 2.0 * d.area,
                ..*d
            })
            .collect();
        let scaled_bct = BlockClusterTree::new(tree_of(&scaled, 4), 0.5).unwrap();
        let scaled_value = hierarchical_value(&kernel, &scaled_bct);
        assert!((scaled_value - 4.0 * value).abs() <= 1e-10 * scaled_value);

        // Euler's identity for the degree-2 scaling (a, P, N) -> (t a, t P, t N).
        let mut euler = 0.0;
        for (i, d) in descriptors.iter().enumerate() {
            let coordinates = [
                d.area,
                d.area * d.centroid[0],
                d.area * d.centroid[1],
                d.area * d.centroid[2],
                d.area * d.normal[0],
                d.area * d.normal[1],
                d.area * d.normal[2],
            ];
            for k in 0..DATA_DIM {
                euler += coordinates[k] * derivatives.source[(i, k)];
            }
        }
        assert!((euler - 2.0 * value).abs() <= 1e-8 * value);
    }

    #[test]
    fn distinct_trees_match_bipartite_sum() {
        let first = random_descriptors(120, 4, 0.0);
        let second = random_descriptors(90, 5, 4.0);
        let kernel = TangentPointKernel::<i32>::new(4.0, 8.0);

        let mut expected = 0.0;
        let mut expected_first = Mat::<f64>::zeros(120, DATA_DIM);
        let mut expected_second = Mat::<f64>::zeros(90, DATA_DIM);
        for i in 0..120 {
            for j in 0..90 {
                let terms = kernel.pair_terms(&first[i], &second[j]);
                expected += terms.energy;
                add_row(&mut expected_first, i, &terms.first);
                add_row(&mut expected_second, j, &terms.second);
            }
        }

        let bct = BlockClusterTree::new_pair(tree_of(&first, 200), tree_of(&second, 200), 0.1)
            .unwrap();
        let derivatives = hierarchical_derivatives(&kernel, &bct).unwrap();
        assert!((derivatives.energy - expected).abs() <= 1e-10 * expected);

        let target = derivatives.target.unwrap();
        assert!(
            max_abs_diff(derivatives.source.as_ref(), expected_first.as_ref())
                <= 1e-10 * max_abs(expected_first.as_ref())
        );
        assert!(
            max_abs_diff(target.as_ref(), expected_second.as_ref())
                <= 1e-10 * max_abs(expected_second.as_ref())
        );
    }
}
