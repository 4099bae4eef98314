/////////////////////////////////////////////////////////////////////////////////////////////
//
// Compares the exact and tree-accelerated energies on a random triangle soup.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::Mat;
use repulsive_tpe::{
    generate_sphere_soup, AllPairsTpe, HierarchicalTpe, MetricSolveParams, SurfaceEnergy,
    TpeParams,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 2000 unit-area triangles scattered over a sphere
    let soup = generate_sphere_soup(2000, Some(42));

    let params = TpeParams::builder()
        .exponents(6.0, 12.0)
        .theta(0.5)
        .split_threshold(8)
        .build()?;

    let exact = AllPairsTpe::new(&soup, params)?;
    let fast = HierarchicalTpe::new(&soup, params)?;

    let exact_value = exact.value();
    let fast_value = fast.value();
    println!("All-pairs energy:    {:.10e}", exact_value);
    println!("Hierarchical energy: {:.10e}", fast_value);
    println!(
        "Relative error:      {:.3e}",
        (fast_value - exact_value).abs() / exact_value
    );

    let bct = fast.block_cluster_tree();
    println!(
        "{} near pairs, {} far blocks ({} of {} pairs summed exactly)",
        bct.near_pair_count(),
        bct.far_field().len(),
        bct.near_pair_count(),
        soup.num_faces() * (soup.num_faces() - 1) / 2
    );

    // The metric acts on faces, so the vertex gradient is averaged onto each face.
    // This only gives the solve a realistic right-hand side. A flow would solve for
    // vertex directions with the chain rule instead.
    let gradient = fast.differential()?;
    let face_gradient = Mat::from_fn(soup.num_faces(), 3, |f, k| {
        soup.faces()[f].iter().map(|&v| gradient[(v, k)]).sum::<f64>() / 3.0
    });
    let (direction, reports) = fast.solve_metric(face_gradient.as_ref(), &MetricSolveParams::default())?;

    for (axis, report) in reports.iter().enumerate() {
        println!(
            "Metric solve axis {}: {} iterations, residual {:.2e}",
            axis, report.iterations, report.residual
        );
    }
    println!("Descent direction norm: {:.6e}", direction.norm_l2());

    Ok(())
}
