/////////////////////////////////////////////////////////////////////////////////////////////
//
// Measures how tree construction, energy and gradient times scale with the face count.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

// Expected: O(N log N) time for every stage.

use repulsive_tpe::{generate_sphere_soup, HierarchicalTpe, SurfaceEnergy, TpeParams};
use std::time::Instant;

struct Timings {
    build: f64,
    value: f64,
    differential: f64,
    interactions: usize,
}

fn run_benchmark(n: usize, params: TpeParams) -> Result<Timings, Box<dyn std::error::Error>> {
    println!("  Generating a soup of {} triangles...", n);
    let soup = generate_sphere_soup(n, Some(42));

    let start = Instant::now();
    let energy = HierarchicalTpe::new(&soup, params)?;
    let build = start.elapsed().as_secs_f64();

    let start = Instant::now();
    let value = energy.value();
    let value_time = start.elapsed().as_secs_f64();

    let start = Instant::now();
    let _gradient = energy.differential()?;
    let differential = start.elapsed().as_secs_f64();

    println!("  Energy {:.6e}", value);

    Ok(Timings {
        build,
        value: value_time,
        differential,
        interactions: energy.block_cluster_tree().interaction_count(),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Tangent-point energy complexity benchmark ===\n");

    let params = TpeParams::builder()
        .exponents(6.0, 12.0)
        .theta(0.5)
        .split_threshold(8)
        .build()?;

    let test_sizes = [1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 64_000];

    let mut rows = Vec::with_capacity(test_sizes.len());
    for &n in &test_sizes {
        println!("\nTesting N = {}:", n);
        rows.push((n, run_benchmark(n, params)?));
    }

    println!(
        "\nN\tBuild(s)\tValue(s)\tGrad(s)\tInteractions\tTotal/(N*log(N)) (us)"
    );
    println!("{}", "-".repeat(88));
    for (n, t) in &rows {
        let n_f64 = *n as f64;
        let n_log_n = n_f64 * n_f64.log2();
        let total = t.build + t.value + t.differential;
        println!(
            "{}\t{:.3}\t\t{:.3}\t\t{:.3}\t{}\t\t{:.4}",
            n,
            t.build,
            t.value,
            t.differential,
            t.interactions,
            total / n_log_n * 1e6
        );
    }

    println!("\nIf Total/(N*log(N)) stays roughly constant as N doubles, the cost is O(N log N).");
    Ok(())
}
