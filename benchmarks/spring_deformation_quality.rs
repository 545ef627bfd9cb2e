//! Spring-analogy deformation quality
//!
//! A square cavity has its top wall pushed down by a random smooth bump of
//! growing amplitude. The linear and torsional spring methods and the
//! algebraic method are compared by the smallest element area they produce
//! and by the cost of the linear solves.

use grid_motion::{DeformConfig, DeformMethod, MeshGenerator, VolumetricDeformer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

fn main() {
    println!("=== Spring Deformation Quality ===\n");

    let mut rng = StdRng::seed_from_u64(7);
    let phase: f64 = rng.gen_range(0.0..PI);
    let n = 24;

    for amplitude in [0.05, 0.15, 0.3, 0.45] {
        for method in [DeformMethod::Spring, DeformMethod::TorsionalSpring, DeformMethod::Algebraic] {
            let mut mesh = MeshGenerator::rectangle_triangles(n, n, 1.0, 1.0);
            let top = mesh.marker_index("top").expect("top marker");
            mesh.markers[top].moving = true;
            for v in mesh.markers[top].vertices.iter_mut() {
                let x = mesh.geometry.nodes[v.point].x;
                v.var_coord.y = -amplitude * (PI * x).sin().powi(2) * (1.0 + 0.2 * (4.0 * PI * x + phase).sin());
            }

            let config = DeformConfig { method, increments: 4, ..DeformConfig::default() };
            let mut deformer = VolumetricDeformer::new(&config);
            match deformer.deform(&mut mesh, None) {
                Ok(report) => println!(
                    "A = {:.2}  {:16}  min area = {:.3e}  degenerate = {:3}  CG iterations = {:5}",
                    amplitude,
                    format!("{:?}", method),
                    report.quality.min_volume,
                    report.quality.num_degenerate,
                    report.total_iterations()
                ),
                Err(e) => println!("A = {:.2}  {:16}  failed: {}", amplitude, format!("{:?}", method), e),
            }
        }
        println!();
    }
}
