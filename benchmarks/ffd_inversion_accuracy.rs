//! FFD point inversion accuracy
//!
//! Random points inside a deformed box are mapped forward with the Bezier
//! evaluation and then inverted with Newton-Raphson; the recovered parametric
//! coordinates are compared with the sampled ones.

use grid_motion::FfdBox;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() {
    println!("=== FFD Point Inversion Accuracy ===\n");

    let mut rng = StdRng::seed_from_u64(42);
    let n_samples = 2000;

    for degree in [[1, 1, 1], [2, 2, 1], [3, 3, 2], [5, 4, 3]] {
        let mut b = FfdBox::axis_aligned("bench", degree, Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 1.0, 0.5))
            .expect("valid degree");

        // Random interior perturbation of 5% of the box size
        let indices: Vec<_> = b.cp_indices().collect();
        for (i, j, k) in indices {
            let d = Vector3::new(
                rng.gen_range(-0.1..0.1),
                rng.gen_range(-0.05..0.05),
                rng.gen_range(-0.025..0.025),
            );
            b.move_control_point(i, j, k, d);
        }

        let mut max_err: f64 = 0.0;
        let mut sum_iters = 0;
        let mut failures = 0;
        for _ in 0..n_samples {
            let uvw = [rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)];
            let x = b.eval_cartesian(uvw);
            let inv = b.parametric_iterative(&x, [0.5, 0.5, 0.5], 1e-12, 500);
            if !inv.converged {
                failures += 1;
                continue;
            }
            sum_iters += inv.iterations;
            let back = b.eval_cartesian(inv.uvw);
            max_err = max_err.max((back - x).norm());
        }

        let converged = n_samples - failures;
        println!(
            "degree {:?}: {}/{} converged, mean iterations {:.2}, max |X(u) - x| = {:.3e}",
            degree,
            converged,
            n_samples,
            sum_iters as f64 / converged.max(1) as f64,
            max_err
        );
    }
}
