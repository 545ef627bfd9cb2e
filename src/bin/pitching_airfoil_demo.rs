use grid_motion::{
    assess_mesh_quality, update_zones, ForceCoefficients, GridMovementKind, MeshGenerator, MotionConfig, TimeScheme,
    Zone,
};

const DEFAULT_CONFIG: &str = r#"
[grid_movement]
kind = "flutter"
mg_levels = 2

[time]
scheme = "dual_time_2nd"
delta_t = 0.025

[motion]
origin = [0.0, 0.0, 0.0]
pitching_omega = [0.0, 0.0, 6.283185307179586]
pitching_amplitude = [0.0, 0.0, 3.0]

[deform]
method = "torsional_spring"
increments = 2
"#;

fn main() -> grid_motion::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== Pitching Body Grid Motion Demo ===\n");

    // Optional configuration file as the first argument
    let config = match std::env::args().nth(1) {
        Some(path) => MotionConfig::from_file(path)?,
        None => MotionConfig::from_toml_str(DEFAULT_CONFIG)?,
    };

    println!("Generating O-grid around the body...");
    let mut mesh = MeshGenerator::annulus_quads(48, 12, 0.5, 6.0, 1.25);
    if let Some(body) = mesh.marker_index("body") {
        mesh.markers[body].moving = true;
    }
    println!("  Nodes: {}", mesh.num_nodes());
    println!("  Elements: {}", mesh.num_elements());

    let n_zones = if config.time.scheme == TimeScheme::TimeSpectral {
        config.time.n_time_instances
    } else {
        1
    };
    let mut zones = (0..n_zones)
        .map(|i| Zone::new(i, mesh.clone(), config.clone()))
        .collect::<grid_motion::Result<Vec<_>>>()?;

    let n_steps = match config.oscillation_period() {
        Some(period) if config.time.scheme != TimeScheme::TimeSpectral => {
            (period / config.time.delta_t).round() as usize
        }
        _ => 1,
    };
    println!("\nAdvancing {} steps ({:?})...", n_steps, config.grid_movement.kind);

    let loads = vec![ForceCoefficients::default(); n_zones];
    for iter in 1..=n_steps {
        let steps = update_zones(&mut zones, iter, &loads)?;
        let zone = &zones[0];
        let quality = assess_mesh_quality(&zone.mesh);
        let cg: usize = steps[0].deformation.as_ref().map_or(0, |d| d.total_iterations());
        let v_max = zone.mesh.grid_velocity.iter().map(|v| v.norm()).fold(0.0, f64::max);
        println!(
            "  step {:3}  t = {:.4}  CG iters = {:4}  max |v_grid| = {:.4e}  min V = {:.4e}",
            iter, steps[0].t_new, cg, v_max, quality.min_volume
        );
    }

    if zones[0].kind() == GridMovementKind::Flutter || zones[0].kind() == GridMovementKind::RigidMotion {
        let moved = zones[0]
            .mesh
            .geometry
            .nodes
            .iter()
            .zip(&mesh.geometry.nodes)
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max);
        println!("\nLargest distance from the initial grid after one period: {:.3e}", moved);
    }
    println!("\n{}", assess_mesh_quality(&zones[0].mesh).report());
    Ok(())
}
