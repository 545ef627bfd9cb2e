use approx::assert_relative_eq;
use grid_motion::kinematics::RigidMotion;
use grid_motion::sliding::update_donors;
use grid_motion::timespectral::InstanceSnapshot;
use grid_motion::{
    locate_donors, set_grid_movement, spectral_operator, update_zones, ForceCoefficients, GridMovementKind,
    MarkerKind, MeshGenerator, MotionConfig, TimeScheme, TimeSpectralCoupler, Zone,
};
use nalgebra::{Point3, Vector3};
use std::f64::consts::PI;

fn pitching(kind: GridMovementKind, scheme: TimeScheme, amplitude_deg: f64) -> MotionConfig {
    let mut config = MotionConfig::default();
    config.grid_movement.kind = kind;
    config.grid_movement.mg_levels = 2;
    config.time.scheme = scheme;
    config.time.delta_t = 0.25;
    config.motion.pitching_omega = [0.0, 0.0, 2.0 * PI];
    config.motion.pitching_amplitude = [0.0, 0.0, amplitude_deg];
    config
}

#[test]
fn test_quarter_period_pitch_turns_grid() {
    let config = pitching(GridMovementKind::RigidMotion, TimeScheme::DualTime1st, 90.0);
    let mesh = MeshGenerator::annulus_quads(16, 3, 0.5, 2.0, 1.0);
    let mut zone = Zone::new(0, mesh.clone(), config).unwrap();

    let step = set_grid_movement(&mut zone, 1, &ForceCoefficients::default()).unwrap();
    assert_relative_eq!(step.t_new, 0.25);

    // Node 0 starts at (0.5, 0) and is turned by the full amplitude
    assert_relative_eq!(zone.mesh.geometry.nodes[0], Point3::new(0.0, 0.5, 0.0), epsilon = 1e-12);
    for (x, x0) in zone.mesh.geometry.nodes.iter().zip(&mesh.geometry.nodes) {
        assert_relative_eq!(x.coords.norm(), x0.coords.norm(), epsilon = 1e-12);
    }
    // Rigid motion keeps every control volume
    for (v, v0) in zone.mesh.volumes.current.iter().zip(&mesh.volumes.current) {
        assert_relative_eq!(*v, *v0, epsilon = 1e-12);
    }

    // At half a period the pitch angle is zero again
    set_grid_movement(&mut zone, 2, &ForceCoefficients::default()).unwrap();
    assert_relative_eq!(zone.mesh.geometry.nodes[0], Point3::new(0.5, 0.0, 0.0), epsilon = 1e-12);
}

#[test]
fn test_spectral_operator_properties() {
    for n in 2..12 {
        let d = spectral_operator(n, 0.8);
        for i in 0..n {
            assert!(d.row(i).sum().abs() < 1e-12);
        }
        assert_relative_eq!(d.clone(), -d.transpose(), epsilon = 1e-12);
    }
}

#[test]
fn test_spectral_sources_differentiate_periodic_signal() {
    let n = 7;
    let period = 2.0;
    let w = 2.0 * PI / period;
    let values: Vec<Vec<f64>> = (0..n)
        .map(|k| {
            let t = k as f64 * period / n as f64;
            vec![(w * t).cos(), 2.0 + (2.0 * w * t).sin()]
        })
        .collect();
    let coupler = TimeSpectralCoupler::new(n, period);
    let sources = coupler.all_sources(InstanceSnapshot { values: &values, previous: None });
    for (k, s) in sources.iter().enumerate() {
        let t = k as f64 * period / n as f64;
        assert_relative_eq!(s[0], -w * (w * t).sin(), epsilon = 1e-10);
        assert_relative_eq!(s[1], 2.0 * w * (2.0 * w * t).cos(), epsilon = 1e-10);
    }
}

#[test]
fn test_time_spectral_grid_velocities_match_rigid_kinematics() {
    let n = 5;
    let mut config = pitching(GridMovementKind::RigidMotion, TimeScheme::TimeSpectral, 1.0);
    config.time.n_time_instances = n;
    let mesh = MeshGenerator::annulus_quads(12, 3, 0.5, 2.0, 1.0);
    let mut zones: Vec<Zone> = (0..n).map(|i| Zone::new(i, mesh.clone(), config.clone()).unwrap()).collect();

    update_zones(&mut zones, 1, &[]).unwrap();

    let motion = RigidMotion::from_config(&config);
    let w = 2.0 * PI;
    let v_scale = w * 1f64.to_radians() * 2.0;
    for (i, zone) in zones.iter().enumerate() {
        let t = i as f64 / n as f64;
        for (x, v) in zone.mesh.geometry.nodes.iter().zip(&zone.mesh.grid_velocity) {
            let exact = motion.velocity(x, t);
            assert!((v - exact).norm() < 1e-3 * v_scale, "instance {}: {:?} vs {:?}", i, v, exact);
        }
        assert_eq!(zone.hierarchy.levels[0].grid_velocity.len(), zone.hierarchy.levels[0].nodes.len());
    }
}

#[test]
fn test_sliding_interface_between_moving_zones() {
    // Zone 1 is a 2×1 strip; zone 0 receives along a line inside it
    let donor = MeshGenerator::rectangle_triangles(8, 4, 2.0, 1.0);
    let mut recv = MeshGenerator::rectangle_quads(4, 1, 1.0, 0.2);
    for p in recv.geometry.nodes.iter_mut() {
        p.x += 0.3;
        p.y += 0.4;
    }
    let top = recv.marker_index("top").unwrap();
    recv.markers[top].kind = MarkerKind::SendReceive { receive: true };
    for v in recv.markers[top].vertices.iter_mut() {
        v.matching_zone = Some(1);
    }

    let mut records = locate_donors(&[&recv, &donor]).unwrap();
    assert_eq!(records.len(), 5);

    // Translate the donor zone; a linear field moves with it
    let mut donor = donor;
    let slide = RigidMotion {
        plunging_omega: Vector3::new(PI, 0.0, 0.0),
        plunging_amplitude: Vector3::new(0.3, 0.0, 0.0),
        ..RigidMotion::default()
    };
    slide.apply(&mut donor, 0.0, 0.5);
    update_donors(&mut records, &[&recv, &donor]);
    assert_eq!(records.len(), 5);

    let field: Vec<f64> = donor.geometry.nodes.iter().map(|p| 2.0 * (p.x - 0.3) + 5.0 * p.y).collect();
    for r in &records {
        let p = recv.geometry.nodes[r.point];
        assert_relative_eq!(r.interpolate(&field), 2.0 * (p.x - 0.3) + 5.0 * p.y, epsilon = 1e-10);
    }
}
