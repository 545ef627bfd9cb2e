//! Analytic 2-D shape functions in chord-normalized coordinates.
//!
//! Every function takes the chordwise position x ∈ [0,1] and returns a
//! y value (or y perturbation) in chord units.

use std::f64::consts::PI;

/// Exponent of the sine in the Hicks-Henne bump
pub const HICKS_HENNE_TENSION: i32 = 3;

/// Hicks-Henne bump peaking at `location`: sin(π·x^e)^t with e = ln½ / ln(location).
///
/// Zero outside the open interval (0, 1).
pub fn hicks_henne(x: f64, location: f64) -> f64 {
    if x <= 0.0 || x >= 1.0 || location <= 0.0 || location >= 1.0 {
        return 0.0;
    }
    let e = 0.5_f64.ln() / location.ln();
    (PI * x.powf(e)).sin().powi(HICKS_HENNE_TENSION)
}

/// NACA 4-digit camber line for maximum camber `m` at chordwise position `p`.
pub fn naca4_camber(x: f64, m: f64, p: f64) -> f64 {
    if m == 0.0 || p <= 0.0 || p >= 1.0 {
        return 0.0;
    }
    if x < p {
        m / (p * p) * (2.0 * p * x - x * x)
    } else {
        m / ((1.0 - p) * (1.0 - p)) * (1.0 - 2.0 * p + 2.0 * p * x - x * x)
    }
}

/// NACA 4-digit half thickness for thickness ratio `t` (closed trailing edge).
pub fn naca4_thickness(x: f64, t: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    5.0 * t * (0.2969 * x.sqrt() - 0.1260 * x - 0.3516 * x.powi(2) + 0.2843 * x.powi(3) - 0.1036 * x.powi(4))
}

/// Surface ordinate of a NACA 4-digit section (camber ± half thickness).
pub fn naca4_surface(x: f64, m: f64, p: f64, t: f64, upper: bool) -> f64 {
    let yc = naca4_camber(x, m, p);
    let yt = naca4_thickness(x, t);
    if upper {
        yc + yt
    } else {
        yc - yt
    }
}

/// Parabolic-arc section: camber and thickness both 2·c·x(1−x).
pub fn parabolic_surface(x: f64, camber: f64, thickness: f64, upper: bool) -> f64 {
    let base = 2.0 * x * (1.0 - x);
    if upper {
        base * (camber + thickness)
    } else {
        base * (camber - thickness)
    }
}

/// Smooth bump of `height` over [0, `length`]: h·sin²(πx/L).
pub fn obstacle(x: f64, height: f64, length: f64) -> f64 {
    if length <= 0.0 || x <= 0.0 || x >= length {
        return 0.0;
    }
    height * (PI * x / length).sin().powi(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hicks_henne_peaks_at_location() {
        for &loc in &[0.2, 0.5, 0.8] {
            assert_relative_eq!(hicks_henne(loc, loc), 1.0, epsilon = 1e-12);
            assert!(hicks_henne(loc - 0.05, loc) < 1.0);
            assert!(hicks_henne(loc + 0.05, loc) < 1.0);
        }
        assert_eq!(hicks_henne(0.0, 0.3), 0.0);
        assert_eq!(hicks_henne(1.0, 0.3), 0.0);
    }

    #[test]
    fn test_naca0012_thickness() {
        // Maximum thickness 12% of chord near x = 0.3
        assert_relative_eq!(2.0 * naca4_thickness(0.3, 0.12), 0.12, epsilon = 2e-3);
        assert_relative_eq!(naca4_thickness(0.0, 0.12), 0.0);
        assert!(naca4_thickness(1.0, 0.12).abs() < 1e-4);
    }

    #[test]
    fn test_naca_camber_continuous_at_max() {
        let (m, p) = (0.02, 0.4);
        assert_relative_eq!(naca4_camber(p, m, p), m, epsilon = 1e-14);
        assert_relative_eq!(naca4_camber(p - 1e-9, m, p), naca4_camber(p + 1e-9, m, p), epsilon = 1e-9);
        assert_relative_eq!(naca4_camber(1.0, m, p), 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_symmetric_sections() {
        assert_relative_eq!(naca4_surface(0.5, 0.0, 0.0, 0.12, true), -naca4_surface(0.5, 0.0, 0.0, 0.12, false));
        assert_relative_eq!(parabolic_surface(0.5, 0.0, 0.1, true), 0.05);
        assert_relative_eq!(obstacle(0.5, 0.1, 1.0), 0.1);
    }
}
