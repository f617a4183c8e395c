//! Closest-point projection onto a parametric patch.

use serde::{Deserialize, Serialize};

use super::core::{Point3, Tolerance, Vec3};

/// Options controlling point projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionOptions {
    /// Maximum accepted distance between a point and its projection.
    pub tolerance: Tolerance,

    /// Gauss-Newton iterations per patch.
    pub max_iterations: usize,

    /// Samples per parametric direction used to seed the iteration.
    pub seed_samples: usize,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::LOOSE,
            max_iterations: 25,
            seed_samples: 8,
        }
    }
}

impl ProjectionOptions {
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Tolerance::new(tolerance.abs());
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_seed_samples(mut self, seed_samples: usize) -> Self {
        self.seed_samples = seed_samples.max(1);
        self
    }
}

/// Result of projecting one point onto one patch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ClosestPoint {
    pub u: f64,
    pub v: f64,
    pub distance: f64,
}

/// Finds the parameters on a patch closest to `target`.
///
/// `frame(u, v)` returns the surface point and its two partial derivatives.
/// The seed is the nearest sample of a regular grid; it is refined with
/// Gauss-Newton steps clamped to the domain.
pub(crate) fn closest_point<F>(
    frame: F,
    domain_u: (f64, f64),
    domain_v: (f64, f64),
    target: Point3,
    options: &ProjectionOptions,
) -> ClosestPoint
where
    F: Fn(f64, f64) -> (Point3, Vec3, Vec3),
{
    let (u0, u1) = domain_u;
    let (v0, v1) = domain_v;
    let samples = options.seed_samples.max(1);

    let mut best_u = u0;
    let mut best_v = v0;
    let mut best_d2 = f64::INFINITY;
    for a in 0..=samples {
        let u = u0 + (u1 - u0) * a as f64 / samples as f64;
        for b in 0..=samples {
            let v = v0 + (v1 - v0) * b as f64 / samples as f64;
            let d2 = frame(u, v).0.distance_squared_to(target);
            if d2 < best_d2 {
                best_d2 = d2;
                best_u = u;
                best_v = v;
            }
        }
    }

    let step_tol_u = Tolerance::TIGHT.relative_to(u1 - u0);
    let step_tol_v = Tolerance::TIGHT.relative_to(v1 - v0);
    let (mut u, mut v) = (best_u, best_v);
    for _ in 0..options.max_iterations {
        let (point, su, sv) = frame(u, v);
        let residual = point - target;
        let g_u = residual.dot(su);
        let g_v = residual.dot(sv);
        let a = su.dot(su);
        let b = su.dot(sv);
        let c = sv.dot(sv);
        let det = a * c - b * b;
        if !det.is_finite() || det.abs() <= f64::EPSILON * (a * c).abs().max(f64::MIN_POSITIVE) {
            break;
        }
        let du = (c * g_u - b * g_v) / det;
        let dv = (a * g_v - b * g_u) / det;
        let next_u = (u - du).clamp(u0, u1);
        let next_v = (v - dv).clamp(v0, v1);
        let moved_u = (next_u - u).abs();
        let moved_v = (next_v - v).abs();
        u = next_u;
        v = next_v;
        if moved_u <= step_tol_u && moved_v <= step_tol_v {
            break;
        }
    }

    let refined = frame(u, v).0.distance_squared_to(target);
    if refined <= best_d2 {
        ClosestPoint { u, v, distance: refined.sqrt() }
    } else {
        ClosestPoint { u: best_u, v: best_v, distance: best_d2.sqrt() }
    }
}
