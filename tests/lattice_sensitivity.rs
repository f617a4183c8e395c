//! Sensitivities through a B-spline lattice checked against design
//! perturbations.

use pgm_engine::config::{Configuration, DesignVariable, PointGradient, VariableValues};
use pgm_engine::geom::{BSplineSurface, LatticeState, Point3, SparseMatrix};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TOL: f64 = 1e-9;

fn init_logs() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// Biquadratic patch with three design variables:
/// `camber` (3) lifts each v-row of control points along z,
/// `sweep` (scalar) shears the rows along x,
/// `thickness` (2 x 1) pushes the u = 0 and u = 2 columns apart along y.
fn wing() -> Configuration<LatticeState> {
    let patch = BSplineSurface::clamped_uniform(2, 2, 3, 3).unwrap();
    let mut control_points = Vec::new();
    for j in 0..3 {
        for i in 0..3 {
            let (u, v) = (f64::from(i), f64::from(j));
            control_points.push(Point3::new(0.5 * u, 0.5 * v, 0.1 * (u - 1.0).powi(2) + 0.05 * v));
        }
    }

    let dof = |i: usize, j: usize| j * 3 + i;
    let (x, y, z) = (0, 9, 18);
    let mut triplets = Vec::new();
    for j in 0..3 {
        for i in 0..3 {
            triplets.push((z + dof(i, j), j, 1.0));
            if j > 0 {
                triplets.push((x + dof(i, j), 3, 0.5 * j as f64));
            }
        }
        triplets.push((y + dof(0, j), 4, -1.0));
        triplets.push((y + dof(2, j), 5, 1.0));
    }
    let jacobian = SparseMatrix::from_triplets(27, 6, &triplets).unwrap();
    let state = LatticeState::from_control_points(vec![patch], &control_points, jacobian).unwrap();

    let mut config = Configuration::new(state);
    config
        .add_design_variable(DesignVariable::new("camber", vec![3], 0.0).unwrap())
        .unwrap();
    config
        .add_design_variable(DesignVariable::scalar("sweep", 0.0).unwrap())
        .unwrap();
    config
        .add_design_variable(DesignVariable::new("thickness", vec![2, 1], 0.0).unwrap())
        .unwrap();

    let mut samples = Vec::new();
    for u in [0.1, 0.35, 0.6, 0.85] {
        for v in [0.15, 0.5, 0.9] {
            samples.push(config.state().point_at(0, u, v).unwrap());
        }
    }
    config.add_point_set(samples, "surface").unwrap();
    config
}

fn baseline() -> VariableValues {
    [
        ("camber", vec![0.1, 0.0, -0.1]),
        ("sweep", vec![0.2]),
        ("thickness", vec![0.05, 0.05]),
    ]
    .into_iter()
    .map(|(name, values)| (name.to_string(), values))
    .collect()
}

fn random_rows(rng: &mut StdRng, count: usize) -> Vec<[f64; 3]> {
    (0..count)
        .map(|_| {
            [
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            ]
        })
        .collect()
}

fn weighted_sum(weights: &[[f64; 3]], points: &[Point3]) -> f64 {
    weights
        .iter()
        .zip(points)
        .map(|(w, p)| w[0] * p.x + w[1] * p.y + w[2] * p.z)
        .sum()
}

#[test]
fn sensitivity_matches_finite_differences() {
    init_logs();
    let mut config = wing();
    let base = baseline();
    config.set_design_variables(&base).unwrap();
    let weights = random_rows(&mut StdRng::seed_from_u64(7), 12);
    let f0 = weighted_sum(&weights, config.update("surface").unwrap());

    let sensitivity = config
        .total_sensitivity(&PointGradient::from_points(&weights), "surface")
        .unwrap();

    let step = 0.25;
    for (name, values) in &base {
        let analytic = sensitivity[name].as_vector().unwrap();
        assert_eq!(analytic.len(), values.len());
        for k in 0..values.len() {
            let mut perturbed = base.clone();
            perturbed.get_mut(name).unwrap()[k] += step;
            config.set_design_variables(&perturbed).unwrap();
            let f1 = weighted_sum(&weights, config.update("surface").unwrap());
            let fd = (f1 - f0) / step;
            assert!(
                (fd - analytic[k]).abs() < 1e-8,
                "{name}[{k}]: finite difference {fd}, adjoint {}",
                analytic[k]
            );
        }
    }
}

#[test]
fn sensitivity_is_linear_in_the_gradient() {
    let config = wing();
    let mut rng = StdRng::seed_from_u64(11);
    let g1 = PointGradient::from_points(&random_rows(&mut rng, 12));
    let g2 = PointGradient::from_points(&random_rows(&mut rng, 12));
    let (a, b) = (1.5, -0.75);

    let s1 = config.total_sensitivity(&g1, "surface").unwrap();
    let s2 = config.total_sensitivity(&g2, "surface").unwrap();
    let combined = config
        .total_sensitivity(&g1.combine(a, &g2, b).unwrap(), "surface")
        .unwrap();

    for name in config.variable_names() {
        let (x, y, z) = (
            s1[name].as_vector().unwrap(),
            s2[name].as_vector().unwrap(),
            combined[name].as_vector().unwrap(),
        );
        for k in 0..z.len() {
            assert!((z[k] - (a * x[k] + b * y[k])).abs() < TOL, "{name}[{k}]");
        }
    }
}

#[test]
fn forward_product_matches_update_difference() {
    let mut config = wing();
    let base = baseline();
    config.set_design_variables(&base).unwrap();
    let before = config.update("surface").unwrap().to_vec();

    let delta: VariableValues = [
        ("camber", vec![0.02, -0.01, 0.03]),
        ("thickness", vec![0.1, -0.2]),
    ]
    .into_iter()
    .map(|(name, values)| (name.to_string(), values))
    .collect();
    let predicted = config.total_sensitivity_prod(&delta, "surface").unwrap();

    let mut moved = base.clone();
    for (name, step) in &delta {
        for (value, d) in moved.get_mut(name).unwrap().iter_mut().zip(step) {
            *value += d;
        }
    }
    config.set_design_variables(&moved).unwrap();
    let after = config.update("surface").unwrap();

    for ((p0, p1), dp) in before.iter().zip(after).zip(&predicted) {
        assert!(((*p1 - *p0) - (*dp - Point3::ORIGIN)).length() < TOL);
    }
}

#[test]
fn forward_and_adjoint_products_agree() {
    let config = wing();
    let mut rng = StdRng::seed_from_u64(3);
    let weights = random_rows(&mut rng, 12);
    let sensitivity = config
        .total_sensitivity(&PointGradient::from_points(&weights), "surface")
        .unwrap();

    let delta: VariableValues = config
        .values()
        .into_iter()
        .map(|(name, values)| {
            let step = values.iter().map(|_| rng.random_range(-1.0..1.0)).collect();
            (name, step)
        })
        .collect();
    let forward = weighted_sum(&weights, &config.total_sensitivity_prod(&delta, "surface").unwrap());
    let adjoint: f64 = delta
        .iter()
        .map(|(name, step)| {
            let block = sensitivity[name].as_vector().unwrap();
            block.iter().zip(step).map(|(s, d)| s * d).sum::<f64>()
        })
        .sum();
    assert!((forward - adjoint).abs() < TOL);
}

#[test]
fn multiple_functions_produce_matrix_blocks() {
    let config = wing();
    let mut rng = StdRng::seed_from_u64(5);
    let first = random_rows(&mut rng, 12);
    let second = random_rows(&mut rng, 12);

    let both = PointGradient::from_functions(&[first.clone(), second.clone()]).unwrap();
    let joint = config.total_sensitivity(&both, "surface").unwrap();
    let single = [
        config
            .total_sensitivity(&PointGradient::from_points(&first), "surface")
            .unwrap(),
        config
            .total_sensitivity(&PointGradient::from_points(&second), "surface")
            .unwrap(),
    ];

    for name in config.variable_names() {
        let block = &joint[name];
        assert!(block.as_vector().is_none());
        for (function, reference) in single.iter().enumerate() {
            for (element, expected) in reference[name].as_vector().unwrap().iter().enumerate() {
                let value = block.get(element, function).unwrap();
                assert!((value - expected).abs() < TOL, "{name}[{element}, {function}]");
            }
        }
    }
}

#[test]
fn untouched_axes_contribute_nothing() {
    let config = wing();
    // only y gradients: camber (z) and sweep (x) see nothing
    let gradient = PointGradient::from_points(&[[0.0, 1.0, 0.0]; 12]);
    let sensitivity = config.total_sensitivity(&gradient, "surface").unwrap();
    assert!(sensitivity["camber"].as_vector().unwrap().iter().all(|s| *s == 0.0));
    assert_eq!(sensitivity["sweep"].as_vector(), Some(&[0.0][..]));
    let thickness = sensitivity["thickness"].as_vector().unwrap();
    assert!(thickness[0] < 0.0 && thickness[1] > 0.0);
}

/// Bilinear patch whose four control points are blended from three dofs;
/// the fourth corner completes a parallelogram.
#[test]
fn blended_dofs_propagate_to_points() {
    let patch = BSplineSurface::clamped_uniform(1, 1, 2, 2).unwrap();
    let dofs = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ];
    let blend = SparseMatrix::from_triplets(
        4,
        3,
        &[
            (0, 0, 1.0),
            (1, 1, 1.0),
            (2, 2, 1.0),
            (3, 0, -1.0),
            (3, 1, 1.0),
            (3, 2, 1.0),
        ],
    )
    .unwrap();
    // "lift" moves the second dof along z
    let jacobian = SparseMatrix::from_triplets(9, 1, &[(7, 0, 1.0)]).unwrap();
    let state = LatticeState::new(vec![patch], &dofs, blend, jacobian).unwrap();

    let mut config = Configuration::new(state);
    config
        .add_design_variable(DesignVariable::scalar("lift", 0.0).unwrap())
        .unwrap();
    config
        .add_point_set([[0.5, 0.5, 0.0], [1.0, 1.0, 0.0]], "probe")
        .unwrap();

    let mut values = VariableValues::new();
    values.insert("lift".to_string(), vec![2.0]);
    config.set_design_variables(&values).unwrap();
    let points = config.update("probe").unwrap();
    assert!((points[0].z - 1.0).abs() < TOL);
    assert!((points[1].z - 2.0).abs() < TOL);

    let gradient = PointGradient::from_points(&[[0.0, 0.0, 1.0]; 2]);
    let sensitivity = config.total_sensitivity(&gradient, "probe").unwrap();
    let lift = sensitivity["lift"].as_vector().unwrap();
    assert!((lift[0] - 1.5).abs() < TOL);
}
