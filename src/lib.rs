#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Design-variable to point-set coupling for gradient-based shape
//! optimization.
//!
//! A [`Configuration`] binds named design variables to a parametric surface
//! (any [`SurfaceState`]) and to externally supplied point clouds projected
//! onto it. Point sets are re-evaluated through fixed sparse evaluation
//! operators when the design changes, and point-coordinate gradients are
//! propagated back to the design variables through the transposes of the
//! same operators.
//!
//! ```
//! use pgm_engine::config::{Configuration, DesignVariable, PointGradient, VariableValues};
//! use pgm_engine::geom::{BSplineSurface, LatticeState, Point3, SparseMatrix};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let patch = BSplineSurface::clamped_uniform(1, 1, 2, 2)?;
//! let corners = [
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//! ];
//! // "lift" raises every corner along z
//! let jacobian = SparseMatrix::from_triplets(12, 1, &[(8, 0, 1.0), (9, 0, 1.0), (10, 0, 1.0), (11, 0, 1.0)])?;
//! let state = LatticeState::from_control_points(vec![patch], &corners, jacobian)?;
//!
//! let mut config = Configuration::new(state);
//! config.add_design_variable(DesignVariable::scalar("lift", 0.0)?)?;
//! config.add_point_set([[0.5, 0.5, 0.0]], "probe")?;
//!
//! let mut values = VariableValues::new();
//! values.insert("lift".to_string(), vec![2.0]);
//! config.set_design_variables(&values)?;
//! assert!(!config.is_up_to_date("probe"));
//! assert_eq!(config.update("probe")?[0].z, 2.0);
//!
//! let gradient = PointGradient::from_points(&[[0.0, 0.0, 1.0]]);
//! let sensitivity = config.total_sensitivity(&gradient, "probe")?;
//! assert_eq!(sensitivity["lift"].as_vector(), Some(&[1.0][..]));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod geom;

pub use config::{ConfigError, Configuration};
pub use geom::SurfaceState;

cfg_if::cfg_if! {
    if #[cfg(feature = "debug_logs")] {
        /// Installs an `env_logger` backend honouring `RUST_LOG`.
        ///
        /// Safe to call more than once; later calls are ignored.
        pub fn init_logger() {
            let _ = env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or("debug"),
            )
            .try_init();
        }
    } else {
        /// No-op fallback when debug logs are disabled.
        pub fn init_logger() {}
    }
}
