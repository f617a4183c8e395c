//! Hand-off of the design-variable catalogue to an external optimizer.

use serde::Serialize;

/// Kind of a variable group as understood by optimization drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VariableKind {
    Continuous,
}

impl VariableKind {
    /// Single-character tag drivers use for the kind.
    #[must_use]
    pub const fn tag(self) -> char {
        match self {
            Self::Continuous => 'c',
        }
    }
}

/// One variable group as registered with an optimizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableGroup<'a> {
    pub name: &'a str,
    pub size: usize,
    pub kind: VariableKind,
    /// Current value, column-major flattened.
    pub value: Vec<f64>,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub scale: f64,
}

/// Receiver of variable groups, implemented by optimizer bindings.
pub trait OptimizerSink {
    type Error;

    fn add_var_group(&mut self, group: VariableGroup<'_>) -> Result<(), Self::Error>;
}
