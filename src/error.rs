//! Error types reported by the layout and assembly routines.
use crate::graph::{EdgeIndex, Owner};
use std::error::Error;
use std::fmt;

/// Errors produced while laying out, assembling or distributing a mixed-dimensional system.
///
/// Assembly is all-or-nothing: when any of these errors is returned, no matrix is produced.
/// Errors raised by discretization operators are wrapped together with the identity of the
/// node or edge, the variable and the operator that failed.
#[derive(Debug)]
#[non_exhaustive]
pub enum AssemblyError {
    /// Declarations or registrations are invalid, missing or inconsistent with the graph.
    Configuration { owner: Option<Owner>, message: String },
    /// A discretization operator failed, or produced output of the wrong shape.
    Discretization {
        owner: Owner,
        variable: String,
        operator: String,
        source: eyre::Report,
    },
    /// No coupling law is applicable to the dimensions of the grids joined by an edge.
    CouplingResolution {
        edge: EdgeIndex,
        primary_dim: usize,
        secondary_dim: usize,
    },
    /// A global vector does not match the size of the current DOF layout.
    DimensionMismatch { expected: usize, actual: usize },
}

impl AssemblyError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            owner: None,
            message: message.into(),
        }
    }

    pub(crate) fn configuration_at(owner: impl Into<Owner>, message: impl Into<String>) -> Self {
        Self::Configuration {
            owner: Some(owner.into()),
            message: message.into(),
        }
    }

    pub(crate) fn discretization(
        owner: impl Into<Owner>,
        variable: &str,
        operator: &str,
        source: eyre::Report,
    ) -> Self {
        Self::Discretization {
            owner: owner.into(),
            variable: variable.to_string(),
            operator: operator.to_string(),
            source,
        }
    }

    /// The node or edge the error is attributed to, if any.
    pub fn owner(&self) -> Option<Owner> {
        match self {
            Self::Configuration { owner, .. } => *owner,
            Self::Discretization { owner, .. } => Some(*owner),
            Self::CouplingResolution { edge, .. } => Some(Owner::Edge(*edge)),
            Self::DimensionMismatch { .. } => None,
        }
    }
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { owner: Some(owner), message } => {
                write!(f, "Invalid configuration on {}: {}", owner, message)
            }
            Self::Configuration { owner: None, message } => write!(f, "Invalid configuration: {}", message),
            Self::Discretization {
                owner,
                variable,
                operator,
                source,
            } => write!(
                f,
                "Discretization operator '{}' for variable '{}' on {} failed. Error: {}",
                operator, variable, owner, source
            ),
            Self::CouplingResolution {
                edge,
                primary_dim,
                secondary_dim,
            } => write!(
                f,
                "No coupling law applies to {} joining grids of dimension {} and {}",
                edge, primary_dim, secondary_dim
            ),
            Self::DimensionMismatch { expected, actual } => write!(
                f,
                "Vector of length {} does not match the {} degrees of freedom of the current layout",
                actual, expected
            ),
        }
    }
}

impl Error for AssemblyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Discretization { source, .. } => {
                let source: &(dyn Error + 'static) = source.as_ref();
                Some(source)
            }
            _ => None,
        }
    }
}
