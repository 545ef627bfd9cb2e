//! Error types for dynamic mesh operations.

use thiserror::Error;

/// Errors that stop the current motion or deformation step.
///
/// Numerical non-convergence of a single point inversion or a single spring
/// solve is *not* an error: it is reported through the returned statistics
/// and logged. Only persistent non-convergence escalates to
/// [`MotionError::NonConvergence`].
#[derive(Debug, Error)]
pub enum MotionError {
    /// File could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed input text (configuration, FFD block, motion file).
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration values are inconsistent.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// An element has zero or negative signed volume after deformation.
    #[error("Element {element} has non-positive volume {volume:.6e} after deformation")]
    InvalidElement { element: usize, volume: f64 },

    /// Stored control points do not match the declared box degree.
    #[error("FFD box '{tag}': degree {degree:?} needs {expected} control points, found {found}")]
    DegreeMismatch {
        tag: String,
        degree: [usize; 3],
        expected: usize,
        found: usize,
    },

    /// A scheme or dimension that has no implementation.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Parent/child tags of the FFD boxes form a cycle.
    #[error("FFD hierarchy contains a cycle through box '{0}'")]
    CyclicHierarchy(String),

    /// A box tag referenced by a hierarchy or design variable does not exist.
    #[error("Unknown FFD box '{0}'")]
    UnknownBox(String),

    /// A boundary marker tag does not exist on the mesh.
    #[error("Unknown boundary marker '{0}'")]
    UnknownMarker(String),

    /// The stiffness structure was initialised twice without deallocation.
    #[error("Stiffness matrix structure already allocated")]
    StructureAllocated,

    /// The spring solve hit its iteration cap on too many consecutive calls.
    #[error("Spring solve hit its iteration cap on {consecutive} consecutive calls (residual {residual:.3e})")]
    NonConvergence { consecutive: usize, residual: f64 },
}

impl MotionError {
    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, MotionError>;
