use thiserror::Error;

/// Failures reported by pluggable capabilities (projectors, minimizers,
/// regularisers, solvers). Any such failure aborts the reconstruction.
pub type CapabilityError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{what} has shape {found:?}, expected {expected:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    // No #[from]: Box<dyn Error> is not itself std::error::Error.
    #[error("capability failed: {0}")]
    Capability(CapabilityError),

    #[error("no {0} capability was provided")]
    MissingCapability(&'static str),

    #[error("bad configuration: {0}")]
    BadConfig(String),
}

impl Error {
    pub fn shape_mismatch(what: &'static str, expected: &[usize], found: &[usize]) -> Self {
        Error::DimensionMismatch {
            what,
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
