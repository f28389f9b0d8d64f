use thiserror::Error;

/// Structural failures raised while building the verifier. A wrong proof never surfaces
/// here: it only leaves the emitted constraint system unsatisfiable.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("unknown gate id `{0}`")]
    UnknownGate(String),

    #[error("malformed gate id `{id}`: {reason}")]
    MalformedGate { id: String, reason: String },

    #[error("unsupported circuit feature: {0}")]
    Unsupported(String),

    #[error("proof shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("gate `{gate}` produced {produced} constraints but the circuit declares {max}")]
    TooManyConstraints {
        gate: String,
        produced: usize,
        max: usize,
    },

    #[error("FRI parameters admit too many non-canonical query indices (density {density:.3e})")]
    NoncanonicalIndices { density: f64 },

    #[error("expected a {expected} digest")]
    DigestKind { expected: &'static str },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("failed to decode circuit data: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Synthesis(#[from] halo2_proofs::plonk::Error),
}

impl VerifierError {
    pub(crate) fn shape(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    pub(crate) fn ensure_len(what: impl Into<String>, expected: usize, actual: usize) -> Result<()> {
        if expected != actual {
            return Err(Self::shape(what, expected, actual));
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, VerifierError>;
