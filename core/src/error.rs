use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid array shape {shape:?}: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        shape:    Vec<usize>,
        expected: usize,
        actual:   usize,
    },

    #[error("Array shape {shape:?} is too large to encode")]
    ShapeTooLarge { shape: Vec<usize> },

    #[error("Engine construction failed: {0:#}")]
    EngineInit(anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type HostResult<T> = Result<T, HostError>;
