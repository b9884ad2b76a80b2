use thiserror::Error;

/// Structured error kinds surfaced by every public operation in this
/// crate (`spec.md` §7). The core never retries and never returns
/// partial results on error.
#[derive(Debug, Error)]
pub enum SketchError {
    /// Malformed sequence, empty input, or a k-mer shorter than `ksize`.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Mismatched k, seed, moltype, or scaled-vs-num mode between operands.
    #[error("incompatible sketches: {message}")]
    IncompatibleSketch { message: String },

    /// md5 mismatch, JSON schema violation, or truncated hash list.
    #[error("corrupt signature: {message}")]
    CorruptSignature { message: String },

    /// Manifest references a missing node, unsupported version, or an
    /// empty tree.
    #[error("corrupt index: {message}")]
    CorruptIndex { message: String },

    /// Underlying I/O or network error from a storage backend.
    #[error("storage failure: {message}")]
    StorageFailure { message: String },

    /// Multiple ksizes/moltypes present when the caller must disambiguate.
    #[error("ambiguous selection: {message}")]
    AmbiguousSelection { message: String },

    /// A field can only be mutated while the sketch is empty.
    #[error("cannot set {field} on a non-empty sketch")]
    NonEmptySketch { field: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Niffler(#[from] niffler::Error),

    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
}

impl SketchError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        SketchError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn incompatible(message: impl Into<String>) -> Self {
        SketchError::IncompatibleSketch {
            message: message.into(),
        }
    }

    pub fn corrupt_signature(message: impl Into<String>) -> Self {
        SketchError::CorruptSignature {
            message: message.into(),
        }
    }

    pub fn corrupt_index(message: impl Into<String>) -> Self {
        SketchError::CorruptIndex {
            message: message.into(),
        }
    }

    pub fn storage_failure(message: impl Into<String>) -> Self {
        SketchError::StorageFailure {
            message: message.into(),
        }
    }

    pub fn ambiguous(message: impl Into<String>) -> Self {
        SketchError::AmbiguousSelection {
            message: message.into(),
        }
    }
}
