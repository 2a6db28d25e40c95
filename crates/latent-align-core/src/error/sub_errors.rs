//! Sub-error types, one per concern.

use thiserror::Error;

// ============================================================================
// VECTOR ERROR
// ============================================================================

/// Caller-supplied vector or batch is unusable.
///
/// Always recoverable by resubmitting corrected input.
#[derive(Debug, Error)]
pub enum VectorError {
    #[error("Empty vector: dimension must be > 0")]
    Empty,

    #[error("Non-finite component at index {index}: {value}")]
    NonFinite { index: usize, value: f32 },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid layer depth {0}: must be >= 1")]
    InvalidLayerDepth(u32),

    #[error("Invalid model id '{id}': {reason}")]
    InvalidModelId { id: String, reason: String },

    #[error("Invalid activation batch: {0}")]
    InvalidBatch(String),

    /// Wire data could not be trusted (malformed, checksum, signature).
    #[error("Packet rejected: {0}")]
    Packet(#[from] CodecError),
}

// ============================================================================
// CODEC ERROR
// ============================================================================

/// Encoding/decoding and packet framing failures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Truncated input: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Bad magic bytes")]
    BadMagic,

    #[error("Unsupported format version {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown precision tag {0}")]
    UnknownPrecision(u8),

    #[error("Body length {len} is not a multiple of {bytes_per_component}")]
    BodyLength {
        len: usize,
        bytes_per_component: usize,
    },

    #[error("Component {index} ({value}) is not representable at reduced precision")]
    ValueOutOfRange { index: usize, value: f32 },

    #[error("Invalid header field: {0}")]
    InvalidHeader(String),

    #[error("Checksum mismatch: body does not match header digest")]
    ChecksumMismatch,

    #[error("Signature verification failed")]
    SignatureInvalid,
}

// ============================================================================
// REGISTRY ERROR
// ============================================================================

/// Compatibility registry failures.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid quality metrics: {0}")]
    InvalidMetrics(String),

    /// Metrics fall below the bronze tier; matrix is not usable in production.
    #[error("Certification rejected: cosine similarity {cosine:.4} is below bronze")]
    BelowCertification { cosine: f64 },

    /// A matrix with this version already exists for the model pair.
    #[error("Version conflict: {pair} already has version {version}")]
    VersionConflict { pair: String, version: String },

    #[error("Unknown matrix id: {0}")]
    UnknownMatrix(uuid::Uuid),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

// ============================================================================
// CONFIG ERROR
// ============================================================================

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse TOML: {0}")]
    Parse(String),

    #[error("Failed to serialize to TOML: {0}")]
    Serialize(String),

    #[error("[{section}] {message}")]
    Invalid { section: &'static str, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(section: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            section,
            message: message.into(),
        }
    }
}
