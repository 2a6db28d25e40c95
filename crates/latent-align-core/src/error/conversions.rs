//! Cross-type conversions into [`AlignError`].

use super::sub_errors::{CodecError, VectorError};
use super::unified::AlignError;

impl From<CodecError> for AlignError {
    fn from(err: CodecError) -> Self {
        AlignError::InvalidVector(VectorError::Packet(err))
    }
}
