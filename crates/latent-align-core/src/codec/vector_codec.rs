//! Reduced-precision vector encoding.
//!
//! Reduced precision is bfloat16: the top 16 bits of an IEEE-754 binary32
//! value (1 sign, 8 exponent, 7 mantissa bits) with round-to-nearest-even.
//! The exponent range equals f32, so only overflow near `f32::MAX` is
//! unrepresentable. Relative error is at most 2^-9 for normal values only.
//! Subnormals keep 7 mantissa bits at a fixed scale, so their guarantee is
//! absolute: error at most `f32::MIN_POSITIVE * 2^-8`, which can be a large
//! fraction of the value itself.
//!
//! # Blob layout
//!
//! ```text
//! [0..2]   magic "LV"
//! [2]      format version (1)
//! [3]      precision tag (0 = full, 1 = reduced)
//! [4..8]   layer depth (u32 LE)
//! [8]      model id length n
//! [9..9+n] model id (ASCII)
//! [..+4]   dimension (u32 LE)
//! [..]     components (LE f32 or bf16)
//! ```

use half::bf16;
use tracing::debug;

use crate::error::{AlignError, CodecError, VectorError};
use crate::types::{LatentVector, ModelId, Precision};

const BLOB_MAGIC: [u8; 2] = *b"LV";
const BLOB_VERSION: u8 = 1;

/// Encodes and decodes [`LatentVector`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorCodec;

impl VectorCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encode a vector at the requested precision.
    ///
    /// # Errors
    /// - `CodecError::ValueOutOfRange` for NaN/Inf components, or finite
    ///   components that overflow bf16
    pub fn encode(&self, vector: &LatentVector, precision: Precision) -> Result<Vec<u8>, CodecError> {
        let id = vector.model_id().as_str().as_bytes();
        let body = encode_components(vector.components(), precision)?;

        let mut out = Vec::with_capacity(13 + id.len() + body.len());
        out.extend_from_slice(&BLOB_MAGIC);
        out.push(BLOB_VERSION);
        out.push(precision.tag());
        out.extend_from_slice(&vector.layer_depth().to_le_bytes());
        out.push(id.len() as u8);
        out.extend_from_slice(id);
        out.extend_from_slice(&(vector.dimension() as u32).to_le_bytes());
        out.extend_from_slice(&body);

        debug!(
            target: "codec::vector",
            dim = vector.dimension(),
            precision = %precision,
            bytes = out.len(),
            "Encoded latent vector"
        );
        Ok(out)
    }

    /// Decode a blob produced by [`encode`](Self::encode).
    ///
    /// # Errors
    /// `AlignError::InvalidVector` wrapping the codec or vector failure.
    pub fn decode(&self, bytes: &[u8]) -> Result<LatentVector, AlignError> {
        let mut cursor = Cursor::new(bytes);
        if cursor.take(2)? != BLOB_MAGIC {
            return Err(CodecError::BadMagic.into());
        }
        let version = cursor.u8()?;
        if version != BLOB_VERSION {
            return Err(CodecError::UnsupportedVersion(version).into());
        }
        let tag = cursor.u8()?;
        let precision = Precision::from_tag(tag).ok_or(CodecError::UnknownPrecision(tag))?;
        let layer_depth = cursor.u32()?;
        let id_len = cursor.u8()? as usize;
        let id_bytes = cursor.take(id_len)?;
        let id = std::str::from_utf8(id_bytes)
            .map_err(|e| CodecError::InvalidHeader(format!("model id is not UTF-8: {}", e)))?;
        let model_id = ModelId::new(id)?;
        let dim = cursor.u32()? as usize;
        let body = cursor.rest();
        let expected = dim * precision.bytes_per_component();
        if body.len() != expected {
            return Err(CodecError::Truncated {
                expected,
                actual: body.len(),
            }
            .into());
        }
        let components = decode_components(body, precision)?;
        Ok(LatentVector::with_precision(
            model_id,
            layer_depth,
            precision,
            components,
        )?)
    }
}

/// Encode raw components without any framing.
pub fn encode_components(components: &[f32], precision: Precision) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(components.len() * precision.bytes_per_component());
    for (index, &value) in components.iter().enumerate() {
        if !value.is_finite() {
            return Err(CodecError::ValueOutOfRange { index, value });
        }
        match precision {
            Precision::Full => out.extend_from_slice(&value.to_le_bytes()),
            Precision::Reduced => {
                let reduced = bf16::from_f32(value);
                if !reduced.is_finite() {
                    return Err(CodecError::ValueOutOfRange { index, value });
                }
                out.extend_from_slice(&reduced.to_le_bytes());
            }
        }
    }
    Ok(out)
}

/// Decode raw components produced by [`encode_components`].
pub fn decode_components(bytes: &[u8], precision: Precision) -> Result<Vec<f32>, CodecError> {
    let width = precision.bytes_per_component();
    if bytes.len() % width != 0 {
        return Err(CodecError::BodyLength {
            len: bytes.len(),
            bytes_per_component: width,
        });
    }
    let components = match precision {
        Precision::Full => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        Precision::Reduced => bytes
            .chunks_exact(2)
            .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
    };
    Ok(components)
}

/// Minimal bounds-checked reader.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(CodecError::Truncated {
                expected: end,
                actual: self.bytes.len(),
            });
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        slice
    }
}
