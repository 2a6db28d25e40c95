//! Signed, checksummed packet framing for aligned vectors.
//!
//! # Header layout (190 bytes, little-endian)
//!
//! ```text
//! [0..4]     magic "LAPK"
//! [4]        format version (1)
//! [5]        compression tag (0 = full, 1 = reduced)
//! [6..10]    layer depth (u32)
//! [10..42]   source model id, zero padded
//! [42..74]   target model id, zero padded
//! [74..82]   timestamp (ms since Unix epoch)
//! [82..90]   sequence number
//! [90..94]   body length in bytes
//! [94..126]  SHA-256 of body
//! [126..190] Ed25519 signature over bytes [0..126]
//! ```
//!
//! The body carries the raw component encoding of a vector that already
//! lives in the target model's space. The signature covers the checksum,
//! which in turn covers the body.

use chrono::Utc;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::vector_codec::{decode_components, encode_components};
use crate::error::{AlignError, CodecError};
use crate::types::{LatentVector, ModelId, Precision, MAX_MODEL_ID_LEN};

pub const PACKET_MAGIC: [u8; 4] = *b"LAPK";
pub const PACKET_VERSION: u8 = 1;
pub const CHECKSUM_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

const SIGNED_PREFIX: usize = 4 + 1 + 1 + 4 + MAX_MODEL_ID_LEN * 2 + 8 + 8 + 4 + CHECKSUM_SIZE;

/// Total header size in bytes.
pub const HEADER_SIZE: usize = SIGNED_PREFIX + SIGNATURE_SIZE;

/// Routing metadata carried ahead of every body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub source_model: ModelId,
    pub target_model: ModelId,
    pub layer_depth: u32,
    pub compression: Precision,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub sequence_number: u64,
}

impl PacketHeader {
    /// Header stamped with the current time.
    pub fn new(
        source_model: ModelId,
        target_model: ModelId,
        layer_depth: u32,
        compression: Precision,
        sequence_number: u64,
    ) -> Self {
        Self {
            source_model,
            target_model,
            layer_depth,
            compression,
            timestamp: Utc::now().timestamp_millis().max(0) as u64,
            sequence_number,
        }
    }
}

/// Signs outgoing packets with an Ed25519 key.
pub struct PacketSigner {
    key: SigningKey,
}

impl PacketSigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Deterministic signer from a 32-byte secret seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(seed))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for PacketSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketSigner")
            .field("verifying_key", &self.key.verifying_key())
            .finish_non_exhaustive()
    }
}

/// A framed packet: header, digest, signature and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: PacketHeader,
    checksum: [u8; CHECKSUM_SIZE],
    signature: [u8; SIGNATURE_SIZE],
    body: Vec<u8>,
}

impl Packet {
    /// Frame an already-encoded body.
    ///
    /// # Errors
    /// - `CodecError::BodyLength` if the body is empty or not a whole number
    ///   of components at the header's compression
    pub fn frame(
        header: PacketHeader,
        body: Vec<u8>,
        signer: &PacketSigner,
    ) -> Result<Self, CodecError> {
        let width = header.compression.bytes_per_component();
        if body.is_empty() || body.len() % width != 0 || body.len() > u32::MAX as usize {
            return Err(CodecError::BodyLength {
                len: body.len(),
                bytes_per_component: width,
            });
        }
        let checksum: [u8; CHECKSUM_SIZE] = Sha256::digest(&body).into();
        let prefix = signed_prefix(&header, body.len() as u32, &checksum);
        let signature = signer.sign(&prefix);

        debug!(
            target: "codec::packet",
            source = %header.source_model,
            target_model = %header.target_model,
            seq = header.sequence_number,
            body_len = body.len(),
            "Framed packet"
        );
        Ok(Self {
            header,
            checksum,
            signature,
            body,
        })
    }

    /// Encode `vector` (already in `target`'s space) and frame it.
    ///
    /// The header's target model is the vector's model id.
    pub fn frame_vector(
        vector: &LatentVector,
        source_model: ModelId,
        sequence_number: u64,
        compression: Precision,
        signer: &PacketSigner,
    ) -> Result<Self, CodecError> {
        let body = encode_components(vector.components(), compression)?;
        let header = PacketHeader::new(
            source_model,
            vector.model_id().clone(),
            vector.layer_depth(),
            compression,
            sequence_number,
        );
        Self::frame(header, body, signer)
    }

    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn checksum(&self) -> &[u8; CHECKSUM_SIZE] {
        &self.checksum
    }

    /// Serialize header and body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = signed_prefix(&self.header, self.body.len() as u32, &self.checksum);
        out.reserve(SIGNATURE_SIZE + self.body.len());
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.body);
        out
    }

    /// Check the signature against `key`.
    ///
    /// # Errors
    /// `CodecError::SignatureInvalid` on any mismatch.
    pub fn verify_signature(&self, key: &VerifyingKey) -> Result<(), CodecError> {
        let prefix = signed_prefix(&self.header, self.body.len() as u32, &self.checksum);
        let signature = Signature::from_bytes(&self.signature);
        key.verify(&prefix, &signature).map_err(|_| {
            warn!(
                target: "codec::packet",
                seq = self.header.sequence_number,
                "Packet signature rejected"
            );
            CodecError::SignatureInvalid
        })
    }

    /// Decode the body into a vector in the target model's space.
    pub fn latent_vector(&self) -> Result<LatentVector, AlignError> {
        let components = decode_components(&self.body, self.header.compression)?;
        Ok(LatentVector::with_precision(
            self.header.target_model.clone(),
            self.header.layer_depth,
            self.header.compression,
            components,
        )?)
    }
}

/// Parse and integrity-check a packet.
///
/// Fails closed: any malformed field or checksum mismatch rejects the whole
/// packet. Signature verification is a separate step
/// ([`Packet::verify_signature`]) because it needs the sender's key.
pub fn parse_packet(bytes: &[u8]) -> Result<Packet, CodecError> {
    if bytes.len() < HEADER_SIZE {
        return Err(CodecError::Truncated {
            expected: HEADER_SIZE,
            actual: bytes.len(),
        });
    }
    if bytes[0..4] != PACKET_MAGIC {
        return Err(CodecError::BadMagic);
    }
    if bytes[4] != PACKET_VERSION {
        return Err(CodecError::UnsupportedVersion(bytes[4]));
    }
    let compression = Precision::from_tag(bytes[5]).ok_or(CodecError::UnknownPrecision(bytes[5]))?;
    let layer_depth = read_u32(&bytes[6..10]);
    let id_end = 10 + MAX_MODEL_ID_LEN;
    let source_model = read_model_id(&bytes[10..id_end])?;
    let target_model = read_model_id(&bytes[id_end..id_end + MAX_MODEL_ID_LEN])?;
    let mut pos = id_end + MAX_MODEL_ID_LEN;
    let timestamp = read_u64(&bytes[pos..pos + 8]);
    pos += 8;
    let sequence_number = read_u64(&bytes[pos..pos + 8]);
    pos += 8;
    let body_len = read_u32(&bytes[pos..pos + 4]) as usize;
    pos += 4;
    let mut checksum = [0u8; CHECKSUM_SIZE];
    checksum.copy_from_slice(&bytes[pos..pos + CHECKSUM_SIZE]);
    pos += CHECKSUM_SIZE;
    let mut signature = [0u8; SIGNATURE_SIZE];
    signature.copy_from_slice(&bytes[pos..pos + SIGNATURE_SIZE]);

    if layer_depth == 0 {
        return Err(CodecError::InvalidHeader("layer depth must be >= 1".into()));
    }
    let body = &bytes[HEADER_SIZE..];
    if body.len() != body_len {
        return Err(CodecError::Truncated {
            expected: HEADER_SIZE + body_len,
            actual: bytes.len(),
        });
    }
    let width = compression.bytes_per_component();
    if body.is_empty() || body.len() % width != 0 {
        return Err(CodecError::BodyLength {
            len: body.len(),
            bytes_per_component: width,
        });
    }
    let digest: [u8; CHECKSUM_SIZE] = Sha256::digest(body).into();
    if digest != checksum {
        warn!(
            target: "codec::packet",
            seq = sequence_number,
            "Packet checksum mismatch"
        );
        return Err(CodecError::ChecksumMismatch);
    }

    Ok(Packet {
        header: PacketHeader {
            source_model,
            target_model,
            layer_depth,
            compression,
            timestamp,
            sequence_number,
        },
        checksum,
        signature,
        body: body.to_vec(),
    })
}

fn signed_prefix(header: &PacketHeader, body_len: u32, checksum: &[u8; CHECKSUM_SIZE]) -> Vec<u8> {
    let mut out = Vec::with_capacity(SIGNED_PREFIX);
    out.extend_from_slice(&PACKET_MAGIC);
    out.push(PACKET_VERSION);
    out.push(header.compression.tag());
    out.extend_from_slice(&header.layer_depth.to_le_bytes());
    write_model_id(&mut out, &header.source_model);
    write_model_id(&mut out, &header.target_model);
    out.extend_from_slice(&header.timestamp.to_le_bytes());
    out.extend_from_slice(&header.sequence_number.to_le_bytes());
    out.extend_from_slice(&body_len.to_le_bytes());
    out.extend_from_slice(checksum);
    out
}

fn write_model_id(out: &mut Vec<u8>, id: &ModelId) {
    let mut field = [0u8; MAX_MODEL_ID_LEN];
    let raw = id.as_str().as_bytes();
    field[..raw.len()].copy_from_slice(raw);
    out.extend_from_slice(&field);
}

fn read_model_id(field: &[u8]) -> Result<ModelId, CodecError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    if field[end..].iter().any(|&b| b != 0) {
        return Err(CodecError::InvalidHeader("model id padding is not zero".into()));
    }
    let id = std::str::from_utf8(&field[..end])
        .map_err(|e| CodecError::InvalidHeader(format!("model id is not UTF-8: {}", e)))?;
    ModelId::new(id).map_err(|e| CodecError::InvalidHeader(e.to_string()))
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn read_u64(b: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&b[..8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> PacketSigner {
        PacketSigner::from_seed(&[7u8; 32])
    }

    fn sample_packet() -> Packet {
        let v = LatentVector::new(
            ModelId::new("llama-3-8b").unwrap(),
            16,
            (0..32).map(|i| i as f32 * 0.25 - 4.0).collect(),
        )
        .unwrap();
        Packet::frame_vector(&v, ModelId::new("mistral-7b").unwrap(), 9, Precision::Reduced, &signer())
            .unwrap()
    }

    #[test]
    fn test_header_size_constant() {
        assert_eq!(HEADER_SIZE, 190);
        let packet = sample_packet();
        assert_eq!(packet.to_bytes().len(), HEADER_SIZE + 64);
    }

    #[test]
    fn test_parse_roundtrip_and_verify() {
        let packet = sample_packet();
        let parsed = parse_packet(&packet.to_bytes()).expect("parse");
        assert_eq!(parsed, packet);
        parsed
            .verify_signature(&signer().verifying_key())
            .expect("signature verifies");
        let v = parsed.latent_vector().unwrap();
        assert_eq!(v.model_id().as_str(), "llama-3-8b");
        assert_eq!(v.dimension(), 32);
        assert_eq!(v.components()[0], -4.0);
    }

    #[test]
    fn test_body_tamper_fails_checksum() {
        let mut bytes = sample_packet().to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(parse_packet(&bytes), Err(CodecError::ChecksumMismatch)));
    }

    #[test]
    fn test_header_tamper_fails_signature() {
        let mut bytes = sample_packet().to_bytes();
        // sequence number
        bytes[82] ^= 0xFF;
        let parsed = parse_packet(&bytes).expect("checksum still valid");
        assert!(matches!(
            parsed.verify_signature(&signer().verifying_key()),
            Err(CodecError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_wrong_key_fails_signature() {
        let packet = sample_packet();
        let other = PacketSigner::from_seed(&[8u8; 32]);
        assert!(packet.verify_signature(&other.verifying_key()).is_err());
    }

    #[test]
    fn test_truncated_and_bad_magic() {
        let bytes = sample_packet().to_bytes();
        assert!(matches!(
            parse_packet(&bytes[..HEADER_SIZE - 1]),
            Err(CodecError::Truncated { .. })
        ));
        assert!(matches!(
            parse_packet(&bytes[..bytes.len() - 2]),
            Err(CodecError::Truncated { .. })
        ));
        let mut bad = bytes.clone();
        bad[0] = b'X';
        assert!(matches!(parse_packet(&bad), Err(CodecError::BadMagic)));
    }

    #[test]
    fn test_frame_rejects_ragged_body() {
        let header = PacketHeader::new(
            ModelId::new("a").unwrap(),
            ModelId::new("b").unwrap(),
            1,
            Precision::Full,
            0,
        );
        assert!(Packet::frame(header.clone(), vec![0u8; 6], &signer()).is_err());
        assert!(Packet::frame(header, Vec::new(), &signer()).is_err());
    }
}
