//! Codec edge cases over realistic activation data.
//!
//! Activations are drawn from a seeded standard normal so every run sees
//! the same vectors. Each test prints before/after state as evidence.

use latent_align_core::codec::{parse_packet, Packet, PacketSigner, VectorCodec, HEADER_SIZE};
use latent_align_core::error::CodecError;
use latent_align_core::{math, LatentVector, ModelId, Precision};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

fn activations(seed: u64, dim: usize) -> Vec<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..dim)
        .map(|_| -> f32 { StandardNormal.sample(&mut rng) })
        .collect()
}

fn vector(dim: usize) -> LatentVector {
    LatentVector::new(ModelId::new("llama-3-8b").unwrap(), 24, activations(42, dim)).unwrap()
}

/// Reduced precision keeps every component within 0.5% of the original.
#[test]
fn edge_case_reduced_roundtrip_within_half_percent() {
    println!("\n=== EDGE CASE: Reduced precision roundtrip, dim 4096 ===");
    let codec = VectorCodec::new();
    let original = vector(4096);
    println!("BEFORE: l2 norm = {:.6}", original.l2_norm());

    let bytes = codec.encode(&original, Precision::Reduced).expect("encode");
    let decoded = codec.decode(&bytes).expect("decode");
    println!("AFTER: {} bytes, l2 norm = {:.6}", bytes.len(), decoded.l2_norm());

    let mut worst = 0.0f32;
    for (a, b) in original.components().iter().zip(decoded.components()) {
        if *a != 0.0 {
            worst = worst.max(((a - b) / a).abs());
        }
    }
    println!("  - worst relative error: {:.6}", worst);
    assert!(worst <= 0.005);

    let cos = math::cosine_similarity(original.components(), decoded.components()).unwrap();
    assert!(cos > 0.99999);
    println!("PASSED: reduced precision bounded");
}

/// Values outside the bf16 range are rejected instead of saturating.
#[test]
fn edge_case_reduced_overflow_rejected() {
    let codec = VectorCodec::new();
    let v = LatentVector::new(ModelId::new("m").unwrap(), 1, vec![1.0, f32::MAX, 2.0]).unwrap();
    match codec.encode(&v, Precision::Reduced) {
        Err(CodecError::ValueOutOfRange { index, .. }) => assert_eq!(index, 1),
        other => panic!("expected ValueOutOfRange, got {:?}", other),
    }
}

/// Every single-bit flip in the body is caught by the checksum.
#[test]
fn edge_case_every_body_bit_flip_detected() {
    println!("\n=== EDGE CASE: Body bit flips ===");
    let signer = PacketSigner::from_seed(&[1u8; 32]);
    let v = vector(16);
    let packet = Packet::frame_vector(
        &v,
        ModelId::new("mistral-7b").unwrap(),
        1,
        Precision::Full,
        &signer,
    )
    .unwrap();
    let bytes = packet.to_bytes();
    let body_bits = (bytes.len() - HEADER_SIZE) * 8;
    println!("BEFORE: {} body bits", body_bits);

    for bit in 0..body_bits {
        let mut tampered = bytes.clone();
        tampered[HEADER_SIZE + bit / 8] ^= 1 << (bit % 8);
        assert!(
            matches!(parse_packet(&tampered), Err(CodecError::ChecksumMismatch)),
            "bit {} not detected",
            bit
        );
    }
    println!("AFTER: all {} flips rejected", body_bits);
}

/// Signed packet survives the wire and decodes to the reduced-precision vector.
#[test]
fn edge_case_packet_carries_reduced_vector() {
    let signer = PacketSigner::from_seed(&[3u8; 32]);
    let codec = VectorCodec::new();
    let v = vector(256);
    let packet = Packet::frame_vector(
        &v,
        ModelId::new("mistral-7b").unwrap(),
        77,
        Precision::Reduced,
        &signer,
    )
    .unwrap();

    let parsed = parse_packet(&packet.to_bytes()).unwrap();
    parsed.verify_signature(&signer.verifying_key()).unwrap();
    assert_eq!(parsed.header().sequence_number, 77);
    assert_eq!(parsed.header().source_model.as_str(), "mistral-7b");

    let via_packet = parsed.latent_vector().unwrap();
    let via_codec = codec
        .decode(&codec.encode(&v, Precision::Reduced).unwrap())
        .unwrap();
    assert_eq!(via_packet.components(), via_codec.components());
}
