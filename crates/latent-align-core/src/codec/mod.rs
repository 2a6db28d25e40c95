//! Wire codec for latent vectors.
//!
//! | Precision | Bytes/component | Compression | Max relative error |
//! |-----------|-----------------|-------------|--------------------|
//! | Full (f32) | 4 | 1x | 0 |
//! | Reduced (bf16) | 2 | 2x | 2^-9 (~0.2%) |
//!
//! [`VectorCodec`] produces self-describing vector blobs; [`packet`] frames
//! raw component bodies behind a fixed-size, checksummed and signed header.

pub mod packet;
mod vector_codec;

pub use packet::{
    parse_packet, Packet, PacketHeader, PacketSigner, CHECKSUM_SIZE, HEADER_SIZE, PACKET_MAGIC,
    PACKET_VERSION, SIGNATURE_SIZE,
};
pub use vector_codec::{decode_components, encode_components, VectorCodec};
