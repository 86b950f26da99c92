//! Content hashing and Merkle root computation.
//!
//! Every economic decision downstream (payment, slashing) is gated on these
//! digests being unforgeable, so all hashing is BLAKE3 over canonical bytes.

pub mod hashing;
pub mod merkle;

pub use hashing::{hash_bytes, hash_concat, hash_value};
pub use merkle::merkle_root;
