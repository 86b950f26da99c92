pub mod backend;
pub mod generator;

pub use backend::{HashCommitmentBackend, ProofBackend};
pub use generator::ReceiptGenerator;
