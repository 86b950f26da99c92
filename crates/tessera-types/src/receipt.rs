use crate::amount::Amount;
use crate::digest::Digest;
use crate::id::{CycleId, JobId, PeerId, ReceiptId};
use serde::{Deserialize, Serialize};

/// Tamper-evident record binding one execution's input, output and logs to
/// the peer that produced it. Immutable once created, retained for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub receipt_id: ReceiptId,
    pub job_id: JobId,
    pub input_hash: Digest,
    pub output_hash: Digest,
    pub logs_hash: Digest,
    /// Single-level commitment over the three hashes and the timestamp. The
    /// receipt binds exactly one job, so no deeper tree is needed.
    pub merkle_proof: Digest,
    /// Milliseconds since epoch.
    pub timestamp: i64,
    pub peer_id: PeerId,
    pub execution_time_ms: u64,
    pub block_height_anchor: Option<u64>,
    // Proof backing, present when the executor attached a proof.
    pub proof_blob: Option<String>,
    pub public_inputs_root: Option<Digest>,
    pub output_root: Option<Digest>,
    pub program_hash: Option<Digest>,
}

impl Receipt {
    pub fn is_proof_backed(&self) -> bool {
        self.proof_blob.is_some()
    }
}

/// Cryptographic artifact attesting that a receipt's output was derived
/// from its input under a given program. The blob layout is backend-defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proof {
    pub proof_blob: String,
    /// `[hash(input), hash(output), hash(program)]`.
    pub public_inputs: Vec<Digest>,
    pub public_inputs_root: Digest,
    pub output_root: Digest,
    pub program_hash: Digest,
}

/// Structured verification outcome. A malformed or mismatched proof yields
/// `valid: false` with a reason rather than an error, so batches of receipts
/// can be evaluated without one bad proof aborting the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub valid: bool,
    pub reason: Option<String>,
}

impl Verification {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Append-only settlement record for one reward claim. Never edited after
/// being written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningClaim {
    /// Settlement id minted for this claim batch.
    pub cycle_id: CycleId,
    pub provider_id: PeerId,
    /// The cycle batches this claim settles; each may be claimed only once.
    pub claimed_cycle_ids: Vec<CycleId>,
    pub cycles_claimed: u64,
    pub zk_proof_count: u64,
    pub reward: Amount,
    pub receipt_ids: Vec<ReceiptId>,
    /// Milliseconds since epoch.
    pub claimed_at: i64,
}
