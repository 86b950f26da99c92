use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tessera_crypto::hash_value;
use tessera_types::{Digest, JobId, PeerId, Proof, Receipt, ReceiptId, Result};
use tracing::info;

/// Preimage of the receipt commitment. Hashed canonically, so field
/// declaration order here does not matter.
#[derive(Serialize)]
struct CommitmentPreimage<'a> {
    input_hash: &'a Digest,
    output_hash: &'a Digest,
    logs_hash: &'a Digest,
    timestamp: i64,
}

/// Binds a job's input, output and logs into a tamper-evident receipt.
#[derive(Default)]
pub struct ReceiptGenerator {
    nonce: AtomicU64,
}

impl ReceiptGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn generate(
        &self,
        job_id: &JobId,
        input: &Value,
        output: &Value,
        logs: &[String],
        execution_time_ms: u64,
        peer_id: &PeerId,
        block_height_anchor: Option<u64>,
        proof: Option<&Proof>,
    ) -> Result<Receipt> {
        let input_hash = hash_value(input)?;
        let output_hash = hash_value(output)?;
        let logs_hash = hash_value(&logs)?;
        let timestamp = Utc::now().timestamp_millis();

        // Single-level commitment: the receipt covers exactly one job, so
        // there is no tree to build over multiple entries.
        let merkle_proof = hash_value(&CommitmentPreimage {
            input_hash: &input_hash,
            output_hash: &output_hash,
            logs_hash: &logs_hash,
            timestamp,
        })?;

        let receipt_id =
            ReceiptId::derive(&merkle_proof, self.nonce.fetch_add(1, Ordering::Relaxed));

        let receipt = Receipt {
            receipt_id,
            job_id: job_id.clone(),
            input_hash,
            output_hash,
            logs_hash,
            merkle_proof,
            timestamp,
            peer_id: peer_id.clone(),
            execution_time_ms,
            block_height_anchor,
            proof_blob: proof.map(|p| p.proof_blob.clone()),
            public_inputs_root: proof.map(|p| p.public_inputs_root),
            output_root: proof.map(|p| p.output_root),
            program_hash: proof.map(|p| p.program_hash),
        };

        info!(
            receipt = %receipt.receipt_id,
            job = %job_id,
            peer = %peer_id,
            proof_backed = receipt.is_proof_backed(),
            "Receipt generated"
        );
        Ok(receipt)
    }

    /// Local integrity check: recomputes the input/output hashes and compares
    /// them against the receipt. This detects tampering relative to the
    /// claimed input and output; whether the execution itself was correct is
    /// the proof backend's job.
    pub fn verify(receipt: &Receipt, input: &Value, output: &Value) -> Result<bool> {
        Ok(hash_value(input)? == receipt.input_hash
            && hash_value(output)? == receipt.output_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn generate(input: &Value, output: &Value) -> Receipt {
        ReceiptGenerator::new()
            .generate(
                &JobId::from("job-1"),
                input,
                output,
                &["step 1".to_string(), "step 2".to_string()],
                120,
                &PeerId::from("peer:exec"),
                None,
                None,
            )
            .unwrap()
    }

    #[test]
    fn test_receipt_integrity() {
        let input = json!({"a": 1});
        let output = json!({"b": 2});
        let receipt = generate(&input, &output);

        assert!(ReceiptGenerator::verify(&receipt, &input, &output).unwrap());
    }

    #[test]
    fn test_tampered_input_detected() {
        let input = json!({"a": 1});
        let output = json!({"b": 2});
        let receipt = generate(&input, &output);

        assert!(!ReceiptGenerator::verify(&receipt, &json!({"a": 999}), &output).unwrap());
        assert!(!ReceiptGenerator::verify(&receipt, &input, &json!({"b": 3})).unwrap());
    }

    #[test]
    fn test_identical_executions_differ_only_in_id() {
        let generator = ReceiptGenerator::new();
        let input = json!({"n": 7});
        let output = json!({"n": 49});
        let logs = vec!["squared".to_string()];
        let peer = PeerId::from("peer:exec");
        let job = JobId::from("job-1");

        let a = generator
            .generate(&job, &input, &output, &logs, 10, &peer, None, None)
            .unwrap();
        let mut b = generator
            .generate(&job, &input, &output, &logs, 10, &peer, None, None)
            .unwrap();

        assert_ne!(a.receipt_id, b.receipt_id);
        // Timestamps may straddle a millisecond boundary; align them before
        // comparing the rest of the record.
        b.timestamp = a.timestamp;
        b.merkle_proof = a.merkle_proof;
        b.receipt_id = a.receipt_id.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn test_proof_fields_copied_into_receipt() {
        use tessera_crypto::{hash_bytes, merkle_root};

        let input = json!({"x": 1});
        let output = json!({"y": 2});
        let digest = hash_bytes(b"program");
        let proof = Proof {
            proof_blob: "00ff".to_string(),
            public_inputs: vec![digest],
            public_inputs_root: merkle_root(&[digest]),
            output_root: digest,
            program_hash: digest,
        };

        let receipt = ReceiptGenerator::new()
            .generate(
                &JobId::from("job-zk"),
                &input,
                &output,
                &[],
                5,
                &PeerId::from("peer:exec"),
                Some(77),
                Some(&proof),
            )
            .unwrap();

        assert!(receipt.is_proof_backed());
        assert_eq!(receipt.proof_blob.as_deref(), Some("00ff"));
        assert_eq!(receipt.public_inputs_root, Some(proof.public_inputs_root));
        assert_eq!(receipt.block_height_anchor, Some(77));
    }
}
