use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_crypto::{hash_bytes, hash_concat, hash_value, merkle_root};
use tessera_types::canonical_json::to_canonical_json;
use tessera_types::{Digest, Proof, Receipt, Result, TesseraError, Verification};

/// Produces and verifies proofs that a receipt's claimed output follows
/// from its input under a given program.
///
/// Verification is a pure function of the proof and the expected output: it
/// must not consult mutable state, and content-level corruption (bad blob,
/// mismatched hashes) is reported as `valid: false`, never as an error.
pub trait ProofBackend: Send + Sync {
    fn prove(
        &self,
        program: &[u8],
        input: &Value,
        output: &Value,
        execution_trace: Option<&[String]>,
    ) -> Result<Proof>;

    fn verify(&self, proof: &Proof, expected_output: &Value) -> Result<Verification>;

    /// Verifies the proof fields embedded in a receipt against the receipt's
    /// own hashes. Used at record time, when the raw output bytes are no
    /// longer at hand. Fails with `ProofStructure` if the receipt claims
    /// proof backing but lacks the proof fields.
    fn verify_receipt(&self, receipt: &Receipt) -> Result<Verification>;
}

/// Contents of the mock backend's proof blob: the three public digests plus
/// a commitment over them, hex-encoded canonical JSON.
#[derive(Serialize, Deserialize)]
struct BlobPayload {
    program_digest: Digest,
    input_hash: Digest,
    output_hash: Digest,
    commitment: Digest,
}

impl BlobPayload {
    fn encode(&self) -> Result<String> {
        Ok(hex::encode(to_canonical_json(self)?))
    }

    fn decode(blob: &str) -> Option<Self> {
        let bytes = hex::decode(blob).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// Hash-commitment proof backend for development and testing.
///
/// The blob commits to the public inputs with BLAKE3, so proofs are
/// self-verifying, but nothing here is zero-knowledge: anyone holding the
/// input can reproduce the blob. Production deployments plug a real
/// zk-SNARK/STARK prover and verifier in behind the same trait; the
/// structural checks in `verify` stay identical.
#[derive(Default)]
pub struct HashCommitmentBackend;

impl HashCommitmentBackend {
    pub fn new() -> Self {
        Self
    }

    fn commitment(program_digest: &Digest, input_hash: &Digest, output_hash: &Digest) -> Digest {
        hash_concat(&hash_concat(program_digest, input_hash), output_hash)
    }
}

impl ProofBackend for HashCommitmentBackend {
    fn prove(
        &self,
        program: &[u8],
        input: &Value,
        output: &Value,
        _execution_trace: Option<&[String]>,
    ) -> Result<Proof> {
        let program_digest = hash_bytes(program);
        let input_hash = hash_value(input)?;
        let output_hash = hash_value(output)?;

        let payload = BlobPayload {
            program_digest,
            input_hash,
            output_hash,
            commitment: Self::commitment(&program_digest, &input_hash, &output_hash),
        };

        let public_inputs = vec![input_hash, output_hash, program_digest];
        Ok(Proof {
            proof_blob: payload.encode()?,
            public_inputs_root: merkle_root(&public_inputs),
            output_root: merkle_root(&[output_hash]),
            program_hash: hash_concat(&program_digest, &input_hash),
            public_inputs,
        })
    }

    fn verify(&self, proof: &Proof, expected_output: &Value) -> Result<Verification> {
        let payload = match BlobPayload::decode(&proof.proof_blob) {
            Some(payload) => payload,
            None => return Ok(Verification::rejected("malformed proof blob")),
        };

        if proof.public_inputs.len() != 3 {
            return Ok(Verification::rejected("malformed public inputs"));
        }

        // The output hash is recomputed here, independently of anything the
        // prover embedded.
        let expected_hash = hash_value(expected_output)?;
        if payload.output_hash != expected_hash || proof.public_inputs[1] != expected_hash {
            return Ok(Verification::rejected("output hash mismatch"));
        }

        if merkle_root(&proof.public_inputs) != proof.public_inputs_root {
            return Ok(Verification::rejected("public inputs root mismatch"));
        }

        if merkle_root(&[expected_hash]) != proof.output_root {
            return Ok(Verification::rejected("output root mismatch"));
        }

        if hash_concat(&payload.program_digest, &payload.input_hash) != proof.program_hash {
            return Ok(Verification::rejected("program hash mismatch"));
        }

        // Backend step. A real ZK backend would run its verifier here; this
        // one recomputes the blob commitment.
        if Self::commitment(&payload.program_digest, &payload.input_hash, &payload.output_hash)
            != payload.commitment
        {
            return Ok(Verification::rejected("proof commitment mismatch"));
        }

        Ok(Verification::ok())
    }

    fn verify_receipt(&self, receipt: &Receipt) -> Result<Verification> {
        let (blob, public_inputs_root, output_root, program_hash) = match (
            &receipt.proof_blob,
            receipt.public_inputs_root,
            receipt.output_root,
            receipt.program_hash,
        ) {
            (Some(blob), Some(pir), Some(or), Some(ph)) => (blob, pir, or, ph),
            _ => {
                return Err(TesseraError::ProofStructure(
                    "receipt is missing proof fields".to_string(),
                ))
            }
        };

        let payload = match BlobPayload::decode(blob) {
            Some(payload) => payload,
            None => return Ok(Verification::rejected("malformed proof blob")),
        };

        if payload.input_hash != receipt.input_hash {
            return Ok(Verification::rejected("input hash mismatch"));
        }
        if payload.output_hash != receipt.output_hash {
            return Ok(Verification::rejected("output hash mismatch"));
        }

        let public_inputs = [receipt.input_hash, receipt.output_hash, payload.program_digest];
        if merkle_root(&public_inputs) != public_inputs_root {
            return Ok(Verification::rejected("public inputs root mismatch"));
        }
        if merkle_root(&[receipt.output_hash]) != output_root {
            return Ok(Verification::rejected("output root mismatch"));
        }
        if hash_concat(&payload.program_digest, &payload.input_hash) != program_hash {
            return Ok(Verification::rejected("program hash mismatch"));
        }
        if Self::commitment(&payload.program_digest, &payload.input_hash, &payload.output_hash)
            != payload.commitment
        {
            return Ok(Verification::rejected("proof commitment mismatch"));
        }

        Ok(Verification::ok())
    }
}
