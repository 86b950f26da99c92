use crate::sandbox::{ExecutionSandbox, ResourceLimits};
use crate::transport::{ComputeResponse, JobEnvelope};
use std::sync::Arc;
use std::time::Instant;
use tessera_receipts::{ProofBackend, ReceiptGenerator};
use tessera_types::{ExecutionResult, Job, PeerId, Receipt};
use tracing::{info, warn};

/// One executing peer: a sandbox plus the receipt/proof machinery that turns
/// a sandbox run into a verifiable `ExecutionResult`.
pub struct LocalExecutor {
    peer_id: PeerId,
    compute_score: f64,
    sandbox: Arc<dyn ExecutionSandbox>,
    receipts: Arc<ReceiptGenerator>,
    proof_backend: Option<Arc<dyn ProofBackend>>,
    default_limits: ResourceLimits,
}

impl LocalExecutor {
    pub fn new(
        peer_id: PeerId,
        compute_score: f64,
        sandbox: Arc<dyn ExecutionSandbox>,
        receipts: Arc<ReceiptGenerator>,
        proof_backend: Option<Arc<dyn ProofBackend>>,
    ) -> Self {
        Self {
            peer_id,
            compute_score,
            sandbox,
            receipts,
            proof_backend,
            default_limits: ResourceLimits::default(),
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn compute_score(&self) -> f64 {
        self.compute_score
    }

    fn limits_for(&self, job: &Job) -> ResourceLimits {
        ResourceLimits {
            memory_mb: job
                .options
                .memory_limit_mb
                .unwrap_or(self.default_limits.memory_mb),
            max_instructions: job
                .options
                .max_instructions
                .unwrap_or(self.default_limits.max_instructions),
            timeout_ms: job
                .options
                .timeout_ms
                .unwrap_or(self.default_limits.timeout_ms),
        }
    }

    pub async fn execute(&self, envelope: JobEnvelope) -> ComputeResponse {
        let JobEnvelope { request_id, job } = envelope;
        let limits = self.limits_for(&job);
        let start = Instant::now();

        info!(
            request = %request_id,
            job = %job.job_id,
            program = %job.program_ref,
            "Executing job"
        );

        let outcome = self.sandbox.run(&job.program_ref, &job.input, &limits).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(outcome) if outcome.success => {
                let output = outcome.output.unwrap_or(serde_json::Value::Null);
                match self.attach_receipt(&job, &output, &outcome.logs, execution_time_ms) {
                    Ok(receipt) => ExecutionResult {
                        success: true,
                        output: Some(output),
                        logs: outcome.logs,
                        error: None,
                        execution_time_ms,
                        peer_id: self.peer_id.clone(),
                        receipt,
                    },
                    Err(e) => {
                        warn!(job = %job.job_id, error = %e, "Receipt generation failed");
                        ExecutionResult {
                            success: false,
                            output: None,
                            logs: outcome.logs,
                            error: Some(format!("receipt generation failed: {}", e)),
                            execution_time_ms,
                            peer_id: self.peer_id.clone(),
                            receipt: None,
                        }
                    }
                }
            }
            Ok(outcome) => ExecutionResult {
                success: false,
                output: None,
                logs: outcome.logs,
                error: outcome.error,
                execution_time_ms,
                peer_id: self.peer_id.clone(),
                receipt: None,
            },
            Err(e) => ExecutionResult {
                success: false,
                output: None,
                logs: vec![],
                error: Some(e.to_string()),
                execution_time_ms,
                peer_id: self.peer_id.clone(),
                receipt: None,
            },
        };

        ComputeResponse { request_id, result }
    }

    /// Builds the receipt (and proof, when a backend is wired) for a
    /// successful run. Returns `None` when the job did not ask for one.
    fn attach_receipt(
        &self,
        job: &Job,
        output: &serde_json::Value,
        logs: &[String],
        execution_time_ms: u64,
    ) -> tessera_types::Result<Option<Receipt>> {
        if !job.options.require_receipt {
            return Ok(None);
        }

        let proof = match &self.proof_backend {
            Some(backend) => Some(backend.prove(
                job.program_ref.as_bytes(),
                &job.input,
                output,
                Some(logs),
            )?),
            None => None,
        };

        let receipt = self.receipts.generate(
            &job.job_id,
            &job.input,
            output,
            logs,
            execution_time_ms,
            &self.peer_id,
            None,
            proof.as_ref(),
        )?;
        Ok(Some(receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::LocalSandbox;
    use serde_json::json;
    use tessera_receipts::HashCommitmentBackend;
    use tessera_types::{JobId, JobOptions, RequestId};

    fn executor(proof: bool) -> LocalExecutor {
        LocalExecutor::new(
            PeerId::from("peer:worker"),
            50.0,
            Arc::new(LocalSandbox::new()),
            Arc::new(ReceiptGenerator::new()),
            proof.then(|| Arc::new(HashCommitmentBackend::new()) as Arc<dyn ProofBackend>),
        )
    }

    fn envelope(require_receipt: bool) -> JobEnvelope {
        JobEnvelope {
            request_id: RequestId::from("req:test"),
            job: Job {
                job_id: JobId::from("job-1"),
                program_ref: "builtin:echo".to_string(),
                input: json!({"v": 42}),
                options: JobOptions {
                    require_receipt,
                    ..Default::default()
                },
            },
        }
    }

    #[tokio::test]
    async fn test_successful_run_without_receipt() {
        let response = executor(false).execute(envelope(false)).await;

        assert!(response.result.success);
        assert_eq!(response.result.output, Some(json!({"v": 42})));
        assert!(response.result.receipt.is_none());
        assert_eq!(response.result.peer_id.as_str(), "peer:worker");
    }

    #[tokio::test]
    async fn test_receipt_attached_when_required() {
        let response = executor(false).execute(envelope(true)).await;

        let receipt = response.result.receipt.expect("receipt required");
        assert!(!receipt.is_proof_backed());
        assert_eq!(receipt.job_id.as_str(), "job-1");
    }

    #[tokio::test]
    async fn test_proof_backed_receipt_verifies() {
        let response = executor(true).execute(envelope(true)).await;

        let receipt = response.result.receipt.expect("receipt required");
        assert!(receipt.is_proof_backed());

        let backend = HashCommitmentBackend::new();
        let verification = backend.verify_receipt(&receipt).unwrap();
        assert!(verification.valid, "rejected: {:?}", verification.reason);
    }

    #[tokio::test]
    async fn test_failed_run_reports_error() {
        let mut envelope = envelope(false);
        envelope.job.program_ref = "builtin:missing".to_string();

        let response = executor(false).execute(envelope).await;
        assert!(!response.result.success);
        assert!(response.result.output.is_none());
        assert!(response.result.error.is_some());
    }
}
