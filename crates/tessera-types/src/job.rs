use crate::id::{JobId, PeerId};
use crate::receipt::Receipt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A unit of requested work. Created by a requester and consumed exactly
/// once by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    /// Identifier of the executable module to run, resolved by the sandbox.
    pub program_ref: String,
    pub input: Value,
    #[serde(default)]
    pub options: JobOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOptions {
    pub memory_limit_mb: Option<u64>,
    pub max_instructions: Option<u64>,
    pub timeout_ms: Option<u64>,
    /// Ask the executing peer to attach a tamper-evident receipt.
    #[serde(default)]
    pub require_receipt: bool,
    /// Bypass peer ranking and dispatch to this peer.
    pub target_peer_id: Option<PeerId>,
}

/// Outcome of one job attempt. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Option<Value>,
    pub logs: Vec<String>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    /// Identity of the peer that executed the job.
    pub peer_id: PeerId,
    pub receipt: Option<Receipt>,
}
