use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tessera_crypto::hash_value;
use tessera_types::{Result, TesseraError};
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct ResourceLimits {
    pub memory_mb: u64,
    pub max_instructions: u64,
    pub timeout_ms: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mb: 256,
            max_instructions: 10_000_000,
            timeout_ms: 10_000,
        }
    }
}

/// What came out of running a program. `output` is present iff the run
/// succeeded; `error` iff it did not.
#[derive(Debug, Clone)]
pub struct SandboxOutcome {
    pub success: bool,
    pub output: Option<Value>,
    pub logs: Vec<String>,
    pub error: Option<String>,
}

impl SandboxOutcome {
    pub fn failed(error: impl Into<String>, logs: Vec<String>) -> Self {
        Self {
            success: false,
            output: None,
            logs,
            error: Some(error.into()),
        }
    }
}

/// The execution engine collaborator. The marketplace never inspects its
/// internals; it hands over a program reference, an input and limits, and
/// gets back output and logs.
#[async_trait]
pub trait ExecutionSandbox: Send + Sync {
    async fn run(&self, program_ref: &str, input: &Value, limits: &ResourceLimits)
        -> Result<SandboxOutcome>;
}

/// In-process sandbox with a small set of builtin programs. Backs the
/// loopback worker pool and the tests; a WASM or container engine slots in
/// behind the same trait.
#[derive(Default)]
pub struct LocalSandbox;

impl LocalSandbox {
    pub fn new() -> Self {
        Self
    }

    fn run_builtin(program_ref: &str, input: &Value) -> Result<SandboxOutcome> {
        let mut logs = vec![format!("program {} loaded", program_ref)];

        let output = match program_ref {
            "builtin:echo" => input.clone(),
            "builtin:hash-chain" => {
                // Iterated hash over the input, a cheap stand-in for real
                // compute with a verifiable fixed point.
                let mut digest = hash_value(input)?;
                for round in 0..4 {
                    digest = hash_value(&digest.to_hex())?;
                    logs.push(format!("round {} digest {}", round, digest));
                }
                json!({ "digest": digest.to_hex() })
            }
            "builtin:sum" => {
                let terms = match input.as_array() {
                    Some(terms) => terms,
                    None => {
                        return Ok(SandboxOutcome::failed("input must be an array", logs));
                    }
                };
                let mut sum = 0.0;
                for term in terms {
                    match term.as_f64() {
                        Some(n) => sum += n,
                        None => {
                            return Ok(SandboxOutcome::failed(
                                format!("non-numeric term {}", term),
                                logs,
                            ));
                        }
                    }
                }
                json!({ "sum": sum })
            }
            other => {
                return Ok(SandboxOutcome::failed(
                    format!("unknown program ref {}", other),
                    logs,
                ));
            }
        };

        logs.push("execution complete".to_string());
        Ok(SandboxOutcome {
            success: true,
            output: Some(output),
            logs,
            error: None,
        })
    }
}

#[async_trait]
impl ExecutionSandbox for LocalSandbox {
    async fn run(
        &self,
        program_ref: &str,
        input: &Value,
        limits: &ResourceLimits,
    ) -> Result<SandboxOutcome> {
        let program_ref = program_ref.to_string();
        let input = input.clone();
        let run = tokio::task::spawn_blocking(move || Self::run_builtin(&program_ref, &input));

        match timeout(Duration::from_millis(limits.timeout_ms), run).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => Err(TesseraError::Internal(format!(
                "sandbox task failed: {}",
                join_err
            ))),
            Err(_) => Ok(SandboxOutcome::failed(
                format!("execution exceeded {}ms", limits.timeout_ms),
                vec![],
            )),
        }
    }
}
