pub mod amount;
pub mod canonical_json;
pub mod digest;
pub mod error;
pub mod id;
pub mod job;
pub mod receipt;

pub use amount::Amount;
pub use digest::Digest;
pub use error::{Result, TesseraError};
pub use id::{CycleId, JobId, PeerId, ReceiptId, RequestId};
pub use job::{ExecutionResult, Job, JobOptions};
pub use receipt::{MiningClaim, Proof, Receipt, Verification};
