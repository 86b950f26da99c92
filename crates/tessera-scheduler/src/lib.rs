pub mod executor;
pub mod sandbox;
pub mod scheduler;
pub mod transport;

pub use executor::LocalExecutor;
pub use sandbox::{ExecutionSandbox, LocalSandbox, ResourceLimits, SandboxOutcome};
pub use scheduler::{JobScheduler, SchedulerConfig};
pub use transport::{ComputeResponse, JobEnvelope, LoopbackTransport, PeerInfo, PeerTransport};
