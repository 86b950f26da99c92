use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id! {
    /// Opaque stable identity of a compute provider.
    PeerId
}

string_id! {
    /// Identity of a requested unit of work.
    JobId
}

string_id! {
    /// Identity of a billable cycle batch, both as claim input and as the
    /// settlement id minted for each recorded claim.
    CycleId
}

string_id! {
    /// Correlation id for one in-flight dispatch.
    RequestId
}

string_id! {
    /// Identity of an execution receipt.
    ReceiptId
}

impl RequestId {
    /// Derives a fresh correlation id from the job identity and a
    /// per-scheduler nonce.
    pub fn derive(job_id: &JobId, nonce: u64) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(job_id.as_str().as_bytes());
        hasher.update(&nonce.to_le_bytes());
        Self(format!("req:{}", &hex::encode(hasher.finalize().as_bytes())[..32]))
    }
}

impl ReceiptId {
    /// Derives a receipt id from the receipt commitment and a generator
    /// nonce, so identical executions still mint distinct receipt ids.
    pub fn derive(commitment: &crate::Digest, nonce: u64) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(commitment.as_bytes());
        hasher.update(&nonce.to_le_bytes());
        Self(format!(
            "receipt:{}",
            &hex::encode(hasher.finalize().as_bytes())[..32]
        ))
    }
}

impl CycleId {
    /// Mints the settlement id under which a claim batch is recorded.
    pub fn derive_settlement(provider: &PeerId, nonce: u64) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(provider.as_str().as_bytes());
        hasher.update(&nonce.to_le_bytes());
        Self(format!(
            "cycle:{}",
            &hex::encode(hasher.finalize().as_bytes())[..32]
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Digest;

    #[test]
    fn test_request_id_is_nonce_dependent() {
        let job = JobId::from("job-1");
        assert_ne!(RequestId::derive(&job, 0), RequestId::derive(&job, 1));
        assert_eq!(RequestId::derive(&job, 7), RequestId::derive(&job, 7));
    }

    #[test]
    fn test_receipt_id_prefix() {
        let id = ReceiptId::derive(&Digest::from_bytes([3u8; 32]), 42);
        assert!(id.as_str().starts_with("receipt:"));
    }
}
