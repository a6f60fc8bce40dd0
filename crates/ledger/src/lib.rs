//! Durable descriptor registries.
//!
//! Two ledgers share one backing store format: the generated-unit ledger
//! (source file → artifact ids, with a companion response file) and the
//! dependency ledger (loaded assembly paths). Both serialize to a JSON
//! registry file that survives process restarts and drives the next run's
//! incremental eligibility decisions.

pub mod deps;
pub mod generated;
pub mod set;
pub mod store;

pub use deps::DependencyLedger;
pub use generated::{GeneratedLedger, GeneratedStoreConfig};
pub use set::DescriptorSet;
pub use store::{from_transfer, to_transfer, RegistryFile, StoreConfig};

/// Errors from ledger persistence.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Could not write registry file: {0}")]
    RegistryWrite(std::path::PathBuf),
}
