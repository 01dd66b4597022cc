//! Renewal credential persistence backends.

pub mod cookie;
pub mod file;
pub mod memory;

use std::sync::Arc;

use zariz_core::config::{PersistenceBackend, PersistenceConfig};
use zariz_core::traits::RenewalStore;

pub use cookie::RenewalCookie;
pub use file::FileRenewalStore;
pub use memory::MemoryRenewalStore;

/// Build the renewal store selected by configuration.
pub fn from_config(config: &PersistenceConfig) -> Arc<dyn RenewalStore> {
    match config.backend {
        PersistenceBackend::Memory => Arc::new(MemoryRenewalStore::new()),
        PersistenceBackend::File => Arc::new(FileRenewalStore::new(&config.path)),
    }
}
