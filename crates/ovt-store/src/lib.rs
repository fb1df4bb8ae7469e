pub mod error;
pub mod memory;
pub mod run_store;

pub use error::StoreError;
pub use memory::HeadlineCache;
pub use run_store::{HistoryLimits, RunStore};
