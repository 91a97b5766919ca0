pub mod kubectl;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use kubectl::KubectlJobStore;
pub use memory::InMemoryJobStore;
pub use sqlite::SqliteJobStore;
pub use traits::{JobStore, StoreError};
