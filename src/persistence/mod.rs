pub mod repository;
pub mod sqlite;

pub use repository::{BuildRepository, SavedBuilds, StoreError, StoredBundle};
pub use sqlite::SqliteBuildStore;
