//! Vector sidecar: namespaced entity-embedding collections

mod sqlite;
mod traits;

pub use sqlite::SqliteVectorSidecar;
pub use traits::{VectorError, VectorMatch, VectorSidecar, VectorStats};
