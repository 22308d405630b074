//! ragbot-vector
//!
//! The per-domain vector index: exact L2 nearest-neighbour search over
//! parallel vector/document arrays, persisted as a LanceDB table plus a small
//! JSON manifest. See `index` for the in-memory structure and `store` for the
//! on-disk format.

pub mod index;
pub mod schema;
pub mod store;

pub use index::{ScoredDocument, VectorIndex, DEFAULT_TOP_K};
pub use store::{load, save};
