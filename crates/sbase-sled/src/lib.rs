//! SBASE Sled - Document storage driver backed by sled.
//!
//! `mem://<name>` opens a temporary database, `sled://<path>` an on-disk one.
//! Every collection is a sled tree of JSON-encoded documents keyed by id.

mod connection;
pub mod driver;
pub mod filter;
mod model;

pub use connection::SledConnection;
pub use driver::{SledDriver, MEMORY_SCHEME, SLED_SCHEME};
pub use model::SledModel;
