//! Tenfold — Session persistence bounded context.
//!
//! Defines the `GameSession` record, the `SessionStore` load/save contract
//! with revision-based compare-and-swap, and the in-memory store used in
//! tests and single-process deployments.

pub mod memory;
pub mod model;
pub mod store;

pub use memory::InMemorySessionStore;
pub use model::{GameSession, Punishment, DAILY_OPPORTUNITIES};
pub use store::{SessionStore, SessionSummary, StoreError};
