//! Tenfold — PostgreSQL session store.

pub mod pg_session_store;
pub mod schema;

pub use pg_session_store::PgSessionStore;
