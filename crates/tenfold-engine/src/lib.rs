//! Tenfold — Turn orchestration.
//!
//! The state machine that sequences a turn: acquire the per-player lock,
//! apply any pending punishment, validate the action, stream from the
//! completion gateway, resolve embedded judgments, apply state deltas,
//! dispatch abuse analysis, persist, and hand the final snapshot to the
//! connection layer.

pub mod bus;
pub mod config;
pub mod frames;
pub mod locks;
pub mod orchestrator;
pub mod response;

pub use bus::FrameBus;
pub use config::EngineConfig;
pub use frames::{StateSnapshot, TurnFrame};
pub use locks::SessionLocks;
pub use orchestrator::TurnOrchestrator;
