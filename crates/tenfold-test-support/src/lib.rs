//! Shared test doubles for the Tenfold narrative game server.

mod clock;
mod provider;
mod rng;
mod store;

pub use clock::FixedClock;
pub use provider::{ScriptedBehavior, ScriptedProvider};
pub use rng::{FixedRandom, SequenceRandom};
pub use store::{FailingSessionStore, FlakySessionStore};
