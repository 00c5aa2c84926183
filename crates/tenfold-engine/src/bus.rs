//! Per-player frame delivery bus.
//!
//! Orchestration is decoupled from any specific connection: the
//! orchestrator publishes frames to a per-player broadcast channel, and
//! whatever connection currently serves that player subscribes. A
//! reconnecting controller attaches to the live channel and receives the
//! frames published from then on; chunks already missed are not replayed.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use tokio::sync::broadcast;

use tenfold_core::player::PlayerId;

use crate::frames::TurnFrame;

const CHANNEL_CAPACITY: usize = 256;

/// Registry of per-player broadcast channels, created on first use.
#[derive(Debug, Default)]
pub struct FrameBus {
    channels: StdMutex<HashMap<PlayerId, broadcast::Sender<TurnFrame>>>,
}

impl FrameBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, player_id: &PlayerId) -> broadcast::Sender<TurnFrame> {
        let mut channels = self.channels.lock().expect("frame bus poisoned");
        channels
            .entry(player_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publishes a frame to whoever is listening. A frame with no
    /// subscriber is dropped; the authoritative state lives in the store,
    /// not the channel.
    pub fn publish(&self, player_id: &PlayerId, frame: TurnFrame) {
        let _ = self.sender(player_id).send(frame);
    }

    /// Subscribes to the player's frames from this moment on.
    #[must_use]
    pub fn subscribe(&self, player_id: &PlayerId) -> broadcast::Receiver<TurnFrame> {
        self.sender(player_id).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_arrive_in_publish_order() {
        let bus = FrameBus::new();
        let player = PlayerId::new("aria");
        let mut rx = bus.subscribe(&player);

        bus.publish(&player, TurnFrame::StreamStart);
        bus.publish(&player, TurnFrame::StreamChunk { content: "a".into() });
        bus.publish(&player, TurnFrame::StreamEnd);

        assert_eq!(rx.recv().await.unwrap(), TurnFrame::StreamStart);
        assert_eq!(
            rx.recv().await.unwrap(),
            TurnFrame::StreamChunk { content: "a".into() }
        );
        assert_eq!(rx.recv().await.unwrap(), TurnFrame::StreamEnd);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_frames() {
        let bus = FrameBus::new();
        let player = PlayerId::new("aria");

        let mut early = bus.subscribe(&player);
        bus.publish(&player, TurnFrame::StreamChunk { content: "missed".into() });

        let mut late = bus.subscribe(&player);
        bus.publish(&player, TurnFrame::StreamEnd);

        assert_eq!(
            early.recv().await.unwrap(),
            TurnFrame::StreamChunk { content: "missed".into() }
        );
        assert_eq!(early.recv().await.unwrap(), TurnFrame::StreamEnd);
        assert_eq!(late.recv().await.unwrap(), TurnFrame::StreamEnd);
    }

    #[tokio::test]
    async fn test_publish_without_subscriber_is_dropped() {
        let bus = FrameBus::new();
        let player = PlayerId::new("aria");
        bus.publish(&player, TurnFrame::StreamStart);

        let mut rx = bus.subscribe(&player);
        bus.publish(&player, TurnFrame::StreamEnd);
        assert_eq!(rx.recv().await.unwrap(), TurnFrame::StreamEnd);
    }

    #[tokio::test]
    async fn test_players_have_independent_channels() {
        let bus = FrameBus::new();
        let mut aria = bus.subscribe(&PlayerId::new("aria"));
        bus.publish(&PlayerId::new("bram"), TurnFrame::StreamStart);
        bus.publish(&PlayerId::new("aria"), TurnFrame::StreamEnd);
        assert_eq!(aria.recv().await.unwrap(), TurnFrame::StreamEnd);
    }
}
