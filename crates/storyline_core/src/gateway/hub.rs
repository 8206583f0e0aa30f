//! Per-story fan-out rooms.
//!
//! # Responsibility
//! - Hold one broadcast channel per story room.
//! - Deliver published events to every subscribed session, origin included.
//!
//! # Invariants
//! - Rooms are created lazily on first subscribe or publish.
//! - Publishing to a room without subscribers is not an error.

use crate::gateway::protocol::ServerEvent;
use crate::model::story::StoryId;
use log::debug;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Events buffered per subscriber before it is reported as lagging.
pub const ROOM_CHANNEL_CAPACITY: usize = 256;

/// Registry of story rooms.
#[derive(Debug)]
pub struct RoomHub {
    rooms: Mutex<HashMap<StoryId, broadcast::Sender<ServerEvent>>>,
    capacity: usize,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::with_capacity(ROOM_CHANNEL_CAPACITY)
    }
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribes to a story room.
    pub fn subscribe(&self, story_id: StoryId) -> broadcast::Receiver<ServerEvent> {
        self.sender(story_id).subscribe()
    }

    /// Publishes to one room. Returns the number of receiving subscribers.
    pub fn publish(&self, story_id: StoryId, event: ServerEvent) -> usize {
        let delivered = self.sender(story_id).send(event).unwrap_or(0);
        debug!(
            "event=room_publish module=gateway status=ok story_id={} receivers={}",
            story_id, delivered
        );
        delivered
    }

    /// Publishes to every known room.
    pub fn publish_all(&self, event: ServerEvent) -> usize {
        let senders: Vec<_> = self.lock().values().cloned().collect();
        senders
            .iter()
            .map(|sender| sender.send(event.clone()).unwrap_or(0))
            .sum()
    }

    /// Number of live subscribers in a room.
    pub fn subscriber_count(&self, story_id: StoryId) -> usize {
        self.lock()
            .get(&story_id)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }

    fn sender(&self, story_id: StoryId) -> broadcast::Sender<ServerEvent> {
        self.lock()
            .entry(story_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<StoryId, broadcast::Sender<ServerEvent>>> {
        self.rooms
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
