//! Realtime fan-out of conversation events to live subscribers.
//!
//! One room per conversation with at least one subscriber. Each subscriber
//! owns a bounded channel. A message event that does not fit in a
//! subscriber's buffer disconnects that subscriber (the client resyncs from
//! history on reconnect); typing events are simply dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use tandem_shared::protocol::{CloseReason, ServerEvent};
use tandem_shared::types::{ConversationId, ProfileId};

struct Subscriber {
    profile: ProfileId,
    tx: mpsc::Sender<ServerEvent>,
}

struct Room {
    conversation_id: ConversationId,
    subscribers: HashMap<u64, Subscriber>,
}

impl Room {
    fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            subscribers: HashMap::new(),
        }
    }

    fn join(&mut self, id: u64, profile: ProfileId, buffer: usize) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(buffer);
        self.subscribers.insert(id, Subscriber { profile, tx });

        debug!(
            conversation = %self.conversation_id,
            profile = %profile,
            subscribers = self.subscribers.len(),
            "Subscriber joined conversation"
        );

        rx
    }

    fn leave(&mut self, id: u64) {
        if let Some(sub) = self.subscribers.remove(&id) {
            debug!(
                conversation = %self.conversation_id,
                profile = %sub.profile,
                subscribers = self.subscribers.len(),
                "Subscriber left conversation"
            );
        }
    }

    /// Deliver `event` to every subscriber except those of `exclude`.
    fn publish(&mut self, event: &ServerEvent, exclude: Option<ProfileId>) -> usize {
        let mut delivered = 0;
        let mut disconnect = Vec::new();

        for (id, sub) in &self.subscribers {
            if Some(sub.profile) == exclude {
                continue;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) if event.is_lossy() => {
                    debug!(
                        conversation = %self.conversation_id,
                        profile = %sub.profile,
                        "Dropping typing event for slow subscriber"
                    );
                }
                Err(TrySendError::Full(_)) => {
                    warn!(
                        conversation = %self.conversation_id,
                        profile = %sub.profile,
                        "Subscriber buffer full, disconnecting"
                    );
                    disconnect.push(*id);
                }
                Err(TrySendError::Closed(_)) => disconnect.push(*id),
            }
        }

        for id in disconnect {
            self.subscribers.remove(&id);
        }
        delivered
    }

    fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

struct HubInner {
    rooms: Mutex<HashMap<ConversationId, Room>>,
    typing: Mutex<HashMap<(ConversationId, ProfileId), DateTime<Utc>>>,
    sequencers: Mutex<HashMap<ConversationId, Arc<tokio::sync::Mutex<()>>>>,
    next_subscriber: AtomicU64,
    typing_ttl: Duration,
    buffer: usize,
}

impl HubInner {
    fn leave(&self, conversation_id: ConversationId, id: u64) {
        let mut rooms = self.rooms.lock();
        let should_remove = match rooms.get_mut(&conversation_id) {
            Some(room) => {
                room.leave(id);
                room.is_empty()
            }
            None => false,
        };
        if should_remove {
            rooms.remove(&conversation_id);
        }
    }
}

#[derive(Clone)]
pub struct ConversationHub {
    inner: Arc<HubInner>,
}

impl ConversationHub {
    pub fn new(typing_ttl: Duration, buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                rooms: Mutex::new(HashMap::new()),
                typing: Mutex::new(HashMap::new()),
                sequencers: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(1),
                typing_ttl,
                buffer: buffer.max(1),
            }),
        }
    }

    /// Join a conversation's room (created if missing).
    pub fn subscribe(&self, conversation_id: ConversationId, profile: ProfileId) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let rx = {
            let mut rooms = self.inner.rooms.lock();
            rooms
                .entry(conversation_id)
                .or_insert_with(|| Room::new(conversation_id))
                .join(id, profile, self.inner.buffer)
        };
        Subscription {
            conversation_id,
            profile,
            id,
            rx,
            hub: Arc::clone(&self.inner),
        }
    }

    /// Push an event to the room. Returns how many subscribers received it.
    pub fn publish(
        &self,
        conversation_id: ConversationId,
        event: ServerEvent,
        exclude: Option<ProfileId>,
    ) -> usize {
        let mut rooms = self.inner.rooms.lock();
        let Some(room) = rooms.get_mut(&conversation_id) else {
            return 0;
        };
        let delivered = room.publish(&event, exclude);
        if room.is_empty() {
            rooms.remove(&conversation_id);
        }
        delivered
    }

    /// Whether a typing signal from `profile` starts a new TTL window.
    ///
    /// Repeats inside the window are no-ops and do not extend it.
    pub fn should_emit_typing(
        &self,
        conversation_id: ConversationId,
        profile: ProfileId,
        now: DateTime<Utc>,
    ) -> bool {
        let mut typing = self.inner.typing.lock();
        let key = (conversation_id, profile);
        match typing.get(&key) {
            Some(last) if window_open(*last, self.inner.typing_ttl, now) => false,
            _ => {
                typing.insert(key, now);
                true
            }
        }
    }

    /// Per-conversation lock that orders commit and publish of messages.
    pub fn sequencer(&self, conversation_id: ConversationId) -> Arc<tokio::sync::Mutex<()>> {
        let mut sequencers = self.inner.sequencers.lock();
        Arc::clone(sequencers.entry(conversation_id).or_default())
    }

    /// Tell every subscriber the conversation is over and drop them.
    pub fn close_room(&self, conversation_id: ConversationId, reason: CloseReason) -> usize {
        self.inner
            .typing
            .lock()
            .retain(|(conversation, _), _| *conversation != conversation_id);

        let Some(room) = self.inner.rooms.lock().remove(&conversation_id) else {
            return 0;
        };

        let event = ServerEvent::ConversationClosed {
            conversation_id,
            reason,
        };
        for sub in room.subscribers.values() {
            // Dropping the sender below ends the stream even if this misses.
            let _ = sub.tx.try_send(event.clone());
        }

        info!(
            conversation = %conversation_id,
            ?reason,
            subscribers = room.subscribers.len(),
            "Closed live conversation"
        );
        room.subscribers.len()
    }

    #[cfg(test)]
    pub fn subscriber_count(&self, conversation_id: ConversationId) -> usize {
        self.inner
            .rooms
            .lock()
            .get(&conversation_id)
            .map(|room| room.subscribers.len())
            .unwrap_or(0)
    }

    /// Drop expired typing windows, idle sequencers and empty rooms.
    pub fn maintain(&self, now: DateTime<Utc>) {
        let ttl = self.inner.typing_ttl;
        self.inner
            .typing
            .lock()
            .retain(|_, last| window_open(*last, ttl, now));
        self.inner
            .sequencers
            .lock()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        self.inner.rooms.lock().retain(|_, room| !room.is_empty());
    }

    #[cfg(test)]
    fn sequencer_count(&self) -> usize {
        self.inner.sequencers.lock().len()
    }
}

/// A window whose end is not representable never closes.
fn window_open(started: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    started
        .checked_add_signed(ttl)
        .map_or(true, |end| now < end)
}

/// A live subscription to one conversation. Dropping it leaves the room.
pub struct Subscription {
    conversation_id: ConversationId,
    profile: ProfileId,
    id: u64,
    rx: mpsc::Receiver<ServerEvent>,
    hub: Arc<HubInner>,
}

impl Subscription {
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn profile(&self) -> ProfileId {
        self.profile
    }

    /// Next event, or `None` once the server has disconnected this subscriber.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx.recv().await
    }

    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.leave(self.conversation_id, self.id);
    }
}
