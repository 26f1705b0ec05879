//! The hub: single owner of room membership, room passwords and presence.
//!
//! Every mutation arrives as a [`HubEvent`] on one queue and is applied in
//! arrival order by [`Hub::run`], so none of the tables need a lock. Outside
//! code talks to it through a cloneable [`HubHandle`].
//!
//! The event queue is unbounded. A burst of joins or messages queues up ahead
//! of the actor instead of pushing back on readers; only the per-connection
//! outbound queues are bounded.

mod key;
mod message;
mod subscription;

pub use key::RoomKey;
pub use message::{Message, Outbound, Outbox};
pub use subscription::{ConnectionId, Destination, Subscription, SubscriptionError};

use std::collections::{hash_map::Entry, HashMap};

use axum::extract::ws::{close_code, Utf8Bytes};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

pub const INVALID_PASSWORD: &str = "Invalid password";

#[derive(Debug)]
pub enum HubEvent {
    Register(Subscription, Outbox),
    Unregister(Subscription),
    Broadcast(Message),
    OnlineUsers(oneshot::Sender<Vec<String>>),
    Rooms(oneshot::Sender<Vec<RoomSummary>>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub name: String,
    pub lock: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Joined,
    Rejected,
}

#[derive(Debug)]
struct Member {
    user: String,
    outbox: Outbox,
}

#[derive(Debug)]
struct Room {
    // fixed by whoever created the room
    password: String,
    members: HashMap<ConnectionId, Member>,
}

impl Room {
    fn new(password: &str) -> Self {
        Self {
            password: password.to_owned(),
            members: HashMap::new(),
        }
    }

    fn is_locked(&self) -> bool {
        !self.password.is_empty()
    }

    fn admits(&self, password: &str) -> bool {
        !self.is_locked() || self.password == password
    }
}

#[derive(Debug, Default)]
pub struct Hub {
    rooms: HashMap<RoomKey, Room>,
    // live connections per user
    online: HashMap<String, usize>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the hub onto its own task and returns the handle used to feed it.
    pub fn spawn(self) -> HubHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(rx));
        HubHandle { tx }
    }

    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<HubEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        debug!("hub stopped, every handle was dropped");
    }

    pub fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register(subscription, outbox) => {
                let _ = self.register(&subscription, outbox);
            }
            HubEvent::Unregister(subscription) => {
                let _ = self.unregister(&subscription);
            }
            HubEvent::Broadcast(message) => {
                let _ = self.broadcast(message);
            }
            HubEvent::OnlineUsers(reply) => {
                let _ = reply.send(self.online_users());
            }
            HubEvent::Rooms(reply) => {
                let _ = reply.send(self.rooms());
            }
        }
    }

    /// Puts the connection into its room, creating the room if needed.
    ///
    /// The first joiner's password becomes the room's password. A later joiner
    /// with a different password gets a policy-violation close and is never
    /// added; nothing else changes.
    pub fn register(&mut self, subscription: &Subscription, outbox: Outbox) -> Admission {
        let key = subscription.room_key();
        let room = match self.rooms.entry(key.clone()) {
            Entry::Vacant(entry) => {
                debug!(room = %key, locked = !subscription.password().is_empty(), "room created");
                entry.insert(Room::new(subscription.password()))
            }
            Entry::Occupied(entry) => {
                let room = entry.into_mut();
                if !room.admits(subscription.password()) {
                    info!(user = subscription.sender(), room = %key, "rejected: invalid password");
                    outbox.reject(close_code::POLICY, INVALID_PASSWORD);
                    return Admission::Rejected;
                }
                room
            }
        };

        let _ = room.members.insert(
            subscription.id(),
            Member {
                user: subscription.sender().to_owned(),
                outbox,
            },
        );
        *self.online.entry(subscription.sender().to_owned()).or_default() += 1;

        debug!(
            user = subscription.sender(),
            room = %key,
            connection = %subscription.id(),
            members = room.members.len(),
            "registered"
        );
        Admission::Joined
    }

    /// Drops the connection from its room, closing its outbound queue.
    ///
    /// Safe to call for a connection that was rejected or already evicted.
    /// Returns whether the connection was still a member.
    pub fn unregister(&mut self, subscription: &Subscription) -> bool {
        let key = subscription.room_key();
        let Some(room) = self.rooms.get_mut(&key) else {
            return false;
        };
        let Some(member) = room.members.remove(&subscription.id()) else {
            return false;
        };

        if room.members.is_empty() {
            let _ = self.rooms.remove(&key);
            debug!(room = %key, "room closed");
        }
        self.went_offline(&member.user);

        debug!(user = %member.user, room = %key, connection = %subscription.id(), "unregistered");
        true
    }

    /// Stamps and serializes the message once, then offers it to every member
    /// of its room without waiting. Members whose queue is full or closed are
    /// evicted after the pass. Returns how many members got the message.
    ///
    /// Only members may post: a message from a connection that was rejected,
    /// evicted or never registered is dropped.
    pub fn broadcast(&mut self, mut message: Message) -> usize {
        let key = message.destination.key(&message.sender);
        let Some(room) = self.rooms.get_mut(&key) else {
            debug!(room = %key, "message for a room with no members dropped");
            return 0;
        };
        if !room.members.contains_key(&message.connection) {
            debug!(
                user = %message.sender,
                room = %key,
                connection = %message.connection,
                "message from a non-member dropped"
            );
            return 0;
        }

        let _ = message.timestamp.get_or_insert_with(OffsetDateTime::now_utc);
        let payload = match serde_json::to_string(&message) {
            Ok(json) => Utf8Bytes::from(json),
            Err(e) => {
                error!(error = %e, room = %key, user = %message.sender, "failed to serialize message");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut evicted = Vec::new();
        for (id, member) in &room.members {
            match member.outbox.offer(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    info!(user = %member.user, room = %key, connection = %id, "evicting slow consumer");
                    evicted.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(user = %member.user, room = %key, connection = %id, "writer already gone");
                    evicted.push(*id);
                }
            }
        }

        let mut gone = Vec::with_capacity(evicted.len());
        for id in evicted {
            if let Some(member) = room.members.remove(&id) {
                gone.push(member.user);
            }
        }
        if room.members.is_empty() {
            let _ = self.rooms.remove(&key);
            debug!(room = %key, "room closed");
        }
        for user in gone {
            self.went_offline(&user);
        }

        delivered
    }

    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.online.keys().cloned().collect();
        users.sort();
        users
    }

    /// Active broadcast rooms. Direct conversations are not listed.
    pub fn rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .iter()
            .filter_map(|(key, room)| {
                key.room_name().map(|name| RoomSummary {
                    name: name.to_owned(),
                    lock: room.is_locked(),
                })
            })
            .collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        rooms
    }

    pub fn members(&self, key: &RoomKey) -> Vec<ConnectionId> {
        self.rooms
            .get(key)
            .map(|room| room.members.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn password(&self, key: &RoomKey) -> Option<&str> {
        self.rooms.get(key).map(|room| room.password.as_str())
    }

    fn went_offline(&mut self, user: &str) {
        if let Entry::Occupied(mut entry) = self.online.entry(user.to_owned()) {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                let _ = entry.remove();
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("hub is not running")]
    Stopped,
}

#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubEvent>,
}

impl HubHandle {
    pub fn register(&self, subscription: Subscription, outbox: Outbox) -> Result<(), HubError> {
        self.send(HubEvent::Register(subscription, outbox))
    }

    pub fn unregister(&self, subscription: Subscription) -> Result<(), HubError> {
        self.send(HubEvent::Unregister(subscription))
    }

    pub fn broadcast(&self, message: Message) -> Result<(), HubError> {
        self.send(HubEvent::Broadcast(message))
    }

    pub async fn online_users(&self) -> Result<Vec<String>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubEvent::OnlineUsers(reply))?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    pub async fn rooms(&self) -> Result<Vec<RoomSummary>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubEvent::Rooms(reply))?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    fn send(&self, event: HubEvent) -> Result<(), HubError> {
        self.tx.send(event).map_err(|_| HubError::Stopped)
    }
}
