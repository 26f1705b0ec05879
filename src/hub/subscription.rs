use std::fmt;

use uuid::Uuid;

use super::RoomKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A broadcast room (with the password attempt, empty for none) or the other
/// side of a direct conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Room { name: String, password: String },
    Direct { recipient: String },
}

impl Destination {
    pub fn key(&self, sender: &str) -> RoomKey {
        match self {
            Destination::Room { name, .. } => RoomKey::room(name.as_str()),
            Destination::Direct { recipient } => RoomKey::direct(sender, recipient),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("either roomName or recvUserName is required")]
    NoDestination,
}

/// What one connection asked for when it was opened. Never changes afterwards.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: ConnectionId,
    sender: String,
    destination: Destination,
}

impl Subscription {
    pub fn new(sender: impl Into<String>, destination: Destination) -> Self {
        Self {
            id: ConnectionId::new(),
            sender: sender.into(),
            destination,
        }
    }

    /// Builds a subscription from the upgrade request's parameters.
    ///
    /// `room` may carry a password after the first `:` (`"general:secret"`).
    /// A room wins over a recipient when both are given.
    pub fn from_params(
        sender: impl Into<String>,
        room: Option<&str>,
        recipient: Option<&str>,
    ) -> Result<Self, SubscriptionError> {
        let room = room
            .map(|room| match room.split_once(':') {
                Some((name, password)) => (name, password),
                None => (room, ""),
            })
            .filter(|(name, _)| !name.is_empty());

        let destination = match (room, recipient.filter(|r| !r.is_empty())) {
            (Some((name, password)), _) => Destination::Room {
                name: name.to_owned(),
                password: password.to_owned(),
            },
            (None, Some(recipient)) => Destination::Direct {
                recipient: recipient.to_owned(),
            },
            (None, None) => return Err(SubscriptionError::NoDestination),
        };

        Ok(Self::new(sender, destination))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn password(&self) -> &str {
        match &self.destination {
            Destination::Room { password, .. } => password.as_str(),
            Destination::Direct { .. } => "",
        }
    }

    pub fn room_key(&self) -> RoomKey {
        self.destination.key(&self.sender)
    }
}
