use std::fmt;

/// Where a connection's traffic lives inside the hub.
///
/// Broadcast rooms and direct conversations are separate variants, so a room
/// called `"alice:bob"` can never alias the conversation between alice and bob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoomKey {
    Room(String),
    Direct(String, String),
}

impl RoomKey {
    pub fn room(name: impl Into<String>) -> Self {
        RoomKey::Room(name.into())
    }

    /// Same key whichever side opens the conversation.
    pub fn direct(a: &str, b: &str) -> Self {
        if a <= b {
            RoomKey::Direct(a.to_owned(), b.to_owned())
        } else {
            RoomKey::Direct(b.to_owned(), a.to_owned())
        }
    }

    pub fn room_name(&self) -> Option<&str> {
        match self {
            RoomKey::Room(name) => Some(name),
            RoomKey::Direct(..) => None,
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RoomKey::Room(name) => write!(f, "room:{name}"),
            RoomKey::Direct(a, b) => write!(f, "user:{a}:{b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_key_is_commutative() {
        let pairs = [("alice", "bob"), ("bob", "alice"), ("", "x"), ("same", "same"), ("Zed", "amy")];
        for (a, b) in pairs {
            assert_eq!(RoomKey::direct(a, b), RoomKey::direct(b, a));
        }
    }

    #[test]
    fn direct_key_sorts_participants() {
        assert_eq!(
            RoomKey::direct("bob", "alice"),
            RoomKey::Direct("alice".into(), "bob".into())
        );
        assert_eq!(RoomKey::direct("bob", "alice").to_string(), "user:alice:bob");
    }

    #[test]
    fn rooms_and_conversations_never_collide() {
        let room = RoomKey::room("alice:bob");
        let direct = RoomKey::direct("alice", "bob");
        assert_ne!(room, direct);
        assert_eq!(room.to_string(), "room:alice:bob");
    }

    #[test]
    fn room_name_only_for_broadcast_rooms() {
        assert_eq!(RoomKey::room("general").room_name(), Some("general"));
        assert_eq!(RoomKey::direct("a", "b").room_name(), None);
    }
}
