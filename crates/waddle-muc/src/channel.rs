use std::fmt;

use crate::handle::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Text,
    Tubes,
    RoomList,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Tubes => "tubes",
            Self::RoomList => "room-list",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one channel of the factory. The room list has no room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId {
    pub kind: ChannelKind,
    pub room: Option<Handle>,
}

impl ChannelId {
    pub fn text(room: Handle) -> Self {
        Self {
            kind: ChannelKind::Text,
            room: Some(room),
        }
    }

    pub fn tubes(room: Handle) -> Self {
        Self {
            kind: ChannelKind::Tubes,
            room: Some(room),
        }
    }

    pub fn room_list() -> Self {
        Self {
            kind: ChannelKind::RoomList,
            room: None,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.room {
            Some(room) => write!(f, "{}/{}", self.kind, room),
            None => write!(f, "{}", self.kind),
        }
    }
}

pub trait Channel {
    fn id(&self) -> ChannelId;

    fn is_ready(&self) -> bool;

    /// Mark the channel closed. Idempotent.
    fn close(&mut self);
}

/// Result of a channel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The channel already exists and is usable.
    Existing,
    /// Created and announced.
    Created,
    /// Created; it will be announced once the room join completes.
    Queued,
    /// The service needed for this channel is not known.
    NotAvailable,
}
