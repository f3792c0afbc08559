//! Notifications emitted to the layer that exposes channels to clients.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use xmpp_parsers::chatstates::ChatState;

use crate::channel::ChannelId;
use crate::error::{JoinError, SendError};
use crate::handle::Handle;
use crate::message::TextKind;
use crate::session::Occupant;
use crate::tubes::TubeOffer;

/// Who a room message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    /// The room itself (bare room JID).
    Room(Handle),
    /// An occupant, as a room-member contact handle.
    Occupant(Handle),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MucEvent {
    NewChannel(ChannelId),
    ChannelError {
        channel: ChannelId,
        error: JoinError,
    },
    ChannelClosed(ChannelId),
    Invited {
        room: Handle,
        inviter: Handle,
        reason: String,
    },
    MessageReceived {
        room: Handle,
        sender: Sender,
        kind: TextKind,
        body: String,
        timestamp: DateTime<Utc>,
    },
    SendError {
        room: Handle,
        error: SendError,
        body: Option<String>,
        timestamp: DateTime<Utc>,
    },
    SubjectChanged {
        room: Handle,
        sender: Sender,
        subject: String,
    },
    ChatStateChanged {
        room: Handle,
        occupant: Handle,
        state: ChatState,
    },
    OccupantUpdated {
        room: Handle,
        occupant: Occupant,
    },
    OccupantLeft {
        room: Handle,
        occupant: Handle,
        nick: String,
    },
    TubesPresenceUpdated {
        room: Handle,
        occupant: Handle,
        tubes: Vec<TubeOffer>,
    },
    BytestreamOffered {
        room: Handle,
        stream_id: String,
        initiator: Handle,
    },
}

pub type EventSender = mpsc::UnboundedSender<MucEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<MucEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
