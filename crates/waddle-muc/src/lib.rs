//! # waddle-muc
//!
//! Client-side multi-user chat (XEP-0045) session management for Waddle
//! Social.
//!
//! ## Architecture
//!
//! - **Factory**: [`MucFactory`] registers the stanza handlers, dispatches
//!   inbound stanzas and answers channel requests
//! - **Registry**: [`MucRegistry`] holds one room session per room, plus its
//!   tubes session and the connection's room list
//! - **Invites**: mediated `muc#user` and direct `jabber:x:conference`
//!   invitations, the latter verified through disco#info
//! - **Events**: every state change is reported as a [`MucEvent`]
//!
//! Handles are owned references ([`HandleRef`]) into a shared
//! [`HandleRepository`]; a room stays interned while any session, invite or
//! occupant refers to it.

pub mod channel;
pub mod config;
pub mod disco;
pub mod error;
pub mod event;
pub mod factory;
pub mod handle;
pub mod invite;
pub mod message;
pub mod ns;
pub mod registry;
pub mod roomlist;
pub mod router;
pub mod session;
pub mod transport;
pub mod tubes;

pub use channel::{Channel, ChannelId, ChannelKind, RequestOutcome};
pub use config::{ConfigError, MucConfig};
pub use error::{JoinError, MucError, SendError, StanzaErrorCondition, StanzaErrorType};
pub use event::{EventReceiver, EventSender, MucEvent, Sender};
pub use factory::{MessageInterceptor, MucFactory};
pub use handle::{
    Handle, HandleContext, HandleError, HandleRef, HandleRepository, HandleType, Handles,
    MemoryHandleRepository,
};
pub use invite::{Invitation, InviteOutcome, InviteResolver};
pub use message::{IncomingMessage, TextKind};
pub use registry::MucRegistry;
pub use roomlist::RoomListSession;
pub use router::ProcessorResult;
pub use session::{Affiliation, JoinMode, MucSession, Occupant, Role, SessionState};
pub use transport::{
    HandlerId, QueryToken, RecordingTransport, StanzaKind, Transport, TransportError,
};
pub use tubes::{TubeOffer, TubesSession};
