//! Room sessions.
//!
//! A [`MucSession`] tracks one room from invitation or join request until
//! it closes. It never removes itself from the registry: the presence and
//! error handlers return a [`SessionTransition`] and the registry applies it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use minidom::Element;
use tracing::{debug, warn};
use xmpp_parsers::chatstates::ChatState;
use xmpp_parsers::muc::user::{
    Affiliation as MucAffiliation, MucUser, Role as MucRole, Status,
};

use crate::channel::{Channel, ChannelId};
use crate::error::{JoinError, MucError, StanzaErrorCondition};
use crate::event::{EventSender, MucEvent, Sender};
use crate::handle::{Handle, HandleRef};
use crate::message::TextKind;
use crate::ns;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created from an invitation; nothing sent to the room yet.
    Invited,
    /// Join presence sent, waiting for our own presence to come back.
    Joining,
    Ready,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    Invited,
    SelfJoining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Moderator,
    Participant,
    Visitor,
    None,
}

impl From<&MucRole> for Role {
    fn from(role: &MucRole) -> Self {
        match role {
            MucRole::Moderator => Self::Moderator,
            MucRole::Participant => Self::Participant,
            MucRole::Visitor => Self::Visitor,
            MucRole::None => Self::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affiliation {
    Owner,
    Admin,
    Member,
    Outcast,
    None,
}

impl From<&MucAffiliation> for Affiliation {
    fn from(affiliation: &MucAffiliation) -> Self {
        match affiliation {
            MucAffiliation::Owner => Self::Owner,
            MucAffiliation::Admin => Self::Admin,
            MucAffiliation::Member => Self::Member,
            MucAffiliation::Outcast => Self::Outcast,
            MucAffiliation::None => Self::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupant {
    pub handle: Handle,
    pub nick: String,
    pub role: Role,
    pub affiliation: Affiliation,
    /// Only visible in non-anonymous rooms.
    pub real_jid: Option<String>,
}

#[derive(Debug)]
struct Member {
    _handle: HandleRef,
    occupant: Occupant,
}

/// State change the registry must apply after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    Ready,
    JoinFailed(JoinError),
    /// We left or were removed from the room.
    Closed,
}

#[derive(Debug)]
pub struct MucSession {
    room: HandleRef,
    room_jid: String,
    initiator: HandleRef,
    invite_reason: Option<String>,
    mode: JoinMode,
    state: SessionState,
    nick: String,
    history_max_stanzas: Option<u32>,
    subject: Option<String>,
    members: HashMap<Handle, Member>,
    events: EventSender,
}

impl MucSession {
    pub fn invited(
        room: HandleRef,
        inviter: HandleRef,
        reason: String,
        nick: &str,
        events: EventSender,
    ) -> Self {
        let room_jid = room.jid();
        Self {
            room,
            room_jid,
            initiator: inviter,
            invite_reason: Some(reason),
            mode: JoinMode::Invited,
            state: SessionState::Invited,
            nick: nick.to_string(),
            history_max_stanzas: None,
            subject: None,
            members: HashMap::new(),
            events,
        }
    }

    pub fn joining(room: HandleRef, self_handle: HandleRef, nick: &str, events: EventSender) -> Self {
        let room_jid = room.jid();
        Self {
            room,
            room_jid,
            initiator: self_handle,
            invite_reason: None,
            mode: JoinMode::SelfJoining,
            state: SessionState::Joining,
            nick: nick.to_string(),
            history_max_stanzas: None,
            subject: None,
            members: HashMap::new(),
            events,
        }
    }

    pub fn with_history_limit(mut self, max_stanzas: Option<u32>) -> Self {
        self.history_max_stanzas = max_stanzas;
        self
    }

    pub fn room(&self) -> Handle {
        self.room.handle()
    }

    pub fn room_jid(&self) -> &str {
        &self.room_jid
    }

    pub fn initiator(&self) -> Handle {
        self.initiator.handle()
    }

    pub fn invite_reason(&self) -> Option<&str> {
        self.invite_reason.as_deref()
    }

    pub fn mode(&self) -> JoinMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn occupant(&self, handle: Handle) -> Option<&Occupant> {
        self.members.get(&handle).map(|m| &m.occupant)
    }

    pub fn occupants(&self) -> impl Iterator<Item = &Occupant> {
        self.members.values().map(|m| &m.occupant)
    }

    fn occupant_jid(&self) -> String {
        format!("{}/{}", self.room_jid, self.nick)
    }

    /// Build the join presence and move to `Joining`.
    pub fn begin_join(&mut self) -> Element {
        debug!(room = %self.room_jid, nick = %self.nick, "joining room");
        self.state = SessionState::Joining;

        let mut x = Element::builder("x", ns::MUC);
        if let Some(max) = self.history_max_stanzas {
            x = x.append(
                Element::builder("history", ns::MUC)
                    .attr("maxstanzas", max.to_string())
                    .build(),
            );
        }

        Element::builder("presence", ns::CLIENT)
            .attr("to", self.occupant_jid())
            .append(x.build())
            .build()
    }

    pub(crate) fn mark_ready(&mut self) {
        self.state = SessionState::Ready;
    }

    pub fn leave_presence(&self) -> Element {
        Element::builder("presence", ns::CLIENT)
            .attr("to", self.occupant_jid())
            .attr("type", "unavailable")
            .build()
    }

    /// Groupchat message to the whole room.
    pub fn build_message(&self, body: &str) -> Result<Element, MucError> {
        if self.state != SessionState::Ready {
            return Err(MucError::NotReady(self.room_jid.clone()));
        }
        Ok(Element::builder("message", ns::CLIENT)
            .attr("to", self.room_jid.as_str())
            .attr("type", "groupchat")
            .append(Element::builder("body", ns::CLIENT).append(body).build())
            .build())
    }

    /// Presence carrying a `muc#user` payload from `occupant`.
    pub fn member_presence(
        &mut self,
        occupant: HandleRef,
        stanza: &Element,
    ) -> Option<SessionTransition> {
        let from = stanza.attr("from").unwrap_or_default();
        let nick = from
            .split_once('/')
            .map(|(_, nick)| nick.to_string())
            .unwrap_or_default();
        let unavailable = stanza.attr("type") == Some("unavailable");

        let muc_user = stanza
            .get_child("x", ns::MUC_USER)
            .and_then(|x| MucUser::try_from(x.clone()).ok());
        if muc_user.is_none() {
            debug!(room = %self.room_jid, from = %from, "unparsable muc#user payload");
        }

        let is_self = nick == self.nick
            || muc_user
                .as_ref()
                .is_some_and(|u| u.status.contains(&Status::SelfPresence));
        let item = muc_user.as_ref().and_then(|u| u.items.first());

        let handle = occupant.handle();
        if unavailable {
            if let Some(member) = self.members.remove(&handle) {
                let _ = self.events.send(MucEvent::OccupantLeft {
                    room: self.room(),
                    occupant: handle,
                    nick: member.occupant.nick,
                });
            }
            if is_self {
                debug!(room = %self.room_jid, "left room");
                return Some(SessionTransition::Closed);
            }
            return None;
        }

        let info = Occupant {
            handle,
            nick: nick.clone(),
            role: item.map(|i| Role::from(&i.role)).unwrap_or(Role::None),
            affiliation: item
                .map(|i| Affiliation::from(&i.affiliation))
                .unwrap_or(Affiliation::None),
            real_jid: item.and_then(|i| i.jid.as_ref()).map(|j| j.to_string()),
        };
        debug!(room = %self.room_jid, nick = %nick, "occupant updated");
        let _ = self.events.send(MucEvent::OccupantUpdated {
            room: self.room(),
            occupant: info.clone(),
        });
        self.members.insert(
            handle,
            Member {
                _handle: occupant,
                occupant: info,
            },
        );

        if is_self && matches!(self.state, SessionState::Joining | SessionState::Invited) {
            debug!(room = %self.room_jid, nick = %nick, "joined room");
            return Some(SessionTransition::Ready);
        }
        None
    }

    /// `type='error'` presence from the room.
    pub fn presence_error(&mut self, stanza: &Element) -> Option<SessionTransition> {
        let condition = stanza
            .children()
            .find(|child| child.name() == "error")
            .and_then(StanzaErrorCondition::from_error_element);

        match self.state {
            SessionState::Joining | SessionState::Invited => {
                let error = JoinError::from(condition);
                warn!(room = %self.room_jid, ?condition, %error, "join failed");
                Some(SessionTransition::JoinFailed(error))
            }
            _ => {
                debug!(room = %self.room_jid, ?condition, "ignoring presence error");
                None
            }
        }
    }

    pub fn receive_message(
        &mut self,
        sender: Sender,
        kind: TextKind,
        body: &str,
        timestamp: DateTime<Utc>,
    ) {
        let _ = self.events.send(MucEvent::MessageReceived {
            room: self.room(),
            sender,
            kind,
            body: body.to_string(),
            timestamp,
        });
    }

    pub fn change_subject(&mut self, sender: Sender, subject: &str) {
        debug!(room = %self.room_jid, "subject changed");
        self.subject = Some(subject.to_string());
        let _ = self.events.send(MucEvent::SubjectChanged {
            room: self.room(),
            sender,
            subject: subject.to_string(),
        });
    }

    pub fn receive_chat_state(&mut self, occupant: Handle, state: ChatState) {
        let _ = self.events.send(MucEvent::ChatStateChanged {
            room: self.room(),
            occupant,
            state,
        });
    }

    pub fn send_error(
        &mut self,
        error: crate::error::SendError,
        body: Option<&str>,
        timestamp: DateTime<Utc>,
    ) {
        debug!(room = %self.room_jid, %error, "message bounced");
        let _ = self.events.send(MucEvent::SendError {
            room: self.room(),
            error,
            body: body.map(str::to_string),
            timestamp,
        });
    }
}

impl Channel for MucSession {
    fn id(&self) -> ChannelId {
        ChannelId::text(self.room())
    }

    fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    fn close(&mut self) {
        self.state = SessionState::Closed;
        self.members.clear();
    }
}
