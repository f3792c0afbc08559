//! Room session registry.
//!
//! Holds at most one [`MucSession`] and one [`TubesSession`] per room handle
//! plus the single [`RoomListSession`]. A tubes session is never present
//! without its parent room session; one requested before the room is joined
//! waits in the pending index and is announced when the join completes.

use std::collections::{HashMap, HashSet};

use minidom::Element;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelId, RequestOutcome};
use crate::error::{JoinError, MucError};
use crate::event::{EventSender, MucEvent};
use crate::handle::{Handle, HandleRef, Handles};
use crate::roomlist::RoomListSession;
use crate::session::{MucSession, SessionState, SessionTransition};
use crate::transport::Transport;
use crate::tubes::TubesSession;

pub struct MucRegistry {
    handles: Handles,
    self_handle: HandleRef,
    nick: String,
    history_max_stanzas: Option<u32>,
    conference_server: Option<String>,
    events: EventSender,
    sessions: HashMap<Handle, MucSession>,
    announced: HashSet<Handle>,
    tubes: HashMap<Handle, TubesSession>,
    pending_tubes: HashSet<Handle>,
    room_list: Option<RoomListSession>,
}

impl MucRegistry {
    pub fn new(
        handles: Handles,
        self_handle: HandleRef,
        nick: &str,
        events: EventSender,
    ) -> Self {
        Self {
            handles,
            self_handle,
            nick: nick.to_string(),
            history_max_stanzas: None,
            conference_server: None,
            events,
            sessions: HashMap::new(),
            announced: HashSet::new(),
            tubes: HashMap::new(),
            pending_tubes: HashSet::new(),
            room_list: None,
        }
    }

    pub fn with_history_limit(mut self, max_stanzas: Option<u32>) -> Self {
        self.history_max_stanzas = max_stanzas;
        self
    }

    pub fn with_conference_server(mut self, server: Option<String>) -> Self {
        self.conference_server = server;
        self
    }

    pub fn find_session(&self, room: Handle) -> Option<&MucSession> {
        self.sessions.get(&room)
    }

    pub(crate) fn find_session_mut(&mut self, room: Handle) -> Option<&mut MucSession> {
        self.sessions.get_mut(&room)
    }

    pub fn find_tubes_session(&self, room: Handle) -> Option<&TubesSession> {
        self.tubes.get(&room)
    }

    pub fn room_list(&self) -> Option<&RoomListSession> {
        self.room_list.as_ref()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn tubes_count(&self) -> usize {
        self.tubes.len()
    }

    pub fn pending_tubes_count(&self) -> usize {
        self.pending_tubes.len()
    }

    pub fn is_announced(&self, room: Handle) -> bool {
        self.announced.contains(&room)
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
            && self.tubes.is_empty()
            && self.pending_tubes.is_empty()
            && self.room_list.is_none()
    }

    /// Every live channel: room sessions, then tubes, then the room list.
    pub fn channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<ChannelId> = self.sessions.values().map(Channel::id).collect();
        channels.extend(self.tubes.values().map(Channel::id));
        if let Some(room_list) = &self.room_list {
            channels.push(room_list.id());
        }
        channels
    }

    fn emit(&self, event: MucEvent) {
        let _ = self.events.send(event);
    }

    fn announce(&mut self, room: Handle) {
        if self.announced.insert(room) {
            self.emit(MucEvent::NewChannel(ChannelId::text(room)));
        }
    }

    /// Create an invited session for `room` unless one exists already.
    /// Returns whether a session was created.
    pub fn ensure_invited_session(
        &mut self,
        room: HandleRef,
        inviter: HandleRef,
        reason: String,
    ) -> bool {
        let handle = room.handle();
        if self.sessions.contains_key(&handle) {
            debug!(room = %room.jid(), "ignoring invite; already in room");
            return false;
        }

        info!(room = %room.jid(), inviter = %inviter.jid(), "invited to room");
        let inviter_handle = inviter.handle();
        let session = MucSession::invited(room, inviter, reason.clone(), &self.nick, self.events.clone())
            .with_history_limit(self.history_max_stanzas);
        self.sessions.insert(handle, session);
        self.announce(handle);
        self.emit(MucEvent::Invited {
            room: handle,
            inviter: inviter_handle,
            reason,
        });
        true
    }

    fn room_ref(&self, room: Handle) -> Result<HandleRef, MucError> {
        HandleRef::from_live(&self.handles.rooms, room)
            .ok_or_else(|| MucError::invalid_handle(format!("room handle {} is not valid", room)))
    }

    /// Make sure a session for `room` exists and is joining or joined.
    ///
    /// A new session sends the join presence. Requesting an invited session
    /// accepts the invitation.
    pub fn request_session(
        &mut self,
        transport: &mut dyn Transport,
        room: Handle,
    ) -> Result<RequestOutcome, MucError> {
        if let Some(session) = self.sessions.get_mut(&room) {
            return match session.state() {
                SessionState::Ready => Ok(RequestOutcome::Existing),
                SessionState::Invited => {
                    debug!(room = %session.room_jid(), "accepting invitation");
                    let presence = session.begin_join();
                    transport.send(presence)?;
                    Ok(RequestOutcome::Queued)
                }
                SessionState::Joining | SessionState::Closed => Ok(RequestOutcome::Queued),
            };
        }

        let room_ref = self.room_ref(room)?;
        let mut session = MucSession::joining(
            room_ref,
            self.self_handle.clone(),
            &self.nick,
            self.events.clone(),
        )
        .with_history_limit(self.history_max_stanzas);
        let presence = session.begin_join();
        self.sessions.insert(room, session);
        if let Err(e) = transport.send(presence) {
            warn!(room = %room, error = %e, "join presence refused");
            self.sessions.remove(&room);
            return Err(e.into());
        }
        Ok(RequestOutcome::Queued)
    }

    pub fn request_tubes_session(
        &mut self,
        transport: &mut dyn Transport,
        room: Handle,
    ) -> Result<RequestOutcome, MucError> {
        if self.tubes.contains_key(&room) {
            return Ok(RequestOutcome::Existing);
        }

        let parent_ready = self.request_session(transport, room)? == RequestOutcome::Existing;
        self.tubes
            .insert(room, TubesSession::new(room, self.events.clone()));

        if parent_ready {
            debug!(room = %room, "tubes session created");
            self.emit(MucEvent::NewChannel(ChannelId::tubes(room)));
            Ok(RequestOutcome::Created)
        } else {
            debug!(room = %room, "tubes session waiting for room join");
            self.pending_tubes.insert(room);
            Ok(RequestOutcome::Queued)
        }
    }

    pub fn request_room_list(&mut self) -> RequestOutcome {
        if self.room_list.is_some() {
            return RequestOutcome::Existing;
        }
        let Some(server) = self.conference_server.as_deref() else {
            debug!("no conference server available for room list request");
            return RequestOutcome::NotAvailable;
        };
        self.room_list = Some(RoomListSession::new(server));
        self.emit(MucEvent::NewChannel(ChannelId::room_list()));
        RequestOutcome::Created
    }

    pub(crate) fn apply(&mut self, room: Handle, transition: SessionTransition) {
        match transition {
            SessionTransition::Ready => self.session_ready(room),
            SessionTransition::JoinFailed(error) => self.join_failed(room, error),
            SessionTransition::Closed => self.destroy_session(room),
        }
    }

    fn session_ready(&mut self, room: Handle) {
        let Some(session) = self.sessions.get_mut(&room) else {
            return;
        };
        session.mark_ready();
        self.announce(room);
        if self.pending_tubes.remove(&room) {
            self.emit(MucEvent::NewChannel(ChannelId::tubes(room)));
        }
    }

    fn join_failed(&mut self, room: Handle, error: JoinError) {
        self.emit(MucEvent::ChannelError {
            channel: ChannelId::text(room),
            error,
        });
        if self.pending_tubes.remove(&room) {
            self.emit(MucEvent::ChannelError {
                channel: ChannelId::tubes(room),
                error,
            });
            if let Some(mut tubes) = self.tubes.remove(&room) {
                tubes.close();
            }
        }
        self.destroy_session(room);
    }

    /// Remove a room session and its tubes session.
    fn destroy_session(&mut self, room: Handle) {
        self.close_tubes_session(room);
        if let Some(mut session) = self.sessions.remove(&room) {
            debug!(room = %session.room_jid(), "removing room session");
            session.close();
            if self.announced.remove(&room) {
                self.emit(MucEvent::ChannelClosed(ChannelId::text(room)));
            }
        }
    }

    /// Leave the room and close its channels.
    pub fn close_session(
        &mut self,
        transport: &mut dyn Transport,
        room: Handle,
    ) -> Result<(), MucError> {
        let Some(session) = self.sessions.get(&room) else {
            return Err(MucError::NoSuchRoom(room.to_string()));
        };
        if session.state() != SessionState::Invited {
            if let Err(e) = transport.send(session.leave_presence()) {
                debug!(room = %session.room_jid(), error = %e, "could not send leave presence");
            }
        }
        self.destroy_session(room);
        Ok(())
    }

    pub fn close_tubes_session(&mut self, room: Handle) {
        if let Some(mut tubes) = self.tubes.remove(&room) {
            debug!(room = %room, "removing tubes session");
            tubes.close();
            if !self.pending_tubes.remove(&room) {
                self.emit(MucEvent::ChannelClosed(ChannelId::tubes(room)));
            }
        }
    }

    pub fn close_room_list(&mut self) {
        if let Some(mut room_list) = self.room_list.take() {
            room_list.close();
            self.emit(MucEvent::ChannelClosed(ChannelId::room_list()));
        }
    }

    /// Drop every channel. Safe to call more than once.
    pub fn close_all(&mut self) {
        if self.is_empty() {
            return;
        }
        debug!("closing channels");

        let pending: Vec<Handle> = self.pending_tubes.drain().collect();
        for room in pending {
            if let Some(mut tubes) = self.tubes.remove(&room) {
                tubes.close();
            }
        }

        let rooms: Vec<Handle> = self.sessions.keys().copied().collect();
        for room in rooms {
            if let Some(mut session) = self.sessions.remove(&room) {
                session.close();
                if self.announced.remove(&room) {
                    self.emit(MucEvent::ChannelClosed(ChannelId::text(room)));
                }
            }
        }

        let rooms: Vec<Handle> = self.tubes.keys().copied().collect();
        for room in rooms {
            self.close_tubes_session(room);
        }

        self.close_room_list();
    }

    pub fn send_message(
        &mut self,
        transport: &mut dyn Transport,
        room: Handle,
        body: &str,
    ) -> Result<(), MucError> {
        let session = self
            .sessions
            .get(&room)
            .ok_or_else(|| MucError::NoSuchRoom(room.to_string()))?;
        let message = session.build_message(body)?;
        transport.send(message)?;
        Ok(())
    }

    /// Route an incoming bytestream to the room's tubes session.
    pub fn handle_bytestream_offer(
        &mut self,
        room: Handle,
        stream_id: &str,
        initiator: Handle,
    ) -> Result<(), MucError> {
        if !self.handles.rooms.is_valid(room) {
            return Err(MucError::invalid_handle(format!("room handle {} is not valid", room)));
        }
        let Some(tubes) = self.tubes.get_mut(&room) else {
            debug!(room = %room, "tubes session doesn't exist for room");
            return Err(MucError::bad_request(Some(
                "No tubes channel available for this MUC".to_string(),
            )));
        };
        tubes.bytestream_offered(stream_id, initiator);
        Ok(())
    }

    /// Member presence for a room with a session.
    pub(crate) fn member_presence(&mut self, room: Handle, occupant: HandleRef, stanza: &Element) {
        let transition = match self.sessions.get_mut(&room) {
            Some(session) => session.member_presence(occupant, stanza),
            None => return,
        };
        if let Some(transition) = transition {
            self.apply(room, transition);
        }
    }

    pub(crate) fn presence_error(&mut self, room: Handle, stanza: &Element) {
        let transition = match self.sessions.get_mut(&room) {
            Some(session) => session.presence_error(stanza),
            None => return,
        };
        if let Some(transition) = transition {
            self.apply(room, transition);
        }
    }

    pub(crate) fn has_tubes_session(&self, room: Handle) -> bool {
        self.tubes.contains_key(&room)
    }

    /// Tubes presence for a room with a live session. Creates and announces
    /// the tubes session if this is the first one seen.
    pub(crate) fn tubes_presence(&mut self, room: Handle, occupant: HandleRef, stanza: &Element) {
        if !self.sessions.contains_key(&room) {
            return;
        }
        if !self.tubes.contains_key(&room) {
            debug!(room = %room, "creating tubes session from presence");
            self.tubes
                .insert(room, TubesSession::new(room, self.events.clone()));
            self.emit(MucEvent::NewChannel(ChannelId::tubes(room)));
        }
        if let Some(tubes) = self.tubes.get_mut(&room) {
            tubes.presence_updated(occupant, stanza);
        }
    }
}
