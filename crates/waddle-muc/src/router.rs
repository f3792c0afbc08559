//! Routing of room messages and presence to sessions.
//!
//! Each handler returns whether the stanza was consumed. Stanzas that do not
//! belong to a known room are left for the rest of the connection.

use minidom::Element;
use tracing::debug;

use crate::event::Sender;
use crate::handle::{HandleContext, HandleRef, Handles};
use crate::message::IncomingMessage;
use crate::ns;
use crate::registry::MucRegistry;
use crate::tubes::parse_tubes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorResult {
    /// Let later handlers see the stanza.
    Continue,
    /// Consumed.
    Drop,
}

pub fn route_message(
    registry: &mut MucRegistry,
    handles: &Handles,
    message: &IncomingMessage,
) -> ProcessorResult {
    let Some(room) = handles.room_for(&message.from) else {
        return ProcessorResult::Continue;
    };
    if registry.find_session(room).is_none() {
        debug!(from = %message.from, "message for room without session");
        return ProcessorResult::Drop;
    }

    // Kept alive until routing is done so the occupant handle stays valid.
    let occupant = if message.from.contains('/') {
        match HandleRef::ensure(&handles.contacts, &message.from, HandleContext::RoomMember) {
            Ok(occupant) => Some(occupant),
            Err(e) => {
                debug!(from = %message.from, error = %e, "invalid occupant");
                return ProcessorResult::Drop;
            }
        }
    } else {
        None
    };
    let sender = occupant
        .as_ref()
        .map_or(Sender::Room(room), |o| Sender::Occupant(o.handle()));

    // Private messages through the room belong to one-to-one chat.
    if matches!(sender, Sender::Occupant(_)) && !message.is_groupchat() {
        return ProcessorResult::Continue;
    }

    let Some(session) = registry.find_session_mut(room) else {
        return ProcessorResult::Drop;
    };

    if let Some(error) = message.send_error {
        session.send_error(error, message.body.as_deref(), message.timestamp);
        return ProcessorResult::Drop;
    }

    if let (Sender::Occupant(occupant), Some(state)) = (sender, message.chat_state.clone()) {
        session.receive_chat_state(occupant, state);
    }
    if let Some(body) = &message.body {
        session.receive_message(sender, message.kind, body, message.timestamp);
    }
    if let Some(subject) = &message.subject {
        session.change_subject(sender, subject);
    }

    ProcessorResult::Drop
}

pub fn route_presence(
    registry: &mut MucRegistry,
    handles: &Handles,
    stanza: &Element,
) -> ProcessorResult {
    let Some(from) = stanza.attr("from") else {
        return ProcessorResult::Continue;
    };
    let is_member = stanza.get_child("x", ns::MUC_USER).is_some();
    let Some(room) = handles.room_for(from) else {
        if is_member {
            debug!(from = %from, "member presence for unknown room");
            return ProcessorResult::Drop;
        }
        return ProcessorResult::Continue;
    };

    if stanza.attr("type") == Some("error") && registry.find_session(room).is_some() {
        registry.presence_error(room, stanza);
        return ProcessorResult::Drop;
    }

    if is_member {
        if registry.find_session(room).is_none() {
            debug!(from = %from, "member presence for room without session");
            return ProcessorResult::Drop;
        }
        let occupant =
            match HandleRef::ensure(&handles.contacts, from, HandleContext::RoomMember) {
                Ok(occupant) => occupant,
                Err(e) => {
                    debug!(from = %from, error = %e, "invalid occupant");
                    return ProcessorResult::Drop;
                }
            };
        registry.member_presence(room, occupant, stanza);
    }

    // The member presence may have closed the room.
    if registry.find_session(room).is_none() {
        return ProcessorResult::Continue;
    }
    if !registry.has_tubes_session(room) && parse_tubes(stanza).is_none() {
        return ProcessorResult::Continue;
    }

    match HandleRef::ensure(&handles.contacts, from, HandleContext::RoomMember) {
        Ok(occupant) => registry.tubes_presence(room, occupant, stanza),
        Err(e) => debug!(from = %from, error = %e, "invalid tubes occupant"),
    }
    ProcessorResult::Continue
}
