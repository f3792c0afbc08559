//! Room invitations.
//!
//! Two forms are understood: the mediated `muc#user` invite sent by the room
//! itself, and the older direct `jabber:x:conference` invite sent by the
//! inviter. A direct invite names an arbitrary JID, so the target is checked
//! with a disco#info query before a session is created for it.

use minidom::Element;
use tracing::{debug, info};

use crate::disco::{parse_response, DiscoCoordinator, DiscoKind};
use crate::handle::{HandleContext, HandleRef, Handles};
use crate::message::IncomingMessage;
use crate::ns;
use crate::transport::{QueryToken, Transport};

/// A validated invitation, ready to become a room session.
#[derive(Debug)]
pub struct Invitation {
    pub room: HandleRef,
    pub inviter: HandleRef,
    pub reason: String,
}

#[derive(Debug)]
pub enum InviteOutcome {
    /// Not an invitation; keep routing the stanza.
    NotInvite,
    /// An invitation that was rejected or is waiting on a disco reply.
    Consumed,
    Accepted(Invitation),
}

/// Direct invite waiting for the room to confirm it is a text conference.
#[derive(Debug)]
pub struct PendingInvite {
    /// Not interned until the room is confirmed.
    room: String,
    inviter: HandleRef,
    reason: String,
}

#[derive(Debug)]
pub struct InviteResolver {
    disco: DiscoCoordinator<PendingInvite>,
    legacy_enabled: bool,
}

impl InviteResolver {
    pub fn new(legacy_enabled: bool) -> Self {
        Self {
            disco: DiscoCoordinator::new(),
            legacy_enabled,
        }
    }

    pub fn process(
        &mut self,
        stanza: &Element,
        message: &IncomingMessage,
        handles: &Handles,
        transport: &mut dyn Transport,
    ) -> InviteOutcome {
        if let Some(invite) = stanza
            .get_child("x", ns::MUC_USER)
            .and_then(|x| x.get_child("invite", ns::MUC_USER))
        {
            return mediated_invite(invite, message, handles);
        }

        if let Some(x) = stanza.get_child("x", ns::X_CONFERENCE) {
            return self.direct_invite(x, message, handles, transport);
        }

        InviteOutcome::NotInvite
    }

    fn direct_invite(
        &mut self,
        x: &Element,
        message: &IncomingMessage,
        handles: &Handles,
        transport: &mut dyn Transport,
    ) -> InviteOutcome {
        if !self.legacy_enabled {
            debug!(from = %message.from, "ignoring direct invite");
            return InviteOutcome::Consumed;
        }
        if message.send_error.is_some() {
            debug!(from = %message.from, "direct invite bounced");
            return InviteOutcome::Consumed;
        }

        let Some(room_jid) = x.attr("jid") else {
            debug!(from = %message.from, "direct invite without room");
            return InviteOutcome::Consumed;
        };

        let inviter =
            match HandleRef::ensure(&handles.contacts, &message.from, HandleContext::Normal) {
                Ok(inviter) => inviter,
                Err(e) => {
                    debug!(from = %message.from, error = %e, "invalid inviter");
                    return InviteOutcome::Consumed;
                }
            };

        let pending = PendingInvite {
            room: room_jid.to_string(),
            inviter,
            reason: message.body.clone().unwrap_or_default(),
        };
        // A refused query hands the invite back; dropping it releases the inviter.
        if self
            .disco
            .issue(transport, DiscoKind::Info, room_jid, None, pending)
            .is_err()
        {
            debug!(room = %room_jid, "could not verify direct invite");
        }
        InviteOutcome::Consumed
    }

    /// Whether `token` belongs to a direct invite being verified.
    pub fn owns(&self, token: &QueryToken) -> bool {
        self.disco.is_outstanding(token)
    }

    /// Disco#info result for a direct invite. Returns the invitation if the
    /// target turned out to be a text conference.
    pub fn complete(
        &mut self,
        token: &QueryToken,
        iq: &Element,
        handles: &Handles,
    ) -> Option<Invitation> {
        let request = self.disco.complete(token)?;
        let pending = request.data;

        let query = match parse_response(iq, DiscoKind::Info) {
            Ok(query) => query,
            Err(e) => {
                debug!(room = %request.target, error = %e, "direct invite target did not answer");
                return None;
            }
        };

        // Only the first identity counts.
        let is_conference = query
            .get_child("identity", ns::DISCO_INFO)
            .is_some_and(|identity| {
                identity.attr("category") == Some("conference")
                    && identity.attr("type") == Some("text")
            });
        if !is_conference {
            debug!(room = %request.target, "direct invite target is not a text conference");
            return None;
        }

        let room = match HandleRef::ensure(&handles.rooms, &pending.room, HandleContext::Normal) {
            Ok(room) => room,
            Err(e) => {
                debug!(room = %pending.room, error = %e, "invalid room in direct invite");
                return None;
            }
        };

        info!(room = %request.target, inviter = %pending.inviter.jid(), "direct invite accepted");
        Some(Invitation {
            room,
            inviter: pending.inviter,
            reason: pending.reason,
        })
    }

    pub fn pending(&self) -> usize {
        self.disco.len()
    }

    pub fn cancel_all(&mut self, transport: &mut dyn Transport) {
        self.disco.cancel_all(transport);
    }
}

fn mediated_invite(
    invite: &Element,
    message: &IncomingMessage,
    handles: &Handles,
) -> InviteOutcome {
    if message.send_error.is_some() {
        debug!(from = %message.from, "invite bounced");
        return InviteOutcome::Consumed;
    }

    let Some(inviter_jid) = invite.attr("from") else {
        debug!(from = %message.from, "invite without inviter");
        return InviteOutcome::Consumed;
    };
    let inviter = match HandleRef::ensure(&handles.contacts, inviter_jid, HandleContext::Normal) {
        Ok(inviter) => inviter,
        Err(e) => {
            debug!(inviter = %inviter_jid, error = %e, "invalid inviter");
            return InviteOutcome::Consumed;
        }
    };

    let reason = invite
        .get_child("reason", ns::MUC_USER)
        .map(Element::text)
        .unwrap_or_default();

    let room_jid = message
        .from
        .split_once('/')
        .map_or(message.from.as_str(), |(bare, _)| bare);
    let room = match HandleRef::ensure(&handles.rooms, room_jid, HandleContext::Normal) {
        Ok(room) => room,
        Err(e) => {
            debug!(room = %room_jid, error = %e, "invite from invalid room");
            return InviteOutcome::Consumed;
        }
    };

    InviteOutcome::Accepted(Invitation {
        room,
        inviter,
        reason,
    })
}
