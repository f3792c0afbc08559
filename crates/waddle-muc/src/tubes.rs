//! Per-room tubes sessions.
//!
//! Occupants advertise the tubes they offer with a `<tubes/>` payload in
//! their room presence. A [`TubesSession`] keeps the latest advertisement of
//! each occupant. It only refers to its parent room by handle; the registry
//! guarantees the parent outlives it.

use std::collections::HashMap;

use minidom::Element;
use tracing::debug;

use crate::channel::{Channel, ChannelId};
use crate::event::{EventSender, MucEvent};
use crate::handle::{Handle, HandleRef};
use crate::ns;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TubeOffer {
    pub id: String,
    /// `stream` or `dbus`.
    pub tube_type: String,
    pub service: String,
    pub initiator: Option<String>,
}

impl TubeOffer {
    fn from_element(tube: &Element) -> Option<Self> {
        Some(Self {
            id: tube.attr("id")?.to_string(),
            tube_type: tube.attr("type")?.to_string(),
            service: tube.attr("service")?.to_string(),
            initiator: tube.attr("initiator").map(str::to_string),
        })
    }
}

/// Tubes listed in a presence stanza, or `None` if it has no `<tubes/>`.
pub fn parse_tubes(stanza: &Element) -> Option<Vec<TubeOffer>> {
    let tubes = stanza.get_child("tubes", ns::TUBES)?;
    Some(
        tubes
            .children()
            .filter(|child| child.name() == "tube")
            .filter_map(TubeOffer::from_element)
            .collect(),
    )
}

#[derive(Debug)]
struct OccupantTubes {
    _handle: HandleRef,
    tubes: Vec<TubeOffer>,
}

#[derive(Debug)]
pub struct TubesSession {
    room: Handle,
    closed: bool,
    occupants: HashMap<Handle, OccupantTubes>,
    /// Offered bytestreams by stream id, with the occupant that offered them.
    bytestreams: HashMap<String, Handle>,
    events: EventSender,
}

impl TubesSession {
    pub fn new(room: Handle, events: EventSender) -> Self {
        Self {
            room,
            closed: false,
            occupants: HashMap::new(),
            bytestreams: HashMap::new(),
            events,
        }
    }

    pub fn room(&self) -> Handle {
        self.room
    }

    pub fn tubes_of(&self, occupant: Handle) -> &[TubeOffer] {
        self.occupants
            .get(&occupant)
            .map(|o| o.tubes.as_slice())
            .unwrap_or_default()
    }

    pub fn bytestream_count(&self) -> usize {
        self.bytestreams.len()
    }

    pub fn bytestream_initiator(&self, stream_id: &str) -> Option<Handle> {
        self.bytestreams.get(stream_id).copied()
    }

    /// Record the tubes `occupant` currently offers. Unavailable presence
    /// withdraws all of them.
    pub fn presence_updated(&mut self, occupant: HandleRef, stanza: &Element) {
        let handle = occupant.handle();
        let tubes = if stanza.attr("type") == Some("unavailable") {
            self.occupants.remove(&handle);
            Vec::new()
        } else {
            let tubes = parse_tubes(stanza).unwrap_or_default();
            self.occupants.insert(
                handle,
                OccupantTubes {
                    _handle: occupant,
                    tubes: tubes.clone(),
                },
            );
            tubes
        };

        debug!(room = %self.room, occupant = %handle, count = tubes.len(), "tubes presence");
        let _ = self.events.send(MucEvent::TubesPresenceUpdated {
            room: self.room,
            occupant: handle,
            tubes,
        });
    }

    pub fn bytestream_offered(&mut self, stream_id: &str, initiator: Handle) {
        debug!(room = %self.room, stream_id = %stream_id, "bytestream offered");
        self.bytestreams.insert(stream_id.to_string(), initiator);
        let _ = self.events.send(MucEvent::BytestreamOffered {
            room: self.room,
            stream_id: stream_id.to_string(),
            initiator,
        });
    }

    /// Forget a bytestream once it is accepted or torn down.
    pub fn bytestream_closed(&mut self, stream_id: &str) -> Option<Handle> {
        let initiator = self.bytestreams.remove(stream_id);
        if initiator.is_some() {
            debug!(room = %self.room, stream_id = %stream_id, "bytestream closed");
        }
        initiator
    }
}

impl Channel for TubesSession {
    fn id(&self) -> ChannelId {
        ChannelId::tubes(self.room)
    }

    fn is_ready(&self) -> bool {
        !self.closed
    }

    fn close(&mut self) {
        self.closed = true;
        self.occupants.clear();
        self.bytestreams.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;
    use crate::handle::{HandleContext, Handles};

    const TUBES_PRESENCE: &str = "<presence xmlns='jabber:client' from='room@conf.example.com/alice'>\
        <tubes xmlns='http://telepathy.freedesktop.org/xmpp/tubes'>\
            <tube type='stream' service='x-abiword' id='1' initiator='room@conf.example.com/alice'/>\
            <tube type='dbus' service='org.example.Chess' id='2'/>\
            <tube type='stream' id='3'/>\
        </tubes>\
    </presence>";

    #[test]
    fn parses_complete_tube_offers() {
        let stanza: Element = TUBES_PRESENCE.parse().unwrap();
        let tubes = parse_tubes(&stanza).unwrap();
        assert_eq!(tubes.len(), 2);
        assert_eq!(tubes[0].service, "x-abiword");
        assert_eq!(tubes[1].tube_type, "dbus");
        assert!(tubes[1].initiator.is_none());
    }

    #[test]
    fn presence_without_tubes_is_none() {
        let stanza: Element = "<presence xmlns='jabber:client' from='a@b/c'/>".parse().unwrap();
        assert!(parse_tubes(&stanza).is_none());
    }

    #[test]
    fn unavailable_withdraws_offers() {
        let handles = Handles::in_memory();
        let (tx, mut rx) = event::channel();
        let room = handles
            .rooms
            .ensure("room@conf.example.com", HandleContext::Normal)
            .unwrap();
        let mut session = TubesSession::new(room, tx);

        let alice = HandleRef::ensure(
            &handles.contacts,
            "room@conf.example.com/alice",
            HandleContext::RoomMember,
        )
        .unwrap();
        let alice_handle = alice.handle();
        let stanza: Element = TUBES_PRESENCE.parse().unwrap();
        session.presence_updated(alice.clone(), &stanza);
        assert_eq!(session.tubes_of(alice_handle).len(), 2);

        let gone: Element = "<presence xmlns='jabber:client' type='unavailable' \
            from='room@conf.example.com/alice'/>"
            .parse()
            .unwrap();
        session.presence_updated(alice, &gone);
        assert!(session.tubes_of(alice_handle).is_empty());

        assert!(matches!(rx.try_recv().unwrap(), MucEvent::TubesPresenceUpdated { .. }));
        match rx.try_recv().unwrap() {
            MucEvent::TubesPresenceUpdated { tubes, .. } => assert!(tubes.is_empty()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn closed_bytestreams_are_forgotten() {
        let handles = Handles::in_memory();
        let (tx, _rx) = event::channel();
        let room = handles
            .rooms
            .ensure("room@conf.example.com", HandleContext::Normal)
            .unwrap();
        let alice = handles
            .contacts
            .ensure("room@conf.example.com/alice", HandleContext::RoomMember)
            .unwrap();
        let mut session = TubesSession::new(room, tx);

        session.bytestream_offered("s5b-1", alice);
        session.bytestream_offered("s5b-1", alice);
        session.bytestream_offered("s5b-2", alice);
        assert_eq!(session.bytestream_count(), 2);

        assert_eq!(session.bytestream_closed("s5b-1"), Some(alice));
        assert_eq!(session.bytestream_closed("s5b-1"), None);
        assert_eq!(session.bytestream_initiator("s5b-2"), Some(alice));

        session.close();
        assert_eq!(session.bytestream_count(), 0);
    }
}
