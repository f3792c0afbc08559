mod common;

use common::*;
use minidom::Element;
use tokio::sync::mpsc;
use waddle_muc::{
    ChannelId, ChannelKind, HandleContext, HandleRef, HandleRepository, HandleType,
    IncomingMessage, JoinError,
    JoinMode, MessageInterceptor, MucError, MucEvent, ProcessorResult, RequestOutcome,
    SessionState, StanzaKind,
};

fn request_text(h: &mut Harness, room: &HandleRef) -> Result<RequestOutcome, MucError> {
    h.factory
        .request_channel(ChannelKind::Text, Some(HandleType::Room), Some(room.handle()))
}

#[test]
fn attach_registers_one_handler_per_stanza_kind() {
    let mut h = Harness::new();
    for kind in [StanzaKind::Message, StanzaKind::Presence, StanzaKind::Iq] {
        assert_eq!(h.factory.transport().handler_count(kind), 1);
    }
    h.factory.detach();
    assert!(!h.factory.is_attached());
    assert_eq!(h.factory.transport().handler_count(StanzaKind::Message), 0);
}

#[test]
#[should_panic(expected = "attached twice")]
fn attaching_twice_panics() {
    let mut h = Harness::new();
    let _ = h.factory.attach();
}

#[test]
fn joining_room_sends_presence_and_announces_on_self_presence() {
    let mut h = Harness::new();
    let room = h.room(ROOM);
    assert_eq!(request_text(&mut h, &room).unwrap(), RequestOutcome::Queued);

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].name(), "presence");
    assert_eq!(sent[0].attr("to"), Some("room@conf.example.com/me"));
    assert!(h.drain().is_empty());

    assert_eq!(h.feed(&self_presence(ROOM, "me")), ProcessorResult::Continue);
    let session = h.factory.registry().find_session(room.handle()).unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.mode(), JoinMode::SelfJoining);

    let events = h.drain();
    assert!(events.contains(&MucEvent::NewChannel(ChannelId::text(room.handle()))));
    assert_eq!(request_text(&mut h, &room).unwrap(), RequestOutcome::Existing);
}

#[test]
fn invite_after_join_request_keeps_single_session() {
    let mut h = Harness::new();
    let room = h.room(ROOM);
    request_text(&mut h, &room).unwrap();

    h.feed(&mediated_invite(ROOM, "alice@example.com/laptop", "hello"));

    assert_eq!(h.factory.registry().session_count(), 1);
    let session = h.factory.registry().find_session(room.handle()).unwrap();
    assert_eq!(session.mode(), JoinMode::SelfJoining);
    assert!(session.invite_reason().is_none());
}

#[test]
fn mediated_invite_creates_invited_session() {
    let mut h = Harness::new();
    assert_eq!(
        h.feed(&mediated_invite(ROOM, "alice@example.com/laptop", "Standup")),
        ProcessorResult::Drop
    );

    let room = h.room_handle(ROOM).unwrap();
    let alice = h
        .handles()
        .contacts
        .lookup("alice@example.com", HandleContext::Normal)
        .unwrap();
    let session = h.factory.registry().find_session(room).unwrap();
    assert_eq!(session.mode(), JoinMode::Invited);
    assert_eq!(session.state(), SessionState::Invited);
    assert_eq!(session.initiator(), alice);
    assert_eq!(session.invite_reason(), Some("Standup"));
    assert!(h.sent().is_empty());

    assert_eq!(
        h.drain(),
        vec![
            MucEvent::NewChannel(ChannelId::text(room)),
            MucEvent::Invited {
                room,
                inviter: alice,
                reason: "Standup".into(),
            },
        ]
    );

    // A second invite for the same room changes nothing.
    h.feed(&mediated_invite(ROOM, "bob@example.com", "Other"));
    assert_eq!(h.factory.registry().session_count(), 1);
    assert_eq!(
        h.factory.registry().find_session(room).unwrap().invite_reason(),
        Some("Standup")
    );
    assert!(h.drain().is_empty());
}

#[test]
fn requesting_an_invited_room_accepts_the_invite() {
    let mut h = Harness::new();
    h.feed(&mediated_invite(ROOM, "alice@example.com", "Standup"));
    let room = h.room(ROOM);

    assert_eq!(request_text(&mut h, &room).unwrap(), RequestOutcome::Queued);
    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].attr("to"), Some("room@conf.example.com/me"));

    let session = h.factory.registry().find_session(room.handle()).unwrap();
    assert_eq!(session.state(), SessionState::Joining);
    assert_eq!(session.mode(), JoinMode::Invited);
}

#[test]
fn direct_invite_to_text_conference_creates_session() {
    let mut h = Harness::new();
    assert_eq!(
        h.feed(&direct_invite(ROOM, "alice@example.com/laptop")),
        ProcessorResult::Drop
    );
    assert_eq!(h.factory.pending_invites(), 1);
    assert_eq!(h.factory.registry().session_count(), 0);

    let query = h.sent().remove(0);
    let id = query.attr("id").unwrap().to_string();
    assert_eq!(
        h.feed(&disco_info_result(&id, ROOM, "conference", "text")),
        ProcessorResult::Drop
    );

    let room = h.room_handle(ROOM).unwrap();
    let session = h.factory.registry().find_session(room).unwrap();
    assert_eq!(session.mode(), JoinMode::Invited);
    assert_eq!(session.invite_reason(), Some("Join us"));
    assert_eq!(h.factory.pending_invites(), 0);
}

#[test]
fn direct_invite_to_other_service_is_ignored() {
    let mut h = Harness::new();
    h.feed(&direct_invite("node@pubsub.example.com", "alice@example.com"));
    let query = h.sent().remove(0);
    let id = query.attr("id").unwrap().to_string();

    h.feed(&disco_info_result(&id, "node@pubsub.example.com", "pubsub", "leaf"));
    assert_eq!(h.factory.registry().session_count(), 0);
    assert!(h.room_handle("node@pubsub.example.com").is_none());
    assert!(h.drain().is_empty());
}

#[test]
fn private_chat_passes_while_direct_invite_is_checked() {
    let mut h = Harness::new();
    h.feed(&direct_invite(ROOM, "alice@example.com"));
    assert_eq!(h.factory.pending_invites(), 1);
    assert!(h.room_handle(ROOM).is_none());

    assert_eq!(
        h.feed(
            "<message xmlns='jabber:client' from='room@conf.example.com/alice' type='chat'>\
                <body>psst</body></message>"
        ),
        ProcessorResult::Continue
    );
    assert!(h.drain().is_empty());
}

#[test]
fn direct_invite_while_offline_is_dropped() {
    let mut h = Harness::new();
    h.factory.transport_mut().set_online(false);

    assert_eq!(
        h.feed(&direct_invite(ROOM, "alice@example.com/laptop")),
        ProcessorResult::Drop
    );
    assert_eq!(h.factory.pending_invites(), 0);
    assert!(h
        .handles()
        .contacts
        .lookup("alice@example.com", HandleContext::Normal)
        .is_none());
    assert!(h.room_handle(ROOM).is_none());
    assert_eq!(h.factory.registry().session_count(), 0);
}

#[test]
fn direct_invites_can_be_disabled() {
    let mut h = Harness::with_config(
        "[account]\njid = \"me@example.com\"\n\n[muc]\nlegacy_invites = false\n",
    );
    assert_eq!(
        h.feed(&direct_invite(ROOM, "alice@example.com")),
        ProcessorResult::Drop
    );
    assert!(h.sent().is_empty());
    assert_eq!(h.factory.pending_invites(), 0);
}

#[test]
fn no_invite_completes_after_close_all() {
    let mut h = Harness::new();
    h.feed(&direct_invite(ROOM, "alice@example.com"));
    let query = h.sent().remove(0);
    let id = query.attr("id").unwrap().to_string();

    h.factory.close_all();
    assert_eq!(h.factory.transport().cancelled().len(), 1);

    assert_eq!(
        h.feed(&disco_info_result(&id, ROOM, "conference", "text")),
        ProcessorResult::Continue
    );
    assert_eq!(h.factory.registry().session_count(), 0);
}

#[test]
fn tubes_requested_before_join_wait_for_room() {
    let mut h = Harness::new();
    let room = h.room(ROOM);
    let outcome = h
        .factory
        .request_channel(ChannelKind::Tubes, Some(HandleType::Room), Some(room.handle()))
        .unwrap();
    assert_eq!(outcome, RequestOutcome::Queued);
    assert_eq!(h.factory.registry().session_count(), 1);
    assert!(h.drain().is_empty());

    h.feed(&self_presence(ROOM, "me"));
    let events = h.drain();
    let text_at = events
        .iter()
        .position(|e| *e == MucEvent::NewChannel(ChannelId::text(room.handle())))
        .unwrap();
    let tubes_at = events
        .iter()
        .position(|e| *e == MucEvent::NewChannel(ChannelId::tubes(room.handle())))
        .unwrap();
    assert!(text_at < tubes_at);
}

#[test]
fn failed_join_takes_pending_tubes_with_it() {
    let mut h = Harness::new();
    let room = h.room(ROOM);
    h.factory
        .request_channel(ChannelKind::Tubes, Some(HandleType::Room), Some(room.handle()))
        .unwrap();

    assert_eq!(
        h.feed(
            "<presence xmlns='jabber:client' type='error' from='room@conf.example.com/me'>\
                <error type='auth'><registration-required xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error>\
            </presence>"
        ),
        ProcessorResult::Drop
    );

    assert!(h.factory.registry().is_empty());
    assert_eq!(
        h.drain(),
        vec![
            MucEvent::ChannelError {
                channel: ChannelId::text(room.handle()),
                error: JoinError::MembersOnly,
            },
            MucEvent::ChannelError {
                channel: ChannelId::tubes(room.handle()),
                error: JoinError::MembersOnly,
            },
        ]
    );
}

#[test]
fn tubes_never_outlive_their_room() {
    let mut h = Harness::new();
    let room = h.room(ROOM);
    request_text(&mut h, &room).unwrap();
    h.feed(&self_presence(ROOM, "me"));
    h.feed(
        "<presence xmlns='jabber:client' from='room@conf.example.com/alice'>\
            <x xmlns='http://jabber.org/protocol/muc#user'>\
                <item affiliation='member' role='participant'/>\
            </x>\
            <tubes xmlns='http://telepathy.freedesktop.org/xmpp/tubes'>\
                <tube type='dbus' service='org.example.Chess' id='7'/>\
            </tubes>\
        </presence>",
    );
    let tubes = h.factory.registry().find_tubes_session(room.handle()).unwrap();
    let alice = h
        .handles()
        .contacts
        .lookup("room@conf.example.com/alice", HandleContext::RoomMember)
        .unwrap();
    assert_eq!(tubes.tubes_of(alice)[0].service, "org.example.Chess");

    // Kicked: our own unavailable presence closes the room.
    h.feed(
        "<presence xmlns='jabber:client' type='unavailable' from='room@conf.example.com/me'>\
            <x xmlns='http://jabber.org/protocol/muc#user'>\
                <item affiliation='none' role='none'/>\
                <status code='307'/>\
                <status code='110'/>\
            </x>\
        </presence>",
    );
    assert!(h.factory.registry().find_session(room.handle()).is_none());
    assert!(h.factory.registry().find_tubes_session(room.handle()).is_none());
}

#[test]
fn bytestream_offer_needs_tubes_session() {
    let mut h = Harness::new();
    let room = h.room(ROOM);
    let alice = HandleRef::ensure(&h.handles().contacts, "alice@example.com", HandleContext::Normal)
        .unwrap();
    let err = h
        .factory
        .handle_bytestream_offer(room.handle(), "s5b-1", alice.handle())
        .unwrap_err();
    let element = err.to_error_element().unwrap();
    assert_eq!(
        element.get_child("text", "urn:ietf:params:xml:ns:xmpp-stanzas").map(Element::text),
        Some("No tubes channel available for this MUC".to_string())
    );

    h.factory
        .request_channel(ChannelKind::Tubes, Some(HandleType::Room), Some(room.handle()))
        .unwrap();
    h.factory
        .handle_bytestream_offer(room.handle(), "s5b-1", alice.handle())
        .unwrap();
    let tubes = h.factory.registry().find_tubes_session(room.handle()).unwrap();
    assert_eq!(tubes.bytestream_initiator("s5b-1"), Some(alice.handle()));
}

#[test]
fn channel_requests_are_validated() {
    let mut h = Harness::new();
    let contact = HandleRef::ensure(&h.handles().contacts, "bob@example.com", HandleContext::Normal)
        .unwrap();

    assert!(matches!(
        h.factory
            .request_channel(ChannelKind::Text, Some(HandleType::Contact), Some(contact.handle())),
        Err(MucError::NotImplemented(_))
    ));
    assert!(matches!(
        h.factory
            .request_channel(ChannelKind::Text, Some(HandleType::Room), None),
        Err(MucError::InvalidHandle(_))
    ));
    assert!(matches!(
        h.factory.request_channel(
            ChannelKind::Text,
            Some(HandleType::Room),
            waddle_muc::Handle::new(4242)
        ),
        Err(MucError::InvalidHandle(_))
    ));
}

#[test]
fn room_list_depends_on_conference_server() {
    let mut h = Harness::with_config("[account]\njid = \"me@example.com\"\n");
    assert_eq!(
        h.factory.request_channel(ChannelKind::RoomList, None, None).unwrap(),
        RequestOutcome::NotAvailable
    );

    let mut h = Harness::new();
    assert_eq!(
        h.factory.request_channel(ChannelKind::RoomList, None, None).unwrap(),
        RequestOutcome::Created
    );
    assert_eq!(
        h.factory.request_channel(ChannelKind::RoomList, None, None).unwrap(),
        RequestOutcome::Existing
    );
    h.factory.close_channel(ChannelId::room_list()).unwrap();
    assert!(h.factory.registry().room_list().is_none());
}

#[test]
fn close_all_twice_leaves_nothing_behind() {
    let mut h = Harness::new();
    let a = h.room("a@conf.example.com");
    let b = h.room("b@conf.example.com");
    request_text(&mut h, &a).unwrap();
    h.feed(&self_presence("a@conf.example.com", "me"));
    h.factory
        .request_channel(ChannelKind::Tubes, Some(HandleType::Room), Some(b.handle()))
        .unwrap();
    h.factory.request_channel(ChannelKind::RoomList, None, None).unwrap();
    h.feed(&direct_invite("c@conf.example.com", "alice@example.com"));
    h.drain();

    h.factory.close_all();
    assert!(h.factory.registry().is_empty());
    assert_eq!(h.factory.pending_invites(), 0);
    let closed = h.drain();
    assert!(closed.contains(&MucEvent::ChannelClosed(ChannelId::text(a.handle()))));
    assert!(closed.contains(&MucEvent::ChannelClosed(ChannelId::room_list())));

    h.factory.close_all();
    assert!(h.drain().is_empty());
}

#[test]
fn messages_reach_the_room() {
    let mut h = Harness::new();
    let room = h.room(ROOM);
    request_text(&mut h, &room).unwrap();
    h.feed(&self_presence(ROOM, "me"));
    h.drain();

    h.factory.send_message(room.handle(), "hello all").unwrap();
    let sent = h.sent();
    let message = sent.last().unwrap();
    assert_eq!(message.attr("type"), Some("groupchat"));

    assert_eq!(
        h.feed(
            "<message xmlns='jabber:client' from='room@conf.example.com/alice' type='groupchat'>\
                <body>hi me</body>\
                <delay xmlns='urn:xmpp:delay' stamp='2024-03-01T10:00:00Z'/>\
            </message>"
        ),
        ProcessorResult::Drop
    );
    match h.drain().as_slice() {
        [MucEvent::MessageReceived { body, timestamp, .. }] => {
            assert_eq!(body, "hi me");
            assert_eq!(timestamp.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        }
        other => panic!("unexpected events {:?}", other),
    }
}

struct DropEverything;

impl MessageInterceptor for DropEverything {
    fn name(&self) -> &str {
        "drop-everything"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn intercept(&mut self, _stanza: &Element, _message: &IncomingMessage) -> ProcessorResult {
        ProcessorResult::Drop
    }
}

#[test]
fn interceptors_run_before_invites() {
    let mut h = Harness::new();
    h.factory.register_interceptor(Box::new(DropEverything));
    assert_eq!(
        h.feed(&mediated_invite(ROOM, "alice@example.com", "x")),
        ProcessorResult::Drop
    );
    assert_eq!(h.factory.registry().session_count(), 0);
}

#[tokio::test]
async fn run_processes_until_the_stream_closes() {
    let mut h = Harness::new();
    let room = h.room(ROOM);
    request_text(&mut h, &room).unwrap();

    let Harness { factory, mut events } = h;
    let (tx, rx) = mpsc::channel(8);
    let task = tokio::spawn(factory.run(rx));

    tx.send(self_presence(ROOM, "me").parse().unwrap()).await.unwrap();
    drop(tx);
    let factory = task.await.unwrap();

    assert!(!factory.is_attached());
    assert!(factory.registry().is_empty());

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&MucEvent::NewChannel(ChannelId::text(room.handle()))));
    assert!(seen.contains(&MucEvent::ChannelClosed(ChannelId::text(room.handle()))));
}
