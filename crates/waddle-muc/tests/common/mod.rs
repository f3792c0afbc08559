//! Test utilities for driving a MUC factory with scripted stanzas.

#![allow(dead_code)]

use minidom::Element;
use waddle_muc::{
    EventReceiver, Handle, HandleContext, HandleRef, Handles, MucConfig, MucEvent, MucFactory,
    RecordingTransport,
};

pub const ACCOUNT: &str = "me@example.com";
pub const ROOM: &str = "room@conf.example.com";

/// A factory wired to a recording transport, with its event stream.
pub struct Harness {
    pub factory: MucFactory<RecordingTransport>,
    pub events: EventReceiver,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(
            "[account]\njid = \"me@example.com\"\n\n[muc]\nconference_server = \"conf.example.com\"\n",
        )
    }

    pub fn with_config(toml: &str) -> Self {
        let config = MucConfig::from_toml_str(toml).expect("valid test config");
        let (mut factory, events) =
            MucFactory::new(&config, RecordingTransport::new(), Handles::in_memory())
                .expect("factory");
        factory.attach().expect("attach");
        Self { factory, events }
    }

    pub fn handles(&self) -> &Handles {
        self.factory.handles()
    }

    /// Intern `jid` as a room; the returned reference keeps it alive.
    pub fn room(&self, jid: &str) -> HandleRef {
        HandleRef::ensure(&self.handles().rooms, jid, HandleContext::Normal).expect("room jid")
    }

    pub fn room_handle(&self, jid: &str) -> Option<Handle> {
        self.handles().room_for(jid)
    }

    pub fn feed(&mut self, xml: &str) -> waddle_muc::ProcessorResult {
        let stanza: Element = xml.parse().expect("well-formed stanza");
        self.factory.dispatch(&stanza)
    }

    pub fn sent(&mut self) -> Vec<Element> {
        self.factory.transport_mut().take_outbound()
    }

    pub fn drain(&mut self) -> Vec<MucEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn self_presence(room: &str, nick: &str) -> String {
    format!(
        "<presence xmlns='jabber:client' from='{room}/{nick}'>\
            <x xmlns='http://jabber.org/protocol/muc#user'>\
                <item affiliation='member' role='participant'/>\
                <status code='110'/>\
            </x>\
        </presence>"
    )
}

pub fn mediated_invite(room: &str, inviter: &str, reason: &str) -> String {
    format!(
        "<message xmlns='jabber:client' from='{room}' to='me@example.com/res'>\
            <x xmlns='http://jabber.org/protocol/muc#user'>\
                <invite from='{inviter}'><reason>{reason}</reason></invite>\
            </x>\
        </message>"
    )
}

pub fn direct_invite(room: &str, inviter: &str) -> String {
    format!(
        "<message xmlns='jabber:client' from='{inviter}' to='me@example.com/res'>\
            <body>Join us</body>\
            <x xmlns='jabber:x:conference' jid='{room}'/>\
        </message>"
    )
}

pub fn disco_info_result(id: &str, from: &str, category: &str, type_: &str) -> String {
    format!(
        "<iq xmlns='jabber:client' type='result' id='{id}' from='{from}'>\
            <query xmlns='http://jabber.org/protocol/disco#info'>\
                <identity category='{category}' type='{type_}'/>\
            </query>\
        </iq>"
    )
}
