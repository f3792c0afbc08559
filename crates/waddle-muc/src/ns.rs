//! XML namespaces used by the MUC layer.

pub const CLIENT: &str = "jabber:client";
pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

pub const MUC: &str = "http://jabber.org/protocol/muc";
pub const MUC_USER: &str = "http://jabber.org/protocol/muc#user";
/// Legacy direct invitations.
pub const X_CONFERENCE: &str = "jabber:x:conference";

pub const DISCO_INFO: &str = waddle_caps::ns::DISCO_INFO;
pub const DISCO_ITEMS: &str = "http://jabber.org/protocol/disco#items";

pub const TUBES: &str = waddle_caps::ns::TUBES;
pub const CHAT_STATES: &str = waddle_caps::ns::CHAT_STATES;

pub const DELAY: &str = "urn:xmpp:delay";
pub const LEGACY_DELAY: &str = "jabber:x:delay";
