//! Namespaces that appear in the feature table and capability stanzas.

/// Service Discovery info namespace (XEP-0030).
pub const DISCO_INFO: &str = "http://jabber.org/protocol/disco#info";
/// Entity Capabilities namespace (XEP-0115).
pub const CAPS: &str = "http://jabber.org/protocol/caps";

/// Node under which our own legacy bundles are published.
pub const WADDLE_CAPS_NODE: &str = "http://telepathy.freedesktop.org/caps";
/// Node used by the Google Talk client for its legacy bundles.
pub const GOOGLE_CAPS_NODE: &str = "http://www.google.com/xmpp/client/caps";

pub const GOOGLE_FEAT_SESSION: &str = "http://www.google.com/xmpp/protocol/session";
pub const GOOGLE_FEAT_VOICE: &str = "http://www.google.com/xmpp/protocol/voice/v1";
pub const GOOGLE_TRANSPORT_P2P: &str = "http://www.google.com/transport/p2p";

pub const JINGLE: &str = "http://jabber.org/protocol/jingle";
pub const JINGLE_DESCRIPTION_AUDIO: &str = "http://jabber.org/protocol/jingle/description/audio";
pub const JINGLE_DESCRIPTION_VIDEO: &str = "http://jabber.org/protocol/jingle/description/video";

pub const CHAT_STATES: &str = "http://jabber.org/protocol/chatstates";
pub const NICK: &str = "http://jabber.org/protocol/nick";
pub const NICK_NOTIFY: &str = "http://jabber.org/protocol/nick+notify";

pub const SI: &str = "http://jabber.org/protocol/si";
pub const IBB: &str = "http://jabber.org/protocol/ibb";
pub const TUBES: &str = "http://telepathy.freedesktop.org/xmpp/tubes";

pub const OLPC_BUDDY_PROPS_NOTIFY: &str = "http://laptop.org/xmpp/buddy-properties+notify";
pub const OLPC_ACTIVITIES_NOTIFY: &str = "http://laptop.org/xmpp/activities+notify";
pub const OLPC_CURRENT_ACTIVITY_NOTIFY: &str = "http://laptop.org/xmpp/current-activity+notify";
pub const OLPC_ACTIVITY_PROPS_NOTIFY: &str = "http://laptop.org/xmpp/activity-properties+notify";
