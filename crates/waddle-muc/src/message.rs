//! Incoming `<message/>` parsing shared by the router and the invite
//! resolver.

use chrono::{DateTime, NaiveDateTime, Utc};
use minidom::Element;
use tracing::debug;
use xmpp_parsers::chatstates::ChatState;

use crate::error::{SendError, StanzaErrorCondition};
use crate::ns;

/// How a message body should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Normal,
    /// `/me` emote; the prefix is stripped from the body.
    Action,
    /// `type='headline'`.
    Notice,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub from: String,
    pub stanza_type: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub kind: TextKind,
    pub body: Option<String>,
    pub subject: Option<String>,
    pub chat_state: Option<ChatState>,
    pub send_error: Option<SendError>,
}

impl IncomingMessage {
    /// Parse a `<message/>`. Returns `None` when the stanza has no sender.
    pub fn parse(stanza: &Element) -> Option<Self> {
        let Some(from) = stanza.attr("from") else {
            debug!("message without from attribute");
            return None;
        };
        let stanza_type = stanza.attr("type").map(str::to_string);

        let send_error = if stanza_type.as_deref() == Some("error") {
            let condition = stanza
                .children()
                .find(|child| child.name() == "error")
                .and_then(StanzaErrorCondition::from_error_element);
            Some(SendError::from(condition))
        } else {
            None
        };

        let mut body = stanza
            .children()
            .find(|child| child.name() == "body")
            .map(Element::text);
        let subject = stanza
            .children()
            .find(|child| child.name() == "subject")
            .map(Element::text);

        let kind = if stanza_type.as_deref() == Some("headline") {
            TextKind::Notice
        } else if let Some(rest) = body.as_deref().and_then(|b| b.strip_prefix("/me ")) {
            body = Some(rest.to_string());
            TextKind::Action
        } else {
            TextKind::Normal
        };

        let chat_state = stanza
            .children()
            .filter(|child| child.ns() == ns::CHAT_STATES)
            .find_map(|child| ChatState::try_from(child.clone()).ok());

        Some(Self {
            from: from.to_string(),
            stanza_type,
            timestamp: delay_stamp(stanza).unwrap_or_else(Utc::now),
            kind,
            body,
            subject,
            chat_state,
            send_error,
        })
    }

    pub fn is_groupchat(&self) -> bool {
        self.stanza_type.as_deref() == Some("groupchat")
    }
}

/// Delivery timestamp from `urn:xmpp:delay`, falling back to the legacy
/// `jabber:x:delay` form.
fn delay_stamp(stanza: &Element) -> Option<DateTime<Utc>> {
    if let Some(stamp) = stanza
        .get_child("delay", ns::DELAY)
        .and_then(|delay| delay.attr("stamp"))
    {
        return DateTime::parse_from_rfc3339(stamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }

    stanza
        .get_child("x", ns::LEGACY_DELAY)
        .and_then(|x| x.attr("stamp"))
        .and_then(|stamp| NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H:%M:%S").ok())
        .map(|naive| naive.and_utc())
}
