//! Error types for the MUC layer.

use minidom::Element;
use thiserror::Error;

use crate::config::ConfigError;
use crate::handle::HandleError;
use crate::ns;
use crate::transport::TransportError;

/// Errors returned to callers of the factory and registry.
#[derive(Debug, Error)]
pub enum MucError {
    /// Handle is zero, released, or of the wrong type.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Channel kind or handle type we do not serve.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// No session exists for the room.
    #[error("No such room: {0}")]
    NoSuchRoom(String),

    /// The session exists but has not finished joining.
    #[error("Room not ready: {0}")]
    NotReady(String),

    /// The transport refused the stanza.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Stanza error to be reported back to the peer.
    #[error("Stanza error: {condition}")]
    Stanza {
        condition: StanzaErrorCondition,
        error_type: StanzaErrorType,
        text: Option<String>,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl MucError {
    pub fn invalid_handle(msg: impl Into<String>) -> Self {
        Self::InvalidHandle(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Create a stanza error for 'bad-request'.
    pub fn bad_request(text: Option<String>) -> Self {
        Self::Stanza {
            condition: StanzaErrorCondition::BadRequest,
            error_type: StanzaErrorType::Modify,
            text,
        }
    }

    /// Build the `<error/>` child for a stanza error; `None` for other variants.
    pub fn to_error_element(&self) -> Option<Element> {
        let Self::Stanza {
            condition,
            error_type,
            text,
        } = self
        else {
            return None;
        };

        let mut builder = Element::builder("error", ns::CLIENT)
            .attr("type", error_type.as_str())
            .append(Element::builder(condition.as_str(), ns::STANZAS).build());
        if let Some(text) = text {
            builder = builder.append(
                Element::builder("text", ns::STANZAS)
                    .append(text.as_str())
                    .build(),
            );
        }
        Some(builder.build())
    }
}

impl From<HandleError> for MucError {
    fn from(err: HandleError) -> Self {
        Self::InvalidHandle(err.to_string())
    }
}

impl From<TransportError> for MucError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

/// XMPP stanza error conditions (RFC 6120 Section 8.3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaErrorCondition {
    BadRequest,
    Conflict,
    FeatureNotImplemented,
    Forbidden,
    Gone,
    InternalServerError,
    ItemNotFound,
    JidMalformed,
    NotAcceptable,
    NotAllowed,
    NotAuthorized,
    PolicyViolation,
    RecipientUnavailable,
    Redirect,
    RegistrationRequired,
    RemoteServerNotFound,
    RemoteServerTimeout,
    ResourceConstraint,
    ServiceUnavailable,
    SubscriptionRequired,
    UndefinedCondition,
    UnexpectedRequest,
}

const ALL_CONDITIONS: &[StanzaErrorCondition] = &[
    StanzaErrorCondition::BadRequest,
    StanzaErrorCondition::Conflict,
    StanzaErrorCondition::FeatureNotImplemented,
    StanzaErrorCondition::Forbidden,
    StanzaErrorCondition::Gone,
    StanzaErrorCondition::InternalServerError,
    StanzaErrorCondition::ItemNotFound,
    StanzaErrorCondition::JidMalformed,
    StanzaErrorCondition::NotAcceptable,
    StanzaErrorCondition::NotAllowed,
    StanzaErrorCondition::NotAuthorized,
    StanzaErrorCondition::PolicyViolation,
    StanzaErrorCondition::RecipientUnavailable,
    StanzaErrorCondition::Redirect,
    StanzaErrorCondition::RegistrationRequired,
    StanzaErrorCondition::RemoteServerNotFound,
    StanzaErrorCondition::RemoteServerTimeout,
    StanzaErrorCondition::ResourceConstraint,
    StanzaErrorCondition::ServiceUnavailable,
    StanzaErrorCondition::SubscriptionRequired,
    StanzaErrorCondition::UndefinedCondition,
    StanzaErrorCondition::UnexpectedRequest,
];

impl StanzaErrorCondition {
    /// Get the element name for this condition.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad-request",
            Self::Conflict => "conflict",
            Self::FeatureNotImplemented => "feature-not-implemented",
            Self::Forbidden => "forbidden",
            Self::Gone => "gone",
            Self::InternalServerError => "internal-server-error",
            Self::ItemNotFound => "item-not-found",
            Self::JidMalformed => "jid-malformed",
            Self::NotAcceptable => "not-acceptable",
            Self::NotAllowed => "not-allowed",
            Self::NotAuthorized => "not-authorized",
            Self::PolicyViolation => "policy-violation",
            Self::RecipientUnavailable => "recipient-unavailable",
            Self::Redirect => "redirect",
            Self::RegistrationRequired => "registration-required",
            Self::RemoteServerNotFound => "remote-server-not-found",
            Self::RemoteServerTimeout => "remote-server-timeout",
            Self::ResourceConstraint => "resource-constraint",
            Self::ServiceUnavailable => "service-unavailable",
            Self::SubscriptionRequired => "subscription-required",
            Self::UndefinedCondition => "undefined-condition",
            Self::UnexpectedRequest => "unexpected-request",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL_CONDITIONS.iter().copied().find(|c| c.as_str() == name)
    }

    /// Condition carried by an `<error/>` element: its first child in the
    /// stanzas namespace.
    pub fn from_error_element(error: &Element) -> Option<Self> {
        error
            .children()
            .filter(|child| child.ns() == ns::STANZAS)
            .find_map(|child| Self::from_name(child.name()))
    }
}

impl std::fmt::Display for StanzaErrorCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// XMPP stanza error types (RFC 6120 Section 8.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaErrorType {
    Auth,
    Cancel,
    Modify,
    Wait,
}

impl StanzaErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Cancel => "cancel",
            Self::Modify => "modify",
            Self::Wait => "wait",
        }
    }
}

impl std::fmt::Display for StanzaErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a room join failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("nickname already in use")]
    NicknameInUse,
    #[error("room is password protected")]
    PasswordRequired,
    #[error("banned from room")]
    Banned,
    #[error("room is members-only")]
    MembersOnly,
    #[error("room is full")]
    RoomFull,
    #[error("room does not exist")]
    RoomNotFound,
    #[error("join failed")]
    Other,
}

impl From<Option<StanzaErrorCondition>> for JoinError {
    fn from(condition: Option<StanzaErrorCondition>) -> Self {
        match condition {
            Some(StanzaErrorCondition::Conflict) => Self::NicknameInUse,
            Some(StanzaErrorCondition::NotAuthorized) => Self::PasswordRequired,
            Some(StanzaErrorCondition::Forbidden) => Self::Banned,
            Some(StanzaErrorCondition::RegistrationRequired) => Self::MembersOnly,
            Some(StanzaErrorCondition::ServiceUnavailable) => Self::RoomFull,
            Some(StanzaErrorCondition::ItemNotFound) => Self::RoomNotFound,
            _ => Self::Other,
        }
    }
}

/// Delivery failure reported by a bounced message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("recipient offline")]
    Offline,
    #[error("invalid contact")]
    InvalidContact,
    #[error("permission denied")]
    PermissionDenied,
    #[error("message too long")]
    TooLong,
    #[error("not implemented")]
    NotImplemented,
    #[error("unknown delivery error")]
    Unknown,
}

impl From<Option<StanzaErrorCondition>> for SendError {
    fn from(condition: Option<StanzaErrorCondition>) -> Self {
        use StanzaErrorCondition as C;
        match condition {
            Some(C::ServiceUnavailable) => Self::Offline,
            Some(C::ItemNotFound | C::JidMalformed | C::RemoteServerTimeout) => {
                Self::InvalidContact
            }
            Some(C::Forbidden | C::NotAuthorized) => Self::PermissionDenied,
            Some(C::ResourceConstraint | C::NotAcceptable) => Self::TooLong,
            Some(C::FeatureNotImplemented) => Self::NotImplemented,
            _ => Self::Unknown,
        }
    }
}
