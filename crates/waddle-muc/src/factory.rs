//! Connection-level entry point for multi-user chat.
//!
//! [`MucFactory`] owns the transport, the session registry and the invite
//! resolver. It registers stanza handlers when the connection comes up,
//! dispatches every inbound stanza, and answers channel requests.

use minidom::Element;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::{ChannelId, ChannelKind, RequestOutcome};
use crate::config::MucConfig;
use crate::error::MucError;
use crate::event::{self, EventReceiver};
use crate::handle::{Handle, HandleContext, HandleRef, HandleType, Handles};
use crate::invite::{Invitation, InviteOutcome, InviteResolver};
use crate::message::IncomingMessage;
use crate::registry::MucRegistry;
use crate::router::{self, ProcessorResult};
use crate::transport::{HandlerId, QueryToken, StanzaKind, Transport};

/// Hook that sees every inbound message before the room router does.
pub trait MessageInterceptor: Send {
    fn name(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32;

    fn intercept(&mut self, stanza: &Element, message: &IncomingMessage) -> ProcessorResult;
}

pub struct MucFactory<T: Transport> {
    transport: T,
    handles: Handles,
    registry: MucRegistry,
    invites: InviteResolver,
    interceptors: Vec<Box<dyn MessageInterceptor>>,
    handlers: Option<[HandlerId; 3]>,
}

impl<T: Transport> MucFactory<T> {
    pub fn new(
        config: &MucConfig,
        transport: T,
        handles: Handles,
    ) -> Result<(Self, EventReceiver), MucError> {
        let account = config.account_jid()?;
        let self_handle =
            HandleRef::ensure(&handles.contacts, &account.to_string(), HandleContext::Normal)?;
        let (events_tx, events_rx) = event::channel();

        let registry = MucRegistry::new(handles.clone(), self_handle, &config.nickname(), events_tx)
            .with_history_limit(config.muc.history_max_stanzas)
            .with_conference_server(config.muc.conference_server.clone());

        debug!(account = %account, nick = %config.nickname(), "muc factory created");
        Ok((
            Self {
                transport,
                handles,
                registry,
                invites: InviteResolver::new(config.muc.legacy_invites),
                interceptors: Vec::new(),
                handlers: None,
            },
            events_rx,
        ))
    }

    pub fn register_interceptor(&mut self, interceptor: Box<dyn MessageInterceptor>) {
        debug!(name = interceptor.name(), priority = interceptor.priority(), "interceptor registered");
        self.interceptors.push(interceptor);
        self.interceptors.sort_by_key(|i| i.priority());
    }

    /// Register stanza handlers. Called once when the connection comes up.
    pub fn attach(&mut self) -> Result<(), MucError> {
        assert!(self.handlers.is_none(), "muc factory attached twice");
        let message = self.transport.register_handler(StanzaKind::Message)?;
        let presence = self.transport.register_handler(StanzaKind::Presence)?;
        let iq = self.transport.register_handler(StanzaKind::Iq)?;
        self.handlers = Some([message, presence, iq]);
        info!("muc handlers attached");
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.handlers.is_some()
    }

    /// Unregister the handlers and close every channel.
    pub fn detach(&mut self) {
        let Some(handlers) = self.handlers.take() else {
            return;
        };
        for id in handlers {
            if let Err(e) = self.transport.unregister_handler(id) {
                warn!(error = %e, "failed to unregister handler");
            }
        }
        self.close_all();
        info!("muc handlers detached");
    }

    pub fn close_all(&mut self) {
        self.invites.cancel_all(&mut self.transport);
        self.registry.close_all();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn registry(&self) -> &MucRegistry {
        &self.registry
    }

    pub fn handles(&self) -> &Handles {
        &self.handles
    }

    pub fn pending_invites(&self) -> usize {
        self.invites.pending()
    }

    /// Feed one inbound stanza through the MUC handlers.
    pub fn dispatch(&mut self, stanza: &Element) -> ProcessorResult {
        match stanza.name() {
            "message" => self.on_message(stanza),
            "presence" => router::route_presence(&mut self.registry, &self.handles, stanza),
            "iq" => self.on_iq(stanza),
            other => {
                debug!(name = %other, "ignoring unknown stanza");
                ProcessorResult::Continue
            }
        }
    }

    fn on_message(&mut self, stanza: &Element) -> ProcessorResult {
        let Some(message) = IncomingMessage::parse(stanza) else {
            return ProcessorResult::Drop;
        };

        for interceptor in &mut self.interceptors {
            if interceptor.intercept(stanza, &message) == ProcessorResult::Drop {
                debug!(name = interceptor.name(), from = %message.from, "message intercepted");
                return ProcessorResult::Drop;
            }
        }

        match self
            .invites
            .process(stanza, &message, &self.handles, &mut self.transport)
        {
            InviteOutcome::NotInvite => {}
            InviteOutcome::Consumed => return ProcessorResult::Drop,
            InviteOutcome::Accepted(invitation) => {
                self.accept(invitation);
                return ProcessorResult::Drop;
            }
        }

        router::route_message(&mut self.registry, &self.handles, &message)
    }

    fn on_iq(&mut self, stanza: &Element) -> ProcessorResult {
        if !matches!(stanza.attr("type"), Some("result") | Some("error")) {
            return ProcessorResult::Continue;
        }
        let Some(id) = stanza.attr("id") else {
            return ProcessorResult::Continue;
        };
        let token = QueryToken::new(id);
        if !self.invites.owns(&token) {
            return ProcessorResult::Continue;
        }
        if let Some(invitation) = self.invites.complete(&token, stanza, &self.handles) {
            self.accept(invitation);
        }
        ProcessorResult::Drop
    }

    fn accept(&mut self, invitation: Invitation) {
        self.registry
            .ensure_invited_session(invitation.room, invitation.inviter, invitation.reason);
    }

    pub fn request_channel(
        &mut self,
        kind: ChannelKind,
        handle_type: Option<HandleType>,
        handle: Option<Handle>,
    ) -> Result<RequestOutcome, MucError> {
        if kind == ChannelKind::RoomList {
            return Ok(self.registry.request_room_list());
        }

        if handle_type != Some(HandleType::Room) {
            return Err(MucError::not_implemented(format!(
                "{} channels need a room handle",
                kind
            )));
        }
        let Some(room) = handle.filter(|h| self.handles.rooms.is_valid(*h)) else {
            return Err(MucError::invalid_handle("room handle is not valid"));
        };

        match kind {
            ChannelKind::Text => self.registry.request_session(&mut self.transport, room),
            ChannelKind::Tubes => self
                .registry
                .request_tubes_session(&mut self.transport, room),
            ChannelKind::RoomList => Ok(self.registry.request_room_list()),
        }
    }

    pub fn close_channel(&mut self, channel: ChannelId) -> Result<(), MucError> {
        match (channel.kind, channel.room) {
            (ChannelKind::Text, Some(room)) => self.registry.close_session(&mut self.transport, room),
            (ChannelKind::Tubes, Some(room)) => {
                self.registry.close_tubes_session(room);
                Ok(())
            }
            (ChannelKind::RoomList, _) => {
                self.registry.close_room_list();
                Ok(())
            }
            (_, None) => Err(MucError::invalid_handle(format!("{} has no room", channel))),
        }
    }

    pub fn send_message(&mut self, room: Handle, body: &str) -> Result<(), MucError> {
        self.registry.send_message(&mut self.transport, room, body)
    }

    pub fn handle_bytestream_offer(
        &mut self,
        room: Handle,
        stream_id: &str,
        initiator: Handle,
    ) -> Result<(), MucError> {
        self.registry
            .handle_bytestream_offer(room, stream_id, initiator)
    }

    /// Process stanzas until the sender side closes, then shut down.
    pub async fn run(mut self, mut stanzas: mpsc::Receiver<Element>) -> Self {
        if !self.is_attached() {
            if let Err(e) = self.attach() {
                warn!(error = %e, "could not attach muc handlers");
                return self;
            }
        }
        while let Some(stanza) = stanzas.recv().await {
            self.dispatch(&stanza);
        }
        debug!("stanza stream closed");
        self.detach();
        self
    }
}

impl<T: Transport> Drop for MucFactory<T> {
    fn drop(&mut self) {
        self.detach();
    }
}
