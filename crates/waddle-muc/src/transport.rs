//! Outbound stanza seam.
//!
//! The MUC layer never owns the XML stream. It sends stanzas, issues IQ
//! queries and registers for inbound stanza kinds through [`Transport`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use minidom::Element;
use thiserror::Error;
use tracing::debug;

use crate::ns;

/// Correlates an outstanding IQ query with its response (the IQ `id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryToken(String);

impl QueryToken {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StanzaKind {
    Message,
    Presence,
    Iq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u32);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("not connected")]
    Offline,

    #[error("no such handler: {0:?}")]
    UnknownHandler(HandlerId),
}

pub trait Transport: Send {
    fn send(&mut self, stanza: Element) -> Result<(), TransportError>;

    /// Send `<iq type='get' to='…'>` wrapping `query`.
    fn send_query(&mut self, to: &str, query: Element) -> Result<QueryToken, TransportError>;

    /// Forget an outstanding query; a late response will not be correlated.
    fn cancel_query(&mut self, token: &QueryToken);

    fn register_handler(&mut self, kind: StanzaKind) -> Result<HandlerId, TransportError>;

    fn unregister_handler(&mut self, id: HandlerId) -> Result<(), TransportError>;
}

/// In-memory transport: queues everything sent so it can be inspected.
#[derive(Debug)]
pub struct RecordingTransport {
    online: bool,
    outbound: Vec<Element>,
    pending_queries: HashSet<QueryToken>,
    cancelled: Vec<QueryToken>,
    handlers: HashMap<HandlerId, StanzaKind>,
    next_query: u64,
    next_handler: u32,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            online: true,
            outbound: Vec::new(),
            pending_queries: HashSet::new(),
            cancelled: Vec::new(),
            handlers: HashMap::new(),
            next_query: 0,
            next_handler: 0,
        }
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    /// Drain the stanzas sent so far.
    pub fn take_outbound(&mut self) -> Vec<Element> {
        std::mem::take(&mut self.outbound)
    }

    pub fn outbound(&self) -> &[Element] {
        &self.outbound
    }

    pub fn is_pending(&self, token: &QueryToken) -> bool {
        self.pending_queries.contains(token)
    }

    pub fn pending_queries(&self) -> usize {
        self.pending_queries.len()
    }

    pub fn cancelled(&self) -> &[QueryToken] {
        &self.cancelled
    }

    pub fn handler_count(&self, kind: StanzaKind) -> usize {
        self.handlers.values().filter(|k| **k == kind).count()
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, stanza: Element) -> Result<(), TransportError> {
        if !self.online {
            return Err(TransportError::Offline);
        }
        self.outbound.push(stanza);
        Ok(())
    }

    fn send_query(&mut self, to: &str, query: Element) -> Result<QueryToken, TransportError> {
        if !self.online {
            return Err(TransportError::Offline);
        }
        self.next_query += 1;
        let token = QueryToken::new(format!("muc-query-{}", self.next_query));
        let iq = Element::builder("iq", ns::CLIENT)
            .attr("type", "get")
            .attr("id", token.as_str())
            .attr("to", to)
            .append(query)
            .build();
        self.outbound.push(iq);
        self.pending_queries.insert(token.clone());
        Ok(token)
    }

    fn cancel_query(&mut self, token: &QueryToken) {
        if self.pending_queries.remove(token) {
            debug!(id = %token, "query cancelled");
            self.cancelled.push(token.clone());
        }
    }

    fn register_handler(&mut self, kind: StanzaKind) -> Result<HandlerId, TransportError> {
        self.next_handler += 1;
        let id = HandlerId(self.next_handler);
        self.handlers.insert(id, kind);
        Ok(id)
    }

    fn unregister_handler(&mut self, id: HandlerId) -> Result<(), TransportError> {
        self.handlers
            .remove(&id)
            .map(|_| ())
            .ok_or(TransportError::UnknownHandler(id))
    }
}
