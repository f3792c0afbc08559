//! Outstanding service-discovery queries.
//!
//! Every query carries a continuation value. The coordinator owns it until
//! the matching IQ arrives, at which point the token is forgotten and the
//! value handed back together with the result. Tokens are never completed
//! twice; cancelled tokens are simply unknown afterwards.

use std::collections::HashMap;

use minidom::Element;
use thiserror::Error;
use tracing::debug;

use crate::error::StanzaErrorCondition;
use crate::ns;
use crate::transport::{QueryToken, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoKind {
    Info,
    Items,
}

impl DiscoKind {
    fn namespace(self) -> &'static str {
        match self {
            Self::Info => ns::DISCO_INFO,
            Self::Items => ns::DISCO_ITEMS,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoError {
    #[error("remote error: {0:?}")]
    Remote(Option<StanzaErrorCondition>),

    #[error("result has no query payload")]
    MissingQuery,
}

#[derive(Debug)]
pub struct DiscoRequest<D> {
    pub kind: DiscoKind,
    pub target: String,
    pub node: Option<String>,
    pub data: D,
}

#[derive(Debug)]
pub struct DiscoCoordinator<D> {
    outstanding: HashMap<QueryToken, DiscoRequest<D>>,
}

impl<D> Default for DiscoCoordinator<D> {
    fn default() -> Self {
        Self {
            outstanding: HashMap::new(),
        }
    }
}

impl<D> DiscoCoordinator<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send a disco query to `target`. If the transport refuses, `data` is
    /// given back untouched.
    pub fn issue(
        &mut self,
        transport: &mut dyn Transport,
        kind: DiscoKind,
        target: &str,
        node: Option<&str>,
        data: D,
    ) -> Result<QueryToken, D> {
        let mut query = Element::builder("query", kind.namespace());
        if let Some(node) = node {
            query = query.attr("node", node);
        }

        match transport.send_query(target, query.build()) {
            Ok(token) => {
                debug!(id = %token, target = %target, ?kind, "disco query issued");
                self.outstanding.insert(
                    token.clone(),
                    DiscoRequest {
                        kind,
                        target: target.to_string(),
                        node: node.map(str::to_string),
                        data,
                    },
                );
                Ok(token)
            }
            Err(e) => {
                debug!(target = %target, error = %e, "disco query refused");
                Err(data)
            }
        }
    }

    /// Take the request for `token`. The token is forgotten before the
    /// caller sees the result.
    pub fn complete(&mut self, token: &QueryToken) -> Option<DiscoRequest<D>> {
        self.outstanding.remove(token)
    }

    pub fn is_outstanding(&self, token: &QueryToken) -> bool {
        self.outstanding.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    /// Cancel every outstanding query and drop the continuations.
    pub fn cancel_all(&mut self, transport: &mut dyn Transport) {
        let tokens: Vec<QueryToken> = self.outstanding.keys().cloned().collect();
        for token in &tokens {
            transport.cancel_query(token);
        }
        if !tokens.is_empty() {
            debug!(count = tokens.len(), "cancelled disco queries");
        }
        self.outstanding.clear();
    }
}

/// Interpret an IQ response to a disco query.
pub fn parse_response(iq: &Element, kind: DiscoKind) -> Result<Element, DiscoError> {
    if iq.attr("type") == Some("error") {
        let condition = iq
            .children()
            .find(|child| child.name() == "error")
            .and_then(StanzaErrorCondition::from_error_element);
        return Err(DiscoError::Remote(condition));
    }

    iq.get_child("query", kind.namespace())
        .cloned()
        .ok_or(DiscoError::MissingQuery)
}
