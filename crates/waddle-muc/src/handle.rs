//! JID interning.
//!
//! Rooms and contacts are referred to by small integer [`Handle`]s. A
//! repository hands them out for normalised JIDs and counts references;
//! the handle is forgotten once the last reference is released.
//!
//! [`HandleRef`] is the owned form: it holds one reference and gives it
//! back on drop.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};

use jid::{BareJid, FullJid, Jid};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonZeroU32);

impl Handle {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleType {
    Contact,
    Room,
}

/// How a contact JID is normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandleContext {
    /// Strip the resource.
    #[default]
    Normal,
    /// `room@service/nick`: the resource is the occupant's nickname and is kept.
    RoomMember,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandleError {
    #[error("invalid JID '{jid}': {reason}")]
    InvalidJid { jid: String, reason: String },

    #[error("'{0}' is not a room JID")]
    NotARoom(String),

    #[error("'{0}' has no occupant nickname")]
    MissingNick(String),
}

pub trait HandleRepository: Send + Sync {
    fn handle_type(&self) -> HandleType;

    /// Intern `jid` and take one reference on the handle.
    fn ensure(&self, jid: &str, context: HandleContext) -> Result<Handle, HandleError>;

    /// Handle for `jid` if it is currently interned. Takes no reference.
    fn lookup(&self, jid: &str, context: HandleContext) -> Option<Handle>;

    /// Normalised JID for a live handle.
    fn inspect(&self, handle: Handle) -> Option<String>;

    fn is_valid(&self, handle: Handle) -> bool;

    fn reference(&self, handle: Handle);

    fn release(&self, handle: Handle);
}

#[derive(Debug, Default)]
struct Interned {
    names: HashMap<String, Handle>,
    entries: HashMap<Handle, (String, usize)>,
    next: u32,
}

/// In-process repository for one handle type.
#[derive(Debug)]
pub struct MemoryHandleRepository {
    handle_type: HandleType,
    state: Mutex<Interned>,
}

impl MemoryHandleRepository {
    pub fn new(handle_type: HandleType) -> Self {
        Self {
            handle_type,
            state: Mutex::new(Interned::default()),
        }
    }

    fn normalize(&self, jid: &str, context: HandleContext) -> Result<String, HandleError> {
        let parsed: Jid = jid.parse().map_err(|e: jid::Error| HandleError::InvalidJid {
            jid: jid.to_string(),
            reason: e.to_string(),
        })?;

        match (self.handle_type, context) {
            (HandleType::Room, _) => {
                let bare: BareJid = parsed.to_bare();
                if parsed.resource().is_some() || bare.node().is_none() {
                    return Err(HandleError::NotARoom(jid.to_string()));
                }
                Ok(bare.to_string())
            }
            (HandleType::Contact, HandleContext::Normal) => Ok(parsed.to_bare().to_string()),
            (HandleType::Contact, HandleContext::RoomMember) => {
                if parsed.resource().is_none() {
                    return Err(HandleError::MissingNick(jid.to_string()));
                }
                let full: FullJid = jid.parse().map_err(|e: jid::Error| HandleError::InvalidJid {
                    jid: jid.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(full.to_string())
            }
        }
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reference count of a live handle, 0 if it is not interned.
    pub fn ref_count(&self, handle: Handle) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(&handle)
            .map(|(_, refs)| *refs)
            .unwrap_or(0)
    }
}

impl HandleRepository for MemoryHandleRepository {
    fn handle_type(&self) -> HandleType {
        self.handle_type
    }

    fn ensure(&self, jid: &str, context: HandleContext) -> Result<Handle, HandleError> {
        let name = self.normalize(jid, context)?;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(handle) = state.names.get(&name).copied() {
            if let Some((_, refs)) = state.entries.get_mut(&handle) {
                *refs += 1;
            }
            return Ok(handle);
        }

        state.next += 1;
        let Some(handle) = Handle::new(state.next) else {
            return Err(HandleError::InvalidJid {
                jid: jid.to_string(),
                reason: "handle space exhausted".to_string(),
            });
        };
        trace!(handle = %handle, jid = %name, "interned");
        state.names.insert(name.clone(), handle);
        state.entries.insert(handle, (name, 1));
        Ok(handle)
    }

    fn lookup(&self, jid: &str, context: HandleContext) -> Option<Handle> {
        let name = self.normalize(jid, context).ok()?;
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .get(&name)
            .copied()
    }

    fn inspect(&self, handle: Handle) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(&handle)
            .map(|(name, _)| name.clone())
    }

    fn is_valid(&self, handle: Handle) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .contains_key(&handle)
    }

    fn reference(&self, handle: Handle) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, refs)) = state.entries.get_mut(&handle) {
            *refs += 1;
        }
    }

    fn release(&self, handle: Handle) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some((_, refs)) = state.entries.get_mut(&handle) else {
            return;
        };
        *refs -= 1;
        if *refs == 0 {
            if let Some((name, _)) = state.entries.remove(&handle) {
                trace!(handle = %handle, jid = %name, "released");
                state.names.remove(&name);
            }
        }
    }
}

/// One owned reference on a handle.
pub struct HandleRef {
    handle: Handle,
    repo: Arc<dyn HandleRepository>,
}

impl HandleRef {
    pub fn ensure(
        repo: &Arc<dyn HandleRepository>,
        jid: &str,
        context: HandleContext,
    ) -> Result<Self, HandleError> {
        let handle = repo.ensure(jid, context)?;
        Ok(Self {
            handle,
            repo: Arc::clone(repo),
        })
    }

    /// Take a new reference on an already-live handle.
    pub fn from_live(repo: &Arc<dyn HandleRepository>, handle: Handle) -> Option<Self> {
        if !repo.is_valid(handle) {
            return None;
        }
        repo.reference(handle);
        Some(Self {
            handle,
            repo: Arc::clone(repo),
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn jid(&self) -> String {
        self.repo.inspect(self.handle).unwrap_or_default()
    }
}

impl Clone for HandleRef {
    fn clone(&self) -> Self {
        self.repo.reference(self.handle);
        Self {
            handle: self.handle,
            repo: Arc::clone(&self.repo),
        }
    }
}

impl Drop for HandleRef {
    fn drop(&mut self) {
        self.repo.release(self.handle);
    }
}

impl fmt::Debug for HandleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRef")
            .field("handle", &self.handle)
            .field("jid", &self.jid())
            .finish()
    }
}

impl PartialEq for HandleRef {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle && Arc::ptr_eq(&self.repo, &other.repo)
    }
}

/// The contact and room repositories of one connection.
#[derive(Clone)]
pub struct Handles {
    pub contacts: Arc<dyn HandleRepository>,
    pub rooms: Arc<dyn HandleRepository>,
}

impl Handles {
    pub fn new(contacts: Arc<dyn HandleRepository>, rooms: Arc<dyn HandleRepository>) -> Self {
        debug_assert_eq!(contacts.handle_type(), HandleType::Contact);
        debug_assert_eq!(rooms.handle_type(), HandleType::Room);
        Self { contacts, rooms }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryHandleRepository::new(HandleType::Contact)),
            Arc::new(MemoryHandleRepository::new(HandleType::Room)),
        )
    }

    pub fn repo(&self, handle_type: HandleType) -> &Arc<dyn HandleRepository> {
        match handle_type {
            HandleType::Contact => &self.contacts,
            HandleType::Room => &self.rooms,
        }
    }

    /// Room handle for the bare part of `jid`, without taking a reference.
    pub fn room_for(&self, jid: &str) -> Option<Handle> {
        let bare = jid.split_once('/').map_or(jid, |(bare, _)| bare);
        self.rooms.lookup(bare, HandleContext::Normal)
    }
}

impl fmt::Debug for Handles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handles").finish_non_exhaustive()
    }
}
