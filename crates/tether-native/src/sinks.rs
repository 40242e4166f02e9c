//! Alert sinks registered with the engine shim.
//!
//! The shim hands `user_data` back on every callback. It carries a
//! registration id rather than the session address, so a callback still in
//! flight for a destroyed session can never reach a sink registered later for
//! a session allocated at the same address.

use std::collections::HashMap;
use std::sync::Arc;

use crate::alert::AlertSink;

pub(crate) struct SinkRegistry {
    next_id: usize,
    by_session: HashMap<usize, usize>,
    sinks: HashMap<usize, Arc<dyn AlertSink>>,
}

impl SinkRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            by_session: HashMap::new(),
            sinks: HashMap::new(),
        }
    }

    /// Register `sink` for `session`, replacing any previous registration.
    ///
    /// Returns the non-zero id to pass as `user_data`. Ids are never reused.
    pub(crate) fn register(&mut self, session: usize, sink: Arc<dyn AlertSink>) -> usize {
        self.unregister(session);
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).unwrap_or(1);
        self.by_session.insert(session, id);
        self.sinks.insert(id, sink);
        id
    }

    /// Drop the registration of `session`; returns whether one existed.
    pub(crate) fn unregister(&mut self, session: usize) -> bool {
        let Some(id) = self.by_session.remove(&session) else {
            return false;
        };
        self.sinks.remove(&id);
        true
    }

    /// Sink registered under `id`.
    pub(crate) fn sink(&self, id: usize) -> Option<Arc<dyn AlertSink>> {
        self.sinks.get(&id).cloned()
    }
}
