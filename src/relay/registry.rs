//! Live session bookkeeping
//!
//! Each session owns its own upstream call, so nothing here iterates or
//! broadcasts; the registry only tracks what must be torn down when a
//! session goes away.

use std::sync::Arc;

use dashmap::DashMap;

use super::session::Session;
use super::subscription::Subscription;
use crate::types::SessionId;
use crate::upstream::StreamHandle;

struct Entry {
    session: Arc<Session>,
    subscription: Option<Arc<Subscription>>,
    stream: Option<StreamHandle>,
}

/// Concurrent map from session id to its session, subscription and stream
#[derive(Default)]
pub struct SessionRegistry {
    entries: DashMap<SessionId, Entry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_session(&self, session: Arc<Session>) {
        self.entries.insert(
            session.id().clone(),
            Entry {
                session,
                subscription: None,
                stream: None,
            },
        );
    }

    /// Returns false if the session is no longer registered
    pub fn register_subscription(&self, id: &str, subscription: Arc<Subscription>) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) => {
                entry.subscription = Some(subscription);
                true
            }
            None => false,
        }
    }

    /// Keep the running upstream call so it can be cancelled on unregister.
    /// A session that already left gets its stream cancelled right away.
    pub fn attach_stream(&self, id: &str, stream: StreamHandle) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) => {
                entry.stream = Some(stream);
                true
            }
            None => {
                stream.cancel();
                false
            }
        }
    }

    /// Remove everything held for `id`, silencing and cancelling its stream
    pub fn unregister(&self, id: &str) -> Option<Arc<Session>> {
        let (_, entry) = self.entries.remove(id)?;
        if let Some(subscription) = &entry.subscription {
            subscription.detach();
        }
        if let Some(stream) = &entry.stream {
            stream.cancel();
        }
        Some(entry.session)
    }

    pub fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.entries.get(id).map(|entry| Arc::clone(&entry.session))
    }

    pub fn subscription(&self, id: &str) -> Option<Arc<Subscription>> {
        self.entries
            .get(id)
            .and_then(|entry| entry.subscription.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
