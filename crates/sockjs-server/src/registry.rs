//! Session registry shared by every transport handler of a server.

use std::sync::Arc;

use dashmap::DashMap;
use sockjs_core::SessionId;
use tracing::{debug, info};

use crate::session::Session;

/// Concurrent map of live polling sessions.
///
/// Sessions remove themselves when they close; nothing sweeps the map.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up `id`, creating the session with `create` if absent.
    ///
    /// The lookup and the insert happen under one shard lock, so two
    /// requests racing on a new id end up with the same session.
    pub fn get_or_insert_with(
        &self,
        id: &SessionId,
        create: impl FnOnce() -> Arc<Session>,
    ) -> Arc<Session> {
        let entry = self.sessions.entry(id.clone()).or_insert_with(|| {
            debug!(session_id = %id, "creating session");
            create()
        });
        Arc::clone(entry.value())
    }

    /// Remove `session` if it is still the entry for its id.
    pub(crate) fn remove(&self, session: &Session) -> bool {
        self.sessions
            .remove_if(session.id(), |_, current| {
                std::ptr::eq(Arc::as_ptr(current), session)
            })
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Close every registered session. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for session in &sessions {
            session.close();
        }
        if !sessions.is_empty() {
            info!(count = sessions.len(), "closed all sessions");
        }
        sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use super::*;
    use crate::session::{OpenHandler, SessionConfig};
    use sockjs_core::SockJsOptions;

    fn make(registry: &Arc<SessionRegistry>, id: &SessionId) -> Arc<Session> {
        let on_open: OpenHandler = Arc::new(|_| {});
        registry.get_or_insert_with(id, || {
            Session::new(
                id.clone(),
                SessionConfig::polling(&SockJsOptions::default()),
                on_open,
                Arc::downgrade(registry),
            )
        })
    }

    #[tokio::test]
    async fn get_or_insert_reuses_existing() {
        let registry = Arc::new(SessionRegistry::new());
        let id = SessionId::from_raw("a");
        let first = make(&registry, &id);
        let second = make(&registry, &id);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&id));
    }

    #[tokio::test]
    async fn close_removes_entry() {
        let registry = Arc::new(SessionRegistry::new());
        let id = SessionId::from_raw("a");
        let session = make(&registry, &id);
        session.close();
        assert!(registry.is_empty());
        assert!(registry.get(&id).is_none());
    }

    #[tokio::test]
    async fn remove_ignores_a_different_session_with_same_id() {
        let registry = Arc::new(SessionRegistry::new());
        let id = SessionId::from_raw("a");
        let registered = make(&registry, &id);
        let stray = Session::new(
            id.clone(),
            SessionConfig::polling(&SockJsOptions::default()),
            Arc::new(|_| {}),
            Weak::new(),
        );
        assert!(!registry.remove(&stray));
        assert!(registry.remove(&registered));
    }

    #[tokio::test]
    async fn close_all_empties_registry() {
        let registry = Arc::new(SessionRegistry::new());
        let a = make(&registry, &SessionId::from_raw("a"));
        let b = make(&registry, &SessionId::from_raw("b"));
        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());
        assert!(a.is_closed() && b.is_closed());
    }
}
