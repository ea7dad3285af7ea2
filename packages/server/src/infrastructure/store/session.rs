//! DashMap によるセッションストア実装

use dashmap::DashMap;

use crate::domain::{Session, SessionStore};

#[derive(Default)]
pub struct DashMapSessionStore {
    sessions: DashMap<String, Session>,
}

impl DashMapSessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for DashMapSessionStore {
    fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    fn set(&self, session: Session) {
        self.sessions.insert(session.session_id.clone(), session);
    }

    fn delete(&self, session_id: &str) -> Option<Session> {
        self.sessions.remove(session_id).map(|(_, session)| session)
    }

    fn touch(&self, session_id: &str, now_millis: i64) -> Option<Session> {
        let mut entry = self.sessions.get_mut(session_id)?;
        entry.last_activity_at = entry.last_activity_at.max(now_millis);
        Some(entry.value().clone())
    }

    fn sweep(&self, is_expired: &(dyn Fn(&Session) -> bool + Sync)) -> Vec<Session> {
        let candidates: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| is_expired(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        candidates
            .into_iter()
            .filter_map(|id| {
                self.sessions
                    .remove_if(&id, |_, session| is_expired(session))
                    .map(|(_, session)| session)
            })
            .collect()
    }

    fn list(&self) -> Vec<Session> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
