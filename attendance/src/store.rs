//! Registry of live attendance sessions, one per course.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::session::{AttendanceSession, PendingEntry};

/// Concurrency-safe course id -> session registry.
///
/// Every mutation that must happen exactly once (open, remove, entry
/// extraction) is a single atomic operation on the underlying concurrent
/// map, so request workers and the sweeper can race freely and unrelated
/// courses never contend.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<i64, Arc<AttendanceSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `session` unless its course already has one. This is the
    /// sole gate against duplicate concurrent sessions for a course; the
    /// rejected session is handed back.
    pub fn try_open(
        &self,
        session: AttendanceSession,
    ) -> Result<Arc<AttendanceSession>, AttendanceSession> {
        match self.sessions.entry(session.course_id) {
            Entry::Occupied(_) => Err(session),
            Entry::Vacant(vacant) => {
                let session = Arc::new(session);
                vacant.insert(Arc::clone(&session));
                Ok(session)
            }
        }
    }

    pub fn get(&self, course_id: i64) -> Option<Arc<AttendanceSession>> {
        self.sessions
            .get(&course_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Atomic take-and-remove. Whoever receives the session owns its
    /// reconciliation; every other caller observes `None`.
    pub fn remove(&self, course_id: i64) -> Option<Arc<AttendanceSession>> {
        self.sessions.remove(&course_id).map(|(_, session)| session)
    }

    /// Atomically extracts one student's pending entry. Of two concurrent
    /// check-ins for the same student, exactly one gets the entry.
    pub fn remove_entry(&self, course_id: i64, student_id: i64) -> Option<PendingEntry> {
        self.get(course_id)?.take_entry(student_id)
    }

    /// Course ids whose session deadline has passed.
    pub fn expired_courses(&self, now: DateTime<Utc>) -> Vec<i64> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
