//! Background expiry: evicts dead sessions and finalizes absences.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::bus::EventBus;
use crate::events;
use crate::ledger::{AttendanceWrite, ChangeReason, PersistenceGateway};
use crate::session::{AttendanceSession, AttendanceStatus};
use crate::store::SessionStore;

/// What one reconciliation pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub absent_recorded: usize,
    pub persist_failures: usize,
}

/// Periodically scans the registry, removing every session whose deadline
/// has passed and finalizing its unresolved entries.
pub struct ExpirationSweeper {
    store: Arc<SessionStore>,
    gateway: Arc<dyn PersistenceGateway>,
    bus: EventBus,
    interval: Duration,
}

impl ExpirationSweeper {
    pub fn new(
        store: Arc<SessionStore>,
        gateway: Arc<dyn PersistenceGateway>,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            gateway,
            bus,
            interval: Duration::from_secs(60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sweep cadence from global config (`SWEEP_INTERVAL_SECONDS`).
    pub fn from_config(
        store: Arc<SessionStore>,
        gateway: Arc<dyn PersistenceGateway>,
        bus: EventBus,
    ) -> Self {
        let interval = Duration::from_secs(common::Config::get().sweep_interval_seconds.max(1));
        Self::new(store, gateway, bus).with_interval(interval)
    }

    /// Runs forever on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.interval);
            // The immediate first tick; real work starts one interval in.
            tick.tick().await;
            loop {
                tick.tick().await;
                self.sweep_once(Utc::now()).await;
            }
        })
    }

    /// One pass over every live session. Returns how many sessions were
    /// reconciled. Never fails; one session's trouble does not stop the rest.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> usize {
        let mut swept = 0;
        for course_id in self.store.expired_courses(now) {
            // Only the caller that wins the removal reconciles.
            let Some(session) = self.store.remove(course_id) else {
                continue;
            };
            let summary = reconcile(
                &session,
                self.gateway.as_ref(),
                &self.bus,
                ChangeReason::WindowExpired,
                now,
            )
            .await;
            log::info!(
                "attendance window for course {course_id} closed: {} absent, {} persist failures",
                summary.absent_recorded,
                summary.persist_failures
            );
            swept += 1;
        }
        swept
    }
}

/// Finalizes every unresolved entry of a removed session as absent, then
/// announces the closed window.
///
/// Absences are attributed to the session owner. Per-entry persistence
/// failures are logged and skipped; one student's failure never blocks the
/// others.
pub async fn reconcile(
    session: &AttendanceSession,
    gateway: &dyn PersistenceGateway,
    bus: &EventBus,
    reason: ChangeReason,
    now: DateTime<Utc>,
) -> ReconcileSummary {
    session.mark_closed();

    let mut summary = ReconcileSummary::default();
    for entry in session.drain_unresolved() {
        let write = AttendanceWrite {
            course_id: session.course_id,
            student_id: entry.student_id,
            present: false,
            method: None,
            changed_by: session.opened_by,
            reason,
            taken_at: now,
        };
        match gateway.record_attendance(write).await {
            Ok(()) => {
                summary.absent_recorded += 1;
                events::student_status(
                    bus,
                    session.course_id,
                    entry.student_id,
                    AttendanceStatus::Absent,
                )
                .await;
            }
            Err(e) => {
                summary.persist_failures += 1;
                log::warn!(
                    "failed to record absence for student {} in course {}: {e}",
                    entry.student_id,
                    session.course_id
                );
            }
        }
    }

    events::window_closed(bus, session.course_id, now, summary.absent_recorded).await;
    summary
}
