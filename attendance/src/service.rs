//! Opening, closing and querying attendance windows.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, EntityTrait};

use crate::bus::EventBus;
use crate::credential;
use crate::error::OpenSessionError;
use crate::events;
use crate::ledger::{AttendanceRow, ChangeReason, LedgerError, PersistenceGateway};
use crate::mailer::{self, Mailer};
use crate::session::{
    AllowedMethods, AttendanceSession, AttendanceStatus, EnrolledStudent, GeoPoint, Geofence,
    PendingEntry,
};
use crate::store::SessionStore;
use crate::sweeper::{self, ReconcileSummary};

/// Parameters for opening one attendance window.
#[derive(Debug, Clone)]
pub struct OpenSessionRequest {
    pub course_id: i64,
    /// Display name used in credential emails (course code).
    pub course_label: String,
    pub opened_by: i64,
    pub expires_at: DateTime<Utc>,
    pub methods: AllowedMethods,
    pub strict_mode: bool,
    /// Required; `open_for_course` fills it from the course row.
    pub geofence: Option<Geofence>,
    pub otp_validity_minutes: u32,
}

/// What the opener gets back.
#[derive(Debug, Clone)]
pub struct OpenedSession {
    pub course_id: i64,
    pub expires_at: DateTime<Utc>,
    /// Present when the QR method is enabled; shown to the room.
    pub qr_payload: Option<String>,
    pub pending_count: usize,
}

/// Dual-source status: live sessions report pending entries from memory,
/// resolved outcomes always come from the persisted rows.
#[derive(Debug)]
pub enum SessionStatus {
    Live {
        expires_at: DateTime<Utc>,
        pending_students: Vec<i64>,
        recorded: Vec<AttendanceRow>,
    },
    Closed {
        recorded: Vec<AttendanceRow>,
    },
}

/// Opens and closes attendance windows and answers status queries.
pub struct SessionService {
    store: Arc<SessionStore>,
    gateway: Arc<dyn PersistenceGateway>,
    bus: EventBus,
    mailer: Arc<dyn Mailer>,
}

impl SessionService {
    pub fn new(
        store: Arc<SessionStore>,
        gateway: Arc<dyn PersistenceGateway>,
        bus: EventBus,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            gateway,
            bus,
            mailer,
        }
    }

    /// Opens a window for the given enrollment snapshot.
    ///
    /// Configuration problems fail before any entry exists. Entries are
    /// registered first; credential mail goes out on a separate task so a
    /// slow or failing send cannot leave a student untracked.
    pub async fn open_with_snapshot(
        &self,
        req: OpenSessionRequest,
        snapshot: Vec<EnrolledStudent>,
        now: DateTime<Utc>,
    ) -> Result<OpenedSession, OpenSessionError> {
        if req.methods.none_selected() {
            return Err(OpenSessionError::NoMethodSelected);
        }
        if req.strict_mode && req.methods.count() != 1 {
            return Err(OpenSessionError::StrictModeMethodConflict);
        }
        let geofence = req.geofence.ok_or(OpenSessionError::MissingGeofence)?;

        let qr_payload = req
            .methods
            .qr
            .then(|| credential::qr_payload(req.course_id, req.strict_mode, req.expires_at));

        let mut entries = Vec::with_capacity(snapshot.len());
        let mut outbox = Vec::new();
        for student in &snapshot {
            let otp_secret = req.methods.email_otp.then(credential::new_otp_secret);
            if let Some(secret) = &otp_secret {
                let code = credential::current_code(secret, req.otp_validity_minutes, now);
                outbox.push((student.email.clone(), code));
            }
            entries.push(PendingEntry {
                student_id: student.id,
                course_id: req.course_id,
                email: student.email.clone(),
                otp_secret,
                checked_in: false,
            });
        }

        let session = AttendanceSession::new(
            req.course_id,
            req.opened_by,
            req.expires_at,
            req.methods,
            req.strict_mode,
            geofence,
            qr_payload.clone(),
            req.otp_validity_minutes,
            entries,
        );

        let session = self
            .store
            .try_open(session)
            .map_err(|_| OpenSessionError::AlreadyActive)?;

        self.dispatch_codes(&req.course_label, outbox, req.otp_validity_minutes);

        for student_id in session.pending_ids() {
            events::student_status(
                &self.bus,
                req.course_id,
                student_id,
                AttendanceStatus::Waiting,
            )
            .await;
        }

        Ok(OpenedSession {
            course_id: req.course_id,
            expires_at: req.expires_at,
            qr_payload,
            pending_count: session.entry_count(),
        })
    }

    /// Opens using enrollment and geofence data loaded from the database.
    pub async fn open_for_course(
        &self,
        db: &DatabaseConnection,
        mut req: OpenSessionRequest,
        now: DateTime<Utc>,
    ) -> Result<OpenedSession, OpenSessionError> {
        let course = db::models::course::Entity::find_by_id(req.course_id)
            .one(db)
            .await
            .map_err(|e| OpenSessionError::Storage(e.to_string()))?
            .ok_or(OpenSessionError::CourseNotFound)?;

        req.course_label = course.code.clone();
        req.geofence = match (
            course.ref_latitude,
            course.ref_longitude,
            course.checkin_radius_m,
        ) {
            (Some(latitude), Some(longitude), Some(radius_m)) => Some(Geofence {
                reference: GeoPoint {
                    latitude,
                    longitude,
                },
                radius_m,
            }),
            _ => None,
        };

        let snapshot =
            db::models::course_enrollment::Model::snapshot_for_course(db, req.course_id)
                .await
                .map_err(|e| OpenSessionError::Storage(e.to_string()))?
                .into_iter()
                .map(|row| EnrolledStudent {
                    id: row.user_id,
                    username: row.username,
                    email: row.email,
                })
                .collect();

        self.open_with_snapshot(req, snapshot, now).await
    }

    /// Manual close. Follows the exact reconciliation path of expiry; the
    /// remove is atomic, so a racing sweep tick and a manual close resolve
    /// each entry exactly once between them.
    pub async fn close(&self, course_id: i64, now: DateTime<Utc>) -> Option<ReconcileSummary> {
        let session = self.store.remove(course_id)?;
        Some(
            sweeper::reconcile(
                &session,
                self.gateway.as_ref(),
                &self.bus,
                ChangeReason::ManualClose,
                now,
            )
            .await,
        )
    }

    pub async fn status(&self, course_id: i64) -> Result<SessionStatus, LedgerError> {
        let recorded = self.gateway.attendance_for_course(course_id).await?;
        match self.store.get(course_id) {
            Some(session) => Ok(SessionStatus::Live {
                expires_at: session.expires_at,
                pending_students: session.pending_ids(),
                recorded,
            }),
            None => Ok(SessionStatus::Closed { recorded }),
        }
    }

    fn dispatch_codes(
        &self,
        course_label: &str,
        outbox: Vec<(String, String)>,
        validity_minutes: u32,
    ) {
        if outbox.is_empty() {
            return;
        }
        let mailer = Arc::clone(&self.mailer);
        let course_label = course_label.to_owned();
        tokio::spawn(async move {
            for (email, code) in outbox {
                let (subject, html) = mailer::otp_email(&course_label, &code, validity_minutes);
                if let Err(e) = mailer.send(&email, &subject, &html).await {
                    log::warn!("failed to send attendance code to {email}: {e}");
                }
            }
        });
    }
}
