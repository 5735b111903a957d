//! Check-in validation and the WAITING -> PRESENT transition.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::bus::EventBus;
use crate::credential;
use crate::error::CheckInError;
use crate::events;
use crate::geo;
use crate::ledger::{AttendanceWrite, ChangeReason, PersistenceGateway};
use crate::session::{AttendanceSession, AttendanceStatus, CheckInMethod, GeoPoint, PendingEntry};
use crate::store::SessionStore;

/// Six hex octets separated by `:` or `-`.
static DEVICE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]{2}([:-][0-9A-Fa-f]{2}){5}$").expect("device id regex"));

/// Uppercase hex with colon separators; `None` if the input is not a
/// hardware address.
pub fn normalize_device_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if !DEVICE_ID_RE.is_match(raw) {
        return None;
    }
    Some(raw.to_ascii_uppercase().replace('-', ":"))
}

/// Credential submitted with a check-in, one variant per method.
#[derive(Debug, Clone)]
pub enum Credential {
    EmailOtp {
        code: String,
    },
    Qr {
        payload: String,
        /// Required in strict mode.
        device_id: Option<String>,
    },
}

impl Credential {
    pub fn method(&self) -> CheckInMethod {
        match self {
            Credential::EmailOtp { .. } => CheckInMethod::EmailOtp,
            Credential::Qr { .. } => CheckInMethod::Qr,
        }
    }
}

/// A student's check-in attempt.
#[derive(Debug, Clone)]
pub struct CheckInRequest {
    pub course_id: i64,
    pub student_id: i64,
    pub credential: Credential,
    pub location: GeoPoint,
}

/// Success payload: how far from the venue, by which method, and when.
#[derive(Debug, Clone)]
pub struct CheckInConfirmation {
    pub course_id: i64,
    pub student_id: i64,
    pub method: CheckInMethod,
    pub distance_m: f64,
    pub taken_at: DateTime<Utc>,
}

/// Validates incoming check-ins against the live session state.
pub struct CheckInValidator {
    store: Arc<SessionStore>,
    gateway: Arc<dyn PersistenceGateway>,
    bus: EventBus,
    otp_window_tolerance: i64,
}

impl CheckInValidator {
    pub fn new(
        store: Arc<SessionStore>,
        gateway: Arc<dyn PersistenceGateway>,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            gateway,
            bus,
            otp_window_tolerance: 1,
        }
    }

    pub fn with_otp_tolerance(mut self, tolerance: i64) -> Self {
        self.otp_window_tolerance = tolerance;
        self
    }

    /// Validates one check-in attempt end to end.
    ///
    /// The pending entry is extracted before any credential check — that
    /// single atomic step is what defeats double check-ins. Every failure
    /// after extraction restores the entry so a legitimate retry still works.
    pub async fn check_in(
        &self,
        req: CheckInRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckInConfirmation, CheckInError> {
        let session = self
            .store
            .get(req.course_id)
            .ok_or(CheckInError::NoActiveSession)?;

        let method = req.credential.method();
        if !session.methods.allows(method) {
            return Err(CheckInError::MethodNotEnabled);
        }

        // Extraction happens on the session handle resolved above, never via
        // a second registry lookup, so a close-and-reopen between the two
        // steps cannot cross-wire entries of different windows.
        let mut entry = session
            .take_entry(req.student_id)
            .ok_or(CheckInError::AlreadyResolvedOrNotEnrolled)?;

        let distance_m = match self.validate(&session, &entry, &req, now) {
            Ok(distance_m) => distance_m,
            Err(e) => {
                self.roll_back(&session, entry, now).await;
                return Err(e);
            }
        };

        entry.checked_in = true;
        let write = AttendanceWrite {
            course_id: req.course_id,
            student_id: req.student_id,
            present: true,
            method: Some(method),
            changed_by: req.student_id,
            reason: ChangeReason::SelfCheckIn,
            taken_at: now,
        };
        if let Err(e) = self.gateway.record_attendance(write).await {
            // The slot must survive a storage hiccup or the student is lost.
            self.roll_back(&session, entry, now).await;
            return Err(CheckInError::Storage(e.to_string()));
        }

        events::student_status(
            &self.bus,
            req.course_id,
            req.student_id,
            AttendanceStatus::Present,
        )
        .await;

        Ok(CheckInConfirmation {
            course_id: req.course_id,
            student_id: req.student_id,
            method,
            distance_m,
            taken_at: now,
        })
    }

    fn validate(
        &self,
        session: &AttendanceSession,
        entry: &PendingEntry,
        req: &CheckInRequest,
        now: DateTime<Utc>,
    ) -> Result<f64, CheckInError> {
        match &req.credential {
            Credential::EmailOtp { code } => self.validate_otp(session, entry, code, now)?,
            Credential::Qr { payload, .. } => validate_qr(session, payload, now)?,
        }

        let distance_m = geo::haversine_distance_m(session.geofence.reference, req.location);
        if distance_m > session.geofence.radius_m {
            return Err(CheckInError::OutOfRange {
                distance_m,
                radius_m: session.geofence.radius_m,
            });
        }

        if session.strict_mode {
            if let Credential::Qr { device_id, .. } = &req.credential {
                let raw = device_id.as_deref().ok_or(CheckInError::InvalidDeviceId)?;
                let device = normalize_device_id(raw).ok_or(CheckInError::InvalidDeviceId)?;
                if session.claim_device(&device, entry.student_id).is_err() {
                    return Err(CheckInError::DeviceAlreadyUsed);
                }
            }
        }

        Ok(distance_m)
    }

    fn validate_otp(
        &self,
        session: &AttendanceSession,
        entry: &PendingEntry,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CheckInError> {
        let secret = entry
            .otp_secret
            .as_deref()
            .ok_or(CheckInError::InvalidOrExpiredCredential)?;
        if !credential::verify_code(
            secret,
            session.otp_validity_minutes,
            code,
            now,
            self.otp_window_tolerance,
        ) {
            return Err(CheckInError::InvalidOrExpiredCredential);
        }
        Ok(())
    }

    /// Restores the extracted entry. If the window closed underneath us and
    /// the reconciler already drained past this student, we own the absence
    /// write it would have made.
    async fn roll_back(
        &self,
        session: &AttendanceSession,
        entry: PendingEntry,
        now: DateTime<Utc>,
    ) {
        if let Some(orphan) = session.restore_entry(entry) {
            let write = AttendanceWrite {
                course_id: session.course_id,
                student_id: orphan.student_id,
                present: false,
                method: None,
                changed_by: session.opened_by,
                reason: ChangeReason::WindowExpired,
                taken_at: now,
            };
            match self.gateway.record_attendance(write).await {
                Ok(()) => {
                    events::student_status(
                        &self.bus,
                        session.course_id,
                        orphan.student_id,
                        AttendanceStatus::Absent,
                    )
                    .await;
                }
                Err(e) => {
                    log::warn!(
                        "failed to record absence for student {} in course {}: {e}",
                        orphan.student_id,
                        session.course_id
                    );
                }
            }
        }
    }
}

fn validate_qr(
    session: &AttendanceSession,
    submitted: &str,
    now: DateTime<Utc>,
) -> Result<(), CheckInError> {
    let expected =
        credential::qr_payload(session.course_id, session.strict_mode, session.expires_at);
    if submitted.trim() != expected || now > session.expires_at {
        return Err(CheckInError::InvalidOrExpiredCredential);
    }
    Ok(())
}
