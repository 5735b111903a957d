//! In-memory model of one course's live attendance window.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::credential;

/// How a student may prove presence during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInMethod {
    EmailOtp,
    Qr,
}

impl CheckInMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInMethod::EmailOtp => "email_otp",
            CheckInMethod::Qr => "qr",
        }
    }
}

/// Methods enabled for a session. At least one must be selected; strict
/// sessions allow exactly one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllowedMethods {
    pub email_otp: bool,
    pub qr: bool,
}

impl AllowedMethods {
    pub fn none_selected(&self) -> bool {
        !self.email_otp && !self.qr
    }

    pub fn count(&self) -> usize {
        usize::from(self.email_otp) + usize::from(self.qr)
    }

    pub fn allows(&self, method: CheckInMethod) -> bool {
        match method {
            CheckInMethod::EmailOtp => self.email_otp,
            CheckInMethod::Qr => self.qr,
        }
    }
}

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Circular validity region around the course's reference coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geofence {
    pub reference: GeoPoint,
    pub radius_m: f64,
}

/// One enrolled student as captured when the window opens.
#[derive(Debug, Clone)]
pub struct EnrolledStudent {
    pub id: i64,
    pub username: String,
    pub email: String,
}

/// Broadcast status of a student within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttendanceStatus {
    Waiting,
    Present,
    Absent,
}

/// A student's unresolved slot within a session. Removal is the terminal
/// transition; an entry is never mutated after it leaves the session.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub student_id: i64,
    pub course_id: i64,
    pub email: String,
    /// Per-student key material; present only when the email method is on.
    pub otp_secret: Option<String>,
    pub checked_in: bool,
}

/// One course's attendance window while it is being taken.
///
/// Metadata is immutable after open; the entry and device maps are the only
/// mutable state and every mutation on them is a single atomic map operation,
/// so check-in workers and the sweeper can race safely.
#[derive(Debug)]
pub struct AttendanceSession {
    pub course_id: i64,
    pub opened_by: i64,
    pub expires_at: DateTime<Utc>,
    pub methods: AllowedMethods,
    pub strict_mode: bool,
    pub geofence: Geofence,
    /// Session-wide payload, shared by every student; set when QR is enabled.
    pub qr_payload: Option<String>,
    pub otp_validity_minutes: u32,
    /// Enrollment order fixed at open; reconciliation walks it.
    roster: Vec<i64>,
    entries: DashMap<i64, PendingEntry>,
    /// Device id -> claiming student, for strict QR sessions.
    devices: DashMap<String, i64>,
    /// Set by the reconciler before it drains; restores observe it.
    closed: AtomicBool,
}

impl AttendanceSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        course_id: i64,
        opened_by: i64,
        expires_at: DateTime<Utc>,
        methods: AllowedMethods,
        strict_mode: bool,
        geofence: Geofence,
        qr_payload: Option<String>,
        otp_validity_minutes: u32,
        entries: Vec<PendingEntry>,
    ) -> Self {
        let map = DashMap::new();
        let mut roster = Vec::with_capacity(entries.len());
        for entry in entries {
            // A student appears at most once; first enrollment wins.
            if !map.contains_key(&entry.student_id) {
                roster.push(entry.student_id);
                map.insert(entry.student_id, entry);
            }
        }

        Self {
            course_id,
            opened_by,
            expires_at,
            methods,
            strict_mode,
            geofence,
            qr_payload,
            otp_validity_minutes,
            roster,
            entries: map,
            devices: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Student ids still waiting, in enrollment order.
    pub fn pending_ids(&self) -> Vec<i64> {
        self.roster
            .iter()
            .copied()
            .filter(|id| self.entries.contains_key(id))
            .collect()
    }

    /// Atomically extracts one student's entry. Exactly one caller wins.
    pub fn take_entry(&self, student_id: i64) -> Option<PendingEntry> {
        self.entries.remove(&student_id).map(|(_, e)| e)
    }

    /// Puts an entry back after a failed check-in attempt so the student can
    /// retry.
    ///
    /// If the window was closed while the attempt was in flight, the
    /// reconciler may already have drained past this slot; in that case the
    /// entry is handed back to the caller, who owns its absence write.
    pub fn restore_entry(&self, mut entry: PendingEntry) -> Option<PendingEntry> {
        entry.checked_in = false;
        let student_id = entry.student_id;
        self.entries.insert(student_id, entry);
        if self.closed.load(Ordering::SeqCst) {
            self.take_entry(student_id)
        } else {
            None
        }
    }

    /// Marks the session closed. Must precede draining; after this point any
    /// restore returns the entry to the restoring caller instead.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Removes and returns every unresolved entry, in enrollment order.
    pub fn drain_unresolved(&self) -> Vec<PendingEntry> {
        self.roster
            .iter()
            .filter_map(|id| self.entries.remove(id).map(|(_, e)| e))
            .collect()
    }

    /// Atomically claims `device_id` for `student_id`. Fails with the prior
    /// owner when a different student already used the device this session.
    pub fn claim_device(&self, device_id: &str, student_id: i64) -> Result<(), i64> {
        match self.devices.entry(device_id.to_owned()) {
            Entry::Occupied(occupied) => {
                let owner = *occupied.get();
                if owner == student_id {
                    Ok(())
                } else {
                    Err(owner)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(student_id);
                Ok(())
            }
        }
    }

    /// Current rotating code for one student, for owner-side display.
    pub fn current_otp_code(&self, student_id: i64, now: DateTime<Utc>) -> Option<String> {
        let entry = self.entries.get(&student_id)?;
        let secret = entry.otp_secret.as_deref()?;
        Some(credential::current_code(
            secret,
            self.otp_validity_minutes,
            now,
        ))
    }
}
