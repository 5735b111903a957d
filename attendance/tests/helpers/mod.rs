#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use attendance::bus::Receiver;
use attendance::ledger::{AttendanceRow, AttendanceWrite, LedgerError, PersistenceGateway};
use attendance::mailer::Mailer;
use attendance::{AllowedMethods, EnrolledStudent, GeoPoint, Geofence, OpenSessionRequest};

pub const OWNER_ID: i64 = 900;

/// Gateway that keeps writes in memory. Failures can be injected per student
/// to exercise the skip-and-continue paths.
#[derive(Default)]
pub struct MemoryGateway {
    pub writes: Mutex<Vec<AttendanceWrite>>,
    failing: Mutex<HashSet<i64>>,
}

impl MemoryGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn fail_for(&self, student_id: i64) {
        self.failing.lock().await.insert(student_id);
    }

    pub async fn heal(&self, student_id: i64) {
        self.failing.lock().await.remove(&student_id);
    }

    pub async fn writes_for(&self, course_id: i64, student_id: i64) -> Vec<AttendanceWrite> {
        self.writes
            .lock()
            .await
            .iter()
            .filter(|w| w.course_id == course_id && w.student_id == student_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn record_attendance(&self, write: AttendanceWrite) -> Result<(), LedgerError> {
        if self.failing.lock().await.contains(&write.student_id) {
            return Err(LedgerError("injected failure".into()));
        }
        self.writes.lock().await.push(write);
        Ok(())
    }

    async fn attendance_for_course(
        &self,
        course_id: i64,
    ) -> Result<Vec<AttendanceRow>, LedgerError> {
        Ok(self
            .writes
            .lock()
            .await
            .iter()
            .filter(|w| w.course_id == course_id)
            .map(|w| AttendanceRow {
                student_id: w.student_id,
                present: w.present,
                method: w.method.map(|m| m.as_str().to_string()),
                taken_at: w.taken_at,
            })
            .collect())
    }
}

/// Mailer that records every send instead of talking to SMTP.
#[derive(Default)]
pub struct MemoryMailer {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl MemoryMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Waits until `n` mails went out; dispatch runs on its own task.
    pub async fn wait_for_sends(&self, n: usize) -> Vec<(String, String, String)> {
        for _ in 0..100 {
            {
                let sent = self.sent.lock().await;
                if sent.len() >= n {
                    return sent.clone();
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("expected {n} sent mails");
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, to_email: &str, subject: &str, html_body: &str) -> Result<(), String> {
        self.sent.lock().await.push((
            to_email.to_owned(),
            subject.to_owned(),
            html_body.to_owned(),
        ));
        Ok(())
    }
}

pub async fn next_event(rx: &mut Receiver) -> serde_json::Value {
    let raw = tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("bus closed");
    serde_json::from_str(&raw).expect("event frames are json")
}

pub fn student(id: i64) -> EnrolledStudent {
    EnrolledStudent {
        id,
        username: format!("u{id}"),
        email: format!("u{id}@test.com"),
    }
}

/// Reference point used by most tests (Hatfield campus).
pub fn venue() -> GeoPoint {
    GeoPoint {
        latitude: -25.7545,
        longitude: 28.2314,
    }
}

pub fn open_request(
    course_id: i64,
    methods: AllowedMethods,
    strict_mode: bool,
    expires_at: DateTime<Utc>,
) -> OpenSessionRequest {
    OpenSessionRequest {
        course_id,
        course_label: "COS333".to_string(),
        opened_by: OWNER_ID,
        expires_at,
        methods,
        strict_mode,
        geofence: Some(Geofence {
            reference: venue(),
            radius_m: 150.0,
        }),
        otp_validity_minutes: 5,
    }
}

pub fn in_ten_minutes(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(10)
}
