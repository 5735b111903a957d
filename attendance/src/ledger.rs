//! Durable attendance rows, written once per resolved entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use thiserror::Error;

use crate::session::CheckInMethod;

#[derive(Debug, Clone, Error)]
#[error("attendance persistence failure: {0}")]
pub struct LedgerError(pub String);

/// Why a row was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    SelfCheckIn,
    WindowExpired,
    ManualClose,
}

impl ChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeReason::SelfCheckIn => "self_check_in",
            ChangeReason::WindowExpired => "window_expired",
            ChangeReason::ManualClose => "manual_close",
        }
    }
}

/// One finalized attendance outcome, ready to persist.
#[derive(Debug, Clone)]
pub struct AttendanceWrite {
    pub course_id: i64,
    pub student_id: i64,
    pub present: bool,
    pub method: Option<CheckInMethod>,
    pub changed_by: i64,
    pub reason: ChangeReason,
    pub taken_at: DateTime<Utc>,
}

/// A persisted row as read back for status queries.
#[derive(Debug, Clone)]
pub struct AttendanceRow {
    pub student_id: i64,
    pub present: bool,
    pub method: Option<String>,
    pub taken_at: DateTime<Utc>,
}

/// Durable store for finalized attendance.
///
/// Exactly-once is enforced upstream by atomic entry extraction; the gateway
/// only ever sees each resolution once.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn record_attendance(&self, write: AttendanceWrite) -> Result<(), LedgerError>;

    async fn attendance_for_course(
        &self,
        course_id: i64,
    ) -> Result<Vec<AttendanceRow>, LedgerError>;
}

/// SeaORM-backed gateway writing to the `attendance_records` table.
pub struct SeaOrmGateway {
    db: DatabaseConnection,
}

impl SeaOrmGateway {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PersistenceGateway for SeaOrmGateway {
    async fn record_attendance(&self, write: AttendanceWrite) -> Result<(), LedgerError> {
        db::models::attendance_record::Model::record(
            &self.db,
            write.course_id,
            write.student_id,
            write.present,
            write.method.map(|m| m.as_str()),
            write.changed_by,
            write.reason.as_str(),
            write.taken_at,
        )
        .await
        .map(|_| ())
        .map_err(|e| LedgerError(e.to_string()))
    }

    async fn attendance_for_course(
        &self,
        course_id: i64,
    ) -> Result<Vec<AttendanceRow>, LedgerError> {
        let rows = db::models::attendance_record::Model::for_course(&self.db, course_id)
            .await
            .map_err(|e| LedgerError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| AttendanceRow {
                student_id: r.student_id,
                present: r.present,
                method: r.method,
                taken_at: r.taken_at,
            })
            .collect())
    }
}
