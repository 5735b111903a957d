//! Caller-facing failures for session and check-in operations.

use thiserror::Error;

/// Why a check-in attempt was rejected. Terminal per request; nothing here
/// is retried automatically.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckInError {
    #[error("no active attendance session for this course")]
    NoActiveSession,

    #[error("check-in method not enabled for this session")]
    MethodNotEnabled,

    #[error("attendance already resolved or student not enrolled")]
    AlreadyResolvedOrNotEnrolled,

    #[error("invalid or expired credential")]
    InvalidOrExpiredCredential,

    #[error("location is {distance_m:.1} m from the venue, outside the {radius_m:.1} m radius")]
    OutOfRange { distance_m: f64, radius_m: f64 },

    #[error("device identifier is not a valid hardware address")]
    InvalidDeviceId,

    #[error("device already used by another student in this session")]
    DeviceAlreadyUsed,

    #[error("failed to persist attendance record: {0}")]
    Storage(String),
}

/// Why a session could not be opened. All of these fail before any entry is
/// created.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpenSessionError {
    #[error("an attendance session is already active for this course")]
    AlreadyActive,

    #[error("at least one check-in method must be selected")]
    NoMethodSelected,

    #[error("strict mode requires exactly one check-in method")]
    StrictModeMethodConflict,

    #[error("course has no geofence configured")]
    MissingGeofence,

    #[error("course not found")]
    CourseNotFound,

    #[error("failed to load course data: {0}")]
    Storage(String),
}
