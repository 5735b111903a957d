//! Real-time attendance coordination for course sessions.
//!
//! A course owner opens a time-boxed window; enrolled students check in with
//! a rotating email code or the session QR payload, fenced to the course
//! location. A background sweeper finalizes everyone who never showed up.
//! Live state is in-process only; resolved outcomes are durable rows.

pub mod bus;
pub mod checkin;
pub mod credential;
pub mod error;
pub mod events;
pub mod geo;
pub mod ledger;
pub mod mailer;
pub mod service;
pub mod session;
pub mod store;
pub mod sweeper;

pub use checkin::{CheckInConfirmation, CheckInRequest, CheckInValidator, Credential};
pub use error::{CheckInError, OpenSessionError};
pub use service::{OpenSessionRequest, OpenedSession, SessionService, SessionStatus};
pub use session::{
    AllowedMethods, AttendanceSession, AttendanceStatus, CheckInMethod, EnrolledStudent, GeoPoint,
    Geofence, PendingEntry,
};
pub use store::SessionStore;
pub use sweeper::{ExpirationSweeper, ReconcileSummary};
