//! Attendance events and the envelope they travel in.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bus::EventBus;
use crate::session::AttendanceStatus;

/// An event knows its stable name and the topic it belongs to.
pub trait Event: Serialize {
    const NAME: &'static str;
    /// Canonical topic path (e.g. "attendance:course:42").
    fn topic_path(&self) -> String;
}

/// Standard envelope sent for every broadcast frame.
#[derive(Serialize)]
pub struct EventEnvelope<'a, T> {
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub event: &'a str,
    pub topic: &'a str,
    pub payload: T,
    pub ts: String,
}

pub fn course_topic(course_id: i64) -> String {
    format!("attendance:course:{course_id}")
}

/// Broadcast a JSON-serialized `EventEnvelope` on the event's topic.
pub async fn emit<E: Event>(bus: &EventBus, ev: &E) {
    let topic = ev.topic_path();
    let env = EventEnvelope {
        r#type: "event",
        event: E::NAME,
        topic: &topic,
        payload: ev,
        ts: Utc::now().to_rfc3339(),
    };
    if let Ok(json) = serde_json::to_string(&env) {
        bus.broadcast(&topic, json).await;
    }
}

#[derive(Debug, Serialize)]
pub struct StudentStatusEvent {
    pub course_id: i64,
    pub student_id: i64,
    pub status: AttendanceStatus,
}

impl Event for StudentStatusEvent {
    const NAME: &'static str = "attendance.student_status";
    fn topic_path(&self) -> String {
        course_topic(self.course_id)
    }
}

#[derive(Debug, Serialize)]
pub struct WindowClosedEvent {
    pub course_id: i64,
    pub closed_at: String, // RFC3339
    pub absent_count: usize,
}

impl Event for WindowClosedEvent {
    const NAME: &'static str = "attendance.window_closed";
    fn topic_path(&self) -> String {
        course_topic(self.course_id)
    }
}

/* ---------- one-liner helpers ---------- */

pub async fn student_status(
    bus: &EventBus,
    course_id: i64,
    student_id: i64,
    status: AttendanceStatus,
) {
    emit(
        bus,
        &StudentStatusEvent {
            course_id,
            student_id,
            status,
        },
    )
    .await;
}

pub async fn window_closed(
    bus: &EventBus,
    course_id: i64,
    closed_at: DateTime<Utc>,
    absent_count: usize,
) {
    emit(
        bus,
        &WindowClosedEvent {
            course_id,
            closed_at: closed_at.to_rfc3339(),
            absent_count,
        },
    )
    .await;
}
