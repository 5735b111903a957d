//! Opening windows from course data and the dual-source status query.

mod helpers;

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};

use attendance::bus::EventBus;
use attendance::ledger::SeaOrmGateway;
use attendance::{
    AllowedMethods, CheckInRequest, CheckInValidator, Credential, OpenSessionError,
    SessionService, SessionStatus, SessionStore,
};
use db::models::{attendance_record, course, course_enrollment, user};
use db::test_utils::setup_test_db;

use helpers::{open_request, student, venue, MemoryGateway, MemoryMailer};

fn otp_only() -> AllowedMethods {
    AllowedMethods {
        email_otp: true,
        qr: false,
    }
}

#[tokio::test]
async fn open_for_course_runs_the_full_flow_against_the_database() {
    let dbc = setup_test_db().await;

    let lecturer = user::Model::create(&dbc, "lect1", "lect1@test.com")
        .await
        .unwrap();
    let s1 = user::Model::create(&dbc, "u23000101", "u23000101@test.com")
        .await
        .unwrap();
    let s2 = user::Model::create(&dbc, "u23000102", "u23000102@test.com")
        .await
        .unwrap();

    let c = course::Model::create(
        &dbc,
        "COS333",
        "Networks",
        2026,
        Some(venue().latitude),
        Some(venue().longitude),
        Some(150.0),
    )
    .await
    .unwrap();

    course_enrollment::Model::enroll(&dbc, lecturer.id, c.id, course_enrollment::Role::Lecturer, true)
        .await
        .unwrap();
    course_enrollment::Model::enroll(&dbc, s1.id, c.id, course_enrollment::Role::Student, true)
        .await
        .unwrap();
    course_enrollment::Model::enroll(&dbc, s2.id, c.id, course_enrollment::Role::Student, true)
        .await
        .unwrap();

    let store = Arc::new(SessionStore::new());
    let gateway = Arc::new(SeaOrmGateway::new(dbc.clone()));
    let bus = EventBus::new();
    let mailer = MemoryMailer::new();

    let service = SessionService::new(
        Arc::clone(&store),
        gateway.clone(),
        bus.clone(),
        mailer.clone(),
    );
    let validator = CheckInValidator::new(Arc::clone(&store), gateway.clone(), bus.clone());

    let now = Utc::now();
    let mut req = open_request(c.id, otp_only(), false, now + ChronoDuration::minutes(10));
    req.opened_by = lecturer.id;
    req.geofence = None; // loaded from the course row
    let opened = service.open_for_course(&dbc, req, now).await.unwrap();
    assert_eq!(opened.pending_count, 2);
    assert!(opened.qr_payload.is_none());

    // Both students got their code by mail, labeled with the course code.
    let sent = mailer.wait_for_sends(2).await;
    assert!(sent.iter().any(|(to, _, _)| to == "u23000101@test.com"));
    assert!(sent.iter().all(|(_, subject, _)| subject.contains("COS333")));

    let code = current_code_for(&store, c.id, s1.id, now);
    validator
        .check_in(
            CheckInRequest {
                course_id: c.id,
                student_id: s1.id,
                credential: Credential::EmailOtp { code },
                location: venue(),
            },
            now,
        )
        .await
        .unwrap();

    // Live status: one pending in memory, one resolved row on disk.
    match service.status(c.id).await.unwrap() {
        SessionStatus::Live {
            pending_students,
            recorded,
            ..
        } => {
            assert_eq!(pending_students, vec![s2.id]);
            assert_eq!(recorded.len(), 1);
            assert!(recorded[0].present);
            assert_eq!(recorded[0].student_id, s1.id);
        }
        other => panic!("expected a live session, got {other:?}"),
    }

    let summary = service.close(c.id, now).await.unwrap();
    assert_eq!(summary.absent_recorded, 1);

    match service.status(c.id).await.unwrap() {
        SessionStatus::Closed { recorded } => {
            assert_eq!(recorded.len(), 2);
        }
        other => panic!("expected a closed session, got {other:?}"),
    }

    let rows = attendance_record::Model::for_course(&dbc, c.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    let absent = rows.iter().find(|r| r.student_id == s2.id).unwrap();
    assert!(!absent.present);
    assert_eq!(absent.changed_by, lecturer.id);
    assert_eq!(absent.change_reason, "manual_close");
}

#[tokio::test]
async fn open_fails_before_any_entry_when_configuration_is_missing() {
    let dbc = setup_test_db().await;

    let lecturer = user::Model::create(&dbc, "lect1", "lect1@test.com")
        .await
        .unwrap();
    // No geofence columns configured.
    let c = course::Model::create(&dbc, "COS301", "Software engineering", 2026, None, None, None)
        .await
        .unwrap();

    let store = Arc::new(SessionStore::new());
    let service = SessionService::new(
        Arc::clone(&store),
        Arc::new(SeaOrmGateway::new(dbc.clone())),
        EventBus::new(),
        MemoryMailer::new(),
    );

    let now = Utc::now();
    let mut req = open_request(c.id, otp_only(), false, now + ChronoDuration::minutes(10));
    req.opened_by = lecturer.id;
    req.geofence = None;

    let err = service.open_for_course(&dbc, req, now).await.unwrap_err();
    assert_eq!(err, OpenSessionError::MissingGeofence);
    assert!(store.is_empty());

    let mut req = open_request(404, otp_only(), false, now + ChronoDuration::minutes(10));
    req.geofence = None;
    let err = service.open_for_course(&dbc, req, now).await.unwrap_err();
    assert_eq!(err, OpenSessionError::CourseNotFound);
}

#[tokio::test]
async fn method_selection_is_validated_at_open() {
    let store = Arc::new(SessionStore::new());
    let service = SessionService::new(
        Arc::clone(&store),
        MemoryGateway::new(),
        EventBus::new(),
        MemoryMailer::new(),
    );
    let now = Utc::now();

    let none = AllowedMethods {
        email_otp: false,
        qr: false,
    };
    let err = service
        .open_with_snapshot(
            open_request(1, none, false, now + ChronoDuration::minutes(10)),
            vec![student(101)],
            now,
        )
        .await
        .unwrap_err();
    assert_eq!(err, OpenSessionError::NoMethodSelected);

    let both = AllowedMethods {
        email_otp: true,
        qr: true,
    };
    let err = service
        .open_with_snapshot(
            open_request(1, both, true, now + ChronoDuration::minutes(10)),
            vec![student(101)],
            now,
        )
        .await
        .unwrap_err();
    assert_eq!(err, OpenSessionError::StrictModeMethodConflict);

    assert!(store.is_empty());
}

#[tokio::test]
async fn a_course_holds_at_most_one_live_session() {
    let store = Arc::new(SessionStore::new());
    let service = SessionService::new(
        Arc::clone(&store),
        MemoryGateway::new(),
        EventBus::new(),
        MemoryMailer::new(),
    );
    let now = Utc::now();

    service
        .open_with_snapshot(
            open_request(1, otp_only(), false, now + ChronoDuration::minutes(10)),
            vec![student(101)],
            now,
        )
        .await
        .unwrap();

    let err = service
        .open_with_snapshot(
            open_request(1, otp_only(), false, now + ChronoDuration::minutes(10)),
            vec![student(102)],
            now,
        )
        .await
        .unwrap_err();
    assert_eq!(err, OpenSessionError::AlreadyActive);

    // The losing open leaves the original roster untouched.
    assert_eq!(store.get(1).unwrap().pending_ids(), vec![101]);
}

fn current_code_for(
    store: &SessionStore,
    course_id: i64,
    student_id: i64,
    now: chrono::DateTime<Utc>,
) -> String {
    store
        .get(course_id)
        .unwrap()
        .current_otp_code(student_id, now)
        .unwrap()
}
