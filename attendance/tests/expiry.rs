//! Window expiry, manual close, and reconciliation guarantees.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use attendance::bus::EventBus;
use attendance::events::course_topic;
use attendance::{
    AllowedMethods, CheckInRequest, CheckInValidator, Credential, ExpirationSweeper,
    SessionService, SessionStore,
};

use helpers::{next_event, open_request, student, venue, MemoryGateway, MemoryMailer, OWNER_ID};

fn otp_only() -> AllowedMethods {
    AllowedMethods {
        email_otp: true,
        qr: false,
    }
}

struct Rig {
    store: Arc<SessionStore>,
    gateway: Arc<MemoryGateway>,
    bus: EventBus,
    service: SessionService,
    validator: CheckInValidator,
    sweeper: ExpirationSweeper,
}

fn rig() -> Rig {
    let store = Arc::new(SessionStore::new());
    let gateway = MemoryGateway::new();
    let bus = EventBus::new();

    let service = SessionService::new(
        Arc::clone(&store),
        gateway.clone(),
        bus.clone(),
        MemoryMailer::new(),
    );
    let validator = CheckInValidator::new(Arc::clone(&store), gateway.clone(), bus.clone());
    let sweeper = ExpirationSweeper::new(Arc::clone(&store), gateway.clone(), bus.clone())
        .with_interval(Duration::from_secs(60));

    Rig {
        store,
        gateway,
        bus,
        service,
        validator,
        sweeper,
    }
}

#[tokio::test]
async fn sweeper_finalizes_students_who_never_checked_in() {
    let rig = rig();
    let now = Utc::now();
    let expires_at = now + ChronoDuration::minutes(5);
    let mut rx = rig.bus.subscribe(&course_topic(1)).await;

    rig.service
        .open_with_snapshot(
            open_request(1, otp_only(), false, expires_at),
            vec![student(101), student(102)],
            now,
        )
        .await
        .unwrap();

    // Two WAITING frames, enrollment order.
    assert_eq!(next_event(&mut rx).await["payload"]["student_id"], 101);
    assert_eq!(next_event(&mut rx).await["payload"]["student_id"], 102);

    let code = rig
        .store
        .get(1)
        .unwrap()
        .current_otp_code(101, now)
        .unwrap();
    rig.validator
        .check_in(
            CheckInRequest {
                course_id: 1,
                student_id: 101,
                credential: Credential::EmailOtp { code },
                location: venue(),
            },
            now,
        )
        .await
        .unwrap();
    assert_eq!(next_event(&mut rx).await["payload"]["status"], "PRESENT");

    // Before the deadline the sweeper leaves the session alone.
    assert_eq!(rig.sweeper.sweep_once(now).await, 0);
    assert!(rig.store.get(1).is_some());

    let after = expires_at + ChronoDuration::seconds(1);
    assert_eq!(rig.sweeper.sweep_once(after).await, 1);
    assert!(rig.store.get(1).is_none());

    let absent = next_event(&mut rx).await;
    assert_eq!(absent["payload"]["student_id"], 102);
    assert_eq!(absent["payload"]["status"], "ABSENT");

    let closed = next_event(&mut rx).await;
    assert_eq!(closed["event"], "attendance.window_closed");
    assert_eq!(closed["payload"]["absent_count"], 1);

    let absent_writes = rig.gateway.writes_for(1, 102).await;
    assert_eq!(absent_writes.len(), 1);
    assert!(!absent_writes[0].present);
    assert_eq!(absent_writes[0].changed_by, OWNER_ID);
    assert_eq!(absent_writes[0].reason.as_str(), "window_expired");
    assert_eq!(absent_writes[0].method, None);

    // A second sweep finds nothing to do.
    assert_eq!(rig.sweeper.sweep_once(after).await, 0);
}

#[tokio::test]
async fn manual_close_reconciles_with_manual_reason() {
    let rig = rig();
    let now = Utc::now();

    rig.service
        .open_with_snapshot(
            open_request(1, otp_only(), false, now + ChronoDuration::minutes(5)),
            vec![student(101)],
            now,
        )
        .await
        .unwrap();

    let summary = rig.service.close(1, now).await.unwrap();
    assert_eq!(summary.absent_recorded, 1);
    assert_eq!(summary.persist_failures, 0);

    let writes = rig.gateway.writes_for(1, 101).await;
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].reason.as_str(), "manual_close");

    // Close races resolve to a single winner; the second caller sees nothing.
    assert!(rig.service.close(1, now).await.is_none());
}

#[tokio::test]
async fn one_student_persist_failure_does_not_block_the_batch() {
    let rig = rig();
    let now = Utc::now();
    let expires_at = now + ChronoDuration::minutes(5);

    rig.service
        .open_with_snapshot(
            open_request(1, otp_only(), false, expires_at),
            vec![student(101), student(102)],
            now,
        )
        .await
        .unwrap();

    rig.gateway.fail_for(101).await;

    let after = expires_at + ChronoDuration::seconds(1);
    rig.sweeper.sweep_once(after).await;

    assert!(rig.gateway.writes_for(1, 101).await.is_empty());
    let ok = rig.gateway.writes_for(1, 102).await;
    assert_eq!(ok.len(), 1);
    assert!(!ok[0].present);
}

#[tokio::test]
async fn spawned_sweeper_drains_expired_sessions() {
    let rig = rig();
    let now = Utc::now();

    rig.service
        .open_with_snapshot(
            open_request(1, otp_only(), false, now - ChronoDuration::seconds(1)),
            vec![student(101)],
            now,
        )
        .await
        .unwrap();

    let handle = ExpirationSweeper::new(
        Arc::clone(&rig.store),
        rig.gateway.clone(),
        rig.bus.clone(),
    )
    .with_interval(Duration::from_millis(20))
    .spawn();

    for _ in 0..100 {
        if rig.store.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.abort();

    assert!(rig.store.is_empty());
    assert_eq!(rig.gateway.writes_for(1, 101).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_checkin_and_sweep_write_exactly_one_record() {
    for round in 0..25i64 {
        let rig = rig();
        let now = Utc::now();
        // Already past its deadline, so the sweep will take it; the rotating
        // code is still in window, so the check-in path is live too.
        let expires_at = now - ChronoDuration::seconds(1);
        let course_id = 1000 + round;

        rig.service
            .open_with_snapshot(
                open_request(course_id, otp_only(), false, expires_at),
                vec![student(101)],
                now,
            )
            .await
            .unwrap();

        let code = rig
            .store
            .get(course_id)
            .unwrap()
            .current_otp_code(101, now)
            .unwrap();

        let validator = Arc::new(rig.validator);
        let sweeper = Arc::new(rig.sweeper);

        let check = {
            let validator = Arc::clone(&validator);
            tokio::spawn(async move {
                validator
                    .check_in(
                        CheckInRequest {
                            course_id,
                            student_id: 101,
                            credential: Credential::EmailOtp { code },
                            location: venue(),
                        },
                        now,
                    )
                    .await
            })
        };
        let sweep = {
            let sweeper = Arc::clone(&sweeper);
            tokio::spawn(async move { sweeper.sweep_once(now).await })
        };

        let _ = check.await.unwrap();
        let _ = sweep.await.unwrap();

        let writes = rig.gateway.writes_for(course_id, 101).await;
        assert_eq!(
            writes.len(),
            1,
            "round {round}: expected exactly one terminal record, got {writes:?}"
        );
    }
}
