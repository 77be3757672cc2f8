//! End-to-end lifecycle tests through the public library API only.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use futures::future::join_all;
use ulid::Ulid;

use stayd::auth::StaticRoles;
use stayd::engine::{Engine, EngineError};
use stayd::model::{ReservationStatus, StayRange};
use stayd::notify::ChangeFeed;

fn test_journal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("stayd_test_integration");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn new_engine(name: &str, admins: &[Ulid]) -> Engine {
    Engine::new(
        test_journal_path(name),
        Arc::new(ChangeFeed::new()),
        Arc::new(StaticRoles::with_admins(admins.iter().copied())),
    )
    .unwrap()
}

fn future(days: u64) -> NaiveDate {
    Utc::now().date_naive() + Days::new(days)
}

#[tokio::test]
async fn guest_books_host_confirms_sweep_checks_out() {
    let engine = new_engine("scenario.journal", &[]);
    let rid = Ulid::new();
    let host = Ulid::new();
    let guest = Ulid::new();

    engine.list_resource(rid, host, true).await.unwrap();

    let id = engine
        .create_reservation(rid, guest, future(10), future(17))
        .await
        .unwrap();
    assert_eq!(
        engine.get_reservation(id).await.unwrap().status,
        ReservationStatus::Pending
    );

    let info = engine.confirm_reservation(id, host).await.unwrap();
    assert_eq!(info.status, ReservationStatus::Confirmed);

    // A sweep dated past the checkout advances the reservation…
    let advanced = engine.run_expiration_sweep(future(18)).await.unwrap();
    assert_eq!(advanced, 1);
    assert_eq!(
        engine.get_reservation(id).await.unwrap().status,
        ReservationStatus::CheckedOut
    );

    // …after which the stay is over for good
    let result = engine.cancel_reservation(id, guest).await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
}

#[tokio::test]
async fn same_day_turnover_across_the_public_api() {
    let engine = new_engine("turnover.journal", &[]);
    let rid = Ulid::new();
    engine.list_resource(rid, Ulid::new(), true).await.unwrap();

    engine
        .create_reservation(rid, Ulid::new(), future(10), future(16))
        .await
        .unwrap();

    // Back-to-back stay on the checkout date is admitted
    engine
        .create_reservation(rid, Ulid::new(), future(16), future(19))
        .await
        .unwrap();

    // A straddling stay is not
    let result = engine
        .create_reservation(rid, Ulid::new(), future(15), future(18))
        .await;
    assert!(matches!(result, Err(EngineError::DateConflict(_))));
}

#[tokio::test]
async fn search_filter_reflects_live_bookings() {
    let engine = new_engine("search.journal", &[]);
    let mut rids = Vec::new();
    for _ in 0..5 {
        let rid = Ulid::new();
        engine.list_resource(rid, Ulid::new(), true).await.unwrap();
        rids.push(rid);
    }

    // Book out resources 1 and 3 for the query window
    for &rid in [rids[1], rids[3]].iter() {
        engine
            .create_reservation(rid, Ulid::new(), future(10), future(20))
            .await
            .unwrap();
    }

    let free = engine
        .filter_available(&rids, future(12), future(14))
        .await
        .unwrap();
    assert_eq!(free, vec![rids[0], rids[2], rids[4]]);

    // The predicate and the filter agree
    for &rid in &rids {
        let expected = free.contains(&rid);
        let actual = engine
            .available_between(rid, future(12), future(14))
            .await
            .unwrap();
        assert_eq!(actual, expected, "predicate disagrees for {rid}");
    }
}

#[tokio::test]
async fn admin_cancellation_path() {
    let admin = Ulid::new();
    let engine = new_engine("admin_cancel.journal", &[admin]);
    let rid = Ulid::new();
    let host = Ulid::new();
    engine.list_resource(rid, host, true).await.unwrap();

    let id = engine
        .create_reservation(rid, Ulid::new(), future(10), future(12))
        .await
        .unwrap();
    engine.confirm_reservation(id, host).await.unwrap();

    let info = engine.cancel_reservation(id, admin).await.unwrap();
    assert_eq!(info.status, ReservationStatus::Cancelled);
}

#[tokio::test]
async fn restart_preserves_the_calendar() {
    let path = test_journal_path("restart.journal");
    let rid = Ulid::new();
    let host = Ulid::new();
    let guest = Ulid::new();
    let id;

    {
        let engine = Engine::new(
            path.clone(),
            Arc::new(ChangeFeed::new()),
            Arc::new(StaticRoles::new()),
        )
        .unwrap();
        engine.list_resource(rid, host, true).await.unwrap();
        id = engine
            .create_reservation(rid, guest, future(10), future(15))
            .await
            .unwrap();
        engine.confirm_reservation(id, host).await.unwrap();
    }

    let engine = Engine::new(
        path,
        Arc::new(ChangeFeed::new()),
        Arc::new(StaticRoles::new()),
    )
    .unwrap();

    assert_eq!(
        engine.get_reservation(id).await.unwrap().status,
        ReservationStatus::Confirmed
    );
    assert!(!engine
        .is_resource_available(rid, future(11), future(13))
        .await
        .unwrap());
    let result = engine
        .create_reservation(rid, Ulid::new(), future(12), future(14))
        .await;
    assert!(matches!(result, Err(EngineError::DateConflict(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_load_never_double_books() {
    let engine = Arc::new(new_engine("concurrent_load.journal", &[]));
    let rid = Ulid::new();
    engine.list_resource(rid, Ulid::new(), true).await.unwrap();

    // 48 guests race for staggered, mutually overlapping week-long stays
    let attempts = (0..48u64).map(|i| {
        let engine = engine.clone();
        async move {
            engine
                .create_reservation(rid, Ulid::new(), future(10 + i), future(17 + i))
                .await
        }
    });
    let results = join_all(attempts).await;

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert!(admitted >= 1);
    for result in &results {
        if let Err(e) = result {
            assert!(
                matches!(e, EngineError::DateConflict(_)),
                "unexpected error under contention: {e}"
            );
        }
    }

    // Invariant: persisted blocking stays are pairwise disjoint
    let blocking: Vec<StayRange> = engine
        .reservations_for(rid)
        .await
        .iter()
        .filter(|r| r.status.is_blocking())
        .map(|r| StayRange::new(r.check_in, r.check_out))
        .collect();
    assert_eq!(blocking.len(), admitted);
    for (i, a) in blocking.iter().enumerate() {
        for b in &blocking[i + 1..] {
            assert!(!a.overlaps(b), "double booking persisted: {a:?} vs {b:?}");
        }
    }
}
