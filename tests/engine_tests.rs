use std::sync::Arc;
use std::time::{Duration, Instant};

use broadside::{GameError, Outcome, Phase, SessionApi, SessionEngine};

async fn playing(engine: &SessionEngine, id: &str) {
    engine.join(id, "alice").await.unwrap();
    engine.join(id, "bob").await.unwrap();
    engine.place_fleet(id, "alice", &[0, 1, 2]).await.unwrap();
    engine.place_fleet(id, "bob", &[5, 6, 7]).await.unwrap();
}

#[tokio::test]
async fn unknown_sessions_are_not_found() {
    let engine = SessionEngine::new();
    assert_eq!(engine.get_state("nope").await, Err(GameError::SessionNotFound));
    assert_eq!(
        engine.attack("nope", "alice", 0, 0).await,
        Err(GameError::SessionNotFound)
    );
    assert_eq!(
        engine.place_fleet("nope", "alice", &[0, 1, 2]).await,
        Err(GameError::SessionNotFound)
    );
    assert_eq!(engine.abandon("nope", "alice").await, Err(GameError::SessionNotFound));
    assert_eq!(engine.session_count().await, 0);
}

#[tokio::test]
async fn sessions_are_independent_and_case_sensitive() {
    let engine = SessionEngine::new();
    playing(&engine, "Room").await;
    let snap = engine.join("room", "carol").await.unwrap();
    assert_eq!(snap.phase, Phase::Lobby);
    assert_eq!(engine.session_count().await, 2);
    assert_eq!(engine.get_state("Room").await.unwrap().phase, Phase::Playing);
}

#[tokio::test]
async fn get_state_does_not_mutate() {
    let engine = SessionEngine::new();
    playing(&engine, "r").await;
    let a = engine.get_state("r").await.unwrap();
    let b = engine.get_state("r").await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_joins_share_one_session() {
    for round in 0..20 {
        let engine = Arc::new(SessionEngine::new());
        let id = format!("race-{}", round);
        let mut handles = Vec::new();
        for name in ["p1", "p2", "p3", "p4", "p5", "p6"] {
            let engine = Arc::clone(&engine);
            let id = id.clone();
            handles.push(tokio::spawn(async move { engine.join(&id, name).await }));
        }
        let mut seated = 0;
        let mut full = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => seated += 1,
                Err(GameError::SessionFull) => full += 1,
                Err(e) => panic!("unexpected {:?}", e),
            }
        }
        assert_eq!((seated, full), (2, 4));
        assert_eq!(engine.session_count().await, 1);
        assert_eq!(engine.get_state(&id).await.unwrap().phase, Phase::Setup);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_attacks_resolve_one_at_a_time() {
    let engine = Arc::new(SessionEngine::new());
    playing(&engine, "r").await;

    // Both players fire at once, several times over; exactly one may win each
    // race for the turn.
    let mut handles = Vec::new();
    for (name, cell) in [("alice", 10), ("bob", 10), ("alice", 11), ("bob", 11)] {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.attack("r", name, cell / 5, cell % 5).await
        }));
    }
    let mut accepted = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(report) => {
                assert_eq!(report.outcome, Outcome::Miss);
                accepted += 1;
            }
            Err(GameError::NotYourTurn) => {}
            Err(e) => panic!("unexpected {:?}", e),
        }
    }
    let snap = engine.get_state("r").await.unwrap();
    let fired = snap.player1_shots.shots_fired() + snap.player2_shots.shots_fired();
    assert_eq!(fired, accepted);
    // Turns alternate, so alice never fired more than one shot ahead of bob.
    let (a, b) = (snap.player1_shots.shots_fired(), snap.player2_shots.shots_fired());
    assert!(a == b || a == b + 1);
}

#[tokio::test]
async fn sweep_drops_settled_sessions_after_grace() {
    let engine = SessionEngine::new();
    playing(&engine, "done").await;
    for (name, cell) in [("alice", 5), ("bob", 20), ("alice", 6), ("bob", 21), ("alice", 7)] {
        engine.attack("done", name, cell / 5, cell % 5).await.unwrap();
    }
    playing(&engine, "live").await;
    engine.join("empty", "carol").await.unwrap();
    engine.abandon("empty", "carol").await.unwrap();

    let grace = Duration::from_secs(60);
    assert_eq!(engine.sweep_settled_at(Instant::now(), grace).await, 0);
    assert_eq!(engine.session_count().await, 3);

    let later = Instant::now() + Duration::from_secs(61);
    assert_eq!(engine.sweep_settled_at(later, grace).await, 2);
    assert_eq!(engine.session_count().await, 1);
    assert!(engine.get_state("live").await.is_ok());
    assert_eq!(engine.get_state("done").await, Err(GameError::SessionNotFound));
}
