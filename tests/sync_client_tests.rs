use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use broadside::{
    AttackReport, AttackResult, Cell, CellMark, ClientConfig, GameError, OfflineFallback, Phase,
    PlacementError, PollOutcome, SessionApi, SessionEngine, Snapshot, SyncClient,
};
use tokio::sync::Notify;

/// Engine wrapper whose answers a test can delay, replace or fail.
#[derive(Default)]
struct Controlled {
    engine: SessionEngine,
    fail_with: Mutex<Option<GameError>>,
    canned_state: Mutex<Option<Snapshot>>,
    hold_polls: AtomicBool,
    hold_attacks: AtomicBool,
    /// Apply placements but answer as if the link dropped.
    lose_placement_replies: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl Controlled {
    fn fail(&self, err: Option<GameError>) {
        *self.fail_with.lock().unwrap() = err;
    }

    fn check(&self) -> Result<(), GameError> {
        match self.fail_with.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn maybe_hold(&self, flag: &AtomicBool) {
        if flag.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait::async_trait]
impl SessionApi for Controlled {
    async fn join(&self, session_id: &str, player: &str) -> Result<Snapshot, GameError> {
        self.check()?;
        self.engine.join(session_id, player).await
    }

    async fn place_fleet(
        &self,
        session_id: &str,
        player: &str,
        cells: &[usize],
    ) -> Result<Snapshot, GameError> {
        self.check()?;
        let result = self.engine.place_fleet(session_id, player, cells).await;
        if result.is_ok() && self.lose_placement_replies.load(Ordering::SeqCst) {
            return Err(GameError::NetworkUnavailable("reply lost".to_string()));
        }
        result
    }

    async fn attack(
        &self,
        session_id: &str,
        player: &str,
        row: usize,
        col: usize,
    ) -> Result<AttackReport, GameError> {
        self.maybe_hold(&self.hold_attacks).await;
        self.check()?;
        self.engine.attack(session_id, player, row, col).await
    }

    async fn get_state(&self, session_id: &str) -> Result<Snapshot, GameError> {
        self.maybe_hold(&self.hold_polls).await;
        self.check()?;
        if let Some(snap) = self.canned_state.lock().unwrap().clone() {
            return Ok(snap);
        }
        self.engine.get_state(session_id).await
    }

    async fn abandon(&self, session_id: &str, player: &str) -> Result<Snapshot, GameError> {
        self.check()?;
        self.engine.abandon(session_id, player).await
    }
}

fn config(fallback: OfflineFallback) -> ClientConfig {
    ClientConfig {
        poll_interval: Duration::from_millis(10),
        offline_fallback: fallback,
        ..ClientConfig::default()
    }
}

fn clients(fallback: OfflineFallback) -> (Arc<Controlled>, Arc<SyncClient>, Arc<SyncClient>) {
    let api = Arc::new(Controlled::default());
    let alice = Arc::new(SyncClient::new(api.clone(), "alice", config(fallback)));
    let bob = Arc::new(SyncClient::new(api.clone(), "bob", config(fallback)));
    (api, alice, bob)
}

/// Both clients seated with fleets placed; alice to move.
async fn playing(fallback: OfflineFallback) -> (Arc<Controlled>, Arc<SyncClient>, Arc<SyncClient>) {
    let (api, alice, bob) = clients(fallback);
    alice.join("room").await.unwrap();
    bob.join("room").await.unwrap();
    alice.poll_once().await.unwrap();
    alice.place_fleet(&[0, 1, 2]).await.unwrap();
    bob.place_fleet(&[5, 6, 7]).await.unwrap();
    alice.poll_once().await.unwrap();
    (api, alice, bob)
}

fn cell(row: usize, col: usize) -> Cell {
    Cell::from_coords(row, col).unwrap()
}

#[tokio::test]
async fn lobby_advances_to_setup_once_rival_arrives() {
    let (_api, alice, bob) = clients(OfflineFallback::Simulate);
    alice.join("room").await.unwrap();
    assert_eq!(alice.view().await.phase, Phase::Lobby);
    assert!(alice.view().await.wants_polling());

    bob.join("room").await.unwrap();
    assert_eq!(bob.view().await.phase, Phase::Setup);

    assert_eq!(alice.poll_once().await, Ok(PollOutcome::Applied));
    let view = alice.view().await;
    assert_eq!(view.phase, Phase::Setup);
    assert_eq!(view.opponent.as_deref(), Some("bob"));
}

#[tokio::test]
async fn waiting_player_learns_play_started_and_whose_turn_it_is() {
    let (_api, alice, bob) = clients(OfflineFallback::Simulate);
    alice.join("room").await.unwrap();
    bob.join("room").await.unwrap();
    alice.poll_once().await.unwrap();

    alice.place_fleet(&[0, 1, 2]).await.unwrap();
    assert_eq!(alice.view().await.phase, Phase::Waiting);

    bob.place_fleet(&[5, 6, 7]).await.unwrap();
    let view = bob.view().await;
    assert_eq!(view.phase, Phase::Playing);
    assert!(!view.my_turn);

    alice.poll_once().await.unwrap();
    let view = alice.view().await;
    assert_eq!(view.phase, Phase::Playing);
    assert!(view.my_turn);
}

#[tokio::test]
async fn placement_is_checked_before_sending() {
    let (api, alice, bob) = clients(OfflineFallback::Simulate);
    assert_eq!(alice.place_fleet(&[0, 1, 2]).await, Err(GameError::NotInSetupPhase));
    alice.join("room").await.unwrap();
    bob.join("room").await.unwrap();
    alice.poll_once().await.unwrap();

    let err = alice.place_fleet(&[3, 3, 4]).await.unwrap_err();
    assert_eq!(err, GameError::InvalidPlacement(PlacementError::Duplicate(3)));
    assert_eq!(alice.view().await.phase, Phase::Setup);
    assert!(!api.engine.get_state("room").await.unwrap().player1_ready);
}

#[tokio::test]
async fn confirmed_shots_and_turn_handover() {
    let (_api, alice, bob) = playing(OfflineFallback::Simulate).await;

    match alice.attack(1, 0).await.unwrap() {
        AttackResult::Confirmed(report) => assert_eq!(report.outcome, broadside::Outcome::Hit),
        other => panic!("expected a confirmed shot, got {:?}", other),
    }
    let view = alice.view().await;
    assert_eq!(view.mark(cell(1, 0)), CellMark::Hit);
    assert!(!view.my_turn);
    assert_eq!(alice.attack(2, 0).await, Err(GameError::NotYourTurn));

    bob.poll_once().await.unwrap();
    let view = bob.view().await;
    assert!(view.my_turn);
    assert!(view.incoming.is_attacked(cell(1, 0)));
    assert_eq!(view.last_move, Some(cell(1, 0)));

    bob.attack(4, 4).await.unwrap();
    assert_eq!(bob.view().await.mark(cell(4, 4)), CellMark::Miss);
}

#[tokio::test]
async fn local_checks_reject_bad_shots() {
    let (_api, alice, _bob) = playing(OfflineFallback::Simulate).await;
    assert_eq!(
        alice.attack(7, 0).await,
        Err(GameError::OutOfBounds { row: 7, col: 0 })
    );
    alice.attack(3, 3).await.unwrap();
    assert!(!alice.view().await.my_turn);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pending_move_blocks_a_second_shot() {
    let (api, alice, _bob) = playing(OfflineFallback::Simulate).await;
    api.hold_attacks.store(true, Ordering::SeqCst);

    let shooter = Arc::clone(&alice);
    let shot = tokio::spawn(async move { shooter.attack(0, 0).await });
    api.entered.notified().await;

    let view = alice.view().await;
    assert_eq!(view.mark(cell(0, 0)), CellMark::Pending);
    assert!(view.pending.is_some());
    assert!(!view.my_turn);
    assert_eq!(alice.attack(0, 1).await, Err(GameError::NotYourTurn));

    // The server still says it is alice's turn; the pending shot wins.
    assert_eq!(alice.poll_once().await, Ok(PollOutcome::Applied));
    let view = alice.view().await;
    assert!(!view.my_turn);
    assert_eq!(view.mark(cell(0, 0)), CellMark::Pending);

    api.hold_attacks.store(false, Ordering::SeqCst);
    api.release.notify_one();
    assert!(matches!(shot.await.unwrap(), Ok(AttackResult::Confirmed(_))));
    let view = alice.view().await;
    assert_eq!(view.mark(cell(0, 0)), CellMark::Miss);
    assert!(view.pending.is_none());
}

#[tokio::test]
async fn winner_takes_priority_and_freezes_the_view() {
    let (_api, alice, bob) = playing(OfflineFallback::Simulate).await;
    for (shooter, (r, c)) in [
        (&alice, (1, 0)),
        (&bob, (4, 4)),
        (&alice, (1, 1)),
        (&bob, (4, 3)),
    ] {
        shooter.poll_once().await.unwrap();
        shooter.attack(r, c).await.unwrap();
    }
    alice.poll_once().await.unwrap();
    alice.attack(1, 2).await.unwrap();

    let view = alice.view().await;
    assert_eq!(view.phase, Phase::Finished);
    assert_eq!(view.victory(), Some(true));
    assert!(!view.wants_polling());

    bob.poll_once().await.unwrap();
    let view = bob.view().await;
    assert_eq!(view.phase, Phase::Finished);
    assert_eq!(view.winner.as_deref(), Some("alice"));
    assert_eq!(view.victory(), Some(false));
    assert!(!view.my_turn);

    assert_eq!(bob.poll_once().await, Ok(PollOutcome::Idle));
    assert_eq!(bob.attack(0, 0).await, Err(GameError::GameOver));
}

#[tokio::test]
async fn older_snapshots_are_ignored() {
    let (api, alice, _bob) = playing(OfflineFallback::Simulate).await;
    let before = alice.view().await;

    let mut old = api.engine.get_state("room").await.unwrap();
    old.revision -= 1;
    old.phase = Phase::Setup;
    old.turn_holder = None;
    *api.canned_state.lock().unwrap() = Some(old);

    assert_eq!(alice.poll_once().await, Ok(PollOutcome::Stale));
    assert_eq!(alice.view().await, before);
}

#[tokio::test]
async fn repeated_snapshots_are_harmless() {
    let (_api, alice, _bob) = playing(OfflineFallback::Simulate).await;
    let before = alice.view().await;
    alice.poll_once().await.unwrap();
    alice.poll_once().await.unwrap();
    assert_eq!(alice.view().await, before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_d_poll_resolving_after_abandon_is_discarded() {
    let (api, alice, _bob) = playing(OfflineFallback::Simulate).await;
    api.hold_polls.store(true, Ordering::SeqCst);

    let poller = Arc::clone(&alice);
    let poll = tokio::spawn(async move { poller.poll_once().await });
    api.entered.notified().await;

    alice.abandon().await.unwrap();

    // The late answer claims the game was won.
    let mut finished = api.engine.get_state("room").await.unwrap();
    finished.phase = Phase::Finished;
    finished.winner = Some("alice".to_string());
    finished.revision += 10;
    *api.canned_state.lock().unwrap() = Some(finished);
    api.hold_polls.store(false, Ordering::SeqCst);
    api.release.notify_one();

    assert_eq!(poll.await.unwrap(), Ok(PollOutcome::Discarded));
    let view = alice.view().await;
    assert_eq!(view.phase, Phase::Lobby);
    assert!(!view.joined);
    assert_eq!(view.winner, None);
    assert_eq!(alice.poll_once().await, Ok(PollOutcome::Idle));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poll_for_previous_room_is_discarded_after_join() {
    let (api, alice, _bob) = playing(OfflineFallback::Simulate).await;
    api.hold_polls.store(true, Ordering::SeqCst);

    let poller = Arc::clone(&alice);
    let poll = tokio::spawn(async move { poller.poll_once().await });
    api.entered.notified().await;

    alice.join("other").await.unwrap();
    api.hold_polls.store(false, Ordering::SeqCst);
    api.release.notify_one();

    assert_eq!(poll.await.unwrap(), Ok(PollOutcome::Discarded));
    let view = alice.view().await;
    assert_eq!(view.session_id.as_deref(), Some("other"));
    assert_eq!(view.phase, Phase::Lobby);
    assert_eq!(view.opponent, None);
    assert_eq!(alice.poll_once().await, Ok(PollOutcome::Applied));
    assert_eq!(alice.view().await.phase, Phase::Lobby);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn polling_loop_stops_when_joining_elsewhere() {
    let (api, alice, _bob) = playing(OfflineFallback::Simulate).await;
    api.hold_polls.store(true, Ordering::SeqCst);
    let poller = Arc::clone(&alice);
    let handle = tokio::spawn(async move { poller.run_polling().await });
    api.entered.notified().await;

    alice.join("other").await.unwrap();
    api.hold_polls.store(false, Ordering::SeqCst);
    api.release.notify_one();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn retried_placement_keeps_the_fleet_the_server_holds() {
    let (api, alice, bob) = clients(OfflineFallback::Simulate);
    alice.join("room").await.unwrap();
    bob.join("room").await.unwrap();
    alice.poll_once().await.unwrap();

    api.lose_placement_replies.store(true, Ordering::SeqCst);
    assert!(matches!(
        alice.place_fleet(&[0, 1, 2]).await,
        Err(GameError::NetworkUnavailable(_))
    ));
    api.lose_placement_replies.store(false, Ordering::SeqCst);
    assert_eq!(alice.view().await.phase, Phase::Setup);

    assert_eq!(
        alice.place_fleet(&[10, 11, 12]).await,
        Err(GameError::InvalidPlacement(PlacementError::AlreadyPlaced))
    );
    let view = alice.view().await;
    assert_eq!(view.phase, Phase::Waiting);
    assert_eq!(view.own_fleet, vec![0, 1, 2]);
}

#[tokio::test]
async fn simulated_shot_when_server_unreachable() {
    let (api, alice, _bob) = playing(OfflineFallback::Simulate).await;
    api.fail(Some(GameError::NetworkUnavailable("down".to_string())));

    assert_eq!(
        alice.attack(2, 2).await,
        Ok(AttackResult::Simulated { row: 2, col: 2 })
    );
    let view = alice.view().await;
    assert_eq!(view.mark(cell(2, 2)), CellMark::Simulated);
    assert!(view.degraded);
    assert!(!view.my_turn);
    assert!(view.message.contains("not confirmed"));

    // A failed poll changes nothing.
    assert!(matches!(
        alice.poll_once().await,
        Err(GameError::NetworkUnavailable(_))
    ));
    assert_eq!(alice.view().await, view);

    // Back online: the server never saw the shot, so it is gone again.
    api.fail(None);
    alice.poll_once().await.unwrap();
    let view = alice.view().await;
    assert_eq!(view.mark(cell(2, 2)), CellMark::Unknown);
    assert!(!view.degraded);
    assert!(view.my_turn);
}

#[tokio::test]
async fn disabled_fallback_reports_the_failure() {
    let (api, alice, _bob) = playing(OfflineFallback::Disabled).await;
    api.fail(Some(GameError::NetworkUnavailable("down".to_string())));

    assert!(matches!(
        alice.attack(2, 2).await,
        Err(GameError::NetworkUnavailable(_))
    ));
    let view = alice.view().await;
    assert_eq!(view.mark(cell(2, 2)), CellMark::Unknown);
    assert!(view.my_turn);
    assert!(!view.degraded);
}

#[tokio::test]
async fn authoritative_rejection_is_a_no_op() {
    let (api, alice, _bob) = playing(OfflineFallback::Simulate).await;
    api.fail(Some(GameError::NotYourTurn));
    assert_eq!(alice.attack(2, 2).await, Err(GameError::NotYourTurn));
    let view = alice.view().await;
    assert_eq!(view.mark(cell(2, 2)), CellMark::Unknown);
    assert!(view.pending.is_none());
    assert_eq!(view.phase, Phase::Playing);
}

#[tokio::test]
async fn opponent_abandon_drops_back_to_lobby() {
    let (_api, alice, bob) = playing(OfflineFallback::Simulate).await;
    bob.abandon().await.unwrap();
    assert_eq!(bob.view().await.phase, Phase::Lobby);

    alice.poll_once().await.unwrap();
    let view = alice.view().await;
    assert_eq!(view.phase, Phase::Lobby);
    assert!(!view.joined);
    assert!(!view.wants_polling());

    // The room can be reused.
    alice.join("room").await.unwrap();
    assert_eq!(alice.view().await.phase, Phase::Lobby);
}

#[tokio::test]
async fn vanished_session_resets_the_client() {
    let (api, alice, _bob) = playing(OfflineFallback::Simulate).await;
    api.fail(Some(GameError::SessionNotFound));
    assert_eq!(alice.poll_once().await, Ok(PollOutcome::SessionGone));
    assert!(!alice.view().await.joined);
}

#[tokio::test]
async fn rejoining_resumes_a_game_in_progress() {
    let (api, alice, _bob) = playing(OfflineFallback::Simulate).await;
    alice.attack(4, 0).await.unwrap();

    let again = SyncClient::new(api.clone(), "alice", config(OfflineFallback::Simulate));
    again.join("room").await.unwrap();
    let view = again.view().await;
    assert_eq!(view.phase, Phase::Playing);
    assert!(!view.my_turn);
    assert_eq!(view.mark(cell(4, 0)), CellMark::Miss);
}

#[tokio::test]
async fn full_room_is_reported() {
    let (api, alice, bob) = clients(OfflineFallback::Simulate);
    alice.join("room").await.unwrap();
    bob.join("room").await.unwrap();
    let carol = SyncClient::new(api, "carol", config(OfflineFallback::Simulate));
    assert_eq!(carol.join("room").await, Err(GameError::SessionFull));
    assert!(!carol.view().await.joined);
}

#[tokio::test]
async fn polling_loop_stops_when_the_game_ends() {
    let (_api, alice, bob) = playing(OfflineFallback::Simulate).await;
    let poller = Arc::clone(&bob);
    let handle = tokio::spawn(async move { poller.run_polling().await });

    for (shooter, (r, c)) in [
        (&alice, (1, 0)),
        (&bob, (4, 4)),
        (&alice, (1, 1)),
        (&bob, (4, 3)),
        (&alice, (1, 2)),
    ] {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !shooter.view().await.my_turn {
                shooter.poll_once().await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        shooter.attack(r, c).await.unwrap();
    }

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bob.view().await.phase, Phase::Finished);
}

#[tokio::test]
async fn polling_loop_stops_on_abandon() {
    let (_api, alice, _bob) = playing(OfflineFallback::Simulate).await;
    let poller = Arc::clone(&alice);
    let handle = tokio::spawn(async move { poller.run_polling().await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    alice.abandon().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
