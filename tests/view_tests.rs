use broadside::name_store::{JsonFileNameStore, MemoryNameStore, NameStore};
use broadside::render::{coord_to_string, parse_coord, parse_fleet, render_view};
use broadside::{ClientConfig, SessionEngine, SyncClient};
use std::sync::Arc;

#[test]
fn coordinates_parse_and_print() {
    assert_eq!(parse_coord("a1"), Some((0, 0)));
    assert_eq!(parse_coord(" E5 "), Some((4, 4)));
    assert_eq!(parse_coord("F1"), None);
    assert_eq!(parse_coord("A0"), None);
    assert_eq!(parse_coord("A6"), None);
    assert_eq!(parse_coord("11"), None);
    assert_eq!(coord_to_string(2, 1), "B3");
    assert_eq!(parse_fleet("A1 B1 C2"), Some(vec![0, 1, 7]));
    assert_eq!(parse_fleet("A1 Z9"), None);
}

#[tokio::test]
async fn rendering_shows_fleet_and_shots() {
    let api = Arc::new(SessionEngine::new());
    let alice = SyncClient::new(api.clone(), "alice", ClientConfig::default());
    let bob = SyncClient::new(api, "bob", ClientConfig::default());
    alice.join("r").await.unwrap();
    bob.join("r").await.unwrap();
    alice.poll_once().await.unwrap();
    alice.place_fleet(&[0, 1, 2]).await.unwrap();
    bob.place_fleet(&[5, 6, 7]).await.unwrap();
    alice.poll_once().await.unwrap();
    alice.attack(1, 0).await.unwrap();
    bob.poll_once().await.unwrap();
    bob.attack(0, 0).await.unwrap();

    let text = render_view(&bob.view().await);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Opponent board (alice):");
    // Bob hit alice at A1; alice hit bob's ship at A2.
    assert_eq!(lines[2], " 1  X . . . .");
    assert_eq!(lines[10], " 1  . . . . .");
    assert_eq!(lines[11], " 2  X S S . .");
    assert!(text.contains("Last shot: A1"));
    assert!(text.contains("[PLAYING]"));
}

#[tokio::test]
async fn rejoined_client_draws_hits_on_its_unseen_fleet() {
    let api = Arc::new(SessionEngine::new());
    let alice = SyncClient::new(api.clone(), "alice", ClientConfig::default());
    let bob = SyncClient::new(api.clone(), "bob", ClientConfig::default());
    alice.join("r").await.unwrap();
    bob.join("r").await.unwrap();
    alice.poll_once().await.unwrap();
    alice.place_fleet(&[0, 1, 2]).await.unwrap();
    bob.place_fleet(&[5, 6, 7]).await.unwrap();
    alice.poll_once().await.unwrap();
    alice.attack(4, 4).await.unwrap();
    bob.poll_once().await.unwrap();
    bob.attack(0, 0).await.unwrap();

    // A fresh client for alice knows the shots but not where her ships are.
    let again = SyncClient::new(api, "alice", ClientConfig::default());
    again.join("r").await.unwrap();
    let view = again.view().await;
    assert!(view.own_fleet.is_empty());

    let text = render_view(&view);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[10], " 1  X . . . .");
    assert!(lines[10..15].iter().all(|row| !row.contains('S')));
}

#[test]
fn json_name_store_round_trips() {
    let path = std::env::temp_dir().join(format!("broadside-name-{}.json", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let store = JsonFileNameStore::new(&path);
    assert_eq!(store.load_name().unwrap(), None);
    store.save_name("Ahab").unwrap();
    assert_eq!(JsonFileNameStore::new(&path).load_name().unwrap().as_deref(), Some("Ahab"));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn memory_name_store() {
    let store = MemoryNameStore::new();
    assert_eq!(store.load_name().unwrap(), None);
    store.save_name("Nemo").unwrap();
    assert_eq!(store.load_name().unwrap().as_deref(), Some("Nemo"));
}
