use std::sync::Arc;

use broadside::{
    init_logging, run_bot, CellMark, ClientConfig, InMemoryTransport, RandomPlayer, SessionApi,
    SessionEngine, Skeleton, Stub, SyncClient,
};
use rand::{rngs::SmallRng, SeedableRng};
use serde_json::json;
use tokio::time::Duration;

fn client_for(engine: &Arc<SessionEngine>, name: &str) -> SyncClient {
    let (client_end, server_end) = InMemoryTransport::pair();
    let api: Arc<dyn SessionApi> = engine.clone();
    tokio::spawn(async move {
        if let Err(e) = Skeleton::new(api, server_end).run().await {
            log::warn!("[sim] skeleton stopped: {}", e);
        }
    });
    let config = ClientConfig {
        poll_interval: Duration::from_millis(1),
        ..ClientConfig::default()
    };
    SyncClient::new(Arc::new(Stub::new(client_end)), name, config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <seed1> <seed2>", args[0]);
        std::process::exit(1);
    }
    let seed1: u64 = args[1].parse()?;
    let seed2: u64 = args[2].parse()?;

    let mut rng1 = SmallRng::seed_from_u64(seed1);
    let mut rng2 = SmallRng::seed_from_u64(seed2);

    let engine = Arc::new(SessionEngine::new());
    let c1 = client_for(&engine, "player1");
    let c2 = client_for(&engine, "player2");
    c1.join("sim").await?;
    c2.join("sim").await?;

    let mut p1 = RandomPlayer::new();
    let mut p2 = RandomPlayer::new();
    let (v1, v2) = tokio::try_join!(
        run_bot(&c1, &mut p1, &mut rng1),
        run_bot(&c2, &mut p2, &mut rng2)
    )?;

    let shots = |marks: &[CellMark]| {
        marks
            .iter()
            .filter(|m| matches!(m, CellMark::Hit | CellMark::Miss))
            .count()
    };
    let result = json!({
        "player1": {"phase": format!("{:?}", v1.phase), "shots": shots(&v1.target)},
        "player2": {"phase": format!("{:?}", v2.phase), "shots": shots(&v2.target)},
        "winner": v1.winner,
        "revision": v1.revision,
    });

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}
