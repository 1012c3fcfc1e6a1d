#[cfg(not(feature = "std"))]
fn main() {}

#[cfg(feature = "std")]
use std::sync::Arc;

#[cfg(feature = "std")]
use broadside::{
    init_logging, render::parse_coord, render::parse_fleet, render::render_view, run_bot, serve,
    ClientConfig, InMemoryTransport, JsonFileNameStore, NameStore, OfflineFallback, Phase, Player,
    RandomPlayer, ServerConfig, SessionApi, SessionEngine, Skeleton, Stub, SyncClient,
    TcpTransport,
};
#[cfg(feature = "std")]
use clap::Parser;
#[cfg(feature = "std")]
use rand::rngs::SmallRng;
#[cfg(feature = "std")]
use rand::SeedableRng;
#[cfg(feature = "std")]
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
#[cfg(feature = "std")]
use tokio::net::TcpListener;
#[cfg(feature = "std")]
use tokio::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[cfg(feature = "std")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
#[cfg(feature = "std")]
enum Commands {
    /// Run the session server.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, help = "Seconds a finished session is kept before it is dropped")]
        grace_secs: Option<u64>,
    },
    /// Join a session on a server and play from the terminal.
    Play {
        #[arg(long, default_value = "127.0.0.1:8080")]
        connect: String,
        #[arg(long, help = "Room id shared with your opponent")]
        session: String,
        #[arg(long, help = "Display name (remembered for next time)")]
        name: Option<String>,
        #[arg(long, default_value = "broadside_name.json")]
        name_file: String,
        #[arg(long, default_value_t = 3000)]
        poll_ms: u64,
        #[arg(long, help = "Report unreachable-server shots instead of simulating them")]
        no_simulate: bool,
    },
    /// Two bots play each other against an in-process server.
    Local {
        #[arg(long, help = "Fix RNG seed for reproducible games (e.g., --seed 12345)")]
        seed: Option<u64>,
    },
}

#[cfg(feature = "std")]
fn seeded_rng(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(s) => SmallRng::seed_from_u64(s),
        None => {
            let mut seed_rng = rand::rng();
            SmallRng::from_rng(&mut seed_rng)
        }
    }
}

/// A client whose requests go through an in-memory link to `engine`.
#[cfg(feature = "std")]
fn local_client(engine: &Arc<SessionEngine>, name: &str, config: ClientConfig) -> SyncClient {
    let (client_end, server_end) = InMemoryTransport::pair();
    let api: Arc<dyn SessionApi> = engine.clone();
    tokio::spawn(async move {
        let mut skeleton = Skeleton::new(api, server_end);
        if let Err(e) = skeleton.run().await {
            log::warn!("[local] skeleton stopped: {}", e);
        }
    });
    let stub = Stub::with_timeout(client_end, config.request_timeout);
    SyncClient::new(Arc::new(stub), name, config)
}

#[cfg(feature = "std")]
async fn run_local(seed: Option<u64>) -> anyhow::Result<()> {
    println!("Starting local bot vs bot game...");
    if let Some(s) = seed {
        println!("Using fixed seed: {} (game will be reproducible)", s);
    }
    let mut rng1 = seeded_rng(seed);
    let mut rng2 = seeded_rng(seed.map(|s| s.wrapping_add(1)));

    let engine = Arc::new(SessionEngine::new());
    let config = ClientConfig {
        poll_interval: Duration::from_millis(20),
        ..ClientConfig::default()
    };
    let alice = local_client(&engine, "alice", config.clone());
    let bob = local_client(&engine, "bob", config);
    alice.join("local").await?;
    bob.join("local").await?;

    let mut p1 = RandomPlayer::new();
    let mut p2 = RandomPlayer::new();
    let (v1, v2) = tokio::try_join!(
        run_bot(&alice, &mut p1, &mut rng1),
        run_bot(&bob, &mut p2, &mut rng2)
    )?;

    println!("{}", render_view(&v1));
    println!("{}", render_view(&v2));
    match v1.winner {
        Some(w) => println!("{} wins", w),
        None => println!("No winner"),
    }
    Ok(())
}

#[cfg(feature = "std")]
async fn run_serve(bind: String, grace_secs: Option<u64>) -> anyhow::Result<()> {
    let mut config = ServerConfig::default();
    if let Some(secs) = grace_secs {
        config.finished_grace = Duration::from_secs(secs);
    }
    let listener = TcpListener::bind(&bind).await?;
    println!("Session server listening on {}", bind);
    serve(listener, Arc::new(SessionEngine::new()), config).await
}

#[cfg(feature = "std")]
fn spawn_poller(client: &Arc<SyncClient>) {
    let client = Arc::clone(client);
    tokio::spawn(async move { client.run_polling().await });
}

#[cfg(feature = "std")]
async fn run_play(
    connect: String,
    session: String,
    name: Option<String>,
    name_file: String,
    poll_ms: u64,
    no_simulate: bool,
) -> anyhow::Result<()> {
    let store = JsonFileNameStore::new(&name_file);
    let name = match name {
        Some(n) => n,
        None => store
            .load_name()
            .unwrap_or_else(|e| {
                log::warn!("[play] could not read {}: {}", name_file, e);
                None
            })
            .ok_or_else(|| anyhow::anyhow!("no remembered name, pass --name"))?,
    };
    if let Err(e) = store.save_name(&name) {
        log::warn!("[play] could not remember name: {}", e);
    }

    let config = ClientConfig {
        poll_interval: Duration::from_millis(poll_ms),
        offline_fallback: if no_simulate {
            OfflineFallback::Disabled
        } else {
            OfflineFallback::Simulate
        },
        ..ClientConfig::default()
    };
    let transport = TcpTransport::connect_with_timeout(&connect, config.request_timeout).await?;
    let stub = Stub::with_timeout(transport, config.request_timeout);
    let client = Arc::new(SyncClient::new(Arc::new(stub), &name, config));

    client.join(&session).await?;
    spawn_poller(&client);

    let mut rng = seeded_rng(None);
    let mut helper = RandomPlayer::new();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Commands: cells like 'A1 B2 C3' to deploy (empty line = random), a cell to fire,");
    println!("'show' to redraw, 'join ID' to enter a room, 'abandon', 'quit'.");
    loop {
        let view = client.view().await;
        stdout.write_all(render_view(&view).as_bytes()).await?;
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "quit" => break,
            "show" => continue,
            "" if view.phase != Phase::Setup => continue,
            "abandon" => {
                if let Err(e) = client.abandon().await {
                    println!("Server did not confirm: {}", e);
                }
                continue;
            }
            _ => {}
        }
        if let Some(room) = line.strip_prefix("join ") {
            // A join stops the running poller, so restart it either way; it
            // exits at once when nothing is seated.
            if let Err(e) = client.join(room.trim()).await {
                println!("Join failed: {}", e);
            }
            spawn_poller(&client);
            continue;
        }
        match view.phase {
            Phase::Setup => {
                let cells = if line.is_empty() {
                    helper.choose_fleet(&mut rng)
                } else {
                    match parse_fleet(line) {
                        Some(cells) => cells,
                        None => {
                            println!("Could not read those cells");
                            continue;
                        }
                    }
                };
                if let Err(e) = client.place_fleet(&cells).await {
                    println!("Placement refused: {}", e);
                }
            }
            Phase::Playing => match parse_coord(line) {
                Some((row, col)) => {
                    if let Err(e) = client.attack(row, col).await {
                        println!("Shot refused: {}", e);
                    }
                }
                None => println!("Could not read that cell"),
            },
            _ => println!("Nothing to do right now"),
        }
    }
    Ok(())
}

#[cfg(feature = "std")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, grace_secs } => run_serve(bind, grace_secs).await,
        Commands::Play {
            connect,
            session,
            name,
            name_file,
            poll_ms,
            no_simulate,
        } => run_play(connect, session, name, name_file, poll_ms, no_simulate).await,
        Commands::Local { seed } => run_local(seed).await,
    }
}
