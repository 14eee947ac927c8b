//! Net Tetris runner (default binary).
//!
//! Headless driver for the session: computer players steer every local board,
//! and session events are reported through the log. Set `RUST_LOG=info` to see
//! them.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use net_tetris::net::{
    Device, GameConfig, Mode, RandomDevice, Session, SessionEvent, TcpTransport,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON game config; NET_TETRIS_* variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Computer players on this machine
    #[arg(short, long, default_value = "1")]
    players: u8,

    /// Stop after this many frames (0 runs until the round is over)
    #[arg(short, long, default_value = "0")]
    frames: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play without a network
    Local,
    /// Host a game and start once enough clients are ready
    Server {
        /// Ready clients needed before the round starts
        #[arg(short, long, default_value = "1")]
        min_clients: usize,
    },
    /// Join a hosted game
    Client,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    }
    .with_env();
    config.validate()?;

    let devices: Vec<Box<dyn Device>> = (0..args.players)
        .map(|i| {
            let seed = config.seed.wrapping_add(i as u32 + 1);
            Box::new(RandomDevice::new(format!("cpu{}", i + 1), seed)) as Box<dyn Device>
        })
        .collect();
    if devices.is_empty() {
        bail!("at least one local player is needed");
    }

    let mut session = Session::new(config.clone());
    let min_clients = match args.command {
        Command::Local => {
            session.create_local_game(devices);
            session.start_game();
            0
        }
        Command::Server { min_clients } => {
            let transport = TcpTransport::listen(config.socket_addr()?)?;
            session.create_server_game(devices, Box::new(transport));
            min_clients
        }
        Command::Client => {
            let transport = TcpTransport::connect(config.socket_addr()?)?;
            session.create_client_game(devices, Box::new(transport));
            session.set_ready(true);
            0
        }
    };

    run(&mut session, &config, min_clients, args.frames)
}

fn run(session: &mut Session, config: &GameConfig, min_clients: usize, frames: u64) -> Result<()> {
    let frame = Duration::from_millis(config.step_ms as u64);
    let mut last = Instant::now();
    let mut count = 0u64;

    loop {
        let now = Instant::now();
        let delta = now.duration_since(last).as_millis().min(u32::MAX as u128) as u32;
        last = now;

        session.update(delta)?;
        if session.mode() == Mode::WaitingToConnect {
            warn!("game closed");
            return Ok(());
        }

        while let Some(event) = session.poll_event() {
            match event {
                SessionEvent::GameOver { high_score } => {
                    for player in session.players() {
                        info!(
                            "{} finished #{} with {} points, {} rows",
                            player.name(),
                            player.last_position(),
                            player.points(),
                            player.cleared_rows()
                        );
                    }
                    if let Some(points) = high_score {
                        info!("high score candidate: {}", points);
                    }
                    return Ok(());
                }
                other => info!("{:?}", other),
            }
        }

        if session.mode() == Mode::Server && !session.is_started() {
            let ready = session
                .connections()
                .iter()
                .filter(|c| !c.is_local() && c.is_ready())
                .count();
            if ready >= min_clients && session.start_game() {
                info!("starting with {} clients", ready);
            }
        }

        count += 1;
        if frames > 0 && count >= frames {
            info!("stopping after {} frames", count);
            return Ok(());
        }

        if let Some(rest) = frame.checked_sub(now.elapsed()) {
            std::thread::sleep(rest);
        }
    }
}
