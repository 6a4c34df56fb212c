// FOVEA Main Entry Point
// Copyright (c) 2026 The FOVEA Project

use fovea_core::config::StreamConfig;
use fovea_core::pipeline::{encoder, orchestrator};
use fovea_core::server;
use fovea_core::state::StreamState;
use fovea_core::viewer::Viewer;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "fovea-core")]
#[command(about = "FOVEA Foveated Streaming Kernel", long_about = None)]
struct Cli {
    /// Path to a JSON stream configuration; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full experiment: prepare renditions, then run producer, consumer,
    /// playback server, and (optionally) the external viewer.
    Run {
        /// Master input video
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Playback server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Seed for the gaze random walk (deterministic trajectories)
        #[arg(long)]
        seed: Option<u64>,

        /// Launch the external viewer against the player URL
        #[arg(long)]
        viewer: bool,
    },

    /// Producer only: mask, segment, and publish the three layers.
    Stream {
        /// Master input video
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Seed for the gaze random walk
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Consumer only: combine available triplets and republish the manifest.
    Playback,

    /// Precompress the master input into the three layer renditions.
    Prepare {
        /// Master input video
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Serve the segment tree for an external player.
    Serve {
        /// Playback server port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let args = Cli::parse();
    let mut cfg = match &args.config {
        Some(path) => StreamConfig::load(path)?,
        None => StreamConfig::default(),
    };

    match args.command {
        Commands::Run {
            input,
            port,
            seed,
            viewer,
        } => {
            if let Some(input) = input {
                cfg.input_video = input;
            }
            if let Some(port) = port {
                cfg.server_port = port;
            }
            if seed.is_some() {
                cfg.gaze_seed = seed;
            }
            if viewer {
                cfg.launch_viewer = true;
            }
            cfg.validate()?;
            run_experiment(Arc::new(cfg)).await?;
        }
        Commands::Stream { input, seed } => {
            if let Some(input) = input {
                cfg.input_video = input;
            }
            if seed.is_some() {
                cfg.gaze_seed = seed;
            }
            cfg.validate()?;
            let cfg = Arc::new(cfg);
            encoder::prepare_layer_inputs(&cfg)
                .await
                .context("H.264 layer preparation failed")?;
            info!("[PREPARE] H.264 compression completed successfully");

            let state = Arc::new(StreamState::new());
            let shutdown = shutdown_channel();
            orchestrator::run_producer(cfg, state, shutdown).await?;
        }
        Commands::Playback => {
            cfg.validate()?;
            let state = Arc::new(StreamState::new());
            let shutdown = shutdown_channel();
            orchestrator::run_consumer(Arc::new(cfg), state, shutdown).await?;
        }
        Commands::Prepare { input } => {
            if let Some(input) = input {
                cfg.input_video = input;
            }
            cfg.validate()?;
            let produced = encoder::prepare_layer_inputs(&cfg)
                .await
                .context("H.264 layer preparation failed")?;
            for path in produced {
                info!("[PREPARE] Rendition ready: {:?}", path);
            }
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                cfg.server_port = port;
            }
            cfg.validate()?;
            let state = Arc::new(StreamState::new());
            server::start_server(cfg.server_port, cfg.segments_root.clone(), state).await?;
        }
    }

    Ok(())
}

/// Flip a watch channel on ctrl-c so every loop sees the same signal.
fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("[MAIN] Shutdown signal received");
            let _ = tx.send(true);
        }
    });
    rx
}

/// Producer + consumer + playback server + optional viewer, torn down
/// together on ctrl-c or on the first loop that dies unexpectedly.
async fn run_experiment(cfg: Arc<StreamConfig>) -> Result<()> {
    encoder::prepare_layer_inputs(&cfg)
        .await
        .context("H.264 layer preparation failed")?;
    info!("[PREPARE] H.264 compression completed successfully");

    let state = Arc::new(StreamState::new());
    let (tx, rx) = watch::channel(false);

    let server_cfg = cfg.clone();
    let server_state = state.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = server::start_server(
            server_cfg.server_port,
            server_cfg.segments_root.clone(),
            server_state,
        )
        .await
        {
            error!("[SERVER] Exited: {:#}", e);
        }
    });

    let viewer = if cfg.launch_viewer {
        match Viewer::launch(&server::player_url(cfg.server_port)) {
            Ok(v) => Some(v),
            Err(e) => {
                error!("[VIEWER] Launch failed: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let mut producer = tokio::spawn(orchestrator::run_producer(
        cfg.clone(),
        state.clone(),
        rx.clone(),
    ));
    let mut consumer = tokio::spawn(orchestrator::run_consumer(
        cfg.clone(),
        state.clone(),
        rx.clone(),
    ));

    info!("[MAIN] Pipeline running. Press Ctrl+C to exit.");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("[MAIN] Shutdown signal received");
        }
        res = &mut producer => {
            report_loop_exit("producer", res);
        }
        res = &mut consumer => {
            report_loop_exit("consumer", res);
        }
    }

    // Single teardown path: flip the channel, drain both loops, then release
    // the external resources exactly once.
    let _ = tx.send(true);
    if !producer.is_finished() {
        report_loop_exit("producer", producer.await);
    }
    if !consumer.is_finished() {
        report_loop_exit("consumer", consumer.await);
    }
    if let Some(viewer) = &viewer {
        viewer.close().await;
    }
    server.abort();
    info!("[MAIN] Pipeline stopped");
    Ok(())
}

fn report_loop_exit(name: &str, res: Result<Result<()>, tokio::task::JoinError>) {
    match res {
        Ok(Ok(())) => info!("[MAIN] {} loop finished", name),
        Ok(Err(e)) => error!("[MAIN] {} loop failed: {:#}", name, e),
        Err(e) => error!("[MAIN] {} task panicked: {}", name, e),
    }
}
