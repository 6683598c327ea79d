//! ESP32 Audio Receiver
//!
//! Accepts the framed microphone stream over TCP, records it to a 24-bit WAV
//! file, and serves a small HTTP control surface for status and gain.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use esp_audio_receiver::{
    config::AppConfig,
    control::ControlState,
    session::SessionManager,
    ui::{handlers::clamp_gain, WebServer},
};

#[derive(Parser, Debug)]
#[command(version, about = "Record an ESP32 microphone stream to WAV")]
struct Args {
    /// TOML config file (defaults to the platform config dir)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// TCP port the producer connects to
    #[arg(long)]
    port: Option<u16>,

    /// Output WAV file
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// HTTP control port
    #[arg(long)]
    http_port: Option<u16>,

    /// Starting gain
    #[arg(long)]
    gain: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    tracing::info!("Starting ESP32 Audio Receiver");

    let mut config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(port) = args.port {
        config.network.tcp_port = port;
    }
    if let Some(output) = args.output {
        config.recording.output_path = output;
    }
    if let Some(port) = args.http_port {
        config.ui.http_port = port;
    }
    if let Some(gain) = args.gain {
        config.initial_gain = gain;
    }
    config.validate()?;

    let initial_gain = clamp_gain(config.initial_gain, config.ui.min_gain, config.ui.max_gain);
    let control = ControlState::shared(initial_gain);

    let manager = SessionManager::bind(&config, control.clone())
        .with_context(|| format!("binding producer port {}", config.network.tcp_port))?;
    let shutdown = manager.shutdown_handle();
    let writer = manager.writer();

    let http_addr = config.ui.socket_addr();
    let http_listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding control surface on {}", http_addr))?;

    let session_thread = manager.spawn()?;

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let web_server = WebServer::new(&config.ui, control.clone());
    let mut web_task = tokio::spawn(web_server.serve_on(http_listener, async move {
        let _ = stop_rx.await;
    }));

    tracing::info!(
        "Gain {:.2}, recording to {}; press Ctrl+C to stop",
        initial_gain,
        config.recording.output_path.display()
    );

    let web_exited = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("Shutdown requested");
            None
        }
        res = &mut web_task => {
            tracing::warn!("Control surface exited early, shutting down");
            Some(res)
        }
    };

    shutdown.trigger();
    let _ = stop_tx.send(());

    let web_result = match web_exited {
        Some(res) => res,
        None => web_task.await,
    };
    if let Err(e) = web_result? {
        tracing::error!("Control surface error: {}", e);
    }

    // Finalize already ran and logged on the session thread
    match tokio::task::spawn_blocking(move || session_thread.join()).await? {
        Ok(_) => {}
        Err(_) => {
            tracing::error!("Session thread panicked, finalizing from main");
            if let Err(e) = writer.finalize() {
                tracing::error!("Finalize failed: {}", e);
            }
        }
    }

    let status = control.get_status();
    tracing::info!(
        "Receiver stopped: {} sessions, {} frames, {} sequence gaps",
        status.sessions_started,
        status.frames_received,
        status.sequence_gaps
    );
    Ok(())
}
