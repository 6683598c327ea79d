//! Session manager
//!
//! Owns the listener and the container writer. Accepts one producer at a
//! time, runs it to completion, and finalizes the container once the
//! receiver is told to stop.

use parking_lot::Mutex;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::{AppConfig, StreamConfig};
use crate::control::{SessionState, SharedControlState};
use crate::error::{ContainerError, DecodeError, Error};
use crate::network::{create_listener, try_accept, ACCEPT_POLL_INTERVAL};
use crate::recording::{ContainerWriter, FinalizeSummary, WavFormat};
use crate::session::connection::{run_session, Session, SessionEnd, SessionReport};

/// Outcome of the manager thread
pub type FinalizeOutcome = Result<Option<FinalizeSummary>, ContainerError>;

/// Stops the session manager from any thread.
///
/// Clears the running flag and shuts down the active peer socket so a
/// blocked read returns straight away.
#[derive(Clone)]
pub struct ShutdownHandle {
    state: SharedControlState,
    active: Arc<Mutex<Option<TcpStream>>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.state.stop();
        if let Some(stream) = self.active.lock().as_ref() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    pub fn is_triggered(&self) -> bool {
        !self.state.is_running()
    }
}

/// Accept loop and session lifecycle
pub struct SessionManager {
    listener: TcpListener,
    nodelay: bool,
    stream_config: StreamConfig,
    writer: Arc<ContainerWriter>,
    state: SharedControlState,
    active: Arc<Mutex<Option<TcpStream>>>,
}

impl SessionManager {
    pub fn new(
        listener: TcpListener,
        nodelay: bool,
        stream_config: StreamConfig,
        writer: Arc<ContainerWriter>,
        state: SharedControlState,
    ) -> Self {
        Self {
            listener,
            nodelay,
            stream_config,
            writer,
            state,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Bind the producer listener and set up the container from `config`
    pub fn bind(config: &AppConfig, state: SharedControlState) -> Result<Self, Error> {
        let listener = create_listener(&config.network)?;
        let format = WavFormat::new(config.stream.sample_rate, config.stream.channels as u16);
        let writer = Arc::new(ContainerWriter::new(
            config.recording.output_path.clone(),
            format,
        ));
        Ok(Self::new(
            listener,
            config.network.nodelay,
            config.stream.clone(),
            writer,
            state,
        ))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            state: self.state.clone(),
            active: self.active.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.session_state()
    }

    pub fn writer(&self) -> Arc<ContainerWriter> {
        self.writer.clone()
    }

    /// Run on a dedicated thread named `session-manager`
    pub fn spawn(self) -> io::Result<JoinHandle<FinalizeOutcome>> {
        thread::Builder::new()
            .name("session-manager".into())
            .spawn(move || self.run())
    }

    /// Serve producers until shutdown, then finalize the container.
    pub fn run(self) -> FinalizeOutcome {
        match self.listener.local_addr() {
            Ok(addr) => tracing::info!("Waiting for producer on {}", addr),
            Err(e) => tracing::warn!("Listener has no local address: {}", e),
        }

        while self.state.is_running() {
            self.state.set_session_state(SessionState::Accepting);

            let (stream, peer) = match try_accept(&self.listener, self.nodelay) {
                Ok(Some(conn)) => conn,
                Ok(None) => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                    continue;
                }
            };

            self.serve(stream, peer);
            self.state.set_session_state(SessionState::Idle);
        }

        self.state.set_session_state(SessionState::Idle);
        let Self { listener, writer, .. } = self;
        drop(listener);

        tracing::info!("Finalizing {}", writer.path().display());
        let outcome = writer.finalize();
        match &outcome {
            Ok(Some(summary)) => tracing::info!(
                "Wrote {} samples ({} data bytes) to {}",
                summary.total_samples,
                summary.sizes.data_bytes,
                writer.path().display()
            ),
            Ok(None) => tracing::info!("No session was recorded; nothing to finalize"),
            Err(e) => tracing::error!("Finalize failed, header sizes are wrong: {}", e),
        }
        outcome
    }

    fn serve(&self, stream: TcpStream, peer: SocketAddr) {
        let session = Session::new(peer);
        tracing::info!(session = %session.id, "Producer connected from {}", peer);

        if let Err(e) = self.writer.open() {
            tracing::error!(session = %session.id, "Cannot record session: {}", e);
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }

        match stream.try_clone() {
            Ok(clone) => *self.active.lock() = Some(clone),
            Err(e) => tracing::warn!("Shutdown will not interrupt this session: {}", e),
        }

        self.state.set_session_state(SessionState::Active);
        self.state.begin_session(session.id, peer);

        let report = run_session(
            &session,
            &stream,
            &self.stream_config,
            &self.writer,
            &self.state,
        );

        self.state.set_session_state(SessionState::Draining);
        self.writer.close();
        self.active.lock().take();
        let _ = stream.shutdown(Shutdown::Both);
        self.state.end_session();

        log_report(&session, &report);
    }
}

fn log_report(session: &Session, report: &SessionReport) {
    match &report.end {
        SessionEnd::Closed => tracing::info!(session = %session.id, "Producer disconnected"),
        SessionEnd::Shutdown => {
            tracing::info!(session = %session.id, "Session stopped for shutdown")
        }
        SessionEnd::Fault(DecodeError::Protocol(e)) => {
            tracing::warn!(session = %session.id, "Protocol fault, dropping producer: {}", e)
        }
        SessionEnd::Fault(DecodeError::Transport(e)) => {
            tracing::warn!(session = %session.id, "Connection lost: {}", e)
        }
    }

    let elapsed = chrono::Utc::now() - session.started_at;
    tracing::info!(
        session = %session.id,
        peer = %session.peer,
        frames = report.stats.frames_decoded,
        bytes_in = report.stats.bytes_received,
        bytes_out = report.bytes_written,
        samples = report.samples_written,
        gaps = report.stats.sequence_gaps,
        mismatches = report.stats.config_mismatches,
        duration_ms = elapsed.num_milliseconds(),
        "Session ended"
    );
}
