//! Shared control state
//!
//! The only state that crosses from the session thread to the control
//! surface. Gain is a lock-free atomic read on every sample; the counters are
//! updated together under one lock after every frame.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::audio::GainSource;
use crate::protocol::FrameHeader;

/// Session manager lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    /// No connection
    Idle = 0,
    /// Waiting for a producer
    Accepting = 1,
    /// Frames flowing
    Active = 2,
    /// Closing the connection and the file
    Draining = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionState::Accepting,
            2 => SessionState::Active,
            3 => SessionState::Draining,
            _ => SessionState::Idle,
        }
    }
}

/// Counters updated after each frame
#[derive(Debug, Clone, Default)]
struct Counters {
    last_sequence: u32,
    highest_sample_index: u64,
    samples_written: u64,
    frames_received: u64,
    sequence_gaps: u64,
    sessions_started: u64,
    session_id: Option<Uuid>,
    active_peer: Option<SocketAddr>,
    session_started_at: Option<DateTime<Utc>>,
}

/// Point-in-time copy of the control state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub gain: f64,
    pub last_sequence: u32,
    pub highest_sample_index: u64,
    pub samples_written: u64,
    pub running: bool,
    pub state: SessionState,
    pub frames_received: u64,
    pub sequence_gaps: u64,
    pub sessions_started: u64,
    pub session_id: Option<Uuid>,
    pub active_peer: Option<SocketAddr>,
    pub session_started_at: Option<DateTime<Utc>>,
}

/// Process-wide state shared by the session thread and the control surface
#[derive(Debug)]
pub struct ControlState {
    /// `f64` bit pattern
    gain: AtomicU64,
    running: AtomicBool,
    state: AtomicU8,
    counters: Mutex<Counters>,
}

/// Thread-safe handle to the control state
pub type SharedControlState = Arc<ControlState>;

impl ControlState {
    pub fn new(initial_gain: f64) -> Self {
        Self {
            gain: AtomicU64::new(initial_gain.to_bits()),
            running: AtomicBool::new(true),
            state: AtomicU8::new(SessionState::Idle as u8),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn shared(initial_gain: f64) -> SharedControlState {
        Arc::new(Self::new(initial_gain))
    }

    pub fn gain(&self) -> f64 {
        f64::from_bits(self.gain.load(Ordering::Relaxed))
    }

    /// Store a new gain. Range checks belong to the caller.
    pub fn set_gain(&self, value: f64) {
        self.gain.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the session loop to wind down
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn session_state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub(crate) fn set_session_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// A new producer session began; the container restarts from zero
    pub(crate) fn begin_session(&self, id: Uuid, peer: SocketAddr) {
        let mut c = self.counters.lock();
        c.sessions_started += 1;
        c.samples_written = 0;
        c.session_id = Some(id);
        c.active_peer = Some(peer);
        c.session_started_at = Some(Utc::now());
    }

    pub(crate) fn end_session(&self) {
        let mut c = self.counters.lock();
        c.session_id = None;
        c.active_peer = None;
        c.session_started_at = None;
    }

    /// Record a frame that made it to the container
    pub(crate) fn record_frame(&self, header: &FrameHeader, samples_written: u64, gaps: u64) {
        let mut c = self.counters.lock();
        c.last_sequence = header.sequence;
        c.highest_sample_index = c.highest_sample_index.max(header.last_sample_index());
        c.samples_written = samples_written;
        c.frames_received += 1;
        c.sequence_gaps += gaps;
    }

    /// Current status for the control surface
    pub fn get_status(&self) -> StatusSnapshot {
        let c = self.counters.lock().clone();
        StatusSnapshot {
            gain: self.gain(),
            last_sequence: c.last_sequence,
            highest_sample_index: c.highest_sample_index,
            samples_written: c.samples_written,
            running: self.is_running(),
            state: self.session_state(),
            frames_received: c.frames_received,
            sequence_gaps: c.sequence_gaps,
            sessions_started: c.sessions_started,
            session_id: c.session_id,
            active_peer: c.active_peer,
            session_started_at: c.session_started_at,
        }
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl GainSource for ControlState {
    fn gain(&self) -> f64 {
        ControlState::gain(self)
    }
}
