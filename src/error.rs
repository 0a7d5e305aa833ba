//! Domain error type for contract violations.
//!
//! Per the error handling design: domain failures (a generation round
//! failing, a reservation being rejected, a purification fidelity mismatch)
//! are ordinary state transitions and are never represented here. `SimError`
//! is reserved for violations of the kernel's or the control plane's own
//! contracts — bugs, not physics.

use thiserror::Error;

use crate::kernel::event::SimTime;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("event scheduled at {requested} is before current time {now}")]
    EventScheduledInPast { now: SimTime, requested: SimTime },

    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("entity '{0}' already registered")]
    DuplicateEntity(String),

    #[error("unknown message type {0:?} for protocol '{1}'")]
    UnknownMessageType(String, String),

    #[error("memory '{memory}' expired while attached to protocol '{expected}', but owning protocol is '{actual}'")]
    MemoryExpireProtocolMismatch {
        memory: String,
        expected: String,
        actual: String,
    },

    #[error("reservation path mismatch: expected hop '{expected}' at index {index}, found '{actual}'")]
    ReservationPathMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("no route to destination '{0}'")]
    NoRoute(String),

    #[error("memory '{0}' is not in the expected state for this operation")]
    InvalidMemoryState(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type SimResult<T> = Result<T, SimError>;
