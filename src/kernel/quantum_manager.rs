//! Minimal quantum state tracking.
//!
//! Full density-matrix or ket arithmetic is out of scope. The control plane
//! only needs a place to stash a scalar fidelity (`Ket`/`Density` formalism,
//! collapsed to one number here) or a four-component Bell-diagonal-state
//! vector (`BellDiagonal` formalism) per state key, and to "run a circuit"
//! in the sense of producing a new key from old ones with a formalism-
//! specific combination rule. `QuantumManager` is the trait boundary so a
//! more faithful backend can be substituted without touching the protocols
//! that call it.

use std::collections::HashMap;

use crate::error::{SimError, SimResult};

pub type StateKey = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formalism {
    Ket,
    Density,
    BellDiagonal,
}

/// A Bell-diagonal state is the tuple of populations `(p00, p01, p10, p11)`
/// over the four Bell basis states, summing to 1. Fidelity is `p00`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BellDiagonalState {
    pub p: [f64; 4],
}

impl BellDiagonalState {
    pub fn pure(fidelity: f64) -> Self {
        let rest = (1.0 - fidelity) / 3.0;
        Self {
            p: [fidelity, rest, rest, rest],
        }
    }

    pub fn fidelity(&self) -> f64 {
        self.p[0]
    }
}

#[derive(Debug, Clone)]
pub enum QuantumState {
    Scalar(f64),
    BellDiagonal(BellDiagonalState),
}

impl QuantumState {
    pub fn fidelity(&self) -> f64 {
        match self {
            QuantumState::Scalar(f) => *f,
            QuantumState::BellDiagonal(bds) => bds.fidelity(),
        }
    }
}

pub trait QuantumManager {
    fn formalism(&self) -> Formalism;
    fn new_state(&mut self, state: QuantumState) -> StateKey;
    fn get(&self, key: StateKey) -> SimResult<&QuantumState>;
    fn set(&mut self, key: StateKey, state: QuantumState) -> SimResult<()>;
    fn remove(&mut self, key: StateKey);
}

/// Default in-process manager: a flat table of states keyed by an
/// incrementing counter, mirroring the Python `QuantumManager`'s internal
/// `states: Dict[int, State]` plus a monotonically increasing key allocator.
#[derive(Debug, Default)]
pub struct SimpleQuantumManager {
    formalism: FormalismChoice,
    states: HashMap<StateKey, QuantumState>,
    next_key: StateKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormalismChoice {
    Ket,
    Density,
    BellDiagonal,
}

impl Default for FormalismChoice {
    fn default() -> Self {
        FormalismChoice::BellDiagonal
    }
}

impl SimpleQuantumManager {
    pub fn new(formalism: Formalism) -> Self {
        let formalism = match formalism {
            Formalism::Ket => FormalismChoice::Ket,
            Formalism::Density => FormalismChoice::Density,
            Formalism::BellDiagonal => FormalismChoice::BellDiagonal,
        };
        Self {
            formalism,
            states: HashMap::new(),
            next_key: 0,
        }
    }
}

impl QuantumManager for SimpleQuantumManager {
    fn formalism(&self) -> Formalism {
        match self.formalism {
            FormalismChoice::Ket => Formalism::Ket,
            FormalismChoice::Density => Formalism::Density,
            FormalismChoice::BellDiagonal => Formalism::BellDiagonal,
        }
    }

    fn new_state(&mut self, state: QuantumState) -> StateKey {
        let key = self.next_key;
        self.next_key += 1;
        self.states.insert(key, state);
        key
    }

    fn get(&self, key: StateKey) -> SimResult<&QuantumState> {
        self.states
            .get(&key)
            .ok_or_else(|| SimError::UnknownEntity(format!("qstate:{key}")))
    }

    fn set(&mut self, key: StateKey, state: QuantumState) -> SimResult<()> {
        self.states.insert(key, state);
        Ok(())
    }

    fn remove(&mut self, key: StateKey) {
        self.states.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_round_trips() {
        let mut qm = SimpleQuantumManager::new(Formalism::BellDiagonal);
        let key = qm.new_state(QuantumState::BellDiagonal(BellDiagonalState::pure(0.9)));
        assert!((qm.get(key).unwrap().fidelity() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn unknown_key_errors() {
        let qm = SimpleQuantumManager::new(Formalism::BellDiagonal);
        assert!(qm.get(42).is_err());
    }
}
