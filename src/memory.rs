//! Quantum memory hardware model.
//!
//! A [`Memory`] is a single physical qubit slot: it decays from its raw
//! fidelity over a coherence-time window, can be excited to emit a photon
//! towards a neighbor, and tracks the key of whatever quantum state (if
//! any) it currently holds. A [`MemoryArray`] is the fixed-size bank of
//! memories a node owns, addressed by index, matching
//! `components/memory.py`'s `Memory`/`MemoryArray` pair.

use crate::kernel::event::SimTime;
use crate::kernel::quantum_manager::StateKey;

#[derive(Debug, Clone)]
pub struct Memory {
    pub name: String,
    pub raw_fidelity: f64,
    pub frequency: f64,
    pub coherence_time: SimTime,
    pub efficiency: f64,
    pub entangled_memory: Option<(String, String)>,
    pub next_excite_time: SimTime,
    pub qstate_key: Option<StateKey>,
    pub expiration_event: Option<crate::kernel::event::EventHandle>,
}

impl Memory {
    pub fn new(
        name: impl Into<String>,
        raw_fidelity: f64,
        frequency: f64,
        coherence_time: SimTime,
        efficiency: f64,
    ) -> Self {
        Self {
            name: name.into(),
            raw_fidelity,
            frequency,
            coherence_time,
            efficiency,
            entangled_memory: None,
            next_excite_time: 0,
            qstate_key: None,
            expiration_event: None,
        }
    }

    pub fn is_entangled(&self) -> bool {
        self.entangled_memory.is_some()
    }

    pub fn reset(&mut self) {
        self.entangled_memory = None;
        self.qstate_key = None;
        self.expiration_event = None;
    }
}

#[derive(Debug, Clone)]
pub struct MemoryArray {
    pub memories: Vec<Memory>,
}

impl MemoryArray {
    pub fn new(
        name_prefix: &str,
        size: usize,
        raw_fidelity: f64,
        frequency: f64,
        coherence_time: SimTime,
        efficiency: f64,
    ) -> Self {
        let memories = (0..size)
            .map(|i| {
                Memory::new(
                    format!("{name_prefix}.mem[{i}]"),
                    raw_fidelity,
                    frequency,
                    coherence_time,
                    efficiency,
                )
            })
            .collect();
        Self { memories }
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    pub fn get(&self, index: usize) -> &Memory {
        &self.memories[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Memory {
        &mut self.memories[index]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.memories.iter().position(|m| m.name == name)
    }
}
