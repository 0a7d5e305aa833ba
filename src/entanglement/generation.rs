//! Entanglement generation: the double-heralded (Barrett-Kok) and
//! single-heralded schemes.
//!
//! Grounded in `entanglement_management/generation.py`'s
//! `EntanglementGenerationA`/`EntanglementGenerationB` round structure
//! (NEGOTIATE -> NEGOTIATE_ACK -> emit -> MEAS_RES) and in
//! `other_examples`'s `barrett_kok.rs`, which chains independent
//! probability checks (BSM efficiency, detector efficiency, dark counts)
//! into a single `attempt_generation` call. The two are combined: the
//! round/negotiate bookkeeping follows the Python state machine, the
//! per-attempt success sampling follows the Rust reference's chained-check
//! style.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::entanglement::protocol::RemotePeer;
use crate::kernel::event::SimTime;

#[derive(Debug, Clone)]
pub enum GenerationMessage {
    /// Sent by the requester before it knows which local protocol instance
    /// the responder will use to answer; carries the requester's own
    /// protocol name (`sender_protocol`) so the responder's `NegotiateAck`
    /// can address it correctly. The responder looks up its own instance
    /// by matching the sender's node name against an installed
    /// `ResponderB` awaiting that peer, rather than by a `receiver` key.
    Negotiate {
        sender_protocol: String,
        qc_delay: SimTime,
        /// The sender's own local memory index, so the responder can report
        /// its real address back instead of a placeholder.
        sender_memory_index: usize,
        /// Round this negotiation starts. Always 1 in practice: round 2's
        /// repeat emission reuses the addresses learned in round 1 and
        /// skips a second handshake, so this only distinguishes a fresh
        /// request from a retry of the same round.
        round: u8,
    },
    NegotiateAck {
        receiver: String,
        emit_time: SimTime,
        /// The responder's own local memory index, mirrored back so the
        /// requester learns the real remote address instead of a placeholder.
        responder_memory_index: usize,
    },
    /// Carries the already-decided outcome back to the requester: the BSM
    /// click is a single physical event, so only the side that performs
    /// the measurement (the responder, on photon arrival) draws from the
    /// rule engine's randomness; the requester just applies the result
    /// rather than independently re-sampling the same click.
    MeasureResult {
        receiver: String,
        success: bool,
        fidelity: f64,
        time: SimTime,
        resolution: SimTime,
        /// Which of the two BSM detectors clicked (`-1` on failure),
        /// carried over the wire so both sides agree on the same physical
        /// event instead of each independently drawing one.
        detector: i8,
    },
}

impl GenerationMessage {
    /// Name of the local protocol instance this message is addressed to.
    /// `Negotiate` has none yet -- the responder resolves its instance by
    /// peer node name instead, see `Node::receive_generation_message`.
    pub fn receiver(&self) -> &str {
        match self {
            GenerationMessage::Negotiate { .. } => "",
            GenerationMessage::NegotiateAck { receiver, .. } => receiver,
            GenerationMessage::MeasureResult { receiver, .. } => receiver,
        }
    }
}

/// A window is valid if the observed trigger time falls within
/// `resolution / 2` of the expected target time on either side -- the
/// symmetric acceptance window `valid_trigger_time` in the original.
pub fn valid_trigger_time(trigger_time: SimTime, target_time: SimTime, resolution: SimTime) -> bool {
    let half = resolution / 2;
    let lower = target_time.saturating_sub(half);
    let upper = target_time + half;
    trigger_time >= lower && trigger_time <= upper
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationRole {
    /// Initiates NEGOTIATE and owns round bookkeeping.
    RequesterA,
    /// Waits for NEGOTIATE, echoes NEGOTIATE_ACK, mirrors rounds.
    ResponderB,
}

/// Physical parameters governing a single generation attempt, grounded in
/// `barrett_kok.rs`'s `BarrettKokProtocol` fields.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub bsm_efficiency: f64,
    pub detector_efficiency: f64,
    pub dark_count_rate: f64,
    pub initial_fidelity: f64,
    pub is_single_heralded: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            bsm_efficiency: 0.95,
            detector_efficiency: 0.85,
            dark_count_rate: 1e-3,
            initial_fidelity: 0.93,
            is_single_heralded: false,
        }
    }
}

/// Which Pauli correction the non-primary side would need to apply to its
/// half of the pair, chosen from the two rounds' detector indices exactly as
/// `generation.py`'s round-3 resolution does. Logged rather than applied to
/// a quantum state -- this crate's fidelity model is scalar, not a full
/// density matrix, so there is no local operator to literally mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    X,
    Z,
}

#[derive(Debug, Clone)]
pub struct EntanglementGenerationState {
    pub name: String,
    pub role: GenerationRole,
    pub memory_index: usize,
    pub peer: Option<RemotePeer>,
    /// Only ever 1 or 2; a value of 1 means round 1's click hasn't resolved
    /// yet, 2 means round 2 is either pending or just resolved.
    pub round: u8,
    /// `bsm_res[round - 1]`: which detector clicked in that round, or `-1`
    /// if the round's click failed. Round 3's resolution reads both slots.
    pub bsm_res: [i8; 2],
    /// Single-heralded scheme only: trigger counts per detector across the
    /// (repeated) attempts, kept as counters per the dark-count accounting
    /// the Python source tracks. Unused by the double-heralded path.
    pub sh_counts: [u8; 2],
    /// `own_node_name > peer_node_name`, decided once at rule-installation
    /// time: decides the correction applied on success, not which side
    /// re-emits for round 2 (that's always the requester, see
    /// `Node::finish_generation`).
    pub is_primary: bool,
    pub params: GenerationParams,
}

impl EntanglementGenerationState {
    pub fn new(
        name: impl Into<String>,
        role: GenerationRole,
        memory_index: usize,
        params: GenerationParams,
        is_primary: bool,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            memory_index,
            peer: None,
            round: 1,
            bsm_res: [-1, -1],
            sh_counts: [0, 0],
            is_primary,
            params,
        }
    }

    pub fn set_others(&mut self, peer: RemotePeer) {
        self.peer = Some(peer);
    }

    pub fn is_ready(&self) -> bool {
        self.peer.is_some()
    }

    /// One full attempt at generating entanglement: photon emission,
    /// transmission loss, BSM detector click, and (single-heralded only)
    /// dark-count contamination, chained as independent checks the way
    /// `BarrettKokProtocol::attempt_generation` does.
    pub fn attempt_generation(&mut self, rng: &mut ChaCha8Rng, channel_transmittance: f64) -> GenerationOutcome {
        let emitted: bool = rng.gen_bool(self.params.bsm_efficiency.clamp(0.0, 1.0));
        if !emitted {
            return GenerationOutcome::Failure;
        }

        let arrived: bool = rng.gen_bool(channel_transmittance.clamp(0.0, 1.0));
        if !arrived {
            return GenerationOutcome::Failure;
        }

        let detected: bool = rng.gen_bool(self.params.detector_efficiency.clamp(0.0, 1.0));
        if !detected {
            return GenerationOutcome::Failure;
        }

        if self.params.is_single_heralded {
            let dark_click: bool = rng.gen_bool(self.params.dark_count_rate.clamp(0.0, 1.0));
            let detector = if dark_click { 1 } else { 0 };
            self.sh_counts[detector as usize] += 1;
            if dark_click {
                return GenerationOutcome::Failure;
            }
        }

        GenerationOutcome::Success {
            fidelity: self.params.initial_fidelity,
        }
    }

    pub fn theoretical_success_rate(&self, channel_transmittance: f64) -> f64 {
        let base = self.params.bsm_efficiency * channel_transmittance * self.params.detector_efficiency;
        if self.params.is_single_heralded {
            base * (1.0 - self.params.dark_count_rate)
        } else {
            base * base
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GenerationOutcome {
    Success { fidelity: f64 },
    Failure,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::rand_core::SeedableRng;

    #[test]
    fn valid_trigger_time_accepts_within_half_resolution() {
        assert!(valid_trigger_time(100, 100, 20));
        assert!(valid_trigger_time(90, 100, 20));
        assert!(valid_trigger_time(110, 100, 20));
        assert!(!valid_trigger_time(70, 100, 20));
    }

    #[test]
    fn deterministic_seed_reproduces_attempt_sequence() {
        let mut rng_a = ChaCha8Rng::from_seed([1u8; 32]);
        let mut rng_b = ChaCha8Rng::from_seed([1u8; 32]);
        let params = GenerationParams::default();
        let mut a = EntanglementGenerationState::new("eg.a", GenerationRole::RequesterA, 0, params, true);
        let mut b = EntanglementGenerationState::new("eg.b", GenerationRole::RequesterA, 0, params, true);
        let outcome_a = a.attempt_generation(&mut rng_a, 0.9);
        let outcome_b = b.attempt_generation(&mut rng_b, 0.9);
        assert_eq!(outcome_a, outcome_b);
    }

    #[test]
    fn higher_loss_reduces_theoretical_rate() {
        let params = GenerationParams::default();
        let state = EntanglementGenerationState::new("eg.a", GenerationRole::RequesterA, 0, params, true);
        assert!(state.theoretical_success_rate(0.9) > state.theoretical_success_rate(0.1));
    }
}
