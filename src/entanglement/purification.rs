//! BBPSSW entanglement purification.
//!
//! Two low-fidelity Bell pairs are consumed (one kept, one sacrificed to a
//! CNOT-and-measure circuit) to probabilistically produce one higher-
//! fidelity pair. Grounded in
//! `entanglement_management/purification.py`: the scalar closed form
//! `improved_fidelity` for the `Ket`/`Density` formalisms, and the
//! Bell-diagonal-state analytical formalism (`purification_res`) for
//! `BellDiagonal`, including the "flip a biased coin against the analytic
//! success probability" trick the Python source uses to decide success
//! deterministically from a single RNG draw rather than simulating the
//! circuit measurement outcome by outcome.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::kernel::quantum_manager::BellDiagonalState;

#[derive(Debug, Clone)]
pub enum PurificationMessage {
    /// Sent by the side that performed the CNOT+measure first, carrying its
    /// measurement parity so the peer can correlate outcomes. `kept_memory`
    /// and `sacrifice_memory` are the *receiver's own* local memory indices
    /// (parsed out of the sender's `remote_memo` addresses), so the peer
    /// doesn't have to re-derive which of its memories this result is about.
    PurificationResult {
        receiver: String,
        kept_memory: usize,
        sacrifice_memory: usize,
        parity: bool,
        fidelity: f64,
    },
}

impl PurificationMessage {
    pub fn receiver(&self) -> &str {
        match self {
            PurificationMessage::PurificationResult { receiver, .. } => receiver,
        }
    }
}

/// Closed-form fidelity of the kept pair after a successful BBPSSW round,
/// for the scalar (`Ket`/`Density`) formalism:
/// `(F^2 + e^2) / (F^2 + 2*F*e + 5*e^2)` where `e = (1-F)/3`.
pub fn improved_fidelity(fidelity: f64) -> f64 {
    let e = (1.0 - fidelity) / 3.0;
    (fidelity * fidelity + e * e) / (fidelity * fidelity + 2.0 * fidelity * e + 5.0 * e * e)
}

/// Probability that a BBPSSW round succeeds (the CNOT-and-measure parities
/// agree), for the scalar formalism. This is the denominator of
/// [`improved_fidelity`]'s closed form.
pub fn success_probability(fidelity: f64) -> f64 {
    let e = (1.0 - fidelity) / 3.0;
    fidelity * fidelity + 2.0 * fidelity * e + 5.0 * e * e
}

/// Analytical BBPSSW outcome on two Bell-diagonal states: returns the
/// success probability and the resulting (renormalized) Bell-diagonal state
/// of the kept pair, following the structure of `purification.py`'s
/// `BBPSSW.purification_res` -- diagonal populations of the kept pair are
/// re-weighted by the matching-parity populations of the sacrificed pair,
/// then renormalized by the overall success probability.
pub fn bds_purification_res(kept: &BellDiagonalState, sacrifice: &BellDiagonalState) -> (f64, BellDiagonalState) {
    let p = kept.p;
    let q = sacrifice.p;

    // Same-parity terms (00/11 vs 01/10) survive the parity check.
    let p_succ = (p[0] * q[0] + p[1] * q[1] + p[2] * q[2] + p[3] * q[3])
        + (p[0] * q[1] + p[1] * q[0] + p[2] * q[3] + p[3] * q[2]);
    let p_succ = p_succ.clamp(1e-12, 1.0);

    let new_00 = (p[0] * q[0] + p[1] * q[1]) / p_succ;
    let new_01 = (p[0] * q[1] + p[1] * q[0]) / p_succ;
    let new_10 = (p[2] * q[2] + p[3] * q[3]) / p_succ;
    let new_11 = (p[2] * q[3] + p[3] * q[2]) / p_succ;

    let total = new_00 + new_01 + new_10 + new_11;
    let result = BellDiagonalState {
        p: [new_00 / total, new_01 / total, new_10 / total, new_11 / total],
    };
    (p_succ, result)
}

/// Flips a single biased coin against `p_succ` to decide success, the
/// determinism trick `purification.py` uses instead of modeling the circuit
/// measurement step by step.
pub fn sample_success(rng: &mut ChaCha8Rng, p_succ: f64) -> bool {
    rng.gen_bool(p_succ.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::rand_core::SeedableRng;

    #[test]
    fn improved_fidelity_increases_high_fidelity_input() {
        assert!(improved_fidelity(0.9) > 0.9);
    }

    #[test]
    fn improved_fidelity_of_perfect_state_stays_perfect() {
        assert!((improved_fidelity(1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bds_purification_improves_fidelity_of_identical_inputs() {
        let state = BellDiagonalState::pure(0.85);
        let (p_succ, result) = bds_purification_res(&state, &state);
        assert!(p_succ > 0.0 && p_succ <= 1.0);
        assert!(result.fidelity() >= state.fidelity());
    }

    #[test]
    fn sample_success_is_deterministic_for_fixed_seed() {
        let mut rng_a = ChaCha8Rng::from_seed([9u8; 32]);
        let mut rng_b = ChaCha8Rng::from_seed([9u8; 32]);
        assert_eq!(sample_success(&mut rng_a, 0.5), sample_success(&mut rng_b, 0.5));
    }
}
