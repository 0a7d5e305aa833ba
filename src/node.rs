//! Node: the entity that owns hardware, the resource-management plane, and
//! the network-management plane, and is the dispatch target for every
//! scheduled [`EntityEvent`].
//!
//! A `Node` is looked up by name out of the `Timeline`'s registry at event
//! time (the entity-swap in `Timeline::execute`), handles the event against
//! its own state and a `&mut Timeline` for scheduling further work, and is
//! reinserted. `NodeKind` distinguishes a full `QuantumRouter` (runs the
//! resource manager and network manager) from a bare `BsmNode` (just
//! forwards photon clicks), matching the two node roles the original
//! topology module distinguishes.

use std::collections::HashMap;

use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::channel::{ClassicalChannel, QuantumChannel};
use crate::entanglement::generation::{
    Correction, EntanglementGenerationState, GenerationMessage, GenerationOutcome, GenerationParams, GenerationRole,
};
use crate::entanglement::purification::{improved_fidelity, sample_success, success_probability, PurificationMessage};
use crate::entanglement::swapping::{EntanglementSwappingA, SwappingMessage, SwappingParams};
use crate::entanglement::{ProtocolOutcome, RemotePeer};
use crate::error::{SimError, SimResult};
use crate::kernel::entity::{Entity, EntityEvent};
use crate::kernel::event::SimTime;
use crate::kernel::process::Process;
use crate::kernel::timeline::Timeline;
use crate::memory::MemoryArray;
use crate::message::Message;
use crate::network::reservation::{Reservation, ReservationMessage};
use crate::network::{NetworkManager, ReservationRequest};
use crate::resource::rule_manager::RuleAction;
use crate::resource::{continuous_rule, eg_peer_by_name, MemoryState, ResourceManager, ResourceManagerMessage, WaitingProtocol};

/// Parses the trailing `[N]` integer out of an address like `"node.mem[3]"`.
fn parse_memory_index(remote_memo: &str) -> Option<usize> {
    let start = remote_memo.rfind('[')?;
    let end = remote_memo.rfind(']')?;
    remote_memo.get(start + 1..end)?.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Router,
    Bsm,
}

/// App-facing outcome of a reservation request, delivered by callback
/// rather than by return value since admission is decided asynchronously
/// (the RSVP handshake spans multiple events).
#[derive(Debug, Clone)]
pub enum ReservationResult {
    Approved(Reservation),
    Rejected(Reservation),
}

pub struct Node {
    name: String,
    kind: NodeKind,
    pub memories: MemoryArray,
    pub resource_manager: ResourceManager,
    pub network_manager: NetworkManager,
    rng: ChaCha8Rng,
    classical_channels: HashMap<String, ClassicalChannel>,
    quantum_channels: HashMap<String, QuantumChannel>,
    generation_protocols: HashMap<String, EntanglementGenerationState>,
    pending_reservations: HashMap<String, Reservation>,
    reservation_log: Vec<ReservationResult>,
    generation_params: GenerationParams,
    swapping_params: SwappingParams,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            memories: MemoryArray::new("mem", 0, 0.93, 2e9, 1_000_000_000, 0.9),
            resource_manager: ResourceManager::new("", 0),
            network_manager: NetworkManager::new(),
            rng: ChaCha8Rng::from_seed([0u8; 32]),
            classical_channels: HashMap::new(),
            quantum_channels: HashMap::new(),
            generation_protocols: HashMap::new(),
            pending_reservations: HashMap::new(),
            reservation_log: Vec::new(),
            generation_params: GenerationParams::default(),
            swapping_params: SwappingParams::default(),
        }
    }

    pub fn with_memories(mut self, count: usize, raw_fidelity: f64, coherence_time: SimTime) -> Self {
        self.memories = MemoryArray::new(&self.name.clone(), count, raw_fidelity, 2e9, coherence_time, 0.9);
        self.resource_manager = ResourceManager::new(self.name.clone(), count);
        self
    }

    pub fn with_rng(mut self, rng: ChaCha8Rng) -> Self {
        self.rng = rng;
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn reservation_log(&self) -> &[ReservationResult] {
        &self.reservation_log
    }

    pub fn add_classical_channel(&mut self, channel: ClassicalChannel) {
        if let Some(peer) = channel.other_end(&self.name) {
            self.network_manager.routing.add_route(peer.to_string(), peer.to_string());
        }
        self.classical_channels.insert(channel.name.clone(), channel);
    }

    pub fn add_quantum_channel(&mut self, channel: QuantumChannel) {
        self.quantum_channels.insert(channel.name.clone(), channel);
    }

    fn classical_channel_to(&self, peer: &str) -> Option<&ClassicalChannel> {
        self.classical_channels
            .values()
            .find(|c| c.other_end(&self.name) == Some(peer))
    }

    fn quantum_channel_to(&self, peer: &str) -> Option<&QuantumChannel> {
        self.quantum_channels
            .values()
            .find(|c| c.other_end(&self.name) == Some(peer))
    }

    /// Sends `message` to `dest`, scheduled to arrive after the classical
    /// channel's propagation delay.
    pub fn send_message(&self, dest: &str, message: Message, tl: &mut Timeline) -> SimResult<()> {
        let delay = self
            .classical_channel_to(dest)
            .ok_or_else(|| SimError::NoRoute(dest.to_string()))?
            .delay;
        let arrival = tl.now() + delay;
        tl.schedule(
            arrival,
            Process::new(
                dest.to_string(),
                EntityEvent::ReceiveMessage {
                    src: self.name.clone(),
                    message,
                },
            ),
        )?;
        Ok(())
    }

    /// Installs the always-on, reservation-independent generation rules
    /// described in the continuous-generation supplement: this node tries
    /// `memory_index`'s memory against `peer_node` whenever it is idle.
    pub fn install_continuous_generation(&mut self, mid: &str, peer_node: &str) {
        let rule = continuous_rule::continuous_generation_rule_a(
            &format!("continuous::{}::{}", self.name, peer_node),
            mid,
            peer_node,
        );
        self.resource_manager.load_rule(rule);
    }

    pub fn install_continuous_generation_responder(&mut self, peer_node: &str) {
        let rule = continuous_rule::continuous_generation_rule_b(
            &format!("continuous-b::{}::{}", self.name, peer_node),
            peer_node,
        );
        self.resource_manager.load_rule(rule);
    }

    /// No-op hook point mirroring `QuantumRouter.get_idle_memory`: called
    /// whenever a memory reverts to raw with no rule claiming it. Override
    /// points live at the call site in application code; the base
    /// implementation just logs.
    pub fn on_idle_memory(&self, memory_index: usize) {
        tracing::trace!(node = %self.name, memory = memory_index, "memory idle, no rule claimed it");
    }

    /// App-facing entry point: requests a reservation towards `responder`.
    /// Builds the `Reservation` and kicks off the forward admission pass by
    /// sending a `Request` to the first hop. The network manager's routing
    /// table supplies the next hop.
    pub fn reserve_net_resource(&mut self, req: ReservationRequest, tl: &mut Timeline) -> SimResult<String> {
        let responder = req.responder.clone();
        let mut reservation = self.network_manager.build_reservation(&self.name, req);
        reservation.path.push(self.name.clone());
        let id = reservation.id.clone();
        self.pending_reservations.insert(id.clone(), reservation.clone());
        let next_hop = self.network_manager.routing.next_hop(&responder)?.to_string();
        self.send_message(
            &next_hop,
            Message::Reservation(ReservationMessage::Request {
                receiver: "reservation".to_string(),
                reservation,
                qcaps: Vec::new(),
            }),
            tl,
        )?;
        Ok(id)
    }

    pub fn get_reserve_res(&self, reservation_id: &str) -> Option<&ReservationResult> {
        self.reservation_log
            .iter()
            .find(|r| self.reservation_id_of(r) == reservation_id)
    }

    fn reservation_id_of<'a>(&self, result: &'a ReservationResult) -> &'a str {
        match result {
            ReservationResult::Approved(r) => &r.id,
            ReservationResult::Rejected(r) => &r.id,
        }
    }

    pub fn get_other_reservation(&self, reservation_id: &str) -> Option<&Reservation> {
        self.pending_reservations.get(reservation_id)
    }

    /// Handles an incoming `EntityEvent` against this node's state,
    /// scheduling any follow-up events on `tl`. Called from
    /// `Timeline::execute` after this node has been removed from the
    /// registry, and reinserted by the caller once this returns.
    pub fn handle(&mut self, event: EntityEvent, tl: &mut Timeline) -> SimResult<()> {
        match event {
            EntityEvent::ReceiveMessage { src, message } => self.receive_message(&src, message, tl),
            EntityEvent::MemoryExpire { memory_index } => self.handle_memory_expire(memory_index, tl),
            EntityEvent::ExcitePhoton {
                memory_index,
                channel,
                peer,
            } => self.handle_excite_photon(memory_index, &channel, &peer, tl),
            EntityEvent::PhotonArrival {
                memory_index,
                source,
                t_emit,
            } => self.handle_photon_arrival(memory_index, &source, t_emit, tl),
            EntityEvent::ResourceManagerTick => self.tick_resource_manager(tl),
            EntityEvent::ReservationWindow {
                reservation_id,
                is_start,
            } => self.handle_reservation_window(&reservation_id, is_start),
        }
    }

    fn handle_memory_expire(&mut self, memory_index: usize, tl: &mut Timeline) -> SimResult<()> {
        self.memories.get_mut(memory_index).reset();
        self.resource_manager.release_memory(memory_index);
        self.on_idle_memory(memory_index);
        self.reevaluate_memory(memory_index, tl)
    }

    /// Re-checks `memory_index` against the rule list and, if a rule now
    /// matches (the memory just went back to `Raw`), instantiates its
    /// action. Called at every point a memory's state returns to `Raw`
    /// instead of waiting for a separate polling tick, so reservation- and
    /// continuous-generation rules react the moment a memory frees up.
    fn reevaluate_memory(&mut self, memory_index: usize, tl: &mut Timeline) -> SimResult<()> {
        if let Some(action) = self.resource_manager.update(memory_index) {
            self.apply_rule_action(memory_index, action, tl)?;
        }
        Ok(())
    }

    /// Sweeps every local memory through `reevaluate_memory`. A swapping or
    /// purification rule tied to one memory index can only become
    /// satisfiable once a *different* memory index transitions (the other
    /// half of the pair finishing generation, a sibling pair completing
    /// purification), so a state change on one memory needs a full sweep,
    /// not just a re-check of the memory that changed.
    fn reevaluate_all(&mut self, tl: &mut Timeline) -> SimResult<()> {
        for idx in 0..self.resource_manager.memory_count() {
            self.reevaluate_memory(idx, tl)?;
        }
        Ok(())
    }

    fn handle_excite_photon(&mut self, memory_index: usize, channel: &str, peer: &str, tl: &mut Timeline) -> SimResult<()> {
        let delay = self
            .quantum_channels
            .get(channel)
            .ok_or_else(|| SimError::NoRoute(channel.to_string()))?
            .delay;
        let t_emit = tl.now();
        tl.schedule(
            tl.now() + delay,
            Process::new(
                peer.to_string(),
                EntityEvent::PhotonArrival {
                    memory_index,
                    source: self.name.clone(),
                    t_emit,
                },
            ),
        )?;
        Ok(())
    }

    /// The arriving photon's destination performs the BSM click: it is the
    /// only side that draws from `attempt_generation`, then reports the
    /// outcome back to the emitter with `MeasureResult` rather than having
    /// both ends independently (and inconsistently) re-sample the same
    /// physical event.
    fn handle_photon_arrival(&mut self, emitter_memory_index: usize, source: &str, t_emit: SimTime, tl: &mut Timeline) -> SimResult<()> {
        let Some(local_key) = self
            .generation_protocols
            .iter()
            .find(|(_, s)| s.peer.as_ref().map(|p| p.node.as_str()) == Some(source))
            .map(|(k, _)| k.clone())
        else {
            return Ok(());
        };
        let transmittance = self
            .quantum_channel_to(source)
            .map(|c| c.transmittance())
            .unwrap_or(1.0);
        let outcome = {
            let state = self
                .generation_protocols
                .get_mut(&local_key)
                .expect("just looked up by key");
            state.attempt_generation(&mut self.rng, transmittance)
        };
        let (success, fidelity) = match outcome {
            GenerationOutcome::Success { fidelity } => (true, fidelity),
            GenerationOutcome::Failure => (false, 0.0),
        };
        // Which of the two BSM detectors clicked, drawn once here (the only
        // side that measures) and carried over the wire so the requester
        // doesn't independently re-sample the same physical event.
        let detector: i8 = if success {
            if self.rng.gen_bool(0.5) {
                0
            } else {
                1
            }
        } else {
            -1
        };
        self.send_message(
            source,
            Message::Generation(GenerationMessage::MeasureResult {
                receiver: format!("eg::{}::{}", source, emitter_memory_index),
                success,
                fidelity,
                time: t_emit,
                resolution: 0,
                detector,
            }),
            tl,
        )?;
        self.finish_generation(&local_key, outcome, detector, tl)
    }

    /// One-time bootstrap sweep fired by `Timeline::register_node`: rules
    /// installed before registration (continuous generation, etc.) need an
    /// initial evaluation against the node's already-`Raw` memories. After
    /// this, `reevaluate_memory` reacts at every later state change, so
    /// nothing re-schedules another tick from here.
    fn tick_resource_manager(&mut self, tl: &mut Timeline) -> SimResult<()> {
        self.reevaluate_all(tl)?;
        Ok(())
    }

    fn handle_reservation_window(&mut self, reservation_id: &str, is_start: bool) -> SimResult<()> {
        if !is_start {
            self.resource_manager.expire_reservation(reservation_id);
            self.pending_reservations.remove(reservation_id);
        }
        Ok(())
    }

    fn apply_rule_action(&mut self, memory_index: usize, action: RuleAction, tl: &mut Timeline) -> SimResult<()> {
        match action {
            RuleAction::InstallGenerationA { mid, peer_node } => {
                let name = format!("eg::{}::{}", self.name, memory_index);
                let is_primary = self.name > peer_node;
                let mut state = EntanglementGenerationState::new(
                    name.clone(),
                    GenerationRole::RequesterA,
                    memory_index,
                    self.generation_params,
                    is_primary,
                );
                state.set_others(RemotePeer {
                    protocol: format!("eg::{}", peer_node),
                    node: peer_node.clone(),
                    memories: Vec::new(),
                });
                self.generation_protocols.insert(name.clone(), state);
                self.resource_manager.memory_info_mut(memory_index).to_occupied(mid);
                let qc_delay = self.quantum_channel_to(&peer_node).map(|c| c.delay).unwrap_or(0);
                self.send_message(
                    &peer_node,
                    Message::Generation(GenerationMessage::Negotiate {
                        sender_protocol: name,
                        qc_delay,
                        sender_memory_index: memory_index,
                        round: 1,
                    }),
                    tl,
                )?;
                Ok(())
            }
            RuleAction::InstallGenerationB { peer_node } => {
                let name = format!("eg::{}::{}", self.name, memory_index);
                let is_primary = self.name > peer_node;
                let mut state = EntanglementGenerationState::new(
                    name.clone(),
                    GenerationRole::ResponderB,
                    memory_index,
                    self.generation_params,
                    is_primary,
                );
                state.set_others(RemotePeer {
                    protocol: format!("eg::{}", peer_node),
                    node: peer_node.clone(),
                    memories: Vec::new(),
                });
                self.generation_protocols.insert(name.clone(), state);
                self.resource_manager
                    .memory_info_mut(memory_index)
                    .to_occupied("eg-b");
                // Enrolled so the sender's NEGOTIATE can bind to this
                // instance by peer name (it doesn't know our protocol name
                // yet -- that's the point of a responder selector).
                self.resource_manager.enroll_waiting(WaitingProtocol {
                    protocol_name: name,
                    memory_indices: vec![memory_index],
                    peer_node: Some(peer_node),
                });
                Ok(())
            }
            RuleAction::InstallSwappingA {
                left_memory,
                right_memory,
                success_probability,
                degradation,
                ..
            } => self.attempt_swap(left_memory, right_memory, success_probability, degradation, tl),
            RuleAction::InstallSwappingB { .. } => {
                self.resource_manager.memory_info_mut(memory_index).to_occupied("es-b");
                Ok(())
            }
            RuleAction::InstallPurificationA {
                kept_memory,
                sacrifice_memory,
                peer_node,
            } => self.start_purification(kept_memory, sacrifice_memory, &peer_node, tl),
            RuleAction::InstallPurificationB { .. } => {
                self.resource_manager.memory_info_mut(memory_index).to_occupied("ep-b");
                Ok(())
            }
        }
    }

    /// Performs the interior-hop Bell-state measurement joining `left_memory`
    /// and `right_memory` into a single end-to-end pair, once both halves
    /// are actually entangled (the rule that calls this fires on either half
    /// completing, so it's a no-op until both are ready). Forwards the
    /// result to both endpoints over the classical channel; on success each
    /// endpoint's new remote address is the *other* endpoint's own local
    /// memory, resolved from the already-known `remote_memo` strings rather
    /// than a second round trip.
    fn attempt_swap(
        &mut self,
        left_memory: usize,
        right_memory: usize,
        success_probability: f64,
        degradation: f64,
        tl: &mut Timeline,
    ) -> SimResult<()> {
        let left = self.resource_manager.memory_info(left_memory).clone();
        let right = self.resource_manager.memory_info(right_memory).clone();
        if left.state != MemoryState::Entangled || right.state != MemoryState::Entangled {
            return Ok(());
        }

        let swap = EntanglementSwappingA::new(
            format!("es::{}::{}::{}", self.name, left_memory, right_memory),
            left_memory,
            right_memory,
            SwappingParams {
                success_probability,
                degradation,
            },
        );
        let draw: f64 = self.rng.gen_range(0.0..1.0);
        let outcome = swap.attempt(draw, left.fidelity, right.fidelity);

        let left_remote_node = left.remote_node.clone().unwrap_or_default();
        let left_remote_memo = left.remote_memo.clone().unwrap_or_default();
        let right_remote_node = right.remote_node.clone().unwrap_or_default();
        let right_remote_memo = right.remote_memo.clone().unwrap_or_default();

        self.resource_manager.release_memory(left_memory);
        self.resource_manager.release_memory(right_memory);

        match outcome {
            ProtocolOutcome::Success { fidelity } => {
                info!(node = %self.name, left_memory, right_memory, fidelity, "entanglement swap succeeded");
                if let Some(idx) = parse_memory_index(&left_remote_memo) {
                    self.send_message(
                        &left_remote_node,
                        Message::Swapping(SwappingMessage::SwapResult {
                            receiver: String::new(),
                            memory_index: idx,
                            success: true,
                            fidelity,
                            new_remote_node: right_remote_node.clone(),
                            new_remote_memory: right_remote_memo.clone(),
                        }),
                        tl,
                    )?;
                }
                if let Some(idx) = parse_memory_index(&right_remote_memo) {
                    self.send_message(
                        &right_remote_node,
                        Message::Swapping(SwappingMessage::SwapResult {
                            receiver: String::new(),
                            memory_index: idx,
                            success: true,
                            fidelity,
                            new_remote_node: left_remote_node.clone(),
                            new_remote_memory: left_remote_memo.clone(),
                        }),
                        tl,
                    )?;
                }
            }
            ProtocolOutcome::Failure => {
                info!(node = %self.name, left_memory, right_memory, "entanglement swap failed");
                for (remote_node, remote_memo) in [
                    (left_remote_node, left_remote_memo),
                    (right_remote_node, right_remote_memo),
                ] {
                    if let Some(idx) = parse_memory_index(&remote_memo) {
                        self.send_message(
                            &remote_node,
                            Message::Swapping(SwappingMessage::SwapResult {
                                receiver: String::new(),
                                memory_index: idx,
                                success: false,
                                fidelity: 0.0,
                                new_remote_node: String::new(),
                                new_remote_memory: String::new(),
                            }),
                            tl,
                        )?;
                    }
                }
            }
        }

        self.reevaluate_memory(left_memory, tl)?;
        self.reevaluate_memory(right_memory, tl)
    }

    /// Primary side of purification: resolves the sacrifice memory if it
    /// wasn't known at rule-install time, samples the BBPSSW outcome once,
    /// and mutates both local memories before forwarding the peer's own
    /// local indices for the same pair.
    fn start_purification(
        &mut self,
        kept_memory: usize,
        sacrifice_memory: usize,
        peer_node: &str,
        tl: &mut Timeline,
    ) -> SimResult<()> {
        let kept = self.resource_manager.memory_info(kept_memory).clone();
        if kept.state != MemoryState::Entangled {
            return Ok(());
        }
        let sacrifice_memory = if sacrifice_memory == usize::MAX {
            let found = (0..self.resource_manager.memory_count()).find(|&idx| {
                idx != kept_memory
                    && self.resource_manager.memory_info(idx).state == MemoryState::Entangled
                    && self.resource_manager.memory_info(idx).remote_node.as_deref() == Some(peer_node)
            });
            match found {
                Some(idx) => idx,
                None => return Ok(()),
            }
        } else if sacrifice_memory < self.resource_manager.memory_count() {
            sacrifice_memory
        } else {
            return Ok(());
        };
        let sacrifice = self.resource_manager.memory_info(sacrifice_memory).clone();
        if sacrifice.state != MemoryState::Entangled {
            return Ok(());
        }

        let p_succ = success_probability(kept.fidelity);
        let success = sample_success(&mut self.rng, p_succ);
        let new_fidelity = if success { improved_fidelity(kept.fidelity) } else { 0.0 };

        let kept_remote_node = kept.remote_node.clone().unwrap_or_default();
        let kept_remote_memo = kept.remote_memo.clone().unwrap_or_default();
        let sacrifice_remote_memo = sacrifice.remote_memo.clone().unwrap_or_default();

        self.resource_manager.release_memory(sacrifice_memory);
        if success {
            self.resource_manager
                .memory_info_mut(kept_memory)
                .to_entangled(kept_remote_node, kept_remote_memo.clone(), new_fidelity);
            info!(node = %self.name, kept_memory, sacrifice_memory, fidelity = new_fidelity, "purification succeeded");
        } else {
            self.resource_manager.release_memory(kept_memory);
            info!(node = %self.name, kept_memory, sacrifice_memory, "purification failed");
        }

        let peer_kept = parse_memory_index(&kept_remote_memo).unwrap_or(0);
        let peer_sacrifice = parse_memory_index(&sacrifice_remote_memo).unwrap_or(0);
        self.send_message(
            peer_node,
            Message::Purification(PurificationMessage::PurificationResult {
                receiver: String::new(),
                kept_memory: peer_kept,
                sacrifice_memory: peer_sacrifice,
                parity: success,
                fidelity: new_fidelity,
            }),
            tl,
        )?;

        self.reevaluate_memory(kept_memory, tl)?;
        self.reevaluate_memory(sacrifice_memory, tl)
    }

    fn receive_message(&mut self, src: &str, message: Message, tl: &mut Timeline) -> SimResult<()> {
        match message {
            Message::Generation(msg) => self.receive_generation_message(src, msg, tl),
            Message::Purification(msg) => self.receive_purification_message(src, msg, tl),
            Message::Swapping(msg) => self.receive_swapping_message(src, msg, tl),
            Message::Reservation(msg) => self.receive_reservation_message(src, msg, tl),
            Message::ResourceManager(msg) => self.receive_resource_manager_message(src, msg, tl),
        }
    }

    fn receive_generation_message(&mut self, src: &str, msg: GenerationMessage, tl: &mut Timeline) -> SimResult<()> {
        if let GenerationMessage::Negotiate {
            sender_protocol,
            qc_delay,
            sender_memory_index,
            ..
        } = msg
        {
            // The responder doesn't yet know its own protocol's name from
            // the message (it was installed independently, by its own
            // rule), so it binds through the waiting-protocol registry by
            // peer name instead of a shared instance key.
            let waiting = self
                .resource_manager
                .match_waiting(&eg_peer_by_name(src))
                .ok_or_else(|| SimError::UnknownMessageType("Generation".into(), src.to_string()))?;
            let local_key = waiting.protocol_name;
            if let Some(state) = self.generation_protocols.get_mut(&local_key) {
                state.set_others(RemotePeer {
                    protocol: sender_protocol.clone(),
                    node: src.to_string(),
                    memories: vec![format!("{}.mem[{}]", src, sender_memory_index)],
                });
            }
            let responder_memory_index = self
                .generation_protocols
                .get(&local_key)
                .map(|s| s.memory_index)
                .unwrap_or(0);
            let emit_time = tl.now() + qc_delay;
            self.send_message(
                src,
                Message::Generation(GenerationMessage::NegotiateAck {
                    receiver: sender_protocol,
                    emit_time,
                    responder_memory_index,
                }),
                tl,
            )?;
            return Ok(());
        }

        let receiver = msg.receiver().to_string();
        let Some(state) = self.generation_protocols.get_mut(&receiver) else {
            return Err(SimError::UnknownMessageType("Generation".into(), receiver));
        };
        match msg {
            GenerationMessage::Negotiate { .. } => unreachable!("handled above"),
            GenerationMessage::NegotiateAck {
                emit_time,
                responder_memory_index,
                ..
            } => {
                let memory_index = state.memory_index;
                if let Some(peer) = state.peer.as_mut() {
                    peer.memories = vec![format!("{}.mem[{}]", src, responder_memory_index)];
                }
                let channel = self
                    .quantum_channel_to(src)
                    .ok_or_else(|| SimError::NoRoute(src.to_string()))?
                    .name
                    .clone();
                tl.schedule(
                    emit_time,
                    Process::new(
                        self.name.clone(),
                        EntityEvent::ExcitePhoton {
                            memory_index,
                            channel,
                            peer: src.to_string(),
                        },
                    ),
                )?;
                Ok(())
            }
            GenerationMessage::MeasureResult {
                success,
                fidelity,
                detector,
                ..
            } => {
                let _ = state;
                let outcome = if success {
                    GenerationOutcome::Success { fidelity }
                } else {
                    GenerationOutcome::Failure
                };
                self.finish_generation(&receiver, outcome, detector, tl)
            }
        }
    }

    /// Resolves one completed attempt. The double-heralded scheme needs two
    /// successful attempts to fully resolve an entangled pair: the first
    /// success just advances `state.round` and (on the requester side only,
    /// since it's the side that re-emits) triggers a second emission over
    /// the same already-known addresses -- there's no second NEGOTIATE,
    /// since both sides already learned each other's memory index in round
    /// 1. The second success finalizes the pair and logs the Pauli
    /// correction the non-primary side would apply, decided from the two
    /// rounds' detector indices exactly as the round-3 resolution step does.
    fn finish_generation(
        &mut self,
        protocol_name: &str,
        outcome: GenerationOutcome,
        detector: i8,
        tl: &mut Timeline,
    ) -> SimResult<()> {
        let Some(state) = self.generation_protocols.get_mut(protocol_name) else {
            return Ok(());
        };
        let memory_index = state.memory_index;

        let fidelity = match outcome {
            GenerationOutcome::Failure => {
                info!(node = %self.name, memory = memory_index, "entanglement generation round failed");
                self.generation_protocols.remove(protocol_name);
                self.resource_manager.release_memory(memory_index);
                return self.reevaluate_memory(memory_index, tl);
            }
            GenerationOutcome::Success { fidelity } => fidelity,
        };

        let round = state.round;
        state.bsm_res[(round - 1) as usize] = detector;

        if round == 1 {
            state.round = 2;
            if state.role == GenerationRole::RequesterA {
                let peer_node = state.peer.as_ref().map(|p| p.node.clone());
                if let Some(peer_node) = peer_node {
                    let channel = self.quantum_channel_to(&peer_node).map(|c| c.name.clone());
                    if let Some(channel) = channel {
                        return self.handle_excite_photon(memory_index, &channel, &peer_node, tl);
                    }
                }
            }
            return Ok(());
        }

        let state = self
            .generation_protocols
            .remove(protocol_name)
            .expect("looked up above");
        let correction = if state.is_primary {
            Correction::X
        } else if state.bsm_res[0] == state.bsm_res[1] {
            Correction::X
        } else {
            Correction::Z
        };
        let peer = state.peer.as_ref();
        let remote_node = peer.map(|p| p.node.clone()).unwrap_or_default();
        let remote_memo = peer.and_then(|p| p.memories.first().cloned()).unwrap_or_default();
        info!(
            node = %self.name, memory = memory_index, fidelity, correction = ?correction,
            "entanglement generation succeeded"
        );
        self.resource_manager
            .memory_info_mut(memory_index)
            .to_entangled(remote_node, remote_memo, fidelity);
        Ok(())
    }

    fn receive_purification_message(&mut self, _src: &str, msg: PurificationMessage, tl: &mut Timeline) -> SimResult<()> {
        match msg {
            PurificationMessage::PurificationResult {
                kept_memory,
                sacrifice_memory,
                parity,
                fidelity,
                ..
            } => {
                if kept_memory >= self.resource_manager.memory_count()
                    || sacrifice_memory >= self.resource_manager.memory_count()
                {
                    return Ok(());
                }
                self.resource_manager.release_memory(sacrifice_memory);
                if parity {
                    let info = self.resource_manager.memory_info(kept_memory);
                    let remote_node = info.remote_node.clone().unwrap_or_default();
                    let remote_memo = info.remote_memo.clone().unwrap_or_default();
                    self.resource_manager
                        .memory_info_mut(kept_memory)
                        .to_entangled(remote_node, remote_memo, fidelity);
                } else {
                    self.resource_manager.release_memory(kept_memory);
                }
                self.reevaluate_memory(kept_memory, tl)?;
                self.reevaluate_memory(sacrifice_memory, tl)
            }
        }
    }

    fn receive_swapping_message(&mut self, _src: &str, msg: SwappingMessage, tl: &mut Timeline) -> SimResult<()> {
        match msg {
            SwappingMessage::SwapResult {
                memory_index,
                success,
                fidelity,
                new_remote_node,
                new_remote_memory,
                ..
            } => {
                if success && memory_index < self.resource_manager.memory_count() {
                    self.resource_manager
                        .memory_info_mut(memory_index)
                        .to_entangled(new_remote_node.clone(), new_remote_memory.clone(), fidelity);
                    info!(node = %self.name, memory_index, fidelity, new_remote_node = %new_remote_node, "swap result applied");
                    Ok(())
                } else if !success && memory_index < self.resource_manager.memory_count() {
                    self.resource_manager.release_memory(memory_index);
                    self.reevaluate_memory(memory_index, tl)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn receive_resource_manager_message(&mut self, _src: &str, msg: ResourceManagerMessage, tl: &mut Timeline) -> SimResult<()> {
        match msg {
            ResourceManagerMessage::Request { memory_indices, .. } => {
                for idx in memory_indices {
                    if idx < self.resource_manager.memory_count() {
                        self.resource_manager.memory_info_mut(idx).to_occupied("remote-paired");
                    }
                }
                Ok(())
            }
            ResourceManagerMessage::Response { .. } => Ok(()),
            ResourceManagerMessage::ReleaseProtocol { protocol_name, .. } => {
                self.generation_protocols.remove(&protocol_name);
                Ok(())
            }
            ResourceManagerMessage::ReleaseMemory { memory_index, .. } => {
                self.resource_manager.release_memory(memory_index);
                self.reevaluate_memory(memory_index, tl)
            }
        }
    }

    fn receive_reservation_message(&mut self, src: &str, msg: ReservationMessage, tl: &mut Timeline) -> SimResult<()> {
        match msg {
            ReservationMessage::Request {
                mut reservation,
                mut qcaps,
                ..
            } => {
                reservation.path.push(self.name.clone());
                let available = (0..self.resource_manager.memory_count())
                    .filter(|&i| self.resource_manager.memory_info(i).state == crate::resource::MemoryState::Raw)
                    .count();
                qcaps.push(crate::network::reservation::QCap {
                    node: self.name.clone(),
                    available_memories: available,
                });

                if reservation.responder == self.name {
                    let admitted = available >= reservation.memory_size;
                    if admitted {
                        self.install_path_rules(&reservation, &qcaps, tl)?;
                        self.reservation_log.push(ReservationResult::Approved(reservation.clone()));
                        self.send_message(
                            src,
                            Message::Reservation(ReservationMessage::Approve {
                                receiver: "reservation".to_string(),
                                reservation,
                                qcaps,
                            }),
                            tl,
                        )?;
                    } else {
                        self.reservation_log.push(ReservationResult::Rejected(reservation.clone()));
                        self.send_message(
                            src,
                            Message::Reservation(ReservationMessage::Reject {
                                receiver: "reservation".to_string(),
                                reservation,
                            }),
                            tl,
                        )?;
                    }
                } else {
                    let next_hop = self.network_manager.routing.next_hop(&reservation.responder)?.to_string();
                    self.send_message(
                        &next_hop,
                        Message::Reservation(ReservationMessage::Request {
                            receiver: "reservation".to_string(),
                            reservation,
                            qcaps,
                        }),
                        tl,
                    )?;
                }
                Ok(())
            }
            ReservationMessage::Approve { reservation, qcaps, .. } => {
                self.install_path_rules(&reservation, &qcaps, tl)?;
                self.reservation_log.push(ReservationResult::Approved(reservation.clone()));
                if reservation.initiator != self.name {
                    if let Some(idx) = reservation.path.iter().position(|n| n == &self.name) {
                        if idx > 0 {
                            let prev_hop = reservation.path[idx - 1].clone();
                            self.send_message(
                                &prev_hop,
                                Message::Reservation(ReservationMessage::Approve {
                                    receiver: "reservation".to_string(),
                                    reservation,
                                    qcaps,
                                }),
                                tl,
                            )?;
                        }
                    }
                }
                Ok(())
            }
            ReservationMessage::Reject { reservation, .. } => {
                self.reservation_log.push(ReservationResult::Rejected(reservation.clone()));
                if reservation.initiator != self.name {
                    if let Some(idx) = reservation.path.iter().position(|n| n == &self.name) {
                        if idx > 0 {
                            let prev_hop = reservation.path[idx - 1].clone();
                            self.send_message(
                                &prev_hop,
                                Message::Reservation(ReservationMessage::Reject {
                                    receiver: "reservation".to_string(),
                                    reservation,
                                }),
                                tl,
                            )?;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Installs this node's share of the path's rules once a reservation is
    /// admitted: endpoints get generation rules, interior hops get swapping
    /// rules in binary-subdivision order. Re-evaluates every memory right
    /// after loading so a rule that already matches an idle memory fires
    /// immediately instead of waiting for some later trigger.
    fn install_path_rules(
        &mut self,
        reservation: &Reservation,
        _qcaps: &[crate::network::reservation::QCap],
        tl: &mut Timeline,
    ) -> SimResult<()> {
        let path = reservation.path.clone();
        if path.is_empty() {
            return Ok(());
        }
        let Some(my_index) = path.iter().position(|n| n == &self.name) else {
            return Ok(());
        };
        if my_index == 0 {
            if let Some(peer) = path.get(1) {
                let rule = crate::network::reservation::eg_rule_endpoint(reservation, "qc0", peer);
                self.resource_manager.load_rule(rule);
            }
            self.install_endpoint_purification_rule(reservation, &reservation.responder);
        } else if my_index == path.len() - 1 {
            if let Some(peer) = path.get(my_index - 1) {
                let rule = crate::network::reservation::eg_rule_responder(reservation, peer);
                self.resource_manager.load_rule(rule);
            }
            self.install_endpoint_purification_rule(reservation, &reservation.initiator);
        } else {
            let left = path[my_index - 1].clone();
            let right = path[my_index + 1].clone();
            let rule = crate::network::reservation::es_rule_interior(
                reservation,
                0,
                1,
                &left,
                &right,
                self.swapping_params.success_probability,
                self.swapping_params.degradation,
            );
            self.resource_manager.load_rule(rule);
        }
        self.reevaluate_all(tl)
    }

    /// Installs this endpoint's purification rule towards the *far* end of
    /// the reservation (not the immediate neighbor on the path, since after
    /// any interior swapping the remote address converges to the far
    /// endpoint anyway). Role is decided lexicographically, the same
    /// primary/non-primary split generation uses, so both endpoints agree
    /// independently on who nominates the kept pair without negotiating it.
    fn install_endpoint_purification_rule(&mut self, reservation: &Reservation, far_end: &str) {
        if far_end == self.name.as_str() {
            return;
        }
        let rule = if self.name.as_str() > far_end {
            crate::network::reservation::ep_rule_paired(reservation, far_end)
        } else {
            crate::network::reservation::ep_rule_responder(reservation, far_end)
        };
        self.resource_manager.load_rule(rule);
    }
}

impl Entity for Node {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_node_has_no_pending_reservations() {
        let node = Node::new("n1", NodeKind::Router).with_memories(4, 0.9, 1_000_000);
        assert_eq!(node.resource_manager.memory_count(), 4);
        assert!(node.reservation_log().is_empty());
    }

    #[test]
    fn install_continuous_generation_adds_a_rule() {
        let mut node = Node::new("n1", NodeKind::Router).with_memories(2, 0.9, 1_000_000);
        node.install_continuous_generation("qc0", "n2");
        assert_eq!(node.resource_manager.update(0).is_some(), true);
    }

    #[test]
    fn with_rng_overrides_default_seed() {
        let rng = ChaCha8Rng::from_seed([5u8; 32]);
        let node = Node::new("n1", NodeKind::Router).with_rng(rng);
        assert_eq!(node.kind(), NodeKind::Router);
    }
}
