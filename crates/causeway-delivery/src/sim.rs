//! In-process cluster simulator for causal delivery.
//!
//! Every peer is a bare [`DeliveryEngine`]; the network is a pool of
//! in-flight copies that can be delivered in arbitrary order (including out
//! of order within one sender's stream) or lost outright.

use crate::engine::DeliveryEngine;
use crate::error::CausalViolation;
use causeway_clock::{Message, VectorClock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Verify that no message in `log` was delivered after a message it
/// causally precedes.
pub fn check_causal_order(log: &[Message]) -> Result<(), CausalViolation> {
    for (effect_pos, effect) in log.iter().enumerate() {
        for (offset, cause) in log[effect_pos + 1..].iter().enumerate() {
            if cause.happened_before(effect) {
                return Err(CausalViolation {
                    cause: cause.id().to_string(),
                    cause_pos: effect_pos + 1 + offset,
                    effect: effect.id().to_string(),
                    effect_pos,
                });
            }
        }
    }
    Ok(())
}

/// One copy of a message on its way to one peer.
#[derive(Clone, Debug)]
pub struct InFlight {
    pub to: usize,
    pub msg: Message,
}

/// Lossy, reordering network.
#[derive(Debug)]
pub struct SimNetwork {
    in_flight: Vec<InFlight>,
    lost: Vec<InFlight>,
    loss_rate: f64,
    rng: StdRng,
}

impl SimNetwork {
    pub fn new(seed: u64, loss_rate: f64) -> Self {
        Self {
            in_flight: Vec::new(),
            lost: Vec::new(),
            loss_rate,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Put a copy on the wire; it may be lost.
    pub fn send(&mut self, item: InFlight) {
        if self.loss_rate > 0.0 && self.rng.gen_bool(self.loss_rate.min(1.0)) {
            self.lost.push(item);
        } else {
            self.in_flight.push(item);
        }
    }

    /// Take any in-flight copy, chosen at random.
    pub fn take_random(&mut self) -> Option<InFlight> {
        if self.in_flight.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.in_flight.len());
        Some(self.in_flight.swap_remove(index))
    }

    /// Lose one in-flight copy, chosen at random.
    pub fn drop_random(&mut self) -> bool {
        match self.take_random() {
            Some(item) => {
                self.lost.push(item);
                true
            }
            None => false,
        }
    }

    /// Take the oldest in-flight copy (FIFO network).
    pub fn take_oldest(&mut self) -> Option<InFlight> {
        if self.in_flight.is_empty() {
            None
        } else {
            Some(self.in_flight.remove(0))
        }
    }

    /// Put every lost copy back on the wire.
    pub fn retransmit_lost(&mut self) {
        self.in_flight.append(&mut self.lost);
    }

    /// Forget every lost copy for good.
    pub fn discard_lost(&mut self) -> usize {
        let n = self.lost.len();
        self.lost.clear();
        n
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn lost_count(&self) -> usize {
        self.lost.len()
    }
}

/// A fixed group of peers exchanging messages over a [`SimNetwork`].
#[derive(Debug)]
pub struct SimCluster {
    engines: Vec<DeliveryEngine>,
    network: SimNetwork,
    max_pending: usize,
    submitted: usize,
}

impl SimCluster {
    /// Create `n` peers over a lossless, reordering network.
    pub fn new(n: usize, seed: u64) -> Self {
        Self::with_loss(n, seed, 0.0)
    }

    pub fn with_loss(n: usize, seed: u64, loss_rate: f64) -> Self {
        let engines = (0..n)
            .filter_map(|i| VectorClock::new(n, i).ok())
            .map(DeliveryEngine::new)
            .collect();
        Self {
            engines,
            network: SimNetwork::new(seed, loss_rate),
            max_pending: 0,
            submitted: 0,
        }
    }

    pub fn origin(index: usize) -> String {
        format!("sim-{}", index)
    }

    pub fn engine(&self, index: usize) -> &DeliveryEngine {
        &self.engines[index]
    }

    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut SimNetwork {
        &mut self.network
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Stamp a message at `from` and multicast it to every other peer.
    pub fn send(&mut self, from: usize, payload: impl Into<String>) -> Message {
        let msg = self.engines[from].stamp(payload, Self::origin(from));
        for to in (0..self.engines.len()).filter(|&to| to != from) {
            self.network.send(InFlight {
                to,
                msg: msg.clone(),
            });
        }
        msg
    }

    fn submit(&mut self, item: InFlight) -> usize {
        let engine = &mut self.engines[item.to];
        // Messages are stamped by cluster peers, so they always fit.
        let delivered = engine.submit(item.msg).unwrap_or(0);
        self.submitted += 1;
        self.max_pending = self.max_pending.max(engine.pending_count());
        delivered
    }

    /// Hand one random in-flight copy to its peer. Returns false when idle.
    pub fn deliver_random(&mut self) -> bool {
        match self.network.take_random() {
            Some(item) => {
                self.submit(item);
                true
            }
            None => false,
        }
    }

    /// Hand the oldest in-flight copy to its peer. Returns false when idle.
    pub fn deliver_oldest(&mut self) -> bool {
        match self.network.take_oldest() {
            Some(item) => {
                self.submit(item);
                true
            }
            None => false,
        }
    }

    /// Lose one random in-flight copy. Returns false when idle.
    pub fn drop_random(&mut self) -> bool {
        self.network.drop_random()
    }

    /// Deliver every in-flight copy in random order.
    pub fn drain(&mut self) {
        while self.deliver_random() {}
    }

    pub fn retransmit_and_drain(&mut self) {
        self.network.retransmit_lost();
        self.drain();
    }

    /// Nothing held anywhere and nothing on the wire.
    pub fn is_quiescent(&self) -> bool {
        self.network.is_empty() && self.total_pending() == 0
    }

    /// All peers have seen the same set of messages.
    pub fn is_converged(&self) -> bool {
        match self.engines.split_first() {
            Some((first, rest)) => rest
                .iter()
                .all(|e| e.clock().values() == first.clock().values()),
            None => true,
        }
    }

    pub fn total_pending(&self) -> usize {
        self.engines.iter().map(|e| e.pending_count()).sum()
    }

    pub fn total_delivered(&self) -> usize {
        self.engines.iter().map(|e| e.delivered_count()).sum()
    }

    /// Copies handed to an engine so far, duplicates included.
    pub fn total_submitted(&self) -> usize {
        self.submitted
    }

    /// Deepest pending buffer observed on any peer.
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Check the delivered log of every peer.
    pub fn check_causal_order(&self) -> Result<(), CausalViolation> {
        self.engines
            .iter()
            .try_for_each(|e| check_causal_order(e.delivered().as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_convergence() {
        let mut cluster = SimCluster::new(3, 7);
        for i in 0..3 {
            cluster.send(i, format!("hello from {}", i));
        }

        assert!(!cluster.is_converged());
        cluster.drain();

        assert!(cluster.is_quiescent());
        assert!(cluster.is_converged());
        assert_eq!(cluster.total_delivered(), 6);
        assert_eq!(cluster.total_submitted(), 6);
        assert!(cluster.check_causal_order().is_ok());
    }

    #[test]
    fn test_cluster_with_loss_recovers_after_retransmit() {
        let mut cluster = SimCluster::with_loss(3, 11, 0.3);
        for round in 0..5 {
            for i in 0..3 {
                cluster.send(i, format!("{}:{}", i, round));
            }
        }

        cluster.drain();
        for _ in 0..20 {
            if cluster.is_quiescent() {
                break;
            }
            cluster.retransmit_and_drain();
        }

        assert!(cluster.is_quiescent());
        assert!(cluster.is_converged());
        assert!(cluster.check_causal_order().is_ok());
    }

    #[test]
    fn test_dropped_copy_stalls_only_its_successors() {
        let mut cluster = SimCluster::new(2, 5);
        cluster.send(0, "first");
        assert!(cluster.drop_random());
        cluster.send(0, "second");
        cluster.drain();

        assert_eq!(cluster.network().lost_count(), 1);
        assert_eq!(cluster.engine(1).delivered_count(), 0);
        assert_eq!(cluster.engine(1).pending_count(), 1);
        assert_eq!(cluster.total_submitted(), 1);

        cluster.retransmit_and_drain();
        assert!(cluster.is_quiescent());
        assert_eq!(cluster.total_submitted(), 2);
        let log: Vec<_> = cluster.engine(1).delivered().iter().map(|m| m.payload()).collect();
        assert_eq!(log, vec!["first", "second"]);
    }

    #[test]
    fn test_check_causal_order_flags_inversion() {
        let mut a = VectorClock::new(2, 0).unwrap();
        let first = Message::new("first", "a", a.increment());
        let second = Message::new("second", "a", a.increment());

        assert!(check_causal_order(&[first.clone(), second.clone()]).is_ok());
        let err = check_causal_order(&[second, first]).unwrap_err();
        assert_eq!(err.cause_pos, 1);
        assert_eq!(err.effect_pos, 0);
    }
}
