//! Vector clock for causal delivery.
//!
//! Every process owns exactly one mutable [`VectorClock`] with one slot per
//! member of the (static) peer set. The slot at `self_index` is advanced on
//! every local send; the other slots only move when a received message is
//! delivered and its timestamp is merged in.
//!
//! # Delivery condition
//!
//! A message from sender `s` stamped with `ts` is deliverable at a process
//! whose clock is `c` iff:
//!
//! ```text
//! ts[s] = c[s] + 1                 // next message expected from s
//! ∀k ≠ s: ts[k] ≤ c[k]             // s had seen nothing we haven't
//! ```
//!
//! A message that fails the condition is held, never rejected: the local
//! clock only grows, so it may pass later.

use crate::error::ClockError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single slot value.
pub type Tick = u64;

/// Why a timestamp is or is not deliverable against a clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// Both halves of the delivery condition hold.
    Ready,
    /// The sender slot has already been seen (`got <= have`).
    Duplicate { expected: Tick, got: Tick },
    /// At least one earlier message from the same sender is missing.
    Gap { expected: Tick, got: Tick },
    /// The sender had delivered something from `slot` that we have not.
    MissingDependency { slot: usize, needed: Tick, have: Tick },
    /// The timestamp does not fit this clock at all.
    Incompatible,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Ready => write!(f, "ready"),
            Readiness::Duplicate { expected, got } => {
                write!(f, "already seen (expected {}, got {})", expected, got)
            }
            Readiness::Gap { expected, got } => {
                write!(f, "waiting for earlier messages (expected {}, got {})", expected, got)
            }
            Readiness::MissingDependency { slot, needed, have } => {
                write!(f, "waiting on slot {} ({} < {})", slot, have, needed)
            }
            Readiness::Incompatible => write!(f, "incompatible timestamp"),
        }
    }
}

/// A fixed-size vector clock.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorClock {
    values: Vec<Tick>,
    self_index: usize,
}

impl VectorClock {
    /// Create an all-zero clock with `size` slots owned by `self_index`.
    pub fn new(size: usize, self_index: usize) -> Result<Self, ClockError> {
        if size == 0 {
            return Err(ClockError::Empty);
        }
        if self_index >= size {
            return Err(ClockError::SelfIndexOutOfRange {
                index: self_index,
                size,
            });
        }
        Ok(VectorClock {
            values: vec![0; size],
            self_index,
        })
    }

    /// Build a clock from explicit slot values.
    pub fn from_values(values: Vec<Tick>, self_index: usize) -> Result<Self, ClockError> {
        let mut clock = Self::new(values.len(), self_index)?;
        clock.values = values;
        Ok(clock)
    }

    /// Advance our own slot and return a snapshot for an outgoing message.
    pub fn increment(&mut self) -> VectorClock {
        self.values[self.self_index] += 1;
        self.clone()
    }

    /// Component-wise max with `other`.
    ///
    /// Merging a dominated clock leaves `self` unchanged.
    pub fn merge(&mut self, other: &VectorClock) -> Result<(), ClockError> {
        if other.len() != self.len() {
            return Err(ClockError::SizeMismatch {
                expected: self.len(),
                found: other.len(),
            });
        }
        for (mine, theirs) in self.values.iter_mut().zip(&other.values) {
            *mine = (*mine).max(*theirs);
        }
        Ok(())
    }

    /// Evaluate the delivery condition for `ts` sent by `sender`, keeping
    /// the reason when it fails.
    pub fn readiness(&self, ts: &VectorClock, sender: usize) -> Readiness {
        if ts.len() != self.len() || sender >= self.len() {
            return Readiness::Incompatible;
        }

        let have = self.values[sender];
        let got = ts.values[sender];
        let expected = have + 1;
        if got <= have {
            return Readiness::Duplicate { expected, got };
        }
        if got > expected {
            return Readiness::Gap { expected, got };
        }

        for (slot, (&needed, &have)) in ts.values.iter().zip(&self.values).enumerate() {
            if slot != sender && needed > have {
                return Readiness::MissingDependency { slot, needed, have };
            }
        }
        Readiness::Ready
    }

    /// The causal delivery condition.
    pub fn can_deliver(&self, ts: &VectorClock, sender: usize) -> bool {
        self.readiness(ts, sender).is_ready()
    }

    /// True if every slot of `self` is `>=` the matching slot of `other`.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        self.len() == other.len() && self.values.iter().zip(&other.values).all(|(a, b)| a >= b)
    }

    /// Strict causal precedence: `self` happened before `other`.
    pub fn happened_before(&self, other: &VectorClock) -> bool {
        other.dominates(self) && self.values != other.values
    }

    /// Neither clock dominates the other.
    pub fn is_concurrent_with(&self, other: &VectorClock) -> bool {
        !self.dominates(other) && !other.dominates(self)
    }

    pub fn get(&self, slot: usize) -> Option<Tick> {
        self.values.get(slot).copied()
    }

    pub fn values(&self) -> &[Tick] {
        &self.values
    }

    pub fn self_index(&self) -> usize {
        self.self_index
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of all slots (total messages this clock has accounted for).
    pub fn total(&self) -> Tick {
        self.values.iter().sum()
    }
}

impl PartialOrd for VectorClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.len() != other.len() {
            return None;
        }
        match (self.dominates(other), other.dominates(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => None,
        }
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ">")
    }
}
