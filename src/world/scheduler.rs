//! Time-ordered queue of deferred simulation events
//!
//! Replaces ad hoc per-entity timers with one heap drained once per tick.
//! Fired actions carry ids only; the handler re-checks target liveness at
//! fire time, so a removed entity makes the action a no-op. Entries owned
//! by a removed entity are cancelled eagerly to keep the heap bounded.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::world::state::{CombatantId, EffectId, MinionId, OrbId};

/// A deferred action keyed by fire time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledAction {
    /// Bring a dead combatant back (player reset or bot anchor respawn)
    RespawnCombatant(CombatantId),
    /// Remove a minion whose lifetime elapsed
    ExpireMinion(MinionId),
    /// Remove an uncollected orb
    ExpireOrb(OrbId),
    /// Remove a transient area effect
    ExpireAreaEffect(EffectId),
}

impl ScheduledAction {
    fn owns_combatant(&self, id: CombatantId) -> bool {
        matches!(self, ScheduledAction::RespawnCombatant(owner) if *owner == id)
    }

    fn owns_minion(&self, id: MinionId) -> bool {
        matches!(self, ScheduledAction::ExpireMinion(owner) if *owner == id)
    }
}

#[derive(Debug)]
struct Entry {
    fire_at: f64,
    /// Insertion order; ties on fire_at keep FIFO order
    seq: u64,
    action: ScheduledAction,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .total_cmp(&other.fire_at)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Min-heap of scheduled actions
pub struct Scheduler {
    heap: BinaryHeap<Reverse<Entry>>,
    seq: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub fn schedule(&mut self, fire_at: f64, action: ScheduledAction) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Reverse(Entry { fire_at, seq, action }));
    }

    /// Pop every action due at or before `now`, in fire order
    pub fn drain_due(&mut self, now: f64) -> Vec<ScheduledAction> {
        let mut due = Vec::new();
        while self
            .heap
            .peek()
            .is_some_and(|Reverse(entry)| entry.fire_at <= now)
        {
            if let Some(Reverse(entry)) = self.heap.pop() {
                due.push(entry.action);
            }
        }
        due
    }

    /// Drop all entries owned by a removed combatant
    pub fn cancel_combatant(&mut self, id: CombatantId) {
        self.retain(|action| !action.owns_combatant(id));
    }

    /// Drop all entries owned by a removed minion
    pub fn cancel_minion(&mut self, id: MinionId) {
        self.retain(|action| !action.owns_minion(id));
    }

    fn retain(&mut self, keep: impl Fn(&ScheduledAction) -> bool) {
        let entries: Vec<_> = std::mem::take(&mut self.heap).into_vec();
        self.heap = entries
            .into_iter()
            .filter(|Reverse(entry)| keep(&entry.action))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
