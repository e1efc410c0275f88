//! Per-module arrival ordering
//!
//! Every module-scoped event takes the next slot in its module's queue when it
//! arrives. Most events are ready immediately; compressed stream chunks hold a
//! pending slot until inflation completes. Slots are released strictly in
//! arrival order, so a slow chunk is never overtaken by a later event for the
//! same module.
//!
//! [`Sequencer::clear`] drops every queue and bumps the generation; tickets
//! issued before the clear are ignored when they complete.

use std::collections::{BTreeMap, HashMap};

use super::reducer::ModuleUpdate;

/// Claim on a pending slot, returned to the sequencer with the payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub module: String,
    pub seq: u64,
    pub generation: u64,
}

#[derive(Debug)]
enum Slot {
    Pending,
    Ready(ModuleUpdate),
}

#[derive(Debug, Default)]
struct ModuleQueue {
    next_seq: u64,
    next_apply: u64,
    slots: BTreeMap<u64, Slot>,
}

impl ModuleQueue {
    fn push(&mut self, slot: Slot) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(seq, slot);
        seq
    }

    /// Pop the contiguous run of ready slots at the head of the queue.
    fn drain_ready(&mut self) -> Vec<ModuleUpdate> {
        let mut ready = Vec::new();
        while let Some(entry) = self.slots.first_entry() {
            if *entry.key() != self.next_apply || matches!(entry.get(), Slot::Pending) {
                break;
            }
            if let Slot::Ready(update) = entry.remove() {
                ready.push(update);
            }
            self.next_apply += 1;
        }
        ready
    }
}

/// Orders module updates by arrival, per module
#[derive(Debug, Default)]
pub struct Sequencer {
    generation: u64,
    queues: HashMap<String, ModuleQueue>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an update that is ready now. Returns the updates (in order) that
    /// can be applied for `module`, which may be empty if an earlier slot is
    /// still pending.
    pub fn push_ready(&mut self, module: &str, update: ModuleUpdate) -> Vec<ModuleUpdate> {
        let queue = self.queues.entry(module.to_string()).or_default();
        queue.push(Slot::Ready(update));
        queue.drain_ready()
    }

    /// Reserve a slot whose payload arrives later.
    pub fn reserve(&mut self, module: &str) -> Ticket {
        let queue = self.queues.entry(module.to_string()).or_default();
        let seq = queue.push(Slot::Pending);
        Ticket {
            module: module.to_string(),
            seq,
            generation: self.generation,
        }
    }

    /// Fill a reserved slot. Returns the updates that can now be applied.
    /// Tickets from an earlier generation are discarded.
    pub fn fulfill(&mut self, ticket: &Ticket, update: ModuleUpdate) -> Vec<ModuleUpdate> {
        if ticket.generation != self.generation {
            tracing::debug!(
                module = %ticket.module,
                seq = ticket.seq,
                "Discarding chunk from a previous run"
            );
            return Vec::new();
        }
        let Some(queue) = self.queues.get_mut(&ticket.module) else {
            return Vec::new();
        };
        match queue.slots.get_mut(&ticket.seq) {
            Some(slot) if matches!(slot, Slot::Pending) => *slot = Slot::Ready(update),
            _ => {
                tracing::warn!(module = %ticket.module, seq = ticket.seq, "Unknown or filled slot");
                return Vec::new();
            }
        }
        queue.drain_ready()
    }

    /// Drop all queued slots and invalidate outstanding tickets.
    pub fn clear(&mut self) {
        self.generation += 1;
        self.queues.clear();
    }

    /// Number of slots still waiting for a payload
    pub fn pending(&self) -> usize {
        self.queues
            .values()
            .flat_map(|q| q.slots.values())
            .filter(|s| matches!(s, Slot::Pending))
            .count()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
