//! Bounded lookahead queue of reference events in program order.

use std::collections::VecDeque;

use log::info;

use crate::{AccessKind, CosimStats, Divergence, EventSource, ReferenceEvent, ReferenceModel};

/// Reference events not yet retired by hardware, oldest at the front.
///
/// Events leave only from the front and only once committed, so committed
/// but unpopped events always form a contiguous prefix.
#[derive(Debug, Clone)]
pub struct LookaheadQueue {
    events: VecDeque<ReferenceEvent>,
    capacity: usize,
    refill_threshold: usize,
}

impl LookaheadQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(capacity: usize, refill_threshold: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            refill_threshold,
        }
    }

    /// Maximum number of queued events.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns `true` when the queue holds `capacity` events.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    /// Appends an event as the newest entry.
    ///
    /// # Errors
    ///
    /// Returns the rejected event when the queue already holds `capacity`
    /// events.
    #[allow(clippy::result_large_err)]
    pub fn push(&mut self, event: ReferenceEvent) -> Result<(), ReferenceEvent> {
        if self.is_full() {
            return Err(event);
        }
        self.events.push_back(event);
        Ok(())
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &ReferenceEvent> {
        self.events.iter()
    }

    /// Oldest event.
    #[must_use]
    pub fn front(&self) -> Option<&ReferenceEvent> {
        self.events.front()
    }

    /// Tops the queue up to capacity once it drains below the threshold.
    ///
    /// Returns the number of events added.
    ///
    /// # Errors
    ///
    /// Returns [`Divergence::ReferenceTrap`] when the model raises an
    /// unrecoverable trap.
    pub fn refill<M: ReferenceModel>(
        &mut self,
        source: &mut EventSource<M>,
        stats: &mut CosimStats,
    ) -> Result<usize, Divergence> {
        if self.events.len() >= self.refill_threshold {
            return Ok(0);
        }

        info!("refilling reference queue");
        let mut added = 0;
        while !self.is_full() {
            match source.step()? {
                Some(event) => {
                    self.events.push_back(event);
                    added += 1;
                    stats.record_event();
                }
                None => stats.record_fetch_trap(),
            }
        }
        for event in &self.events {
            info!("List: reference {event}");
        }
        Ok(added)
    }

    /// Oldest uncommitted event with matching pc and destination register.
    pub fn find_uncommitted_write(&mut self, pc: u64, rd: u8) -> Option<&mut ReferenceEvent> {
        self.events
            .iter_mut()
            .find(|event| !event.is_committed && event.pc == pc && event.rd == rd)
    }

    /// Oldest uncommitted event at `pc`.
    pub fn find_by_pc(&mut self, pc: u64) -> Option<&mut ReferenceEvent> {
        self.events
            .iter_mut()
            .find(|event| !event.is_committed && event.pc == pc)
    }

    /// Oldest event whose line snapshot starts at `addr`.
    pub fn find_by_line(&mut self, addr: u64) -> Option<&mut ReferenceEvent> {
        self.events
            .iter_mut()
            .find(|event| event.line.as_ref().is_some_and(|line| line.base == addr))
    }

    /// Oldest event recording a single-word access at `addr`.
    ///
    /// Events whose access is not yet executed are preferred, so a repeated
    /// address is attributed to the instruction still waiting for it.
    pub fn find_access_owner(&mut self, addr: u64, kind: AccessKind) -> Option<&mut ReferenceEvent> {
        let records = |event: &ReferenceEvent| match kind {
            AccessKind::Read => event.access.reads.get(&addr).copied(),
            AccessKind::Write => event.access.writes.get(&addr).copied(),
            AccessKind::Acquire => None,
        };
        let index = self
            .events
            .iter()
            .position(|event| records(event).is_some_and(|entry| !entry.executed))
            .or_else(|| self.events.iter().position(|event| records(event).is_some()))?;
        self.events.get_mut(index)
    }

    /// Commits every uncommitted trap-flagged event; returns how many.
    pub fn commit_traps(&mut self) -> usize {
        let mut committed = 0;
        for event in self
            .events
            .iter_mut()
            .filter(|event| event.is_trap && !event.is_committed)
        {
            event.is_committed = true;
            committed += 1;
        }
        committed
    }

    /// Removes committed events from the front until an uncommitted one is
    /// reached; returns them in removal order.
    pub fn pop_committed(&mut self) -> Vec<ReferenceEvent> {
        let mut popped = Vec::new();
        while self.events.front().is_some_and(|event| event.is_committed) {
            if let Some(event) = self.events.pop_front() {
                info!("pop reference pc = {:08X}", event.pc);
                popped.push(event);
            }
        }
        popped
    }

    /// Logs every queued event; used before reporting a failed lookup.
    pub fn dump(&self) {
        for event in &self.events {
            info!("List: reference {event}");
        }
    }
}
