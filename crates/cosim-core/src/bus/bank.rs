use std::collections::VecDeque;

use super::DOpcode;

/// One response beat waiting to be driven onto the D channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BankSlot {
    /// Beat data.
    pub data: u64,
    /// Response opcode.
    pub opcode: DOpcode,
    /// Response parameter.
    pub param: u8,
    /// Encoded transfer size.
    pub size: u8,
    /// Requester tag.
    pub source: u16,
    /// Not yet handed to the hardware.
    pub remaining: bool,
}

/// Fixed-size beat array for one response class.
///
/// A transfer filled while another is still draining waits in the backlog
/// and is loaded once the current one has been fully consumed.
#[derive(Debug, Clone)]
pub struct Bank {
    slots: Vec<BankSlot>,
    backlog: VecDeque<Vec<BankSlot>>,
}

impl Bank {
    /// Creates a bank of `width` empty slots.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self {
            slots: vec![BankSlot::default(); width],
            backlog: VecDeque::new(),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn width(&self) -> usize {
        self.slots.len()
    }

    /// Queues a transfer of at most `width` beats.
    pub fn fill(&mut self, beats: Vec<BankSlot>) {
        if self.has_remaining() {
            self.backlog.push_back(beats);
        } else {
            self.load(beats);
        }
    }

    fn load(&mut self, beats: Vec<BankSlot>) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            *slot = beats.get(index).map_or_else(BankSlot::default, |beat| BankSlot {
                remaining: true,
                ..*beat
            });
        }
    }

    /// Whether the current transfer still has beats to send.
    #[must_use]
    pub fn has_remaining(&self) -> bool {
        self.slots.iter().any(|slot| slot.remaining)
    }

    /// Number of unsent beats in the current transfer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.slots.iter().filter(|slot| slot.remaining).count()
    }

    /// Transfers waiting behind the current one.
    #[must_use]
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Next beat to send, without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<&BankSlot> {
        self.slots.iter().find(|slot| slot.remaining)
    }

    /// Consumes the next beat; returns it and whether that finished the
    /// current transfer.
    pub fn consume(&mut self) -> Option<(BankSlot, bool)> {
        let slot = self.slots.iter_mut().find(|slot| slot.remaining)?;
        slot.remaining = false;
        let beat = *slot;
        let finished = !self.has_remaining();
        if finished {
            if let Some(next) = self.backlog.pop_front() {
                self.load(next);
            }
        }
        Some((beat, finished))
    }
}
