use log::{debug, info, trace};

use super::{
    decode_size, AOpcode, Bank, BankSlot, BusObservation, BusResponse, COpcode, ChannelA,
    ChannelC, DOpcode,
};
use crate::{AccessKind, Channel, CosimConfig, CosimStats, Divergence, LookaheadQueue, MemoryView};

/// Response class a bank serves, in fixed priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseClass {
    /// Instruction-cache line refills.
    Fetch,
    /// Grants for acquires and acknowledgements for releases.
    Acquire,
    /// Single-word `Get`/`Put` answers.
    Access,
}

impl ResponseClass {
    /// Classes from highest to lowest priority.
    pub const PRIORITY: [Self; 3] = [Self::Fetch, Self::Acquire, Self::Access];
}

/// Answers bus requests from the reference record and drives the D channel.
///
/// Requests are accepted every cycle they are valid. A class that starts
/// draining keeps the D channel until its transfer is finished, so beats of
/// different transfers never interleave.
#[derive(Debug, Clone)]
pub struct BusResponder {
    fetch: Bank,
    acquire: Bank,
    access: Bank,
    draining: Option<ResponseClass>,
    grant_hold: u32,
    grant_delay: u32,
    beat_bytes: u32,
    line_size_log2: u8,
    addr_mask: u64,
}

impl BusResponder {
    /// Creates a responder with banks sized for one cache line.
    #[must_use]
    pub fn new(config: &CosimConfig) -> Self {
        let beats = config.beats_per_line();
        Self {
            fetch: Bank::new(beats),
            acquire: Bank::new(beats),
            access: Bank::new(1),
            draining: None,
            grant_hold: 0,
            grant_delay: config.grant_delay_cycles,
            beat_bytes: config.xlen_bytes(),
            line_size_log2: config.line_size_log2(),
            addr_mask: config.xlen_mask(),
        }
    }

    /// Class currently holding the D channel.
    #[must_use]
    pub const fn draining(&self) -> Option<ResponseClass> {
        self.draining
    }

    /// Returns `true` when no class has beats left to send.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        ResponseClass::PRIORITY
            .iter()
            .all(|class| !self.bank(*class).has_remaining())
    }

    /// Bank serving `class`.
    #[must_use]
    pub const fn bank(&self, class: ResponseClass) -> &Bank {
        match class {
            ResponseClass::Fetch => &self.fetch,
            ResponseClass::Acquire => &self.acquire,
            ResponseClass::Access => &self.access,
        }
    }

    fn bank_mut(&mut self, class: ResponseClass) -> &mut Bank {
        match class {
            ResponseClass::Fetch => &mut self.fetch,
            ResponseClass::Acquire => &mut self.acquire,
            ResponseClass::Access => &mut self.access,
        }
    }

    /// Checks the requests presented this cycle and queues their responses.
    ///
    /// `memory` backs instruction-cache refills, which bypass the access
    /// record.
    ///
    /// # Errors
    ///
    /// Returns a [`Divergence`] when a request has an unknown opcode, or its
    /// address, size or data disagrees with the queued reference events.
    pub fn observe<V: MemoryView + ?Sized>(
        &mut self,
        obs: &BusObservation,
        queue: &mut LookaheadQueue,
        memory: &V,
        stats: &mut CosimStats,
    ) -> Result<(), Divergence> {
        if obs.c.valid {
            self.observe_release(&obs.c, stats)?;
        }
        if !obs.a.valid {
            return Ok(());
        }
        if obs.miss {
            return self.observe_fetch(&obs.a, memory, stats);
        }

        match AOpcode::from_u8(obs.a.opcode) {
            Some(AOpcode::Get) => self.observe_get(&obs.a, obs.pc, queue, stats),
            Some(AOpcode::PutFullData) => self.observe_put(&obs.a, obs.pc, queue, stats),
            Some(AOpcode::AcquireBlock) => self.observe_acquire(&obs.a, obs.pc, queue, stats),
            _ => Err(Divergence::UnknownOpcode {
                channel: Channel::A,
                opcode: obs.a.opcode,
                miss: false,
            }),
        }
    }

    fn observe_fetch<V: MemoryView + ?Sized>(
        &mut self,
        a: &ChannelA,
        memory: &V,
        stats: &mut CosimStats,
    ) -> Result<(), Divergence> {
        if AOpcode::from_u8(a.opcode) != Some(AOpcode::Get) {
            return Err(Divergence::UnknownOpcode {
                channel: Channel::A,
                opcode: a.opcode,
                miss: true,
            });
        }

        let base = a.address & self.addr_mask;
        info!("[fetch] addr={base:08X} source={}", a.source);
        let beat_bytes = self.beat_bytes;
        let mask = self.addr_mask;
        let beats = (0..self.fetch.width())
            .map(|index| {
                let offset = u64::from(beat_bytes) * index as u64;
                BankSlot {
                    data: memory.read_le(base.wrapping_add(offset) & mask, beat_bytes),
                    opcode: DOpcode::AccessAckData,
                    param: 0,
                    size: self.line_size_log2,
                    source: a.source,
                    remaining: true,
                }
            })
            .collect();
        self.fetch.fill(beats);
        stats.record_fetch_refill();
        Ok(())
    }

    fn observe_get(
        &mut self,
        a: &ChannelA,
        pc: u64,
        queue: &mut LookaheadQueue,
        stats: &mut CosimStats,
    ) -> Result<(), Divergence> {
        let size = self.request_size(a, pc)?;
        info!("[Get] addr={:08X} size={size} pc={pc:08X}", a.address);
        let Some(owner) = queue.find_access_owner(a.address, AccessKind::Read) else {
            queue.dump();
            return Err(Divergence::UnmatchedMemoryAccess {
                kind: AccessKind::Read,
                addr: a.address,
                pc,
            });
        };
        let owner_pc = owner.pc;
        let Some(entry) = owner.access.reads.get_mut(&a.address) else {
            return Err(Divergence::UnmatchedMemoryAccess {
                kind: AccessKind::Read,
                addr: a.address,
                pc,
            });
        };
        if entry.size_bytes != size {
            return Err(Divergence::SizeMismatch {
                kind: AccessKind::Read,
                addr: a.address,
                pc: owner_pc,
                expected: entry.size_bytes,
                actual: size,
            });
        }
        entry.executed = true;
        let data = (entry.value & size_mask(size)) << self.lane_shift(a.address);
        debug!("[Get] answered {data:016X} for event pc={owner_pc:08X}");

        self.access.fill(vec![BankSlot {
            data,
            opcode: DOpcode::AccessAckData,
            param: 0,
            size: a.size,
            source: a.source,
            remaining: true,
        }]);
        stats.record_get();
        Ok(())
    }

    fn observe_put(
        &mut self,
        a: &ChannelA,
        pc: u64,
        queue: &mut LookaheadQueue,
        stats: &mut CosimStats,
    ) -> Result<(), Divergence> {
        let size = self.request_size(a, pc)?;
        info!("[PutFullData] addr={:08X} size={size} data={:016X} pc={pc:08X}", a.address, a.data);
        let shift = self.lane_shift(a.address);
        let Some(owner) = queue.find_access_owner(a.address, AccessKind::Write) else {
            queue.dump();
            return Err(Divergence::UnmatchedMemoryAccess {
                kind: AccessKind::Write,
                addr: a.address,
                pc,
            });
        };
        let owner_pc = owner.pc;
        let Some(entry) = owner.access.writes.get_mut(&a.address) else {
            return Err(Divergence::UnmatchedMemoryAccess {
                kind: AccessKind::Write,
                addr: a.address,
                pc,
            });
        };
        if entry.size_bytes != size {
            return Err(Divergence::SizeMismatch {
                kind: AccessKind::Write,
                addr: a.address,
                pc: owner_pc,
                expected: entry.size_bytes,
                actual: size,
            });
        }
        let expected = entry.value & size_mask(size);
        let actual = (a.data >> shift) & size_mask(size);
        if expected != actual {
            return Err(Divergence::DataMismatch {
                addr: a.address,
                pc: owner_pc,
                expected,
                actual,
            });
        }
        entry.executed = true;

        self.access.fill(vec![BankSlot {
            data: 0,
            opcode: DOpcode::AccessAck,
            param: 0,
            size: a.size,
            source: a.source,
            remaining: true,
        }]);
        stats.record_put();
        Ok(())
    }

    fn observe_acquire(
        &mut self,
        a: &ChannelA,
        pc: u64,
        queue: &mut LookaheadQueue,
        stats: &mut CosimStats,
    ) -> Result<(), Divergence> {
        info!("[AcquireBlock] addr={:08X} param={} pc={pc:08X}", a.address, a.param);
        let Some(line) = queue
            .find_by_line(a.address)
            .and_then(|event| event.line.clone())
        else {
            queue.dump();
            return Err(Divergence::UnmatchedMemoryAccess {
                kind: AccessKind::Acquire,
                addr: a.address,
                pc,
            });
        };

        let beats = (0..self.acquire.width())
            .map(|index| BankSlot {
                data: line.beats.get(index).copied().unwrap_or(0),
                opcode: DOpcode::GrantData,
                param: 0,
                size: a.size,
                source: a.source,
                remaining: true,
            })
            .collect();
        self.acquire.fill(beats);
        self.grant_hold = self.grant_delay;
        stats.record_acquire();
        Ok(())
    }

    fn observe_release(&mut self, c: &ChannelC, stats: &mut CosimStats) -> Result<(), Divergence> {
        match COpcode::from_u8(c.opcode) {
            Some(COpcode::Release | COpcode::ReleaseData) => {
                info!("[Release] addr={:08X} opcode={} param={}", c.address, c.opcode, c.param);
                self.acquire.fill(vec![BankSlot {
                    data: 0,
                    opcode: DOpcode::ReleaseAck,
                    param: 0,
                    size: c.size,
                    source: c.source,
                    remaining: true,
                }]);
                self.grant_hold = self.grant_delay;
                stats.record_release();
                Ok(())
            }
            _ => Err(Divergence::UnknownOpcode {
                channel: Channel::C,
                opcode: c.opcode,
                miss: false,
            }),
        }
    }

    /// Drives the D channel for this cycle.
    ///
    /// The beat is consumed only when `d_ready` is set; otherwise the same
    /// beat is presented again on the next call.
    pub fn respond(&mut self, d_ready: bool, stats: &mut CosimStats) -> BusResponse {
        let acquire_held = self.grant_hold > 0;
        if acquire_held {
            self.grant_hold -= 1;
        }

        let class = match self.draining {
            Some(class) if self.bank(class).has_remaining() => Some(class),
            _ => ResponseClass::PRIORITY.into_iter().find(|class| {
                self.bank(*class).has_remaining()
                    && !(acquire_held && *class == ResponseClass::Acquire)
            }),
        };
        let Some(class) = class else {
            self.draining = None;
            return BusResponse::idle();
        };
        self.draining = Some(class);

        let Some(slot) = self.bank(class).peek().copied() else {
            self.draining = None;
            return BusResponse::idle();
        };
        if d_ready {
            if let Some((_, finished)) = self.bank_mut(class).consume() {
                stats.record_beat();
                if finished {
                    trace!("{class:?} transfer drained");
                    self.draining = None;
                }
            }
        }

        BusResponse {
            opcode: slot.opcode,
            param: slot.param,
            size: slot.size,
            source: slot.source,
            sink: 0,
            denied: false,
            corrupt: false,
            valid: true,
            data: slot.data,
        }
    }

    /// Decodes a single-word request size, rejecting encodings wider than a
    /// cache line.
    fn request_size(&self, a: &ChannelA, pc: u64) -> Result<u32, Divergence> {
        decode_size(a.size)
            .filter(|_| a.size <= self.line_size_log2)
            .ok_or(Divergence::InvalidSize {
                channel: Channel::A,
                size: a.size,
                addr: a.address,
                pc,
            })
    }

    fn lane_shift(&self, addr: u64) -> u32 {
        let offset = addr & u64::from(self.beat_bytes - 1);
        #[allow(clippy::cast_possible_truncation)]
        let shift = (offset * 8) as u32;
        shift
    }
}

const fn size_mask(size_bytes: u32) -> u64 {
    if size_bytes >= 8 {
        u64::MAX
    } else {
        (1 << (size_bytes * 8)) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::{BusResponder, ResponseClass};
    use crate::{
        AccessKind, BusObservation, CacheLine, Channel, ChannelA, ChannelC, CosimConfig,
        CosimStats, DOpcode, Divergence, LookaheadQueue, MemoryImage, ReferenceEvent, Xlen,
    };

    fn get(address: u64, size: u8) -> BusObservation {
        BusObservation {
            a: ChannelA {
                opcode: 4,
                size,
                address,
                valid: true,
                ..ChannelA::default()
            },
            ..BusObservation::default()
        }
    }

    fn put(address: u64, size: u8, data: u64) -> BusObservation {
        BusObservation {
            a: ChannelA {
                opcode: 0,
                size,
                address,
                data,
                valid: true,
                ..ChannelA::default()
            },
            ..BusObservation::default()
        }
    }

    fn acquire(address: u64) -> BusObservation {
        BusObservation {
            a: ChannelA {
                opcode: 6,
                size: 6,
                address,
                source: 2,
                valid: true,
                ..ChannelA::default()
            },
            ..BusObservation::default()
        }
    }

    fn fetch(address: u64) -> BusObservation {
        BusObservation {
            miss: true,
            ..get(address, 6)
        }
    }

    fn queue_with(events: Vec<ReferenceEvent>) -> LookaheadQueue {
        let mut queue = LookaheadQueue::new(10, 2);
        for event in events {
            queue.push(event).expect("room");
        }
        queue
    }

    fn line(base: u64) -> CacheLine {
        CacheLine {
            base,
            beats: (0..8).map(|beat| 0xA0 + beat).collect(),
        }
    }

    #[test]
    fn get_answers_recorded_value_and_marks_entry_executed() {
        let mut responder = BusResponder::new(&CosimConfig::default());
        let mut queue = queue_with(vec![
            ReferenceEvent::new(0x8000_0000, 0x0005_3503, 10, 0x55).with_read(0x8000_2000, 8, 0x55),
        ]);
        let mut stats = CosimStats::default();

        responder
            .observe(&get(0x8000_2000, 3), &mut queue, &MemoryImage::new(), &mut stats)
            .expect("matching get");
        let response = responder.respond(true, &mut stats);

        assert!(response.valid);
        assert_eq!(response.opcode, DOpcode::AccessAckData);
        assert_eq!(response.data, 0x55);
        assert_eq!(response.size, 3);
        let owner = queue
            .find_access_owner(0x8000_2000, AccessKind::Read)
            .expect("owner");
        assert!(owner.access.reads[&0x8000_2000].executed);
        assert_eq!(stats.gets, 1);
    }

    #[test]
    fn get_with_wrong_size_is_rejected() {
        let mut responder = BusResponder::new(&CosimConfig::default());
        let mut queue = queue_with(vec![
            ReferenceEvent::new(0x8000_0000, 0x0005_2503, 10, 0x55).with_read(0x8000_2000, 4, 0x55),
        ]);

        let error = responder
            .observe(
                &get(0x8000_2000, 3),
                &mut queue,
                &MemoryImage::new(),
                &mut CosimStats::default(),
            )
            .expect_err("size mismatch");
        assert_eq!(
            error,
            Divergence::SizeMismatch {
                kind: AccessKind::Read,
                addr: 0x8000_2000,
                pc: 0x8000_0000,
                expected: 4,
                actual: 8,
            }
        );
    }

    #[test]
    fn narrow_get_is_shifted_into_its_byte_lane() {
        let mut responder = BusResponder::new(&CosimConfig::default());
        let mut queue = queue_with(vec![
            ReferenceEvent::new(0x8000_0000, 0x0005_2503, 10, 0x1234).with_read(0x8000_2004, 4, 0x1234),
        ]);
        let mut stats = CosimStats::default();

        responder
            .observe(&get(0x8000_2004, 2), &mut queue, &MemoryImage::new(), &mut stats)
            .expect("matching get");
        assert_eq!(responder.respond(true, &mut stats).data, 0x1234 << 32);
    }

    #[test]
    fn put_data_is_compared_on_its_lane() {
        let mut responder = BusResponder::new(&CosimConfig::default());
        let mut queue = queue_with(vec![
            ReferenceEvent::new(0x8000_0000, 0x00B5_2223, 0, 0).with_write(0x8000_2004, 4, 0xBEEF),
            ReferenceEvent::new(0x8000_0004, 0x00B5_2423, 0, 0).with_write(0x8000_2008, 4, 0xF00D),
        ]);
        let mut stats = CosimStats::default();

        responder
            .observe(
                &put(0x8000_2004, 2, 0xBEEF << 32),
                &mut queue,
                &MemoryImage::new(),
                &mut stats,
            )
            .expect("matching put");
        assert_eq!(responder.respond(true, &mut stats).opcode, DOpcode::AccessAck);

        let error = responder
            .observe(
                &put(0x8000_2008, 2, 0xF00E),
                &mut queue,
                &MemoryImage::new(),
                &mut stats,
            )
            .expect_err("data mismatch");
        assert_eq!(
            error,
            Divergence::DataMismatch {
                addr: 0x8000_2008,
                pc: 0x8000_0004,
                expected: 0xF00D,
                actual: 0xF00E,
            }
        );
    }

    #[test]
    fn unrecorded_address_and_unknown_opcodes_are_fatal() {
        let mut responder = BusResponder::new(&CosimConfig::default());
        let mut queue = queue_with(vec![ReferenceEvent::new(0x0, 0x13, 0, 0)]);
        let memory = MemoryImage::new();
        let mut stats = CosimStats::default();

        let missing = BusObservation {
            pc: 0x44,
            ..get(0x9000, 3)
        };
        assert_eq!(
            responder.observe(&missing, &mut queue, &memory, &mut stats),
            Err(Divergence::UnmatchedMemoryAccess {
                kind: AccessKind::Read,
                addr: 0x9000,
                pc: 0x44,
            })
        );

        let mut hint = get(0x9000, 3);
        hint.a.opcode = 5;
        assert!(matches!(
            responder.observe(&hint, &mut queue, &memory, &mut stats),
            Err(Divergence::UnknownOpcode { channel: Channel::A, opcode: 5, miss: false })
        ));

        let unsupported_c = BusObservation {
            c: ChannelC {
                opcode: 4,
                valid: true,
                ..ChannelC::default()
            },
            ..BusObservation::default()
        };
        assert!(matches!(
            responder.observe(&unsupported_c, &mut queue, &memory, &mut stats),
            Err(Divergence::UnknownOpcode { channel: Channel::C, .. })
        ));
    }

    #[test]
    fn fetch_refill_streams_one_line_from_memory() {
        let config = CosimConfig {
            xlen: Xlen::Rv32,
            ..CosimConfig::default()
        };
        let mut responder = BusResponder::new(&config);
        let mut memory = MemoryImage::new();
        for word in 0..16_u64 {
            memory.write_le(0x1000 + word * 4, 4, 0x100 + word);
        }
        let mut queue = queue_with(vec![]);
        let mut stats = CosimStats::default();

        responder
            .observe(&fetch(0x1000), &mut queue, &memory, &mut stats)
            .expect("fetch");
        let data: Vec<u64> = (0..16)
            .map(|_| responder.respond(true, &mut stats))
            .inspect(|response| assert_eq!(response.size, 6))
            .map(|response| response.data)
            .collect();

        assert_eq!(data, (0x100..0x110).collect::<Vec<u64>>());
        assert!(!responder.respond(true, &mut stats).valid);
        assert_eq!(stats.beats_sent, 16);
    }

    #[test]
    fn beats_are_held_until_ready() {
        let mut responder = BusResponder::new(&CosimConfig::default());
        let mut memory = MemoryImage::new();
        memory.write_le(0x2000, 8, 7);
        let mut stats = CosimStats::default();

        responder
            .observe(&fetch(0x2000), &mut queue_with(vec![]), &memory, &mut stats)
            .expect("fetch");
        assert_eq!(responder.respond(false, &mut stats).data, 7);
        assert_eq!(responder.respond(false, &mut stats).data, 7);
        assert_eq!(responder.respond(true, &mut stats).data, 7);
        assert_eq!(responder.respond(true, &mut stats).data, 0);
        assert_eq!(stats.beats_sent, 2);
    }

    #[test]
    fn grant_is_held_for_the_configured_delay() {
        let mut responder = BusResponder::new(&CosimConfig::default());
        let mut queue = queue_with(vec![
            ReferenceEvent::new(0x0, 0x0005_3503, 10, 0xA0).with_line(line(0x8000_2000)),
        ]);
        let mut stats = CosimStats::default();

        responder
            .observe(&acquire(0x8000_2000), &mut queue, &MemoryImage::new(), &mut stats)
            .expect("acquire");
        assert!(!responder.respond(true, &mut stats).valid);

        let grant = responder.respond(true, &mut stats);
        assert!(grant.valid);
        assert_eq!(grant.opcode, DOpcode::GrantData);
        assert_eq!(grant.source, 2);
        assert_eq!(grant.data, 0xA0);
        assert_eq!(stats.acquires, 1);
    }

    #[test]
    fn draining_class_finishes_before_higher_priority_fetch() {
        let mut responder = BusResponder::new(&CosimConfig {
            grant_delay_cycles: 0,
            ..CosimConfig::default()
        });
        let mut queue = queue_with(vec![
            ReferenceEvent::new(0x0, 0x0005_3503, 10, 0xA0).with_line(line(0x8000_2000)),
        ]);
        let memory = MemoryImage::new();
        let mut stats = CosimStats::default();

        responder
            .observe(&acquire(0x8000_2000), &mut queue, &memory, &mut stats)
            .expect("acquire");
        assert_eq!(responder.respond(true, &mut stats).data, 0xA0);
        assert_eq!(responder.draining(), Some(ResponseClass::Acquire));

        responder
            .observe(&fetch(0x1000), &mut queue, &memory, &mut stats)
            .expect("fetch");
        for beat in 1..8 {
            let response = responder.respond(true, &mut stats);
            assert_eq!(response.opcode, DOpcode::GrantData);
            assert_eq!(response.data, 0xA0 + beat);
        }
        assert_eq!(responder.draining(), None);
        assert_eq!(
            responder.respond(true, &mut stats).opcode,
            DOpcode::AccessAckData
        );
        assert_eq!(responder.draining(), Some(ResponseClass::Fetch));
    }

    #[test]
    fn release_is_acknowledged_through_the_acquire_bank() {
        let mut responder = BusResponder::new(&CosimConfig {
            grant_delay_cycles: 0,
            ..CosimConfig::default()
        });
        let release = BusObservation {
            c: ChannelC {
                opcode: 7,
                size: 6,
                source: 3,
                address: 0x8000_2000,
                valid: true,
                ..ChannelC::default()
            },
            ..BusObservation::default()
        };
        let mut stats = CosimStats::default();

        responder
            .observe(&release, &mut queue_with(vec![]), &MemoryImage::new(), &mut stats)
            .expect("release");
        let ack = responder.respond(true, &mut stats);
        assert_eq!(ack.opcode, DOpcode::ReleaseAck);
        assert_eq!(ack.source, 3);
        assert!(responder.is_idle());
        assert_eq!(stats.releases, 1);
    }

    #[test]
    fn oversized_size_encoding_is_a_protocol_divergence() {
        let mut responder = BusResponder::new(&CosimConfig::default());
        let mut queue = queue_with(vec![
            ReferenceEvent::new(0x8000_0000, 0x0005_2503, 10, 0x55).with_read(0x100, 4, 0x55),
        ]);
        let memory = MemoryImage::new();
        let mut stats = CosimStats::default();

        let error = responder
            .observe(&get(0x100, 32), &mut queue, &memory, &mut stats)
            .expect_err("size 32 does not decode");
        assert_eq!(
            error,
            Divergence::InvalidSize {
                channel: Channel::A,
                size: 32,
                addr: 0x100,
                pc: 0,
            }
        );
        assert_eq!(error.class(), crate::DivergenceClass::Protocol);

        assert!(matches!(
            responder.observe(&put(0x100, 7, 0), &mut queue, &memory, &mut stats),
            Err(Divergence::InvalidSize { size: 7, .. })
        ));
        assert!(responder.is_idle());
        assert_eq!(stats.gets, 0);
    }

    #[test]
    fn miss_with_non_get_opcode_is_rejected() {
        let mut responder = BusResponder::new(&CosimConfig::default());
        let mut miss = fetch(0x1000);
        miss.a.opcode = 6;

        assert_eq!(
            responder.observe(
                &miss,
                &mut queue_with(vec![]),
                &MemoryImage::new(),
                &mut CosimStats::default()
            ),
            Err(Divergence::UnknownOpcode {
                channel: Channel::A,
                opcode: 6,
                miss: true,
            })
        );
        assert!(responder.is_idle());
    }

    #[test]
    fn dataless_release_is_acknowledged() {
        let mut responder = BusResponder::new(&CosimConfig {
            grant_delay_cycles: 0,
            ..CosimConfig::default()
        });
        let release = BusObservation {
            c: ChannelC {
                opcode: 6,
                size: 6,
                source: 1,
                address: 0x8000_3000,
                valid: true,
                ..ChannelC::default()
            },
            ..BusObservation::default()
        };
        let mut stats = CosimStats::default();

        responder
            .observe(&release, &mut queue_with(vec![]), &MemoryImage::new(), &mut stats)
            .expect("release");
        let ack = responder.respond(true, &mut stats);
        assert_eq!(ack.opcode, DOpcode::ReleaseAck);
        assert_eq!(ack.source, 1);
        assert_eq!(ack.size, 6);
        assert!(responder.is_idle());
        assert_eq!(stats.releases, 1);
    }

    #[test]
    fn release_in_the_same_cycle_is_acknowledged_before_the_grant() {
        let mut responder = BusResponder::new(&CosimConfig {
            grant_delay_cycles: 0,
            ..CosimConfig::default()
        });
        let mut queue = queue_with(vec![
            ReferenceEvent::new(0x0, 0x0005_3503, 10, 0xA0).with_line(line(0x8000_2000)),
        ]);
        let both = BusObservation {
            c: ChannelC {
                opcode: 7,
                size: 6,
                source: 3,
                address: 0x8000_4000,
                valid: true,
                ..ChannelC::default()
            },
            ..acquire(0x8000_2000)
        };
        let mut stats = CosimStats::default();

        responder
            .observe(&both, &mut queue, &MemoryImage::new(), &mut stats)
            .expect("release and acquire");
        assert_eq!(responder.bank(ResponseClass::Acquire).backlog_len(), 1);

        let ack = responder.respond(true, &mut stats);
        assert_eq!(ack.opcode, DOpcode::ReleaseAck);
        assert_eq!(ack.source, 3);
        for beat in 0..8 {
            let grant = responder.respond(true, &mut stats);
            assert_eq!(grant.opcode, DOpcode::GrantData);
            assert_eq!(grant.source, 2);
            assert_eq!(grant.data, 0xA0 + beat);
        }
        assert!(responder.is_idle());
        assert_eq!(stats.releases, 1);
        assert_eq!(stats.acquires, 1);
        assert_eq!(stats.beats_sent, 9);
    }
}
