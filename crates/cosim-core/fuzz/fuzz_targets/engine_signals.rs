#![no_main]

use cosim_core::{
    BusObservation, CancelToken, ChannelA, ChannelC, CommitSignal, Control, CosimConfig, Engine,
    ImageSegment, ScriptStep, ScriptedModel,
};
use libfuzzer_sys::fuzz_target;

const RECORD_BYTES: usize = 16;

fn word(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .enumerate()
        .fold(0, |acc, (index, byte)| acc | u64::from(*byte) << (index * 8))
}

fuzz_target!(|data: &[u8]| {
    let config = CosimConfig::default();
    let steps = (0..8)
        .map(|index| ScriptStep::write_reg(0x8000_0000 + index * 4, 0x0000_0293, 5, index))
        .collect();
    let model = ScriptedModel::new(steps, config.xlen_bytes(), config.line_bytes);
    let Ok(mut engine) = Engine::new(config, model) else {
        return;
    };
    let cancel = CancelToken::new();
    let image = ImageSegment::from_words(0x8000_0000, &[0x0000_0293; 16]);
    if engine.init_with_images(&[image], &cancel).is_err() {
        return;
    }

    for (time, record) in data.chunks_exact(RECORD_BYTES).enumerate() {
        let flags = record[0];
        let obs = BusObservation {
            a: ChannelA {
                opcode: record[1] & 0x7,
                size: record[2] & 0x7,
                address: 0x8000_0000 | (word(&record[3..7]) & 0xFFF),
                data: word(&record[8..16]),
                valid: flags & 0x1 != 0,
                ..ChannelA::default()
            },
            c: ChannelC {
                opcode: record[1] >> 5,
                size: 6,
                address: 0x8000_0000,
                valid: flags & 0x2 != 0,
                ..ChannelC::default()
            },
            miss: flags & 0x4 != 0,
            pc: 0,
        };
        let signal = CommitSignal {
            rf_wen: flags & 0x8 != 0,
            wb_valid: flags & 0x10 != 0,
            rf_waddr: record[7] & 0x1F,
            wdata: u64::from(record[2]),
            pc: 0x8000_0000 + u64::from(record[7] & 0x3C),
            insn: 0x0000_0293,
            ll_wen: flags & 0x20 != 0,
        };

        let steps = [
            engine.peek_request(&obs, &cancel),
            engine
                .poke_response(flags & 0x40 != 0, &cancel)
                .map(|_| Control::Continue),
            engine.commit_peek(&signal, &cancel),
            engine.refill_queue(&cancel),
            engine.timeout_check(time as u64, &cancel),
        ];
        if steps
            .iter()
            .any(|step| matches!(step, Err(_) | Ok(Control::Stop(_))))
        {
            return;
        }
    }
});
