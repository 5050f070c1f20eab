//! End-to-end scenarios: serial commands in, HID reports out.

use procon_core::{
    DedupScope, Engine, EngineConfig, LinkConfig, LinkError, LoadError, LoadErrorKind, Phase,
    ReportLink, StatusLine, ZeroLoopPolicy,
};
use procon_proto::{Button, DeviceIdentity, PacketClass};

const TICK_MS: u64 = 8;

/// Link that records every transmitted report.
#[derive(Default)]
struct RecordingLink {
    sent: Vec<Vec<u8>>,
    refuse: bool,
}

impl ReportLink for RecordingLink {
    fn try_transmit(&mut self, report: &[u8]) -> Result<(), LinkError> {
        if self.refuse {
            return Err(LinkError::Busy);
        }
        self.sent.push(report.to_vec());
        Ok(())
    }
}

struct Harness {
    engine: Engine<RecordingLink>,
    ticks: u64,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(EngineConfig::DEFAULT)
    }

    fn with_config(config: EngineConfig) -> Self {
        let identity = DeviceIdentity::new([0xAA, 0xBB, 0xCC], [0x5A; 16]);
        Self {
            engine: Engine::new(RecordingLink::default(), identity, config),
            ticks: 0,
        }
    }

    fn send(&mut self, text: &str) {
        self.engine.feed_serial(text.as_bytes());
    }

    fn load(&mut self, body: &str) {
        self.send("LOAD_MACRO_START\n");
        self.send(body);
        self.send("LOAD_MACRO_END\n");
    }

    /// Run one tick and return the fresh report it produced.
    fn tick(&mut self) -> Vec<u8> {
        let now = self.ticks * TICK_MS;
        self.ticks += 1;
        self.engine.tick(now);
        self.sent().last().cloned().unwrap_or_default()
    }

    fn sent(&self) -> &[Vec<u8>] {
        &self.engine.link().transport().sent
    }

    fn status(&mut self) -> Vec<StatusLine> {
        std::iter::from_fn(|| self.engine.pop_status()).collect()
    }

    fn iterations(&mut self) -> Vec<u32> {
        self.status()
            .into_iter()
            .filter_map(|line| match line {
                StatusLine::IterationComplete(n) => Some(n),
                _ => None,
            })
            .collect()
    }
}

fn a_pressed(report: &[u8]) -> bool {
    report[3] & 0x08 != 0
}

fn b_pressed(report: &[u8]) -> bool {
    report[3] & 0x04 != 0
}

/// Output report carrying subcommand `id` with `args`.
fn subcommand(id: u8, args: &[u8]) -> Vec<u8> {
    let mut report = vec![0u8; 11];
    report[0] = 0x01;
    report[10] = id;
    report.extend_from_slice(args);
    report
}

/// Count rising edges of A across reports until the first iteration completes.
fn presses_in_first_iteration(body: &str) -> usize {
    let mut h = Harness::new();
    h.load(body);
    h.send("START_MACRO\n");
    h.status();

    let mut presses = 0;
    let mut was_pressed = false;
    for _ in 0..1000 {
        let report = h.tick();
        let pressed = a_pressed(&report);
        if pressed && !was_pressed {
            presses += 1;
        }
        was_pressed = pressed;
        if !h.iterations().is_empty() {
            return presses;
        }
    }
    panic!("iteration never completed");
}

#[test]
fn test_hold_sleep_release_tick_by_tick() {
    let mut h = Harness::new();
    h.load("HOLD A\nSLEEP 1\nRELEASE A\n");
    h.send("START_MACRO\n");
    assert_eq!(
        h.status(),
        [StatusLine::MacroLoaded { instructions: 3 }, StatusLine::MacroStarted]
    );

    let report = h.tick();
    assert_eq!(report[0], 0x30);
    assert!(a_pressed(&report));
    assert!(h.iterations().is_empty());

    let report = h.tick();
    assert!(!a_pressed(&report));
    assert_eq!(h.iterations(), [1]);

    let report = h.tick();
    assert!(a_pressed(&report));
    assert!(h.iterations().is_empty());

    let report = h.tick();
    assert!(!a_pressed(&report));
    assert_eq!(h.iterations(), [2]);
}

#[test]
fn test_iteration_line_text() {
    let mut h = Harness::new();
    h.load("PRESS A\n");
    h.send("START_MACRO\n");
    h.status();
    h.tick();
    h.tick();
    let rendered: Vec<String> = h.status().iter().map(|l| l.to_string()).collect();
    assert_eq!(rendered, ["ITERATION_COMPLETE:1"]);
}

#[test]
fn test_loop_five_presses() {
    let body = "LOOP 5\nPRESS A\nSLEEP 1\nENDLOOP\nSLEEP 3\n";
    assert_eq!(presses_in_first_iteration(body), 5);
}

#[test]
fn test_nested_loops_multiply() {
    let body = "LOOP 3\n\
                LOOP 2\n\
                PRESS A\n\
                SLEEP 1\n\
                ENDLOOP\n\
                ENDLOOP\n\
                SLEEP 3\n";
    assert_eq!(presses_in_first_iteration(body), 6);
}

#[test]
fn test_press_equivalent_to_hold_sleep_release() {
    let mut sugar = Harness::new();
    sugar.load("PRESS B\nSLEEP 2\nSTICK L 0.5 -0.5\nPRESS A\n");
    sugar.send("START_MACRO\n");

    let mut plain = Harness::new();
    plain.load(
        "HOLD B\nSLEEP 1\nRELEASE B\nSLEEP 2\nSTICK L 0.5 -0.5\nHOLD A\nSLEEP 1\nRELEASE A\n",
    );
    plain.send("START_MACRO\n");

    for _ in 0..20 {
        let a = sugar.tick();
        let b = plain.tick();
        assert_eq!(a[3..12], b[3..12]);
        assert_eq!(sugar.iterations(), plain.iterations());
    }
}

#[test]
fn test_sleep_holds_exact_frames_under_serial_traffic() {
    let mut h = Harness::new();
    h.load("HOLD B\nSLEEP 10\nRELEASE B\nSLEEP 10\n");
    h.send("START_MACRO\n");

    let mut held = 0;
    for i in 0..20 {
        let report = h.tick();
        if b_pressed(&report) {
            held += 1;
        }
        // Unrelated traffic between ticks, partial lines included.
        match i % 3 {
            0 => h.send("STATUS\n"),
            1 => h.send("PA"),
            _ => h.send("IR\nHOLD Y\nRELEASE Y\n"),
        }
    }
    assert_eq!(held, 10);
}

#[test]
fn test_stop_releases_everything_by_next_report() {
    let mut h = Harness::new();
    h.load("HOLD A\nHOLD ZL\nHOLD DPAD_UP\nSTICK L 1 1\nSTICK R -1 0.3\nSLEEP 50\n");
    h.send("START_MACRO\n");
    let report = h.tick();
    assert!(a_pressed(&report));

    h.send("STOP_MACRO\n");
    let report = h.tick();
    assert_eq!(report[3..6], [0, 0, 0]);
    // Both sticks at 0x800.
    assert_eq!(report[6..12], [0x00, 0x08, 0x80, 0x00, 0x08, 0x80]);
    assert_eq!(h.engine.phase(), Phase::Loaded);
    assert_eq!(h.status().last(), Some(&StatusLine::MacroStopped));
}

#[test]
fn test_failed_load_keeps_previous_program() {
    let mut h = Harness::new();
    h.load("PRESS A\nSLEEP 1\n");
    h.load("HOLD B\nLOOP 3\nPRESS B\n");
    assert_eq!(
        h.status(),
        [
            StatusLine::MacroLoaded { instructions: 2 },
            StatusLine::LoadFailed(LoadError { line: 2, kind: LoadErrorKind::MissingEndLoop }),
        ]
    );

    h.send("START_MACRO\n");
    let report = h.tick();
    assert!(a_pressed(&report));
    assert!(!b_pressed(&report));
}

#[test]
fn test_failed_load_message() {
    let mut h = Harness::new();
    h.load("HOLD A\nHOLD NOPE\n");
    let rendered: Vec<String> = h.status().iter().map(|l| l.to_string()).collect();
    assert_eq!(rendered, ["ERROR: macro load failed at line 2: unknown button"]);
}

#[test]
fn test_load_while_running_stops_first() {
    let mut h = Harness::new();
    h.load("HOLD A\nSLEEP 100\n");
    h.send("START_MACRO\n");
    h.tick();
    assert!(h.engine.state().is_held(Button::A));

    h.load("PRESS B\n");
    assert_eq!(h.engine.phase(), Phase::Loaded);
    assert!(!h.engine.state().is_held(Button::A));
    assert_eq!(h.engine.program().map(|p| p.len()), Some(1));
}

#[test]
fn test_commands_between_load_lines_are_program_text() {
    let mut h = Harness::new();
    h.send("LOAD_MACRO_START\nHOLD A\n");
    // Ticks keep flowing during a load; the body is not applied immediately.
    let report = h.tick();
    assert!(!a_pressed(&report));
    h.send("LOAD_MACRO_END\n");
    assert_eq!(h.status(), [StatusLine::MacroLoaded { instructions: 1 }]);
}

#[test]
fn test_stop_during_load_stops_running_macro() {
    let mut h = Harness::new();
    h.load("HOLD A\nSLEEP 100\n");
    h.send("START_MACRO\n");
    assert!(a_pressed(&h.tick()));
    h.status();

    h.send("LOAD_MACRO_START\nSTOP_MACRO\n");
    let report = h.tick();
    assert!(!a_pressed(&report));
    assert_eq!(h.engine.phase(), Phase::Loaded);
    assert!(!h.engine.is_loading());
    assert_eq!(h.status(), [StatusLine::MacroStopped]);

    // The aborted block leaves the previous program in place.
    h.send("START_MACRO\n");
    assert!(a_pressed(&h.tick()));
}

#[test]
fn test_pair_during_load_enables_pairing() {
    let mut h = Harness::new();
    h.send("LOAD_MACRO_START\nPAIR\n");
    assert!(h.engine.pairing().is_discoverable());
    assert!(h.engine.is_loading());
    h.engine.on_output_report(&subcommand(0x01, &[0x01]));
    let report = h.tick();
    assert_eq!(report[13], 0x81);
    h.send("PRESS A\nLOAD_MACRO_END\n");
    assert_eq!(
        h.status(),
        [StatusLine::PairingEnabled, StatusLine::MacroLoaded { instructions: 1 }]
    );
}

#[test]
fn test_unpair_during_load_disables_pairing() {
    let mut h = Harness::new();
    h.send("PAIR\nLOAD_MACRO_START\nUNPAIR\n");
    assert!(!h.engine.pairing().is_discoverable());
    assert!(h.engine.is_loading());
    h.engine.on_output_report(&subcommand(0x01, &[0x01]));
    let report = h.tick();
    assert_eq!(report[13], 0x00);
}

#[test]
fn test_status_during_load_reports_current_state() {
    let mut h = Harness::new();
    h.load("PRESS A\n");
    h.status();
    h.send("LOAD_MACRO_START\nHOLD B\nSTATUS\n");
    assert_eq!(
        h.status(),
        [StatusLine::Status { phase: Phase::Loaded, iterations: 0, pairing: false, program_len: 1 }]
    );
    h.send("LOAD_MACRO_END\n");
    assert_eq!(h.status(), [StatusLine::MacroLoaded { instructions: 1 }]);
}

#[test]
fn test_zero_loop_rejected_by_default() {
    let mut h = Harness::new();
    h.load("LOOP 0\nPRESS A\nENDLOOP\n");
    assert_eq!(
        h.status(),
        [StatusLine::LoadFailed(LoadError { line: 1, kind: LoadErrorKind::ZeroLoopCount })]
    );
}

#[test]
fn test_zero_loop_skip() {
    let mut config = EngineConfig::DEFAULT;
    config.interpreter.zero_loop = ZeroLoopPolicy::Skip;
    let mut h = Harness::with_config(config);
    h.load("LOOP 0\nPRESS A\nSLEEP 1\nENDLOOP\nPRESS B\nSLEEP 1\n");
    h.send("START_MACRO\n");

    for _ in 0..8 {
        let report = h.tick();
        assert!(!a_pressed(&report));
    }
    assert!(!h.iterations().is_empty());
}

#[test]
fn test_zero_loop_forever() {
    let mut config = EngineConfig::DEFAULT;
    config.interpreter.zero_loop = ZeroLoopPolicy::Forever;
    let mut h = Harness::with_config(config);
    h.load("LOOP 0\nPRESS A\nSLEEP 1\nENDLOOP\n");
    h.send("START_MACRO\n");

    let presses = (0..200).filter(|_| a_pressed(&h.tick())).count();
    assert_eq!(presses, 100);
    assert!(h.iterations().is_empty());
}

#[test]
fn test_subcommand_reply_retried_then_exhausted() {
    let mut h = Harness::new();
    assert!(h.engine.on_output_report(&subcommand(0x02, &[])));

    for _ in 0..12 {
        h.tick();
    }
    let replies = h.sent().iter().filter(|r| r[0] == 0x21).count();
    // First send plus retries at 16, 32 and 64 ms.
    assert_eq!(replies, 4);
    let stats = h.engine.link().stats();
    assert_eq!(stats.retransmitted, 3);
    assert_eq!(stats.exhausted, 1);
    assert_eq!(h.engine.link().pending(), 1);
}

#[test]
fn test_subcommand_reply_evicted_by_age() {
    let mut config = EngineConfig::DEFAULT;
    config.link = LinkConfig {
        max_retries: 10,
        ..LinkConfig::DEFAULT
    };
    let mut h = Harness::with_config(config);
    h.engine.on_output_report(&subcommand(0x02, &[]));

    for _ in 0..16 {
        h.tick();
    }
    let replies = h.sent().iter().filter(|r| r[0] == 0x21).count();
    assert_eq!(replies, 4);
    assert_eq!(h.engine.link().stats().expired, 1);
}

#[test]
fn test_newer_reply_supersedes_pending_one() {
    let mut h = Harness::new();
    h.engine.on_output_report(&subcommand(0x40, &[0x01]));
    h.tick();
    h.engine.on_output_report(&subcommand(0x40, &[0x00]));
    h.tick();
    assert_eq!(h.engine.link().stats().superseded, 1);
}

#[test]
fn test_refused_reports_are_retried() {
    let mut h = Harness::new();
    h.engine.link_mut().transport_mut().refuse = true;
    h.engine.on_output_report(&subcommand(0x02, &[]));
    h.tick();
    assert!(h.sent().is_empty());

    h.engine.link_mut().transport_mut().refuse = false;
    h.tick();
    h.tick();
    assert_eq!(h.sent().iter().filter(|r| r[0] == 0x21).count(), 1);
}

#[test]
fn test_dedup_retransmissions_only_sends_every_tick() {
    let mut h = Harness::new();
    for _ in 0..8 {
        h.tick();
    }
    assert_eq!(h.sent().iter().filter(|r| r[0] == 0x30).count(), 8);
    assert_eq!(h.engine.link().stats().suppressed, 0);
}

#[test]
fn test_dedup_all_transmissions_suppresses_identical_input() {
    let mut config = EngineConfig::DEFAULT;
    config.link.dedup_scope = DedupScope::AllTransmissions;
    let mut h = Harness::with_config(config);

    // Ticks at 0..=56 ms: only the first and the one past the window go out.
    for _ in 0..8 {
        h.tick();
    }
    assert_eq!(h.sent().iter().filter(|r| r[0] == 0x30).count(), 2);

    // A real change is never held back.
    h.send("HOLD A\n");
    let before = h.sent().len();
    h.tick();
    assert_eq!(h.sent().len(), before + 1);
    assert!(a_pressed(h.sent().last().unwrap()));
}

#[test]
fn test_pairing_gates_handshake() {
    let mut h = Harness::new();
    h.engine.on_output_report(&subcommand(0x01, &[0x01]));
    let report = h.tick();
    assert_eq!(report[0], 0x21);
    assert_eq!(report[13], 0x00);

    h.send("PAIR\n");
    h.engine.on_output_report(&subcommand(0x01, &[0x01]));
    let report = h.tick();
    assert_eq!(report[13], 0x81);
    assert_eq!(report[14], 0x01);
    assert_eq!(report[15], 0x01);
    assert_eq!(report[16..22], [0xCC, 0xBB, 0xAA, 0xE9, 0xB6, 0x98]);
}

#[test]
fn test_simple_mode_after_set_report_mode() {
    let mut h = Harness::new();
    h.engine.on_output_report(&subcommand(0x03, &[0x3F]));
    let reply = h.tick();
    assert_eq!(reply[0], 0x21);

    h.send("HOLD A\n");
    let report = h.tick();
    assert_eq!(report[0], 0x3F);
    assert_eq!(report.len(), 12);
    assert_eq!(h.engine.link().transport().sent.last().map(|r| r.len()), Some(12));
}

#[test]
fn test_subcommand_reply_class() {
    let mut h = Harness::new();
    h.engine.on_output_report(&subcommand(0x48, &[0x01]));
    let outcome = h.engine.tick(0);
    assert_eq!(outcome.class, PacketClass::SubcommandReply(0x48));
    assert!(h.engine.state().vibration_enabled);
}
