//! Engine: connects the serial command channel to the report link.

use procon_proto::{
    Button, ControllerState, DeviceIdentity, PacketClass, PairingState, Protocol,
    ProtocolConfig, ReportBuffer, MAX_REPORT_LEN,
};

use crate::command::{parse_line, Command, InterpreterConfig};
use crate::input::{InputError, LineBuffer};
use crate::output::ReportLink;
use crate::program::{MacroProgram, ProgramBuilder};
use crate::reliability::{LinkConfig, ReliableLink, RetryScan, SendOutcome, TimestampMillis};
use crate::scheduler::{Phase, Scheduler, StartError};
use crate::telemetry::{StatusLine, StatusQueue, StatusSink, TelemetryError};

/// Engine configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineConfig {
    pub link: LinkConfig,
    pub protocol: ProtocolConfig,
    pub interpreter: InterpreterConfig,
    /// Report cadence. One tick is one macro frame.
    pub tick_interval_ms: u32,
    /// Instructions the scheduler may run in a single tick.
    pub max_steps_per_tick: u16,
}

impl EngineConfig {
    pub const DEFAULT: Self = Self {
        link: LinkConfig::DEFAULT,
        protocol: ProtocolConfig::DEFAULT,
        interpreter: InterpreterConfig::DEFAULT,
        tick_interval_ms: 8,
        max_steps_per_tick: 512,
    };
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// What happened during one [`Engine::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickOutcome {
    pub retries: RetryScan,
    pub class: PacketClass,
    pub send: SendOutcome,
    pub iteration_complete: Option<u32>,
}

/// The controller engine.
///
/// Owns the controller state and drives it from two directions: serial
/// command lines fed through [`Engine::feed_serial`], and the running macro
/// advanced once per [`Engine::tick`]. Console output reports arrive through
/// [`Engine::on_output_report`] and are answered on the next tick.
///
/// Each tick runs in a fixed order: retry scan, macro step, then one report
/// built from the resulting state and sent through the reliability layer.
pub struct Engine<T> {
    config: EngineConfig,
    state: ControllerState,
    pairing: PairingState,
    protocol: Protocol,
    link: ReliableLink<T>,
    scheduler: Scheduler,
    program: Option<MacroProgram>,
    loader: Option<ProgramBuilder>,
    lines: LineBuffer,
    status: StatusQueue,
    /// Button held by an immediate `PRESS` and the ticks left before release.
    immediate_press: Option<(Button, u32)>,
    report: ReportBuffer,
}

impl<T: ReportLink> Engine<T> {
    #[must_use]
    pub fn new(transport: T, identity: DeviceIdentity, config: EngineConfig) -> Self {
        Self {
            config,
            state: ControllerState::neutral(),
            pairing: PairingState::new(),
            protocol: Protocol::new(config.protocol, identity),
            link: ReliableLink::new(transport, config.link),
            scheduler: Scheduler::new(config.max_steps_per_tick),
            program: None,
            loader: None,
            lines: LineBuffer::new(),
            status: StatusQueue::new(),
            immediate_press: None,
            report: [0; MAX_REPORT_LEN],
        }
    }

    /// Feed raw bytes from the serial command channel.
    ///
    /// Lines may be split across calls arbitrarily.
    pub fn feed_serial(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            let Some(result) = self.lines.push(byte) else {
                continue;
            };
            match result {
                Ok(line) => match core::str::from_utf8(&line) {
                    Ok(text) => self.handle_line(text),
                    Err(_) => self.handle_unreadable(InputError::Encoding),
                },
                Err(e) => self.handle_unreadable(e),
            }
        }
    }

    /// Record a console output report (subcommand or host-link request).
    pub fn on_output_report(&mut self, bytes: &[u8]) -> bool {
        let accepted = self.protocol.handle_output_report(bytes);
        if accepted {
            trace!("output report {:#x}", bytes[0]);
        }
        accepted
    }

    /// Run one tick at time `now`.
    pub fn tick(&mut self, now: TimestampMillis) -> TickOutcome {
        let retries = self.link.poll_retries(now);

        let mut iteration_complete = None;
        if let Some(program) = &self.program {
            let advance = self.scheduler.advance(program, &mut self.state);
            if let Some(n) = advance.iteration_complete {
                debug!("iteration {} complete", n);
                self.status.push(StatusLine::IterationComplete(n));
                iteration_complete = Some(n);
            }
        }

        self.expire_immediate_press();

        let mode = self.protocol.mode();
        let built = self
            .protocol
            .build_report(&mut self.state, &self.pairing, &mut self.report);
        if self.protocol.mode() != mode {
            info!("report mode switched to {:#x}", self.protocol.mode().report_id());
        }
        let send = self.link.send(built.class, &self.report[..built.len], now);

        TickOutcome {
            retries,
            class: built.class,
            send,
            iteration_complete,
        }
    }

    /// Next queued status line.
    pub fn pop_status(&mut self) -> Option<StatusLine> {
        self.status.pop()
    }

    /// Write every queued status line to `sink`.
    pub async fn flush_status<S: StatusSink>(&mut self, sink: &mut S) -> Result<usize, TelemetryError> {
        let mut written = 0;
        while let Some(line) = self.status.pop() {
            sink.write_line(line.render().as_bytes()).await?;
            written += 1;
        }
        Ok(written)
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    #[inline]
    #[must_use]
    pub fn pairing(&self) -> PairingState {
        self.pairing
    }

    #[inline]
    #[must_use]
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    #[inline]
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[inline]
    #[must_use]
    pub fn program(&self) -> Option<&MacroProgram> {
        self.program.as_ref()
    }

    /// True between `LOAD_MACRO_START` and `LOAD_MACRO_END`.
    #[inline]
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loader.is_some()
    }

    #[inline]
    pub fn link(&self) -> &ReliableLink<T> {
        &self.link
    }

    #[inline]
    pub fn link_mut(&mut self) -> &mut ReliableLink<T> {
        &mut self.link
    }

    fn handle_unreadable(&mut self, error: InputError) {
        warn!("serial line dropped: {}", error);
        match &mut self.loader {
            Some(loader) => loader.push_unreadable(error),
            None => self.status.push(StatusLine::InputFailed(error)),
        }
    }

    fn handle_line(&mut self, text: &str) {
        let parsed = parse_line(text, &self.config.interpreter);

        if let Some(loader) = &mut self.loader {
            match parsed {
                Ok(Some(Command::LoadEnd)) => self.finish_load(),
                // Control commands act immediately even inside a load block.
                Ok(Some(Command::Stop)) => {
                    self.loader = None;
                    warn!("macro load aborted by stop");
                    self.execute(Command::Stop);
                }
                Ok(Some(command @ (Command::Pair | Command::Unpair | Command::Status))) => {
                    self.execute(command);
                }
                _ => loader.push_parsed(parsed),
            }
            return;
        }

        match parsed {
            Ok(Some(command)) => self.execute(command),
            Ok(None) => {}
            Err(e) => {
                warn!("command rejected: {}", e);
                self.status.push(StatusLine::CommandFailed(e));
            }
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Hold(button) => self.state.hold(button),
            Command::Release(button) => {
                if self.immediate_press.is_some_and(|(b, _)| b == button) {
                    self.immediate_press = None;
                }
                self.state.release(button);
            }
            Command::Press { button, frames } => {
                if let Some((previous, _)) = self.immediate_press.take() {
                    self.state.release(previous);
                }
                self.state.hold(button);
                self.immediate_press = Some((button, frames.max(1)));
            }
            Command::Stick { stick, position } => self.state.set_stick(stick, position),
            Command::Sleep(_) | Command::Loop(_) | Command::EndLoop => {
                self.status.push(StatusLine::MacroOnly);
            }
            Command::Pair => {
                self.pairing.enable();
                info!("pairing enabled");
                self.status.push(StatusLine::PairingEnabled);
            }
            Command::Unpair => {
                self.pairing.disable();
                info!("pairing disabled");
                self.status.push(StatusLine::PairingDisabled);
            }
            Command::LoadStart => {
                self.loader = Some(ProgramBuilder::new(self.config.interpreter));
            }
            Command::LoadEnd => self.status.push(StatusLine::NoLoadInProgress),
            Command::Start => match self.scheduler.start() {
                Ok(()) => {
                    info!("macro started");
                    self.status.push(StatusLine::MacroStarted);
                }
                Err(StartError::AlreadyRunning) => self.status.push(StatusLine::AlreadyRunning),
                Err(StartError::NoProgram) => self.status.push(StatusLine::NoProgram),
            },
            Command::Stop => {
                self.immediate_press = None;
                if self.scheduler.stop(&mut self.state) {
                    info!("macro stopped after {} iterations", self.scheduler.iterations());
                }
                self.status.push(StatusLine::MacroStopped);
            }
            Command::ReleaseAll => {
                self.immediate_press = None;
                self.state.release_all();
            }
            Command::CenterSticks => self.state.center_sticks(),
            Command::Status => self.status.push(StatusLine::Status {
                phase: self.scheduler.phase(),
                iterations: self.scheduler.iterations(),
                pairing: self.pairing.is_discoverable(),
                program_len: self.program.as_ref().map_or(0, MacroProgram::len),
            }),
        }
    }

    fn finish_load(&mut self) {
        let Some(loader) = self.loader.take() else {
            return;
        };
        match loader.finish() {
            Ok(program) => {
                if self.scheduler.stop(&mut self.state) {
                    info!("running macro stopped for reload");
                    self.immediate_press = None;
                }
                let instructions = program.len();
                self.program = Some(program);
                self.scheduler.program_loaded();
                info!("macro loaded: {} instructions", instructions);
                self.status.push(StatusLine::MacroLoaded { instructions });
            }
            Err(e) => {
                warn!("macro load failed at line {}", e.line);
                self.status.push(StatusLine::LoadFailed(e));
            }
        }
    }

    fn expire_immediate_press(&mut self) {
        match self.immediate_press {
            Some((button, 0)) => {
                self.state.release(button);
                self.immediate_press = None;
            }
            Some((button, remaining)) => self.immediate_press = Some((button, remaining - 1)),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::output::LinkError;
    use core::future::Future;
    use core::pin::Pin;
    use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
    use procon_proto::Stick;
    use std::string::String;
    use std::vec::Vec;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<Vec<u8>>,
    }

    impl ReportLink for Recorder {
        fn try_transmit(&mut self, report: &[u8]) -> Result<(), LinkError> {
            self.sent.push(report.to_vec());
            Ok(())
        }
    }

    struct Lines(Vec<String>);

    impl StatusSink for Lines {
        fn write_line(&mut self, line: &[u8]) -> impl Future<Output = Result<(), TelemetryError>> {
            self.0.push(String::from_utf8_lossy(line).into_owned());
            core::future::ready(Ok(()))
        }
    }

    fn block_on<F: Future>(mut f: F) -> F::Output {
        fn noop_raw_waker() -> RawWaker {
            fn noop(_: *const ()) {}
            fn clone(_: *const ()) -> RawWaker {
                noop_raw_waker()
            }
            static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
            RawWaker::new(core::ptr::null(), &VTABLE)
        }

        let waker = unsafe { Waker::from_raw(noop_raw_waker()) };
        let mut cx = Context::from_waker(&waker);

        // SAFETY: We don't move f after pinning
        let mut f = unsafe { Pin::new_unchecked(&mut f) };

        match f.as_mut().poll(&mut cx) {
            Poll::Ready(result) => result,
            Poll::Pending => panic!("Mock future returned Pending unexpectedly"),
        }
    }

    fn engine() -> Engine<Recorder> {
        let identity = DeviceIdentity::new([1, 2, 3], [0; 16]);
        Engine::new(Recorder::default(), identity, EngineConfig::DEFAULT)
    }

    fn drain(engine: &mut Engine<Recorder>) -> Vec<StatusLine> {
        core::iter::from_fn(|| engine.pop_status()).collect()
    }

    #[test]
    fn test_immediate_hold_and_release() {
        let mut engine = engine();
        engine.feed_serial(b"HOLD A\n");
        assert!(engine.state().is_held(Button::A));
        engine.feed_serial(b"release a\n");
        assert!(!engine.state().is_held(Button::A));
    }

    #[test]
    fn test_immediate_press_lasts_its_duration() {
        let mut engine = engine();
        engine.feed_serial(b"PRESS B 2\n");

        let mut held = Vec::new();
        for t in 0..4 {
            engine.tick(t * 8);
            held.push(engine.state().is_held(Button::B));
        }
        assert_eq!(held, [true, true, false, false]);
    }

    #[test]
    fn test_sleep_outside_load_is_error() {
        let mut engine = engine();
        engine.feed_serial(b"SLEEP 5\nLOOP 2\n");
        assert_eq!(drain(&mut engine), [StatusLine::MacroOnly, StatusLine::MacroOnly]);
    }

    #[test]
    fn test_pairing_toggles() {
        let mut engine = engine();
        assert!(!engine.pairing().is_discoverable());
        engine.feed_serial(b"PAIR\n");
        assert!(engine.pairing().is_discoverable());
        engine.feed_serial(b"UNPAIR\n");
        assert!(!engine.pairing().is_discoverable());
        assert_eq!(
            drain(&mut engine),
            [StatusLine::PairingEnabled, StatusLine::PairingDisabled]
        );
    }

    #[test]
    fn test_load_and_start() {
        let mut engine = engine();
        engine.feed_serial(b"LOAD_MACRO_START\nHOLD A\nSLEEP 1\nRELEASE A\n");
        assert!(engine.is_loading());
        engine.feed_serial(b"LOAD_MACRO_END\nSTART_MACRO\n");
        assert!(!engine.is_loading());
        assert_eq!(engine.phase(), Phase::Running);
        assert_eq!(
            drain(&mut engine),
            [StatusLine::MacroLoaded { instructions: 3 }, StatusLine::MacroStarted]
        );
    }

    #[test]
    fn test_start_without_program() {
        let mut engine = engine();
        engine.feed_serial(b"START_MACRO\n");
        assert_eq!(drain(&mut engine), [StatusLine::NoProgram]);
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn test_start_while_running_ignored() {
        let mut engine = engine();
        engine.feed_serial(b"LOAD_MACRO_START\nPRESS A\nLOAD_MACRO_END\nSTART_MACRO\n");
        engine.tick(0);
        engine.feed_serial(b"START_MACRO\n");
        assert_eq!(drain(&mut engine).last(), Some(&StatusLine::AlreadyRunning));
        assert_eq!(engine.phase(), Phase::Sleeping(1));
    }

    #[test]
    fn test_stop_inside_load_aborts_load_and_run() {
        let mut engine = engine();
        engine.feed_serial(b"LOAD_MACRO_START\nHOLD A\nSLEEP 100\nLOAD_MACRO_END\nSTART_MACRO\n");
        engine.tick(0);
        assert!(engine.state().is_held(Button::A));
        drain(&mut engine);

        engine.feed_serial(b"LOAD_MACRO_START\nSTOP_MACRO\nPAIR\n");
        engine.tick(8);
        assert!(!engine.is_loading());
        assert_eq!(engine.phase(), Phase::Loaded);
        assert!(!engine.state().is_held(Button::A));
        assert!(engine.pairing().is_discoverable());
        assert_eq!(drain(&mut engine), [StatusLine::MacroStopped, StatusLine::PairingEnabled]);
    }

    #[test]
    fn test_pairing_and_status_inside_load_act_immediately() {
        let mut engine = engine();
        engine.feed_serial(b"LOAD_MACRO_START\nHOLD A\nPAIR\nSTATUS\nUNPAIR\nRELEASE A\n");
        assert!(engine.is_loading());
        assert!(!engine.pairing().is_discoverable());
        engine.feed_serial(b"LOAD_MACRO_END\n");
        assert_eq!(
            drain(&mut engine),
            [
                StatusLine::PairingEnabled,
                StatusLine::Status {
                    phase: Phase::Idle,
                    iterations: 0,
                    pairing: true,
                    program_len: 0,
                },
                StatusLine::PairingDisabled,
                StatusLine::MacroLoaded { instructions: 2 },
            ]
        );
    }

    #[test]
    fn test_load_end_without_start() {
        let mut engine = engine();
        engine.feed_serial(b"LOAD_MACRO_END\n");
        assert_eq!(drain(&mut engine), [StatusLine::NoLoadInProgress]);
    }

    #[test]
    fn test_overlong_line_reported() {
        let mut engine = engine();
        let mut line = [b'A'; 80].to_vec();
        line.push(b'\n');
        engine.feed_serial(&line);
        assert_eq!(
            drain(&mut engine),
            [StatusLine::InputFailed(InputError::BufferOverflow)]
        );
    }

    #[test]
    fn test_invalid_utf8_reported() {
        let mut engine = engine();
        engine.feed_serial(b"HOLD \xff\n");
        assert_eq!(drain(&mut engine), [StatusLine::InputFailed(InputError::Encoding)]);
    }

    #[test]
    fn test_release_all_and_center() {
        let mut engine = engine();
        engine.feed_serial(b"HOLD A\nHOLD DPAD_UP\nSTICK R 1 1\n");
        assert!(!engine.state().is_idle());
        engine.feed_serial(b"RELEASE_ALL\nCENTER_STICKS\n");
        assert!(engine.state().is_idle());
        assert!(engine.state().stick(Stick::Right).is_centered());
    }

    #[test]
    fn test_status_command() {
        let mut engine = engine();
        engine.feed_serial(b"LOAD_MACRO_START\nPRESS A\nSLEEP 1\nLOAD_MACRO_END\nPAIR\nSTATUS\n");
        assert_eq!(
            drain(&mut engine).last(),
            Some(&StatusLine::Status {
                phase: Phase::Loaded,
                iterations: 0,
                pairing: true,
                program_len: 2,
            })
        );
    }

    #[test]
    fn test_tick_sends_one_report() {
        let mut engine = engine();
        let outcome = engine.tick(0);
        assert_eq!(outcome.class, PacketClass::Input);
        assert!(matches!(outcome.send, SendOutcome::Sent(0)));
        assert_eq!(engine.link().transport().sent.len(), 1);
        assert_eq!(engine.link().transport().sent[0][0], 0x30);
    }

    #[test]
    fn test_subcommand_answered_on_next_tick() {
        let mut engine = engine();
        let mut request = [0u8; 12];
        request[0] = 0x01;
        request[10] = 0x02;
        assert!(engine.on_output_report(&request));

        let outcome = engine.tick(0);
        assert_eq!(outcome.class, PacketClass::SubcommandReply(0x02));
        assert_eq!(engine.link().transport().sent[0][0], 0x21);
    }

    #[test]
    fn test_flush_status() {
        let mut engine = engine();
        engine.feed_serial(b"PAIR\nJUMP\n");
        let mut sink = Lines(Vec::new());
        let written = block_on(engine.flush_status(&mut sink)).unwrap();
        assert_eq!(written, 2);
        assert_eq!(sink.0, ["Pairing enabled\n", "ERROR: unknown command\n"]);
        assert_eq!(engine.pop_status(), None);
    }
}
