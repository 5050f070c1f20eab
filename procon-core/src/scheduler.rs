//! Non-blocking macro scheduler.
//!
//! ```text
//! IDLE --load--> LOADED --start--> RUNNING <--> SLEEPING(n)
//!                   ^                  |             |
//!                   +------ stop ------+-------------+
//! ```
//!
//! [`Scheduler::advance`] runs once per tick. Zero-duration instructions
//! (`HOLD`, `RELEASE`, `STICK`, loop markers) execute back to back in the same
//! tick; `SLEEP` and `PRESS` suspend by storing a frame count in the cursor,
//! which later ticks count down. Reaching the end of the program wraps to the
//! first instruction, bumps the iteration counter and ends the tick.

use heapless::Vec;
use procon_proto::{Button, ControllerState};

use crate::program::{Instruction, MacroProgram, ZeroLoopPolicy, MAX_LOOP_DEPTH};

/// Scheduler state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// No program loaded.
    #[default]
    Idle,
    /// Program loaded, not running.
    Loaded,
    Running,
    /// Suspended for the given number of remaining frames.
    Sleeping(u32),
}

impl Phase {
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Phase::Running | Phase::Sleeping(_))
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Loaded => "LOADED",
            Phase::Running => "RUNNING",
            Phase::Sleeping(_) => "SLEEPING",
        }
    }
}

/// Why a start request was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartError {
    NoProgram,
    AlreadyRunning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LoopFrame {
    resume: usize,
    /// `None` repeats until stopped.
    remaining: Option<u16>,
}

/// Position of the running macro.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionCursor {
    pc: usize,
    sleep_remaining: u32,
    /// Button to release when the current sleep ends (`PRESS`).
    pending_release: Option<Button>,
    loops: Vec<LoopFrame, MAX_LOOP_DEPTH>,
    iterations: u32,
}

impl ExecutionCursor {
    #[inline]
    #[must_use]
    pub fn pc(&self) -> usize {
        self.pc
    }

    #[inline]
    #[must_use]
    pub fn sleep_remaining(&self) -> u32 {
        self.sleep_remaining
    }

    #[inline]
    #[must_use]
    pub fn loop_depth(&self) -> usize {
        self.loops.len()
    }

    /// Completed passes through the whole program.
    #[inline]
    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

/// What happened during one [`Scheduler::advance`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Advance {
    /// Instructions executed this tick.
    pub steps: u16,
    /// Set when the program wrapped; holds the new iteration count.
    pub iteration_complete: Option<u32>,
}

/// Macro scheduler.
#[derive(Debug)]
pub struct Scheduler {
    phase: Phase,
    cursor: ExecutionCursor,
    max_steps_per_tick: u16,
}

impl Scheduler {
    #[must_use]
    pub fn new(max_steps_per_tick: u16) -> Self {
        Self {
            phase: Phase::Idle,
            cursor: ExecutionCursor::default(),
            max_steps_per_tick: max_steps_per_tick.max(1),
        }
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    #[must_use]
    pub fn cursor(&self) -> &ExecutionCursor {
        &self.cursor
    }

    #[inline]
    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.cursor.iterations
    }

    /// A program was installed. Must not be called while running.
    pub fn program_loaded(&mut self) {
        debug_assert!(!self.phase.is_active());
        self.phase = Phase::Loaded;
    }

    /// Begin executing from the first instruction.
    pub fn start(&mut self) -> Result<(), StartError> {
        match self.phase {
            Phase::Idle => Err(StartError::NoProgram),
            Phase::Running | Phase::Sleeping(_) => Err(StartError::AlreadyRunning),
            Phase::Loaded => {
                self.cursor = ExecutionCursor::default();
                self.phase = Phase::Running;
                Ok(())
            }
        }
    }

    /// Stop at once, releasing every button and centering both sticks.
    ///
    /// Returns `true` if a macro was running. The iteration count is kept
    /// until the next start.
    pub fn stop(&mut self, state: &mut ControllerState) -> bool {
        state.release_all();
        state.center_sticks();

        let was_active = self.phase.is_active();
        if was_active {
            let iterations = self.cursor.iterations;
            self.cursor = ExecutionCursor {
                iterations,
                ..ExecutionCursor::default()
            };
            self.phase = Phase::Loaded;
        }
        was_active
    }

    /// Run one tick of the program against `state`.
    pub fn advance(&mut self, program: &MacroProgram, state: &mut ControllerState) -> Advance {
        let mut advance = Advance::default();

        match self.phase {
            Phase::Idle | Phase::Loaded => return advance,
            Phase::Sleeping(remaining) => {
                let remaining = remaining.saturating_sub(1);
                self.cursor.sleep_remaining = remaining;
                if remaining > 0 {
                    self.phase = Phase::Sleeping(remaining);
                    return advance;
                }
                if let Some(button) = self.cursor.pending_release.take() {
                    state.release(button);
                }
                self.phase = Phase::Running;
            }
            Phase::Running => {}
        }

        while advance.steps < self.max_steps_per_tick {
            let Some(&instruction) = program.get(self.cursor.pc) else {
                self.cursor.pc = 0;
                self.cursor.loops.clear();
                self.cursor.iterations = self.cursor.iterations.wrapping_add(1);
                advance.iteration_complete = Some(self.cursor.iterations);
                break;
            };

            advance.steps += 1;
            if self.execute(instruction, program, state) {
                break;
            }
        }
        advance
    }

    /// Execute one instruction. Returns `true` when it suspends the program.
    fn execute(
        &mut self,
        instruction: Instruction,
        program: &MacroProgram,
        state: &mut ControllerState,
    ) -> bool {
        let cursor = &mut self.cursor;
        cursor.pc += 1;

        match instruction {
            Instruction::Hold(button) => state.hold(button),
            Instruction::Release(button) => state.release(button),
            Instruction::Stick { stick, position } => state.set_stick(stick, position),
            Instruction::Sleep(0) => {}
            Instruction::Sleep(frames) => {
                cursor.sleep_remaining = frames;
                self.phase = Phase::Sleeping(frames);
                return true;
            }
            Instruction::Press { button, frames } => {
                state.hold(button);
                let frames = frames.max(1);
                cursor.pending_release = Some(button);
                cursor.sleep_remaining = frames;
                self.phase = Phase::Sleeping(frames);
                return true;
            }
            Instruction::LoopStart { count, end } => {
                let remaining = match (count, program.zero_loop()) {
                    (0, ZeroLoopPolicy::Forever) => None,
                    (0, _) => {
                        cursor.pc = usize::from(end) + 1;
                        return false;
                    }
                    (n, _) => Some(n),
                };
                let frame = LoopFrame {
                    resume: cursor.pc,
                    remaining,
                };
                if cursor.loops.push(frame).is_err() {
                    warn!("loop stack full at {}", cursor.pc - 1);
                }
            }
            Instruction::LoopEnd => {
                if let Some(top) = cursor.loops.last_mut() {
                    match top.remaining {
                        Some(n) if n > 1 => {
                            top.remaining = Some(n - 1);
                            cursor.pc = top.resume;
                        }
                        Some(_) => {
                            cursor.loops.pop();
                        }
                        None => cursor.pc = top.resume,
                    }
                }
            }
        }
        false
    }
}
