//! Macro programs and the atomic load sequence that builds them.
//!
//! A [`ProgramBuilder`] collects the body of a `LOAD_MACRO_START` ..
//! `LOAD_MACRO_END` block. The first error poisons the whole load: the
//! builder keeps consuming lines until the block ends, then reports the error
//! and yields no program, so the previously installed one stays untouched.

use heapless::Vec;
use procon_proto::{Button, Stick, StickPosition};

use crate::command::{parse_line, Command, InterpreterConfig, ParseError};
use crate::input::InputError;

/// Maximum number of instructions in a program.
pub const PROGRAM_CAPACITY: usize = 1000;

/// Maximum nesting of `LOOP` blocks.
pub const MAX_LOOP_DEPTH: usize = 8;

/// How a `LOOP 0` is treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ZeroLoopPolicy {
    /// Reject the load.
    #[default]
    Reject,
    /// Skip the loop body entirely.
    Skip,
    /// Repeat the loop body until the macro is stopped.
    Forever,
}

/// One program step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Instruction {
    Hold(Button),
    Release(Button),
    /// Hold, wait `frames`, release.
    Press { button: Button, frames: u32 },
    Stick { stick: Stick, position: StickPosition },
    Sleep(u32),
    /// Start of a loop. `end` is the index of the matching [`Instruction::LoopEnd`].
    LoopStart { count: u16, end: u16 },
    LoopEnd,
}

/// A validated, immutable instruction sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroProgram {
    instructions: Vec<Instruction, PROGRAM_CAPACITY>,
    zero_loop: ZeroLoopPolicy,
}

impl MacroProgram {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    #[inline]
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Policy the program was validated under.
    #[inline]
    #[must_use]
    pub fn zero_loop(&self) -> ZeroLoopPolicy {
        self.zero_loop
    }

    /// Parse a whole program body at once.
    ///
    /// Convenience over [`ProgramBuilder`] for tests and tools.
    pub fn parse(text: &str, config: &InterpreterConfig) -> Result<Self, LoadError> {
        let mut builder = ProgramBuilder::new(*config);
        for line in text.lines() {
            builder.push_line(line);
        }
        builder.finish()
    }
}

/// What went wrong while loading a program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadErrorKind {
    Parse(ParseError),
    /// Overlong or garbled line.
    Unreadable(InputError),
    /// A control command (e.g. `PAIR`) inside a load block.
    NotAnInstruction,
    UnmatchedEndLoop,
    MissingEndLoop,
    LoopTooDeep,
    ZeroLoopCount,
    CapacityExceeded,
    EmptyProgram,
}

impl core::fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LoadErrorKind::Parse(e) => core::fmt::Display::fmt(e, f),
            LoadErrorKind::Unreadable(e) => core::fmt::Display::fmt(e, f),
            LoadErrorKind::NotAnInstruction => f.write_str("command not allowed in a macro"),
            LoadErrorKind::UnmatchedEndLoop => f.write_str("ENDLOOP without LOOP"),
            LoadErrorKind::MissingEndLoop => f.write_str("LOOP without ENDLOOP"),
            LoadErrorKind::LoopTooDeep => f.write_str("loops nested too deeply"),
            LoadErrorKind::ZeroLoopCount => f.write_str("LOOP count must be positive"),
            LoadErrorKind::CapacityExceeded => f.write_str("program too long"),
            LoadErrorKind::EmptyProgram => f.write_str("program is empty"),
        }
    }
}

/// A rejected load, with the 1-based body line that caused it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoadError {
    pub line: u32,
    pub kind: LoadErrorKind,
}

impl core::fmt::Display for LoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

/// Accumulates a load block line by line.
#[derive(Debug)]
pub struct ProgramBuilder {
    config: InterpreterConfig,
    instructions: Vec<Instruction, PROGRAM_CAPACITY>,
    open_loops: Vec<(u16, u32), MAX_LOOP_DEPTH>,
    line: u32,
    error: Option<LoadError>,
}

impl ProgramBuilder {
    #[must_use]
    pub fn new(config: InterpreterConfig) -> Self {
        Self {
            config,
            instructions: Vec::new(),
            open_loops: Vec::new(),
            line: 0,
            error: None,
        }
    }

    /// Body lines consumed so far.
    #[inline]
    #[must_use]
    pub fn lines(&self) -> u32 {
        self.line
    }

    /// First error seen, if any.
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<LoadError> {
        self.error
    }

    /// Parse and add one body line.
    pub fn push_line(&mut self, text: &str) {
        let parsed = parse_line(text, &self.config);
        self.push_parsed(parsed);
    }

    /// Add one body line that the caller already parsed.
    pub fn push_parsed(&mut self, parsed: Result<Option<Command>, ParseError>) {
        self.line += 1;
        if self.error.is_some() {
            return;
        }
        match parsed {
            Ok(Some(command)) => {
                if let Err(kind) = self.add(command) {
                    self.fail(kind);
                }
            }
            Ok(None) => {}
            Err(e) => self.fail(LoadErrorKind::Parse(e)),
        }
    }

    /// Record a line that could not be read at all.
    pub fn push_unreadable(&mut self, error: InputError) {
        self.line += 1;
        if self.error.is_none() {
            self.fail(LoadErrorKind::Unreadable(error));
        }
    }

    /// Close the block and validate the program.
    pub fn finish(self) -> Result<MacroProgram, LoadError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if let Some(&(_, line)) = self.open_loops.last() {
            return Err(LoadError {
                line,
                kind: LoadErrorKind::MissingEndLoop,
            });
        }
        if self.instructions.is_empty() {
            return Err(LoadError {
                line: self.line + 1,
                kind: LoadErrorKind::EmptyProgram,
            });
        }
        Ok(MacroProgram {
            instructions: self.instructions,
            zero_loop: self.config.zero_loop,
        })
    }

    fn fail(&mut self, kind: LoadErrorKind) {
        self.error = Some(LoadError {
            line: self.line,
            kind,
        });
    }

    fn add(&mut self, command: Command) -> Result<(), LoadErrorKind> {
        let instruction = match command {
            Command::Hold(button) => Instruction::Hold(button),
            Command::Release(button) => Instruction::Release(button),
            Command::Press { button, frames } => Instruction::Press { button, frames },
            Command::Stick { stick, position } => Instruction::Stick { stick, position },
            Command::Sleep(frames) => Instruction::Sleep(frames),
            Command::Loop(count) => {
                if count == 0 && self.config.zero_loop == ZeroLoopPolicy::Reject {
                    return Err(LoadErrorKind::ZeroLoopCount);
                }
                // PROGRAM_CAPACITY fits in u16.
                let index = self.instructions.len() as u16;
                self.open_loops
                    .push((index, self.line))
                    .map_err(|_| LoadErrorKind::LoopTooDeep)?;
                Instruction::LoopStart { count, end: 0 }
            }
            Command::EndLoop => {
                let (start, _) = self
                    .open_loops
                    .pop()
                    .ok_or(LoadErrorKind::UnmatchedEndLoop)?;
                let end = self.instructions.len() as u16;
                if let Some(Instruction::LoopStart { end: slot, .. }) =
                    self.instructions.get_mut(usize::from(start))
                {
                    *slot = end;
                }
                Instruction::LoopEnd
            }
            _ => return Err(LoadErrorKind::NotAnInstruction),
        };

        self.instructions
            .push(instruction)
            .map_err(|_| LoadErrorKind::CapacityExceeded)
    }
}
