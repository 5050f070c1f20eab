//! Status lines reported back over the serial command channel.
//!
//! The host tooling scans these lines, so the text of each variant is part of
//! the interface: `ITERATION_COMPLETE:<n>` for every completed pass of the
//! running macro, and load results containing "successfully" or "ERROR".

use core::fmt::Write;
use core::future::Future;

use heapless::{Deque, String};

use crate::command::ParseError;
use crate::input::InputError;
use crate::program::LoadError;
use crate::scheduler::Phase;

/// Longest rendered status line, terminator included.
pub const MAX_STATUS_LENGTH: usize = 96;

/// Queued status lines. The oldest line is dropped when full.
pub const STATUS_QUEUE_CAPACITY: usize = 16;

/// One rendered status line.
pub type StatusText = String<MAX_STATUS_LENGTH>;

/// A status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusLine {
    /// The running macro wrapped; carries the completed iteration count.
    IterationComplete(u32),
    MacroLoaded { instructions: usize },
    LoadFailed(LoadError),
    MacroStarted,
    MacroStopped,
    AlreadyRunning,
    NoProgram,
    PairingEnabled,
    PairingDisabled,
    /// Reply to `STATUS`.
    Status {
        phase: Phase,
        iterations: u32,
        pairing: bool,
        program_len: usize,
    },
    CommandFailed(ParseError),
    /// `SLEEP`, `LOOP` or `ENDLOOP` outside a load block.
    MacroOnly,
    /// `LOAD_MACRO_END` without a matching start.
    NoLoadInProgress,
    InputFailed(InputError),
}

impl core::fmt::Display for StatusLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StatusLine::IterationComplete(n) => write!(f, "ITERATION_COMPLETE:{n}"),
            StatusLine::MacroLoaded { instructions } => {
                write!(f, "Macro loaded successfully ({instructions} instructions)")
            }
            StatusLine::LoadFailed(e) => {
                write!(f, "ERROR: macro load failed at line {}: {}", e.line, e.kind)
            }
            StatusLine::MacroStarted => f.write_str("Macro started"),
            StatusLine::MacroStopped => f.write_str("Macro stopped"),
            StatusLine::AlreadyRunning => f.write_str("Macro already running"),
            StatusLine::NoProgram => f.write_str("ERROR: no macro loaded"),
            StatusLine::PairingEnabled => f.write_str("Pairing enabled"),
            StatusLine::PairingDisabled => f.write_str("Pairing disabled"),
            StatusLine::Status {
                phase,
                iterations,
                pairing,
                program_len,
            } => write!(
                f,
                "STATUS:{} iterations={iterations} pairing={} program={program_len}",
                phase.name(),
                if *pairing { "on" } else { "off" },
            ),
            StatusLine::CommandFailed(e) => write!(f, "ERROR: {e}"),
            StatusLine::MacroOnly => f.write_str("ERROR: command only valid inside a macro"),
            StatusLine::NoLoadInProgress => f.write_str("ERROR: no macro load in progress"),
            StatusLine::InputFailed(e) => write!(f, "ERROR: {e}"),
        }
    }
}

impl StatusLine {
    /// Render as a newline-terminated line.
    #[must_use]
    pub fn render(&self) -> StatusText {
        let mut text = StatusText::new();
        // Every variant fits; a longer render is truncated by the failed write.
        let _ = write!(text, "{self}\n");
        text
    }
}

/// Bounded FIFO of pending status lines.
#[derive(Debug, Default)]
pub struct StatusQueue {
    lines: Deque<StatusLine, STATUS_QUEUE_CAPACITY>,
    dropped: u32,
}

impl StatusQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: Deque::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, line: StatusLine) {
        if self.lines.is_full() {
            self.lines.pop_front();
            self.dropped = self.dropped.wrapping_add(1);
        }
        // Room was made above.
        let _ = self.lines.push_back(line);
    }

    pub fn pop(&mut self) -> Option<StatusLine> {
        self.lines.pop_front()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines lost to overflow since creation.
    #[inline]
    #[must_use]
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

/// Error type for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryError {
    /// I/O error during transmission.
    Io,
    /// Transmit buffer is full.
    BufferFull,
}

/// Destination for status lines, typically the UART transmit half.
pub trait StatusSink {
    /// Write one rendered line (terminator included).
    fn write_line(&mut self, line: &[u8]) -> impl Future<Output = Result<(), TelemetryError>>;
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::program::LoadErrorKind;

    fn text(line: StatusLine) -> std::string::String {
        std::format!("{line}")
    }

    #[test]
    fn test_iteration_line() {
        assert_eq!(text(StatusLine::IterationComplete(7)), "ITERATION_COMPLETE:7");
    }

    #[test]
    fn test_load_lines() {
        assert_eq!(
            text(StatusLine::MacroLoaded { instructions: 12 }),
            "Macro loaded successfully (12 instructions)"
        );
        let e = LoadError {
            line: 3,
            kind: LoadErrorKind::UnmatchedEndLoop,
        };
        assert_eq!(
            text(StatusLine::LoadFailed(e)),
            "ERROR: macro load failed at line 3: ENDLOOP without LOOP"
        );
    }

    #[test]
    fn test_status_line() {
        let line = StatusLine::Status {
            phase: Phase::Sleeping(4),
            iterations: 2,
            pairing: true,
            program_len: 3,
        };
        assert_eq!(text(line), "STATUS:SLEEPING iterations=2 pairing=on program=3");
    }

    #[test]
    fn test_render_terminates() {
        let rendered = StatusLine::MacroStarted.render();
        assert_eq!(rendered.as_str(), "Macro started\n");
    }

    #[test]
    fn test_queue_drops_oldest() {
        let mut queue = StatusQueue::new();
        for n in 0..(STATUS_QUEUE_CAPACITY as u32 + 2) {
            queue.push(StatusLine::IterationComplete(n));
        }
        assert_eq!(queue.len(), STATUS_QUEUE_CAPACITY);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.pop(), Some(StatusLine::IterationComplete(2)));
    }
}
