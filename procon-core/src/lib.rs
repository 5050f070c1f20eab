//! Platform-agnostic Pro Controller emulator engine.
//!
//! This crate holds everything between the serial command channel and the
//! report endpoint, without any platform-specific dependencies. It can be used
//! both in embedded `no_std` environments and on host for testing.
//!
//! # Overview
//!
//! - [`command`]: Serial command language ([`parse_line`], [`Command`])
//! - [`program`]: Macro programs and atomic loading ([`MacroProgram`], [`ProgramBuilder`])
//! - [`scheduler`]: Frame-based, non-blocking macro execution ([`Scheduler`])
//! - [`reliability`]: Retry, supersession and duplicate suppression ([`ReliableLink`])
//! - [`output`]: Report transport traits ([`ReportLink`], [`ReportSink`], [`FrameQueue`])
//! - [`input`]: Line assembly for the serial channel ([`LineBuffer`])
//! - [`telemetry`]: Status lines sent back to the host ([`StatusLine`])
//! - [`engine`]: Ties it all together, one report per tick ([`Engine`])
//!
//! # Example
//!
//! ```rust
//! use procon_core::{Engine, EngineConfig, FrameQueue, StatusLine};
//! use procon_proto::{Button, DeviceIdentity};
//!
//! let identity = DeviceIdentity::new([0x12, 0x34, 0x56], [0; 16]);
//! let mut engine = Engine::new(FrameQueue::<4>::new(), identity, EngineConfig::DEFAULT);
//!
//! engine.feed_serial(b"LOAD_MACRO_START\nHOLD A\nSLEEP 1\nRELEASE A\nLOAD_MACRO_END\n");
//! engine.feed_serial(b"START_MACRO\n");
//!
//! engine.tick(0);
//! assert!(engine.state().is_held(Button::A));
//! engine.tick(8);
//! assert!(!engine.state().is_held(Button::A));
//!
//! let lines: Vec<StatusLine> = core::iter::from_fn(|| engine.pop_status()).collect();
//! assert_eq!(lines.last(), Some(&StatusLine::IterationComplete(1)));
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting and logging (for embedded targets)

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

#[macro_use]
mod fmt;

pub mod command;
pub mod engine;
pub mod input;
pub mod output;
pub mod program;
pub mod reliability;
pub mod scheduler;
pub mod telemetry;

// Re-export main types at crate root
pub use command::{parse_line, Command, InterpreterConfig, ParseError};
pub use engine::{Engine, EngineConfig, TickOutcome};
pub use input::{InputError, LineBuffer, MAX_LINE_LENGTH};
pub use output::{Frame, FrameQueue, LinkError, ReportLink, ReportSink};
pub use program::{
    Instruction, LoadError, LoadErrorKind, MacroProgram, ProgramBuilder, ZeroLoopPolicy,
    MAX_LOOP_DEPTH, PROGRAM_CAPACITY,
};
pub use reliability::{
    DedupScope, LinkConfig, LinkStats, ReliableLink, RetryScan, SendOutcome, TimestampMillis,
};
pub use scheduler::{Phase, Scheduler, StartError};
pub use telemetry::{StatusLine, StatusQueue, StatusSink, TelemetryError, MAX_STATUS_LENGTH};
