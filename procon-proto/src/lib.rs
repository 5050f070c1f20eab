//! Pro Controller state, HID report layouts and console request handling.
//!
//! This crate is the protocol layer of the controller emulator:
//!
//! - **Types**: controller state as the emulator sees it
//!   - [`Buttons`] - Discrete button bitfield
//!   - [`Hat`] - D-pad value (8 directions + neutral)
//!   - [`StickPosition`] - 12-bit analog stick position
//!   - [`ControllerState`] - Complete controller snapshot
//!   - [`PairingState`] - Discoverability flag
//!
//! - **Reports**: wire layouts written from [`ControllerState`]
//!   - [`report::write_full`] - Standard full report (0x30)
//!   - [`report::write_simple`] - Simple HID report (0x3F)
//!
//! - **Requests**: console output reports and their answers
//!   - [`Protocol`] - Tracks report mode, motion, timer and pending requests
//!   - [`subcommand::DISPATCH`] - Subcommand id to handler table
//!   - [`spi`] - Virtual SPI flash (calibration and colors)
//!
//! # Example
//!
//! ```
//! use procon_proto::{
//!     Button, ControllerState, DeviceIdentity, PairingState, Protocol, ProtocolConfig,
//!     MAX_REPORT_LEN,
//! };
//!
//! let identity = DeviceIdentity::new([0x12, 0x34, 0x56], [0; 16]);
//! let mut protocol = Protocol::new(ProtocolConfig::DEFAULT, identity);
//! let mut state = ControllerState::neutral();
//! state.hold(Button::A);
//!
//! let mut buf = [0u8; MAX_REPORT_LEN];
//! let built = protocol.build_report(&mut state, &PairingState::new(), &mut buf);
//! assert_eq!(buf[0], 0x30);
//! assert_eq!(built.len, 49);
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)
//!
//! # No-std Support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod protocol;
pub mod report;
pub mod spi;
pub mod subcommand;
pub mod types;

// Re-export types at crate root for convenience
pub use protocol::{BuiltReport, DeviceIdentity, OutputReport, Protocol, ProtocolConfig};
pub use report::{
    semantic_span, ControllerKind, PacketClass, ReportBuffer, ReportMode, MAX_REPORT_LEN,
};
pub use types::{
    Button, ButtonTarget, Buttons, ControllerState, Directions, Hat, PairingState, Stick,
    StickPosition,
};
