//! UART-driven Switch Pro Controller emulator for RP2040.
//!
//! This crate provides the embedded side of the emulator: a USB HID endpoint
//! that the console talks to as if it were a Pro Controller, and a serial
//! command channel that drives it.
//!
//! # Overview
//!
//! The firmware runs on a Raspberry Pi Pico (RP2040) and:
//! 1. Receives commands and macro programs over UART (115200 baud, 8N1)
//! 2. Answers the console's handshake and subcommands
//! 3. Sends one input report every 8 ms, driven by the macro scheduler
//! 4. Writes status lines (`ITERATION_COMPLETE:<n>`, load results) back over UART
//!
//! # Hardware Configuration
//!
//! | Function | GPIO | Description |
//! |----------|------|-------------|
//! | UART1 TX | 8    | Status lines to the host |
//! | UART1 RX | 9    | Commands from the host |
//! | LED      | 25   | On-board LED (error indicator) |
//!
//! # Architecture
//!
//! The firmware uses the Embassy async runtime with six concurrent tasks:
//!
//! - **USB Task**: Manages the USB device stack
//! - **Serial Task**: Reads UART chunks and forwards them to the control loop
//! - **Request Task**: Reads console output reports and forwards them
//! - **Control Task**: Owns the [`Engine`], ticks it every 8 ms and hands
//!   reports and status lines to the writer tasks
//! - **Report Task**: Writes reports to the IN endpoint
//! - **Status Task**: Writes status lines to the UART
//!
//! Only the control task touches engine state; the others talk to it through
//! [`Channel`](embassy_sync::channel::Channel)s. The control task only ever
//! `try_send`s into the writer channels, so neither a stalled endpoint nor a
//! full UART ring can delay a tick.
//!
//! # Modules
//!
//! - [`serial`]: UART command channel ([`SerialReader`], [`UartStatusSink`], [`StatusForwarder`])
//! - [`usb_link`]: USB HID endpoint ([`UsbReportSink`], [`UsbRequestReader`], [`ReportForwarder`])
//!
//! # Features
//!
//! - **`dev-panic`** (default): Use `panic-probe` for development (prints panic info via RTT)
//! - **`prod-panic`**: Use `panic-reset` for production (silent watchdog reset)
//! - **`joycon-left`**: Announce as a left Joy-Con
//! - **`joycon-right`**: Announce as a right Joy-Con
//!
//! # Re-exports
//!
//! This crate re-exports the engine types from [`procon_core`] and
//! [`procon_proto`] for convenience.

#![no_std]

#[cfg(all(feature = "joycon-left", feature = "joycon-right"))]
compile_error!("Cannot enable both `joycon-left` and `joycon-right` features - a device announces a single controller");

pub use procon_core::{
    Engine, EngineConfig, FrameQueue, InputError, LinkError, ReportSink, StatusLine, StatusSink,
    TelemetryError,
};
pub use procon_proto::{ControllerKind, DeviceIdentity, ProtocolConfig};

pub mod serial;
pub mod usb_link;

pub use serial::{
    SerialChunk, SerialReader, StatusBytes, StatusChannel, StatusForwarder, UartStatusSink,
};
pub use usb_link::{
    configure_usb_hid, product_id, product_name, ConsoleRequest, ReportChannel, ReportForwarder,
    UsbReportSink, UsbRequestReader, VENDOR_ID,
};

/// Controller class announced on USB and in the device-info reply.
#[cfg(feature = "joycon-left")]
pub const CONTROLLER_KIND: ControllerKind = ControllerKind::JoyConLeft;
#[cfg(feature = "joycon-right")]
pub const CONTROLLER_KIND: ControllerKind = ControllerKind::JoyConRight;
#[cfg(not(any(feature = "joycon-left", feature = "joycon-right")))]
pub const CONTROLLER_KIND: ControllerKind = ControllerKind::ProController;

/// Depth of the report queue between the engine and the USB endpoint.
pub const REPORT_QUEUE_DEPTH: usize = 4;

/// Engine configuration for this build.
#[must_use]
pub const fn engine_config() -> EngineConfig {
    let mut config = EngineConfig::DEFAULT;
    config.protocol = ProtocolConfig::for_cadence_ms(config.tick_interval_ms, CONTROLLER_KIND);
    config
}
