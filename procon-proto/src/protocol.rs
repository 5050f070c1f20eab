//! The protocol layer: turns controller state and console requests into
//! outgoing reports.
//!
//! The console drives the exchange through output reports:
//!
//! ```text
//! 0x01 counter rumble[8] subcmd data...   subcommand request
//! 0x10 counter rumble[8]                  rumble only (plain poll)
//! 0x80 cmd                                USB host-link command
//! ```
//!
//! [`Protocol::handle_output_report`] records the latest request and
//! [`Protocol::build_report`] answers it on the next tick. With no request
//! pending it takes the fast path and writes a plain input report.

use heapless::Vec;

use crate::report::{
    self, ControllerKind, PacketClass, ReportBuffer, ReportMode, MAX_REPORT_LEN,
    REPLY_ACK_OFFSET, REPLY_DATA_OFFSET, REPLY_SUBCOMMAND_OFFSET, REPORT_ID_HOST_REPLY,
    REPORT_ID_REPLY, STANDARD_REPORT_LEN,
};
use crate::subcommand::{self, Context, Effect, Request};
use crate::types::{ControllerState, PairingState};

pub const OUTPUT_ID_SUBCOMMAND: u8 = 0x01;
pub const OUTPUT_ID_RUMBLE: u8 = 0x10;
pub const OUTPUT_ID_HOST_LINK: u8 = 0x80;

/// Offset of the subcommand id in a 0x01 output report.
pub const SUBCOMMAND_ID_OFFSET: usize = 10;

/// Largest subcommand argument block kept from an output report.
pub const MAX_SUBCOMMAND_DATA: usize = 38;

/// The controller's internal timer ticks every 5 ms.
pub const TIMER_RESOLUTION_MS: u32 = 5;

/// Nintendo's Bluetooth OUI, used as the fixed half of the device address.
pub const NINTENDO_OUI: [u8; 3] = [0x98, 0xB6, 0xE9];

pub mod host_link {
    //! USB host-link commands (0x80 output reports).
    pub const STATUS: u8 = 0x01;
    pub const HANDSHAKE: u8 = 0x02;
    pub const HIGH_SPEED: u8 = 0x03;
    /// Keep the link open without the usual inactivity timeout.
    pub const FORCE_USB: u8 = 0x04;
    /// Restore the inactivity timeout.
    pub const RELEASE_USB: u8 = 0x05;
}

/// Per-boot identity announced during pairing and device-info queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceIdentity {
    /// Device address, most significant byte first.
    pub mac: [u8; 6],
    /// Long-term key handed over in the second pairing step.
    pub link_key: [u8; 16],
}

impl DeviceIdentity {
    /// Build an identity from random material drawn at boot.
    #[must_use]
    pub fn new(random_tail: [u8; 3], link_key: [u8; 16]) -> Self {
        let mut mac = [0u8; 6];
        mac[..3].copy_from_slice(&NINTENDO_OUI);
        mac[3..].copy_from_slice(&random_tail);
        Self { mac, link_key }
    }

    /// Address in wire (least significant byte first) order.
    #[must_use]
    pub fn mac_reversed(&self) -> [u8; 6] {
        let mut mac = self.mac;
        mac.reverse();
        mac
    }
}

/// Protocol layer configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProtocolConfig {
    pub kind: ControllerKind,
    /// Amount the report timer advances per report.
    pub timer_step: u8,
}

impl ProtocolConfig {
    pub const DEFAULT: Self = Self::for_cadence_ms(8, ControllerKind::ProController);

    /// Size the timer step to the report cadence.
    #[must_use]
    pub const fn for_cadence_ms(cadence_ms: u32, kind: ControllerKind) -> Self {
        let step = (cadence_ms + TIMER_RESOLUTION_MS / 2) / TIMER_RESOLUTION_MS;
        let timer_step = if step == 0 {
            1
        } else if step > u8::MAX as u32 {
            u8::MAX
        } else {
            step as u8
        };
        Self { kind, timer_step }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Decoded console output report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputReport {
    Subcommand {
        id: u8,
        data: Vec<u8, MAX_SUBCOMMAND_DATA>,
    },
    Rumble,
    HostLink(u8),
}

impl OutputReport {
    /// Parse a raw output report. Unsupported or truncated reports yield `None`.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match *bytes.first()? {
            OUTPUT_ID_SUBCOMMAND => {
                let id = *bytes.get(SUBCOMMAND_ID_OFFSET)?;
                let args = &bytes[SUBCOMMAND_ID_OFFSET + 1..];
                let args = &args[..args.len().min(MAX_SUBCOMMAND_DATA)];
                let data = Vec::from_slice(args).ok()?;
                Some(OutputReport::Subcommand { id, data })
            }
            OUTPUT_ID_RUMBLE => Some(OutputReport::Rumble),
            OUTPUT_ID_HOST_LINK => bytes.get(1).copied().map(OutputReport::HostLink),
            _ => None,
        }
    }
}

/// A report written by [`Protocol::build_report`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BuiltReport {
    pub len: usize,
    pub class: PacketClass,
}

/// Protocol layer state.
#[derive(Debug)]
pub struct Protocol {
    config: ProtocolConfig,
    identity: DeviceIdentity,
    mode: ReportMode,
    imu_enabled: bool,
    player_lights: u8,
    timer: u8,
    usb_forced: bool,
    pending: Option<OutputReport>,
}

impl Protocol {
    #[must_use]
    pub fn new(config: ProtocolConfig, identity: DeviceIdentity) -> Self {
        Self {
            config,
            identity,
            mode: ReportMode::default(),
            imu_enabled: false,
            player_lights: 0,
            timer: 0,
            usb_forced: false,
            pending: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> ReportMode {
        self.mode
    }

    #[inline]
    #[must_use]
    pub fn imu_enabled(&self) -> bool {
        self.imu_enabled
    }

    #[inline]
    #[must_use]
    pub fn player_lights(&self) -> u8 {
        self.player_lights
    }

    /// True after a host-link "no timeout" command until it is released.
    #[inline]
    #[must_use]
    pub fn usb_forced(&self) -> bool {
        self.usb_forced
    }

    #[inline]
    #[must_use]
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> ProtocolConfig {
        self.config
    }

    /// Record a console output report to be answered by the next report.
    ///
    /// Returns `false` for reports that need no answer or cannot be parsed.
    /// A newer request replaces one that has not been answered yet.
    pub fn handle_output_report(&mut self, bytes: &[u8]) -> bool {
        match OutputReport::parse(bytes) {
            Some(OutputReport::Rumble) | None => false,
            Some(report) => {
                self.pending = Some(report);
                true
            }
        }
    }

    /// Build the next outgoing report into `buf`.
    ///
    /// Subcommand effects that touch controller state (vibration) are
    /// applied to `state`.
    pub fn build_report(
        &mut self,
        state: &mut ControllerState,
        pairing: &PairingState,
        buf: &mut ReportBuffer,
    ) -> BuiltReport {
        let Some(request) = self.pending.take() else {
            return self.build_input(state, buf);
        };

        match request {
            OutputReport::Subcommand { id, data } => {
                self.build_reply(id, &data, state, pairing, buf)
            }
            OutputReport::HostLink(command) => self
                .build_host_link(command, pairing, buf)
                .unwrap_or_else(|| self.build_input(state, buf)),
            OutputReport::Rumble => self.build_input(state, buf),
        }
    }

    fn next_timer(&mut self) -> u8 {
        let timer = self.timer;
        self.timer = self.timer.wrapping_add(self.config.timer_step);
        timer
    }

    fn build_input(&mut self, state: &ControllerState, buf: &mut ReportBuffer) -> BuiltReport {
        let len = match self.mode {
            ReportMode::Full => {
                let timer = self.next_timer();
                report::write_full(buf, timer, state, self.imu_enabled)
            }
            ReportMode::Simple => report::write_simple(buf, state, self.config.kind),
        };
        BuiltReport {
            len,
            class: PacketClass::Input,
        }
    }

    fn build_reply(
        &mut self,
        id: u8,
        data: &[u8],
        state: &mut ControllerState,
        pairing: &PairingState,
        buf: &mut ReportBuffer,
    ) -> BuiltReport {
        let ctx = Context {
            identity: &self.identity,
            pairing: *pairing,
            kind: self.config.kind,
        };
        let reply = subcommand::dispatch(&Request { id, data }, &ctx);

        if let Some(effect) = reply.effect {
            self.apply(effect, state);
        }

        let timer = self.next_timer();
        report::write_standard_header(buf, REPORT_ID_REPLY, timer, state);
        buf[REPLY_ACK_OFFSET] = reply.ack;
        buf[REPLY_SUBCOMMAND_OFFSET] = id;
        let payload = &mut buf[REPLY_DATA_OFFSET..STANDARD_REPORT_LEN];
        payload.fill(0);
        payload[..reply.data.len()].copy_from_slice(&reply.data);

        BuiltReport {
            len: STANDARD_REPORT_LEN,
            class: PacketClass::SubcommandReply(id),
        }
    }

    fn apply(&mut self, effect: Effect, state: &mut ControllerState) {
        match effect {
            Effect::SetReportMode(mode) => self.mode = mode,
            Effect::SetImu(enabled) => self.imu_enabled = enabled,
            Effect::SetVibration(enabled) => state.vibration_enabled = enabled,
            Effect::SetPlayerLights(lights) => self.player_lights = lights,
        }
    }

    /// Answer a host-link command. `None` means no reply is due.
    fn build_host_link(
        &mut self,
        command: u8,
        pairing: &PairingState,
        buf: &mut ReportBuffer,
    ) -> Option<BuiltReport> {
        buf.fill(0);
        buf[0] = REPORT_ID_HOST_REPLY;
        buf[1] = command;
        let len = match command {
            host_link::STATUS => {
                buf[3] = self.config.kind.device_type();
                buf[4..10].copy_from_slice(&self.identity.mac_reversed());
                10
            }
            host_link::HANDSHAKE if pairing.is_discoverable() => 2,
            host_link::HIGH_SPEED => 2,
            host_link::FORCE_USB => {
                self.usb_forced = true;
                2
            }
            host_link::RELEASE_USB => {
                self.usb_forced = false;
                2
            }
            _ => return None,
        };
        debug_assert!(len <= MAX_REPORT_LEN);
        Some(BuiltReport {
            len,
            class: PacketClass::HostLink(command),
        })
    }
}
