//! Input report layouts.
//!
//! Three layouts are produced:
//!
//! ```text
//! 0x30 full:    id timer conn btn[3] lstick[3] rstick[3] vib imu[36]
//! 0x21 reply:   id timer conn btn[3] lstick[3] rstick[3] vib ack subcmd data[34]
//! 0x3F simple:  id btn[2] hat lx[2] ly[2] rx[2] ry[2]
//! ```
//!
//! Sticks in the full/reply layouts are two 12-bit values packed into three
//! bytes. In the simple layout they are 16-bit samples (Pro Controller) or
//! fixed filler (single Joy-Con).

use crate::types::{Buttons, ControllerState, Hat, StickPosition};

pub const REPORT_ID_FULL: u8 = 0x30;
pub const REPORT_ID_SIMPLE: u8 = 0x3F;
pub const REPORT_ID_REPLY: u8 = 0x21;
pub const REPORT_ID_HOST_REPLY: u8 = 0x81;

/// Largest report the protocol layer ever writes.
pub const MAX_REPORT_LEN: usize = 64;

/// Full (0x30) and reply (0x21) reports share this length.
pub const STANDARD_REPORT_LEN: usize = 49;

/// Simple HID (0x3F) report length.
pub const SIMPLE_REPORT_LEN: usize = 12;

/// Bytes shared by the full and reply layouts (id through vibrator byte).
pub const STANDARD_HEADER_LEN: usize = 13;

pub const IMU_OFFSET: usize = STANDARD_HEADER_LEN;
pub const IMU_LEN: usize = 36;

/// Offset of the ack byte in a 0x21 reply.
pub const REPLY_ACK_OFFSET: usize = 13;
/// Offset of the echoed subcommand id in a 0x21 reply.
pub const REPLY_SUBCOMMAND_OFFSET: usize = 14;
pub const REPLY_DATA_OFFSET: usize = 15;
pub const REPLY_DATA_LEN: usize = STANDARD_REPORT_LEN - REPLY_DATA_OFFSET;

/// Battery full, powered, Pro Controller connection bits.
pub const CONNECTION_INFO: u8 = 0x90;

/// Output buffer handed to the report builder.
pub type ReportBuffer = [u8; MAX_REPORT_LEN];

/// One accelerometer + gyroscope sample of a controller lying flat at rest.
const RESTING_IMU_SAMPLE: [u8; 12] = [
    0x00, 0x00, // accel x
    0x00, 0x00, // accel y
    0x00, 0x10, // accel z (1 g)
    0x00, 0x00, // gyro x
    0x00, 0x00, // gyro y
    0x00, 0x00, // gyro z
];

/// Active wire format for periodic input reports.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportMode {
    /// Standard full report (0x30), the power-on default.
    #[default]
    Full,
    /// Simple HID report (0x3F).
    Simple,
}

impl ReportMode {
    /// Map a mode-switch argument to a report mode.
    #[must_use]
    pub const fn from_report_id(id: u8) -> Option<Self> {
        match id {
            REPORT_ID_FULL => Some(ReportMode::Full),
            REPORT_ID_SIMPLE => Some(ReportMode::Simple),
            _ => None,
        }
    }

    #[must_use]
    pub const fn report_id(self) -> u8 {
        match self {
            ReportMode::Full => REPORT_ID_FULL,
            ReportMode::Simple => REPORT_ID_SIMPLE,
        }
    }
}

/// Emulated controller class.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerKind {
    #[default]
    ProController,
    JoyConLeft,
    JoyConRight,
}

impl ControllerKind {
    /// Device type byte reported by the device-info subcommand.
    #[must_use]
    pub const fn device_type(self) -> u8 {
        match self {
            ControllerKind::JoyConLeft => 0x01,
            ControllerKind::JoyConRight => 0x02,
            ControllerKind::ProController => 0x03,
        }
    }

    /// Whether simple-mode reports carry analog samples or filler.
    #[must_use]
    pub const fn simple_mode_has_analog(self) -> bool {
        matches!(self, ControllerKind::ProController)
    }
}

/// Supersession class of an outgoing packet.
///
/// A newer packet of the same class makes older pending ones obsolete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketClass {
    /// Periodic input report (full or simple).
    Input,
    /// Reply to the given subcommand id.
    SubcommandReply(u8),
    /// Reply to the given host-link command.
    HostLink(u8),
}

/// Full-layout button byte and mask for each [`Buttons`] flag and d-pad direction.
///
/// Byte 0 holds the right-hand buttons, byte 1 the shared ones, byte 2 the
/// left-hand buttons including the d-pad.
const FULL_BUTTON_MAP: [(Buttons, usize, u8); 14] = [
    (Buttons::Y, 0, 0x01),
    (Buttons::X, 0, 0x02),
    (Buttons::B, 0, 0x04),
    (Buttons::A, 0, 0x08),
    (Buttons::R, 0, 0x40),
    (Buttons::ZR, 0, 0x80),
    (Buttons::MINUS, 1, 0x01),
    (Buttons::PLUS, 1, 0x02),
    (Buttons::R_STICK, 1, 0x04),
    (Buttons::L_STICK, 1, 0x08),
    (Buttons::HOME, 1, 0x10),
    (Buttons::CAPTURE, 1, 0x20),
    (Buttons::L, 2, 0x40),
    (Buttons::ZL, 2, 0x80),
];

const DPAD_DOWN: u8 = 0x01;
const DPAD_UP: u8 = 0x02;
const DPAD_RIGHT: u8 = 0x04;
const DPAD_LEFT: u8 = 0x08;

/// Encode buttons and hat into the three full-layout button bytes.
#[must_use]
pub fn encode_buttons(state: &ControllerState) -> [u8; 3] {
    let mut out = [0u8; 3];
    for &(flag, byte, mask) in &FULL_BUTTON_MAP {
        if state.buttons.contains(flag) {
            out[byte] |= mask;
        }
    }

    out[2] |= match state.hat {
        Hat::Up => DPAD_UP,
        Hat::UpRight => DPAD_UP | DPAD_RIGHT,
        Hat::Right => DPAD_RIGHT,
        Hat::DownRight => DPAD_DOWN | DPAD_RIGHT,
        Hat::Down => DPAD_DOWN,
        Hat::DownLeft => DPAD_DOWN | DPAD_LEFT,
        Hat::Left => DPAD_LEFT,
        Hat::UpLeft => DPAD_UP | DPAD_LEFT,
        Hat::Neutral => 0,
    };
    out
}

/// Pack a stick position into three bytes (12 bits per axis).
#[inline]
#[must_use]
pub const fn encode_stick(pos: StickPosition) -> [u8; 3] {
    [
        (pos.x & 0xFF) as u8,
        ((pos.x >> 8) as u8 & 0x0F) | (((pos.y & 0x0F) as u8) << 4),
        (pos.y >> 4) as u8,
    ]
}

/// Unpack three stick bytes into a position.
#[inline]
#[must_use]
pub const fn decode_stick(bytes: [u8; 3]) -> StickPosition {
    StickPosition {
        x: bytes[0] as u16 | ((bytes[1] as u16 & 0x0F) << 8),
        y: (bytes[1] as u16 >> 4) | ((bytes[2] as u16) << 4),
    }
}

/// Write the header shared by the full and reply layouts.
pub fn write_standard_header(buf: &mut ReportBuffer, id: u8, timer: u8, state: &ControllerState) {
    buf[0] = id;
    buf[1] = timer;
    buf[2] = CONNECTION_INFO;
    buf[3..6].copy_from_slice(&encode_buttons(state));
    buf[6..9].copy_from_slice(&encode_stick(state.left_stick));
    buf[9..12].copy_from_slice(&encode_stick(state.right_stick));
    buf[12] = if state.vibration_enabled { 0x80 } else { 0x00 };
}

/// Write a full (0x30) input report. Returns the report length.
pub fn write_full(buf: &mut ReportBuffer, timer: u8, state: &ControllerState, imu: bool) -> usize {
    write_standard_header(buf, REPORT_ID_FULL, timer, state);
    let motion = &mut buf[IMU_OFFSET..IMU_OFFSET + IMU_LEN];
    if imu {
        for sample in motion.chunks_exact_mut(RESTING_IMU_SAMPLE.len()) {
            sample.copy_from_slice(&RESTING_IMU_SAMPLE);
        }
    } else {
        motion.fill(0);
    }
    STANDARD_REPORT_LEN
}

/// Write a simple (0x3F) input report. Returns the report length.
pub fn write_simple(buf: &mut ReportBuffer, state: &ControllerState, kind: ControllerKind) -> usize {
    const FILLER: [u8; 8] = [0x00, 0x80, 0x00, 0x80, 0x00, 0x80, 0x00, 0x80];

    buf[0] = REPORT_ID_SIMPLE;
    buf[1..3].copy_from_slice(&state.buttons.raw().to_le_bytes());
    buf[3] = state.hat.raw();
    if kind.simple_mode_has_analog() {
        let axes = [
            state.left_stick.x,
            state.left_stick.y,
            state.right_stick.x,
            state.right_stick.y,
        ];
        for (i, &axis) in axes.iter().enumerate() {
            let offset = 4 + i * 2;
            buf[offset..offset + 2].copy_from_slice(&(axis << 4).to_le_bytes());
        }
    } else {
        buf[4..12].copy_from_slice(&FILLER);
    }
    SIMPLE_REPORT_LEN
}

/// Bytes that carry input meaning (buttons and sticks) for duplicate detection.
///
/// Timer and vibration bytes change every report and are excluded.
#[must_use]
pub fn semantic_span(report: &[u8]) -> &[u8] {
    match report.first() {
        Some(&REPORT_ID_FULL) | Some(&REPORT_ID_REPLY) if report.len() >= 12 => &report[3..12],
        Some(&REPORT_ID_SIMPLE) if report.len() >= SIMPLE_REPORT_LEN => {
            &report[1..SIMPLE_REPORT_LEN]
        }
        _ => report,
    }
}
