//! Serial command language.
//!
//! One command per line, case-insensitive, blank lines and `#` comments
//! ignored:
//!
//! ```text
//! HOLD <button>            RELEASE <button>         PRESS <button> [duration]
//! STICK <L|R> <h> <v>      SLEEP <duration>         WAIT <duration>
//! LOOP <count>             ENDLOOP
//! PAIR                     UNPAIR                   STATUS
//! RELEASE_ALL              CENTER_STICKS
//! LOAD_MACRO_START         LOAD_MACRO_END
//! START_MACRO              STOP_MACRO
//! ```
//!
//! Durations are frames when integral and seconds when they carry a decimal
//! point (`SLEEP 0.5`). Stick deflections range over `[-1.0, 1.0]`, positive
//! pointing right/up; values outside are clamped.

use core::num::IntErrorKind;
use core::str::FromStr;

use fixed::types::I16F16;
use fixed_macro::fixed;
use procon_proto::{Button, Stick, StickPosition};

use crate::program::ZeroLoopPolicy;

/// Full positive stick deflection.
const FULL_DEFLECTION: I16F16 = fixed!(1: I16F16);

/// Interpreter configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterpreterConfig {
    /// Frames per second used to convert decimal-second durations.
    pub frame_rate_hz: u32,
    /// How `LOOP 0` is treated at load time.
    pub zero_loop: ZeroLoopPolicy,
}

impl InterpreterConfig {
    pub const DEFAULT: Self = Self {
        frame_rate_hz: 125,
        zero_loop: ZeroLoopPolicy::Reject,
    };
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One parsed command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Hold(Button),
    Release(Button),
    Press { button: Button, frames: u32 },
    Stick { stick: Stick, position: StickPosition },
    Sleep(u32),
    Loop(u16),
    EndLoop,
    Pair,
    Unpair,
    LoadStart,
    LoadEnd,
    Start,
    Stop,
    ReleaseAll,
    CenterSticks,
    Status,
}

/// Why a command line was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    UnknownCommand,
    UnknownButton,
    UnknownStick,
    MissingArgument,
    UnexpectedArgument,
    InvalidNumber,
    OutOfRange,
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            ParseError::UnknownCommand => "unknown command",
            ParseError::UnknownButton => "unknown button",
            ParseError::UnknownStick => "unknown stick",
            ParseError::MissingArgument => "missing argument",
            ParseError::UnexpectedArgument => "unexpected argument",
            ParseError::InvalidNumber => "invalid number",
            ParseError::OutOfRange => "number out of range",
        };
        f.write_str(msg)
    }
}

/// Parse one line. Blank lines and comments yield `Ok(None)`.
pub fn parse_line(line: &str, config: &InterpreterConfig) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut tokens = line.split_ascii_whitespace();
    let Some(keyword) = tokens.next() else {
        return Ok(None);
    };
    let mut next = || tokens.next().ok_or(ParseError::MissingArgument);
    let is = |name: &str| keyword.eq_ignore_ascii_case(name);

    let command = if is("HOLD") {
        Command::Hold(button(next()?)?)
    } else if is("RELEASE") {
        Command::Release(button(next()?)?)
    } else if is("PRESS") {
        let button = button(next()?)?;
        let frames = match next() {
            Ok(token) => parse_duration(token, config.frame_rate_hz)?.max(1),
            Err(_) => 1,
        };
        Command::Press { button, frames }
    } else if is("STICK") {
        let stick = Stick::from_name(next()?).ok_or(ParseError::UnknownStick)?;
        let x = parse_axis(next()?)?;
        let y = parse_axis(next()?)?;
        Command::Stick {
            stick,
            position: StickPosition::new(x, y),
        }
    } else if is("SLEEP") || is("WAIT") {
        Command::Sleep(parse_duration(next()?, config.frame_rate_hz)?)
    } else if is("LOOP") {
        Command::Loop(parse_integer(next()?)?)
    } else if is("ENDLOOP") {
        Command::EndLoop
    } else if is("PAIR") {
        Command::Pair
    } else if is("UNPAIR") {
        Command::Unpair
    } else if is("LOAD_MACRO_START") {
        Command::LoadStart
    } else if is("LOAD_MACRO_END") {
        Command::LoadEnd
    } else if is("START_MACRO") {
        Command::Start
    } else if is("STOP_MACRO") {
        Command::Stop
    } else if is("RELEASE_ALL") {
        Command::ReleaseAll
    } else if is("CENTER_STICKS") {
        Command::CenterSticks
    } else if is("STATUS") {
        Command::Status
    } else {
        return Err(ParseError::UnknownCommand);
    };

    if tokens.next().is_some() {
        return Err(ParseError::UnexpectedArgument);
    }
    Ok(Some(command))
}

fn button(token: &str) -> Result<Button, ParseError> {
    Button::from_name(token).ok_or(ParseError::UnknownButton)
}

fn parse_integer<T: FromStr<Err = core::num::ParseIntError>>(token: &str) -> Result<T, ParseError> {
    if token.starts_with('-') {
        return Err(ParseError::OutOfRange);
    }
    token.parse::<T>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow => ParseError::OutOfRange,
        _ => ParseError::InvalidNumber,
    })
}

/// Parse a duration: frames when integral, seconds when it has a decimal point.
///
/// Seconds convert at `frame_rate_hz`, truncating partial frames.
pub fn parse_duration(token: &str, frame_rate_hz: u32) -> Result<u32, ParseError> {
    let Some((whole, fraction)) = token.split_once('.') else {
        return parse_integer(token);
    };
    if token.starts_with('-') {
        return Err(ParseError::OutOfRange);
    }
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !digits(whole) || !digits(fraction) {
        return Err(ParseError::InvalidNumber);
    }

    let rate = u64::from(frame_rate_hz);
    let whole: u64 = if whole.is_empty() { 0 } else { parse_integer(whole)? };

    // Digits past the ninth cannot move the result by a whole frame.
    let mut numerator = 0u64;
    let mut scale = 1u64;
    for b in fraction.bytes().take(9) {
        numerator = numerator * 10 + u64::from(b - b'0');
        scale *= 10;
    }

    let frames = whole
        .checked_mul(rate)
        .and_then(|f| f.checked_add(numerator * rate / scale))
        .ok_or(ParseError::OutOfRange)?;
    u32::try_from(frames).map_err(|_| ParseError::OutOfRange)
}

fn parse_axis(token: &str) -> Result<u16, ParseError> {
    // Saturate so that huge deflections clamp like any other out-of-range value.
    let value = I16F16::saturating_from_str(token).map_err(|_| ParseError::InvalidNumber)?;
    Ok(axis_to_raw(value))
}

/// Map a deflection in `[-1, 1]` to a 12-bit axis value.
///
/// `-1` maps to `0x000`, `0` to `0x800` and `1` to `0xFFF`.
#[must_use]
pub fn axis_to_raw(value: I16F16) -> u16 {
    let value = value.clamp(I16F16::NEG_ONE, FULL_DEFLECTION);
    let span = if value.is_negative() {
        i32::from(StickPosition::CENTER_VALUE)
    } else {
        i32::from(StickPosition::MAX - StickPosition::CENTER_VALUE)
    };
    let offset = value.saturating_mul_int(span).round().to_num::<i32>();
    let raw = (i32::from(StickPosition::CENTER_VALUE) + offset)
        .clamp(i32::from(StickPosition::MIN), i32::from(StickPosition::MAX));
    raw as u16
}
