//! Controller state types: Buttons, Hat, StickPosition, ControllerState, PairingState.

use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// Discrete (non d-pad) buttons represented as a bitfield.
///
/// The bit order matches the 16-bit button field of the simple HID report,
/// so encoding that layout is a plain little-endian copy.
///
/// # Example
///
/// ```
/// use procon_proto::Buttons;
///
/// let buttons = Buttons::A | Buttons::ZR;
/// assert!(buttons.contains(Buttons::A));
/// assert!(buttons.contains(Buttons::ZR));
/// assert!(!buttons.contains(Buttons::B));
/// ```
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Buttons(pub u16);

impl Buttons {
    pub const B: Self = Self(1 << 0);
    pub const A: Self = Self(1 << 1);
    pub const Y: Self = Self(1 << 2);
    pub const X: Self = Self(1 << 3);
    pub const L: Self = Self(1 << 4);
    pub const R: Self = Self(1 << 5);
    pub const ZL: Self = Self(1 << 6);
    pub const ZR: Self = Self(1 << 7);
    pub const MINUS: Self = Self(1 << 8);
    pub const PLUS: Self = Self(1 << 9);
    pub const L_STICK: Self = Self(1 << 10); // Left stick press
    pub const R_STICK: Self = Self(1 << 11); // Right stick press
    pub const HOME: Self = Self(1 << 12);
    pub const CAPTURE: Self = Self(1 << 13);

    /// No buttons pressed.
    pub const NONE: Self = Self(0);

    /// Check if the given button(s) are pressed.
    #[inline]
    #[must_use]
    pub const fn contains(self, button: Buttons) -> bool {
        (self.0 & button.0) == button.0
    }

    /// Set or clear button(s).
    #[inline]
    pub fn set(&mut self, button: Buttons, pressed: bool) {
        if pressed {
            self.0 |= button.0;
        } else {
            self.0 &= !button.0;
        }
    }

    /// Get the raw u16 value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Check if no buttons are pressed.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Buttons {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Buttons {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Buttons {
    type Output = Self;

    #[inline]
    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for Buttons {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for Buttons {
    type Output = Self;

    #[inline]
    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

/// D-pad directions as a small bitset, used to compose a [`Hat`] value.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Directions(pub u8);

impl Directions {
    pub const UP: Self = Self(1 << 0);
    pub const DOWN: Self = Self(1 << 1);
    pub const LEFT: Self = Self(1 << 2);
    pub const RIGHT: Self = Self(1 << 3);
    pub const NONE: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn contains(self, other: Directions) -> bool {
        (self.0 & other.0) == other.0
    }

    /// The direction that cancels this one on the same axis.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self.0 {
            0b0001 => Self::DOWN,
            0b0010 => Self::UP,
            0b0100 => Self::RIGHT,
            0b1000 => Self::LEFT,
            _ => Self::NONE,
        }
    }
}

/// 4-bit hat switch value: eight directions plus neutral.
///
/// Exactly one value is active at a time, which keeps the d-pad state
/// consistent no matter how hold/release commands interleave.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Hat {
    Up = 0,
    UpRight = 1,
    Right = 2,
    DownRight = 3,
    Down = 4,
    DownLeft = 5,
    Left = 6,
    UpLeft = 7,
    #[default]
    Neutral = 8,
}

impl Hat {
    /// Compose a hat value from a direction set. Opposite directions cancel.
    #[must_use]
    pub const fn from_directions(dirs: Directions) -> Self {
        let up = dirs.contains(Directions::UP) && !dirs.contains(Directions::DOWN);
        let down = dirs.contains(Directions::DOWN) && !dirs.contains(Directions::UP);
        let left = dirs.contains(Directions::LEFT) && !dirs.contains(Directions::RIGHT);
        let right = dirs.contains(Directions::RIGHT) && !dirs.contains(Directions::LEFT);

        match (up, down, left, right) {
            (true, _, false, false) => Hat::Up,
            (true, _, false, true) => Hat::UpRight,
            (false, false, false, true) => Hat::Right,
            (_, true, false, true) => Hat::DownRight,
            (_, true, false, false) => Hat::Down,
            (_, true, true, _) => Hat::DownLeft,
            (false, false, true, _) => Hat::Left,
            (true, _, true, _) => Hat::UpLeft,
            _ => Hat::Neutral,
        }
    }

    /// Decompose into the set of held directions.
    #[must_use]
    pub const fn directions(self) -> Directions {
        match self {
            Hat::Up => Directions::UP,
            Hat::UpRight => Directions(Directions::UP.0 | Directions::RIGHT.0),
            Hat::Right => Directions::RIGHT,
            Hat::DownRight => Directions(Directions::DOWN.0 | Directions::RIGHT.0),
            Hat::Down => Directions::DOWN,
            Hat::DownLeft => Directions(Directions::DOWN.0 | Directions::LEFT.0),
            Hat::Left => Directions::LEFT,
            Hat::UpLeft => Directions(Directions::UP.0 | Directions::LEFT.0),
            Hat::Neutral => Directions::NONE,
        }
    }

    /// Raw 4-bit wire value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }
}

/// A named controller input, as accepted by the command language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Button {
    A,
    B,
    X,
    Y,
    L,
    R,
    ZL,
    ZR,
    Plus,
    Minus,
    Home,
    Capture,
    LeftStick,
    RightStick,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
}

impl Button {
    /// Look up a button by name, ignoring ASCII case.
    ///
    /// Accepts the canonical names (`A`, `ZL`, `DPAD_UP`, `L_STICK`, ...) and
    /// a few aliases (`UP`, `LS`, `START`, `SELECT`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        const NAMES: &[(&str, Button)] = &[
            ("A", Button::A),
            ("B", Button::B),
            ("X", Button::X),
            ("Y", Button::Y),
            ("L", Button::L),
            ("R", Button::R),
            ("ZL", Button::ZL),
            ("ZR", Button::ZR),
            ("PLUS", Button::Plus),
            ("START", Button::Plus),
            ("MINUS", Button::Minus),
            ("SELECT", Button::Minus),
            ("HOME", Button::Home),
            ("CAPTURE", Button::Capture),
            ("L_STICK", Button::LeftStick),
            ("LSTICK", Button::LeftStick),
            ("LS", Button::LeftStick),
            ("R_STICK", Button::RightStick),
            ("RSTICK", Button::RightStick),
            ("RS", Button::RightStick),
            ("DPAD_UP", Button::DpadUp),
            ("UP", Button::DpadUp),
            ("DPAD_DOWN", Button::DpadDown),
            ("DOWN", Button::DpadDown),
            ("DPAD_LEFT", Button::DpadLeft),
            ("LEFT", Button::DpadLeft),
            ("DPAD_RIGHT", Button::DpadRight),
            ("RIGHT", Button::DpadRight),
        ];

        NAMES
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|&(_, button)| button)
    }

    /// Canonical upper-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Button::A => "A",
            Button::B => "B",
            Button::X => "X",
            Button::Y => "Y",
            Button::L => "L",
            Button::R => "R",
            Button::ZL => "ZL",
            Button::ZR => "ZR",
            Button::Plus => "PLUS",
            Button::Minus => "MINUS",
            Button::Home => "HOME",
            Button::Capture => "CAPTURE",
            Button::LeftStick => "L_STICK",
            Button::RightStick => "R_STICK",
            Button::DpadUp => "DPAD_UP",
            Button::DpadDown => "DPAD_DOWN",
            Button::DpadLeft => "DPAD_LEFT",
            Button::DpadRight => "DPAD_RIGHT",
        }
    }

    /// Where this input lives in [`ControllerState`].
    #[must_use]
    pub const fn target(self) -> ButtonTarget {
        match self {
            Button::A => ButtonTarget::Flag(Buttons::A),
            Button::B => ButtonTarget::Flag(Buttons::B),
            Button::X => ButtonTarget::Flag(Buttons::X),
            Button::Y => ButtonTarget::Flag(Buttons::Y),
            Button::L => ButtonTarget::Flag(Buttons::L),
            Button::R => ButtonTarget::Flag(Buttons::R),
            Button::ZL => ButtonTarget::Flag(Buttons::ZL),
            Button::ZR => ButtonTarget::Flag(Buttons::ZR),
            Button::Plus => ButtonTarget::Flag(Buttons::PLUS),
            Button::Minus => ButtonTarget::Flag(Buttons::MINUS),
            Button::Home => ButtonTarget::Flag(Buttons::HOME),
            Button::Capture => ButtonTarget::Flag(Buttons::CAPTURE),
            Button::LeftStick => ButtonTarget::Flag(Buttons::L_STICK),
            Button::RightStick => ButtonTarget::Flag(Buttons::R_STICK),
            Button::DpadUp => ButtonTarget::Hat(Directions::UP),
            Button::DpadDown => ButtonTarget::Hat(Directions::DOWN),
            Button::DpadLeft => ButtonTarget::Hat(Directions::LEFT),
            Button::DpadRight => ButtonTarget::Hat(Directions::RIGHT),
        }
    }
}

/// Storage location of a [`Button`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonTarget {
    /// One bit of the [`Buttons`] field.
    Flag(Buttons),
    /// One direction folded into the [`Hat`].
    Hat(Directions),
}

/// Which analog stick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stick {
    Left,
    Right,
}

impl Stick {
    /// Parse `L`, `R`, `LEFT`, `RIGHT`, `L_STICK` or `R_STICK` (any case).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        ["L", "LEFT", "L_STICK"]
            .iter()
            .any(|n| n.eq_ignore_ascii_case(name))
            .then_some(Stick::Left)
            .or_else(|| {
                ["R", "RIGHT", "R_STICK"]
                    .iter()
                    .any(|n| n.eq_ignore_ascii_case(name))
                    .then_some(Stick::Right)
            })
    }
}

/// Analog stick position, 12 bits per axis.
///
/// Range: [0, 0xFFF], centered at 0x800. Positive Y points up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StickPosition {
    pub x: u16,
    pub y: u16,
}

impl StickPosition {
    pub const MIN: u16 = 0x000;
    pub const CENTER_VALUE: u16 = 0x800;
    pub const MAX: u16 = 0xFFF;

    pub const CENTER: Self = Self {
        x: Self::CENTER_VALUE,
        y: Self::CENTER_VALUE,
    };

    /// Create a position, clamping each axis to the 12-bit range.
    #[must_use]
    pub const fn new(x: u16, y: u16) -> Self {
        Self {
            x: if x > Self::MAX { Self::MAX } else { x },
            y: if y > Self::MAX { Self::MAX } else { y },
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_centered(self) -> bool {
        self.x == Self::CENTER_VALUE && self.y == Self::CENTER_VALUE
    }
}

impl Default for StickPosition {
    fn default() -> Self {
        Self::CENTER
    }
}

/// Canonical controller state read by the report builder every tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerState {
    pub buttons: Buttons,
    pub hat: Hat,
    pub left_stick: StickPosition,
    pub right_stick: StickPosition,
    pub vibration_enabled: bool,
}

impl ControllerState {
    /// No buttons pressed, hat neutral, sticks centered.
    #[must_use]
    pub const fn neutral() -> Self {
        Self {
            buttons: Buttons::NONE,
            hat: Hat::Neutral,
            left_stick: StickPosition::CENTER,
            right_stick: StickPosition::CENTER,
            vibration_enabled: false,
        }
    }

    /// Press a button. A d-pad direction replaces its opposite.
    pub fn hold(&mut self, button: Button) {
        match button.target() {
            ButtonTarget::Flag(flag) => self.buttons |= flag,
            ButtonTarget::Hat(dir) => {
                let held = self.hat.directions().0 & !dir.opposite().0;
                self.hat = Hat::from_directions(Directions(held | dir.0));
            }
        }
    }

    /// Release a button. Releasing something not held is a no-op.
    pub fn release(&mut self, button: Button) {
        match button.target() {
            ButtonTarget::Flag(flag) => self.buttons &= !flag,
            ButtonTarget::Hat(dir) => {
                let held = self.hat.directions().0 & !dir.0;
                self.hat = Hat::from_directions(Directions(held));
            }
        }
    }

    #[must_use]
    pub fn is_held(&self, button: Button) -> bool {
        match button.target() {
            ButtonTarget::Flag(flag) => self.buttons.contains(flag),
            ButtonTarget::Hat(dir) => self.hat.directions().contains(dir),
        }
    }

    /// Release every button and the d-pad.
    pub fn release_all(&mut self) {
        self.buttons = Buttons::NONE;
        self.hat = Hat::Neutral;
    }

    pub fn center_sticks(&mut self) {
        self.left_stick = StickPosition::CENTER;
        self.right_stick = StickPosition::CENTER;
    }

    pub fn set_stick(&mut self, stick: Stick, position: StickPosition) {
        match stick {
            Stick::Left => self.left_stick = position,
            Stick::Right => self.right_stick = position,
        }
    }

    #[must_use]
    pub const fn stick(&self, stick: Stick) -> StickPosition {
        match stick {
            Stick::Left => self.left_stick,
            Stick::Right => self.right_stick,
        }
    }

    /// True when nothing is held and both sticks rest at center.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.buttons.is_empty()
            && self.hat == Hat::Neutral
            && self.left_stick.is_centered()
            && self.right_stick.is_centered()
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Discoverability flag. Off at boot; only an explicit command enables it.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PairingState {
    discoverable: bool,
}

impl PairingState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            discoverable: false,
        }
    }

    pub fn enable(&mut self) {
        self.discoverable = true;
    }

    pub fn disable(&mut self) {
        self.discoverable = false;
    }

    #[inline]
    #[must_use]
    pub const fn is_discoverable(self) -> bool {
        self.discoverable
    }
}
