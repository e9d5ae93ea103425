// src/keys.rs

/// Represents a key symbol, independent of the backend that produced it.
///
/// Only keys the viewer can react to get their own variant; everything
/// printable arrives as `Char`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeySymbol {
    // Alphanumeric keys
    Char(char),

    // Function keys
    F11,

    // Navigation keys
    Left,
    Right,
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,

    // Other common keys
    Enter,
    Escape,

    // Unidentified key
    #[default]
    Unknown,
}

/// Represents mouse buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    Other(u8),
}

impl MouseButton {
    /// Maps a conventional 1-based button number (X11 `Button1`..) to a button.
    pub fn from_number(number: u32) -> MouseButton {
        match number {
            1 => MouseButton::Left,
            2 => MouseButton::Middle,
            3 => MouseButton::Right,
            n => MouseButton::Other(n.min(u8::MAX as u32) as u8),
        }
    }
}

/// Control character emitted by Ctrl-C in a raw terminal.
pub const CTRL_C: char = '\u{3}';
