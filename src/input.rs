// src/input.rs

//! Input Event Router.
//!
//! Every backend reduces its raw input (X11 key events, bytes from a raw
//! terminal, native toolkit key codes, mouse buttons) to [`KeySymbol`] or
//! [`MouseButton`]. This module maps those to the small symbolic [`Command`]
//! set the session understands. The router has no state beyond the mapping.

use crate::keys::{KeySymbol, MouseButton, CTRL_C};
use log::trace;

/// Symbolic commands consumed by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Next,
    Prev,
    JumpForward,
    JumpBackward,
    First,
    Last,
    ToggleFullscreen,
    EmitCurrent,
    Quit,
}

/// Key binding table printed after the command-line help.
pub const KEY_BINDINGS: &str = "\
Key bindings:
  j / Right / PageDown / Space   Next image
  k / Left / PageUp              Previous image
  ] / [                          Jump forward / back (10 images by default)
  , / .                          First / last image
  f / F11                        Toggle fullscreen
  Enter                          Print the current source to stdout
  q / Escape / Ctrl-C            Quit
  Left / right mouse button      Next / previous image";

/// Maps a key to a command. Unbound keys return `None`.
pub fn route_key(symbol: KeySymbol) -> Option<Command> {
    let command = match symbol {
        KeySymbol::Char('j') | KeySymbol::Char(' ') | KeySymbol::Right | KeySymbol::PageDown => {
            Command::Next
        }
        KeySymbol::Char('k') | KeySymbol::Left | KeySymbol::PageUp => Command::Prev,
        KeySymbol::Char(']') => Command::JumpForward,
        KeySymbol::Char('[') => Command::JumpBackward,
        KeySymbol::Char(',') => Command::First,
        KeySymbol::Char('.') => Command::Last,
        KeySymbol::Char('f') | KeySymbol::F11 => Command::ToggleFullscreen,
        KeySymbol::Enter => Command::EmitCurrent,
        KeySymbol::Char('q') | KeySymbol::Escape | KeySymbol::Char(CTRL_C) => Command::Quit,
        _ => return None,
    };
    trace!("Key {:?} => {:?}", symbol, command);
    Some(command)
}

/// Maps a released mouse button to a command. Only Next/Prev are bound.
pub fn route_button(button: MouseButton) -> Option<Command> {
    match button {
        MouseButton::Left => Some(Command::Next),
        MouseButton::Right => Some(Command::Prev),
        _ => None,
    }
}

// --- Raw terminal decoding ---

const ESC: u8 = 0x1b;

/// Splits bytes read from a raw-mode terminal into key symbols.
///
/// Recognises CSI cursor keys (`ESC [ A..D`, `ESC [ H/F`), the VT paging keys
/// (`ESC [ 5 ~`, `ESC [ 6 ~`), a lone `ESC`, carriage return / line feed and
/// single-byte characters. Unknown escape sequences are consumed whole and
/// reported as `Unknown`.
pub fn decode_tty_bytes(bytes: &[u8]) -> Vec<KeySymbol> {
    let mut symbols = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i];
        if byte == ESC {
            if bytes.get(i + 1) == Some(&b'[') {
                let (symbol, consumed) = decode_csi(&bytes[i + 2..]);
                symbols.push(symbol);
                i += 2 + consumed;
            } else {
                symbols.push(KeySymbol::Escape);
                i += 1;
            }
            continue;
        }
        let symbol = match byte {
            b'\r' | b'\n' => KeySymbol::Enter,
            0x03 => KeySymbol::Char(CTRL_C),
            0x20..=0x7e => KeySymbol::Char(byte as char),
            _ => KeySymbol::Unknown,
        };
        symbols.push(symbol);
        i += 1;
    }
    symbols
}

/// Decodes the tail of a CSI sequence (after `ESC [`).
/// Returns the symbol and the number of bytes consumed.
fn decode_csi(rest: &[u8]) -> (KeySymbol, usize) {
    // Parameter bytes are 0x30..=0x3f, the final byte is 0x40..=0x7e.
    let params = rest.iter().take_while(|b| (0x30..=0x3f).contains(*b)).count();
    let Some(&final_byte) = rest.get(params) else {
        // Truncated sequence, e.g. a 3-byte read of `ESC [ 5`.
        let symbol = match &rest[..params] {
            b"5" => KeySymbol::PageUp,
            b"6" => KeySymbol::PageDown,
            _ => KeySymbol::Unknown,
        };
        return (symbol, params);
    };
    let symbol = match (&rest[..params], final_byte) {
        (b"", b'A') => KeySymbol::Up,
        (b"", b'B') => KeySymbol::Down,
        (b"", b'C') => KeySymbol::Right,
        (b"", b'D') => KeySymbol::Left,
        (b"", b'H') | (b"1", b'~') => KeySymbol::Home,
        (b"", b'F') | (b"4", b'~') => KeySymbol::End,
        (b"5", b'~') => KeySymbol::PageUp,
        (b"6", b'~') => KeySymbol::PageDown,
        _ => KeySymbol::Unknown,
    };
    (symbol, params + 1)
}
