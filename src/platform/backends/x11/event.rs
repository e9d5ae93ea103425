// src/platform/backends/x11/event.rs
#![allow(non_snake_case)] // Allow non-snake case for X11 types

use super::window::Window;
use crate::geometry::Geometry;
use crate::keys::{KeySymbol, MouseButton};
use crate::platform::backends::SurfaceEvent;

use log::trace;
use std::ptr;

use libc::{c_char, c_int};
use x11::{keysym, xlib};

/// Buffer size for text obtained from `XLookupString`.
const KEY_TEXT_BUFFER_SIZE: usize = 32;

/// Translates one X event into a `SurfaceEvent`.
///
/// Returns `None` for events the viewer does not react to, including
/// `Expose` events that are followed by more in the same series and
/// `ConfigureNotify` events that only moved the window.
pub fn translate(xevent: &mut xlib::XEvent, window: &mut Window) -> Option<SurfaceEvent> {
    match xevent.get_type() {
        xlib::Expose => {
            // SAFETY: the type tag is Expose.
            let expose = unsafe { xevent.expose };
            // Only the last Expose of a series triggers a repaint.
            (expose.count == 0).then_some(SurfaceEvent::Exposed)
        }
        xlib::ConfigureNotify => {
            // SAFETY: the type tag is ConfigureNotify.
            let configure = unsafe { xevent.configure };
            let geometry = Geometry::new(configure.width as u32, configure.height as u32);
            if window.update_geometry(geometry) {
                trace!("XEvent: ConfigureNotify resize to {}", geometry);
                Some(SurfaceEvent::Resized(geometry))
            } else {
                None
            }
        }
        xlib::KeyPress => {
            // SAFETY: the type tag is KeyPress.
            let key_event = unsafe { &mut xevent.key };
            let symbol = lookup_key(key_event);
            trace!("XEvent: KeyPress {:?}", symbol);
            Some(SurfaceEvent::Key(symbol))
        }
        xlib::ButtonRelease => {
            // SAFETY: the type tag is ButtonRelease.
            let button = unsafe { xevent.button };
            Some(SurfaceEvent::Button(MouseButton::from_number(button.button)))
        }
        xlib::ClientMessage => {
            // SAFETY: the type tag is ClientMessage.
            let message = unsafe { xevent.client_message };
            window
                .is_delete_request(&message)
                .then_some(SurfaceEvent::CloseRequested)
        }
        other => {
            trace!("XEvent: Ignored (type: {})", other);
            None
        }
    }
}

/// Runs `XLookupString` and maps the result to a `KeySymbol`.
pub fn lookup_key(key_event: &mut xlib::XKeyEvent) -> KeySymbol {
    let mut x_keysym: xlib::KeySym = 0;
    let mut key_text_buffer = [0u8; KEY_TEXT_BUFFER_SIZE];
    // SAFETY: the buffer length is passed along; no compose state is kept.
    let count = unsafe {
        xlib::XLookupString(
            key_event,
            key_text_buffer.as_mut_ptr() as *mut c_char,
            key_text_buffer.len() as c_int,
            &mut x_keysym,
            ptr::null_mut(),
        )
    };
    let text = if count > 0 {
        String::from_utf8_lossy(&key_text_buffer[..count as usize]).into_owned()
    } else {
        String::new()
    };
    xkeysym_to_keysymbol(x_keysym, &text)
}

/// Maps an X11 KeySym and the text `XLookupString` produced for it.
///
/// Named keys are matched on the keysym first, because `XLookupString` also
/// yields control characters for them (`\r` for Return, `\x1b` for Escape).
/// Anything else that produced a single character becomes `Char`, which is
/// how Ctrl-C arrives as `\x03`.
pub fn xkeysym_to_keysymbol(keysym_val: xlib::KeySym, text: &str) -> KeySymbol {
    if keysym_val <= u32::MAX as xlib::KeySym {
        let named = match keysym_val as u32 {
            keysym::XK_Return | keysym::XK_KP_Enter => Some(KeySymbol::Enter),
            keysym::XK_Escape => Some(KeySymbol::Escape),
            keysym::XK_Left | keysym::XK_KP_Left => Some(KeySymbol::Left),
            keysym::XK_Right | keysym::XK_KP_Right => Some(KeySymbol::Right),
            keysym::XK_Up | keysym::XK_KP_Up => Some(KeySymbol::Up),
            keysym::XK_Down | keysym::XK_KP_Down => Some(KeySymbol::Down),
            keysym::XK_Page_Up | keysym::XK_KP_Page_Up => Some(KeySymbol::PageUp),
            keysym::XK_Page_Down | keysym::XK_KP_Page_Down => Some(KeySymbol::PageDown),
            keysym::XK_Home | keysym::XK_KP_Home => Some(KeySymbol::Home),
            keysym::XK_End | keysym::XK_KP_End => Some(KeySymbol::End),
            keysym::XK_F11 => Some(KeySymbol::F11),
            keysym::XK_KP_Space => Some(KeySymbol::Char(' ')),
            _ => None,
        };
        if let Some(symbol) = named {
            return symbol;
        }
    }

    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '\u{FFFD}' => KeySymbol::Char(c),
        _ => {
            trace!(
                "Unhandled keysym 0x{:X} with text '{}', mapping to KeySymbol::Unknown",
                keysym_val,
                text
            );
            KeySymbol::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::CTRL_C;

    fn sym(value: u32) -> xlib::KeySym {
        value as xlib::KeySym
    }

    #[test]
    fn named_keys_win_over_control_text() {
        assert_eq!(xkeysym_to_keysymbol(sym(keysym::XK_Return), "\r"), KeySymbol::Enter);
        assert_eq!(
            xkeysym_to_keysymbol(sym(keysym::XK_Escape), "\u{1b}"),
            KeySymbol::Escape
        );
        assert_eq!(xkeysym_to_keysymbol(sym(keysym::XK_F11), ""), KeySymbol::F11);
        assert_eq!(
            xkeysym_to_keysymbol(sym(keysym::XK_Page_Down), ""),
            KeySymbol::PageDown
        );
    }

    #[test]
    fn printable_text_becomes_char() {
        assert_eq!(xkeysym_to_keysymbol(sym(keysym::XK_j), "j"), KeySymbol::Char('j'));
        assert_eq!(
            xkeysym_to_keysymbol(sym(keysym::XK_bracketright), "]"),
            KeySymbol::Char(']')
        );
        assert_eq!(xkeysym_to_keysymbol(sym(keysym::XK_space), " "), KeySymbol::Char(' '));
    }

    #[test]
    fn control_c_arrives_as_etx() {
        assert_eq!(
            xkeysym_to_keysymbol(sym(keysym::XK_c), "\u{3}"),
            KeySymbol::Char(CTRL_C)
        );
    }

    #[test]
    fn unknown_without_text() {
        assert_eq!(xkeysym_to_keysymbol(sym(keysym::XK_Shift_L), ""), KeySymbol::Unknown);
        assert_eq!(xkeysym_to_keysymbol(sym(keysym::XK_a), "ab"), KeySymbol::Unknown);
    }
}
