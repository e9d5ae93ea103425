// src/platform/backends/x11/window.rs
#![allow(non_snake_case)] // Allow non-snake case for X11 types

use super::connection::Connection;
use crate::geometry::Geometry;
use anyhow::{anyhow, Context, Result};
use log::{debug, info, trace, warn};
use std::ffi::CString;
use std::mem;
use std::ptr;

use libc::{c_char, c_int, c_long, c_uint};
use x11::xlib;

/// `_NET_WM_STATE` client message action that flips a state.
const NET_WM_STATE_TOGGLE: c_long = 2;

/// Atoms used to talk to the window manager.
#[derive(Debug, Clone, Copy)]
struct WmAtoms {
    protocols: xlib::Atom,
    delete_window: xlib::Atom,
    net_wm_name: xlib::Atom,
    utf8_string: xlib::Atom,
    net_wm_state: xlib::Atom,
    net_wm_state_fullscreen: xlib::Atom,
}

impl WmAtoms {
    fn intern(connection: &Connection) -> Self {
        WmAtoms {
            protocols: connection.intern_atom(b"WM_PROTOCOLS\0"),
            delete_window: connection.intern_atom(b"WM_DELETE_WINDOW\0"),
            net_wm_name: connection.intern_atom(b"_NET_WM_NAME\0"),
            utf8_string: connection.intern_atom(b"UTF8_STRING\0"),
            net_wm_state: connection.intern_atom(b"_NET_WM_STATE\0"),
            net_wm_state_fullscreen: connection.intern_atom(b"_NET_WM_STATE_FULLSCREEN\0"),
        }
    }
}

/// The viewer's top-level window.
///
/// Cleanup is explicit through [`Window::destroy`], which must run before the
/// `Connection` is closed.
#[derive(Debug)]
pub struct Window {
    id: xlib::Window,
    gc: xlib::GC,
    atoms: WmAtoms,
    geometry: Geometry,
}

impl Window {
    /// Creates, configures and maps a window of `geometry`.
    ///
    /// The window is typed as a dialog so tiling window managers float it at
    /// its requested size, and never shrinks below `min`.
    pub fn new(
        connection: &Connection,
        geometry: Geometry,
        min: Geometry,
        background: [u8; 3],
    ) -> Result<Self> {
        info!("Creating X11 window: {}", geometry);
        let display = connection.display();
        let [r, g, b] = background;
        let bg_pixel = ((r as u64) << 16) | ((g as u64) << 8) | b as u64;

        // SAFETY: Xlib calls on a live connection.
        let id = unsafe {
            let mut attributes: xlib::XSetWindowAttributes = mem::zeroed();
            attributes.background_pixel = bg_pixel;
            attributes.event_mask = xlib::ExposureMask
                | xlib::KeyPressMask
                | xlib::ButtonReleaseMask
                | xlib::StructureNotifyMask;

            xlib::XCreateWindow(
                display,
                connection.root_window(),
                0,
                0,
                geometry.width.max(1) as c_uint,
                geometry.height.max(1) as c_uint,
                0,
                connection.depth(),
                xlib::InputOutput as c_uint,
                connection.visual(),
                xlib::CWBackPixel | xlib::CWEventMask,
                &mut attributes,
            )
        };
        if id == 0 {
            return Err(anyhow!("XCreateWindow failed"));
        }

        // SAFETY: id is the window just created.
        let gc = unsafe { xlib::XCreateGC(display, id, 0, ptr::null_mut()) };
        if gc.is_null() {
            // SAFETY: destroying the window created above.
            unsafe { xlib::XDestroyWindow(display, id) };
            return Err(anyhow!("XCreateGC failed for window ID {}", id));
        }

        let window = Window {
            id,
            gc,
            atoms: WmAtoms::intern(connection),
            geometry,
        };
        window.setup_protocols_and_hints(connection, min);
        // SAFETY: mapping our own window.
        unsafe { xlib::XMapWindow(display, id) };
        connection.flush();
        debug!("X window {} mapped", id);
        Ok(window)
    }

    /// Registers `WM_DELETE_WINDOW`, the dialog window type and min-size hints.
    fn setup_protocols_and_hints(&self, connection: &Connection, min: Geometry) {
        let display = connection.display();
        // SAFETY: Xlib calls on our own window with interned atoms.
        unsafe {
            let mut protocols = [self.atoms.delete_window];
            if xlib::XSetWMProtocols(display, self.id, protocols.as_mut_ptr(), 1) == 0 {
                warn!("Failed to register WM_DELETE_WINDOW. Window close events might not be received.");
            }

            let window_type = connection.intern_atom(b"_NET_WM_WINDOW_TYPE\0");
            let dialog = connection.intern_atom(b"_NET_WM_WINDOW_TYPE_DIALOG\0");
            xlib::XChangeProperty(
                display,
                self.id,
                window_type,
                xlib::XA_ATOM,
                32,
                xlib::PropModeReplace,
                &dialog as *const xlib::Atom as *const u8,
                1,
            );

            let mut size_hints: xlib::XSizeHints = mem::zeroed();
            size_hints.flags = xlib::PMinSize;
            size_hints.min_width = min.width as c_int;
            size_hints.min_height = min.height as c_int;
            xlib::XSetWMNormalHints(display, self.id, &mut size_hints);
        }
        debug!("WM protocols and hints set (min {}).", min);
    }

    #[inline]
    pub fn id(&self) -> xlib::Window {
        self.id
    }

    #[inline]
    pub fn gc(&self) -> xlib::GC {
        self.gc
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Records a size reported by `ConfigureNotify`. Returns true if it changed.
    pub fn update_geometry(&mut self, geometry: Geometry) -> bool {
        if geometry == self.geometry || geometry.is_empty() {
            return false;
        }
        self.geometry = geometry;
        true
    }

    /// True if `event` is a `WM_DELETE_WINDOW` request for this window.
    pub fn is_delete_request(&self, event: &xlib::XClientMessageEvent) -> bool {
        event.message_type == self.atoms.protocols
            && event.data.get_long(0) as xlib::Atom == self.atoms.delete_window
    }

    /// Sets the title via `XStoreName` and the UTF-8 `_NET_WM_NAME`.
    pub fn set_title(&self, connection: &Connection, title: &str) -> Result<()> {
        trace!("Setting window title to '{}'", title);
        let display = connection.display();
        let title_c_str = CString::new(title.replace('\0', ""))
            .context("Failed to create CString for title")?;
        // SAFETY: Xlib calls on our own window.
        unsafe {
            xlib::XStoreName(display, self.id, title_c_str.as_ptr() as *mut c_char);
            if self.atoms.net_wm_name != 0 && self.atoms.utf8_string != 0 {
                xlib::XChangeProperty(
                    display,
                    self.id,
                    self.atoms.net_wm_name,
                    self.atoms.utf8_string,
                    8,
                    xlib::PropModeReplace,
                    title_c_str.as_ptr() as *const u8,
                    title_c_str.as_bytes().len() as c_int,
                );
            }
        }
        connection.flush();
        Ok(())
    }

    /// Asks the window manager to flip `_NET_WM_STATE_FULLSCREEN`.
    pub fn toggle_fullscreen(&self, connection: &Connection) -> Result<()> {
        // SAFETY: a client message to the root window, as EWMH prescribes.
        let status = unsafe {
            let mut event: xlib::XEvent = mem::zeroed();
            event.client_message.type_ = xlib::ClientMessage;
            event.client_message.window = self.id;
            event.client_message.message_type = self.atoms.net_wm_state;
            event.client_message.format = 32;
            event.client_message.data.set_long(0, NET_WM_STATE_TOGGLE);
            event
                .client_message
                .data
                .set_long(1, self.atoms.net_wm_state_fullscreen as c_long);
            event.client_message.data.set_long(2, 0);
            event.client_message.data.set_long(3, 1);
            xlib::XSendEvent(
                connection.display(),
                connection.root_window(),
                xlib::False,
                xlib::SubstructureRedirectMask | xlib::SubstructureNotifyMask,
                &mut event,
            )
        };
        if status == 0 {
            return Err(anyhow!("XSendEvent for _NET_WM_STATE failed"));
        }
        connection.flush();
        debug!("Requested fullscreen toggle for window {}", self.id);
        Ok(())
    }

    /// Frees the GC and destroys the window. Idempotent.
    pub fn destroy(&mut self, connection: &Connection) {
        let display = connection.display();
        // SAFETY: each resource is freed once and then forgotten.
        unsafe {
            if !self.gc.is_null() {
                xlib::XFreeGC(display, self.gc);
                self.gc = ptr::null_mut();
            }
            if self.id != 0 {
                xlib::XDestroyWindow(display, self.id);
                self.id = 0;
            }
        }
        debug!("X window destroyed");
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        if self.id != 0 {
            warn!(
                "Window (ID: {}) dropped without explicit destroy. X resources may leak.",
                self.id
            );
        }
    }
}
