// src/platform/backends/x11/connection.rs
#![allow(non_snake_case)] // Allow non-snake case for X11 types

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use std::ptr;

use libc::c_int;
use x11::xlib;

/// Represents and manages the connection to the X server.
///
/// Holds the `Display` pointer together with the default screen, visual and
/// depth, which are all the viewer needs to create a window and images.
/// The connection is closed when this struct is dropped; every window and
/// image created from it must be destroyed first.
#[derive(Debug)]
pub struct Connection {
    display: *mut xlib::Display,
    screen: c_int,
    visual: *mut xlib::Visual,
    depth: c_int,
}

impl Connection {
    /// Opens the display named by `$DISPLAY`.
    pub fn new() -> Result<Self> {
        info!("Establishing X11 server connection.");
        // SAFETY: NULL selects the DISPLAY environment variable.
        let display = unsafe { xlib::XOpenDisplay(ptr::null()) };
        if display.is_null() {
            return Err(anyhow!(
                "Failed to open X display. Check DISPLAY environment variable or X server status."
            ));
        }

        // SAFETY: display is a live connection.
        let (screen, visual, depth) = unsafe {
            let screen = xlib::XDefaultScreen(display);
            (
                screen,
                xlib::XDefaultVisual(display, screen),
                xlib::XDefaultDepth(display, screen),
            )
        };
        if visual.is_null() {
            // SAFETY: closing the connection we just opened.
            unsafe { xlib::XCloseDisplay(display) };
            return Err(anyhow!("Failed to get default visual"));
        }
        debug!(
            "X display {:p}: screen {}, depth {}",
            display, screen, depth
        );

        Ok(Connection {
            display,
            screen,
            visual,
            depth,
        })
    }

    #[inline]
    pub fn display(&self) -> *mut xlib::Display {
        self.display
    }

    #[inline]
    pub fn screen(&self) -> c_int {
        self.screen
    }

    #[inline]
    pub fn visual(&self) -> *mut xlib::Visual {
        self.visual
    }

    #[inline]
    pub fn depth(&self) -> c_int {
        self.depth
    }

    /// Channel masks of the default visual, used to pack pixels.
    pub fn visual_masks(&self) -> (u64, u64, u64) {
        // SAFETY: visual is non-null and owned by the display.
        unsafe {
            let visual = &*self.visual;
            (
                visual.red_mask as u64,
                visual.green_mask as u64,
                visual.blue_mask as u64,
            )
        }
    }

    pub fn root_window(&self) -> xlib::Window {
        // SAFETY: display and screen are valid.
        unsafe { xlib::XRootWindow(self.display, self.screen) }
    }

    /// Interns an atom, creating it if needed. `name` must be NUL-terminated.
    pub fn intern_atom(&self, name: &[u8]) -> xlib::Atom {
        debug_assert_eq!(name.last(), Some(&0));
        // SAFETY: name is NUL-terminated.
        unsafe { xlib::XInternAtom(self.display, name.as_ptr().cast(), xlib::False) }
    }

    pub fn flush(&self) {
        // SAFETY: display is valid.
        unsafe { xlib::XFlush(self.display) };
    }

    pub fn sync(&self) {
        // SAFETY: display is valid.
        unsafe { xlib::XSync(self.display, xlib::False) };
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.display.is_null() {
            info!("Closing X11 display connection: {:p}", self.display);
            // SAFETY: closed exactly once.
            let status = unsafe { xlib::XCloseDisplay(self.display) };
            if status != 0 {
                warn!("XCloseDisplay returned non-zero status: {}", status);
            }
        }
    }
}
