// src/platform/backends/native.rs

//! Native window backend for platforms without X11 or a Linux console,
//! built on `minifb`.
//!
//! `minifb` has no blocking event wait, so `wait_event` polls the window at
//! its target frame rate and synthesizes press and release edges itself.

use super::{BackendKind, Frame, Surface, SurfaceEvent};
use crate::config::Config;
use crate::error::PresentError;
use crate::geometry::Geometry;
use crate::keys::{KeySymbol, MouseButton, CTRL_C};
use crate::platform::blit::{compose, PixelLayout};
use anyhow::{anyhow, Context, Result};
use log::{debug, info, trace};
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use std::collections::VecDeque;

const TARGET_FPS: usize = 60;

/// Maps a `minifb` key to a key symbol. `ctrl` reports a held Control key.
pub fn key_to_keysymbol(key: Key, ctrl: bool) -> KeySymbol {
    match key {
        Key::C if ctrl => KeySymbol::Char(CTRL_C),
        Key::J => KeySymbol::Char('j'),
        Key::K => KeySymbol::Char('k'),
        Key::F => KeySymbol::Char('f'),
        Key::Q => KeySymbol::Char('q'),
        Key::Space => KeySymbol::Char(' '),
        Key::LeftBracket => KeySymbol::Char('['),
        Key::RightBracket => KeySymbol::Char(']'),
        Key::Comma => KeySymbol::Char(','),
        Key::Period => KeySymbol::Char('.'),
        Key::Enter | Key::NumPadEnter => KeySymbol::Enter,
        Key::Escape => KeySymbol::Escape,
        Key::Left => KeySymbol::Left,
        Key::Right => KeySymbol::Right,
        Key::Up => KeySymbol::Up,
        Key::Down => KeySymbol::Down,
        Key::PageUp => KeySymbol::PageUp,
        Key::PageDown => KeySymbol::PageDown,
        Key::Home => KeySymbol::Home,
        Key::End => KeySymbol::End,
        Key::F11 => KeySymbol::F11,
        _ => KeySymbol::Unknown,
    }
}

fn update_window(window: &mut Window, pixels: &[u32], size: Geometry) -> Result<()> {
    window
        .update_with_buffer(pixels, size.width as usize, size.height as usize)
        .map_err(|e| anyhow!("failed to update window with {} buffer: {}", size, e))
}

pub struct NativeSurface {
    min_size: Geometry,
    background: [u8; 3],
    window: Option<Window>,
    /// The buffer currently bound to the window, with the size it was
    /// composed for. A resize does not change it; only the next present does.
    bound: Option<(Vec<u32>, Geometry)>,
    geometry: Geometry,
    pending: VecDeque<SurfaceEvent>,
    left_down: bool,
    right_down: bool,
}

impl NativeSurface {
    pub fn new(config: &Config) -> Self {
        NativeSurface {
            min_size: Geometry::new(config.window.min_width, config.window.min_height),
            background: config.render.background,
            window: None,
            bound: None,
            geometry: Geometry::default(),
            pending: VecDeque::new(),
            left_down: false,
            right_down: false,
        }
    }

    /// Disposes of the bound buffer, then binds `buffer` in its place.
    ///
    /// `minifb` copies the pixels on every update, so the old buffer is no
    /// longer referenced by the window once the next one is handed over.
    fn bind(&mut self, buffer: Vec<u32>, geometry: Geometry) -> Result<()> {
        let window = self.window.as_mut().context("native window is not open")?;
        drop(self.bound.take());
        let (pixels, size) = self.bound.insert((buffer, geometry));
        update_window(window, pixels, *size)
    }

    /// Pumps the window once and queues whatever happened.
    fn poll(&mut self) -> Result<()> {
        let window = self.window.as_mut().context("native window is not open")?;
        match &self.bound {
            // minifb stretches a smaller buffer to the window.
            Some((pixels, size)) => update_window(window, pixels, *size)?,
            None => window.update(),
        }

        if !window.is_open() {
            self.pending.push_back(SurfaceEvent::CloseRequested);
            return Ok(());
        }

        let (width, height) = window.get_size();
        let size = Geometry::new(width as u32, height as u32);
        if size != self.geometry && !size.is_empty() {
            trace!("Native window resized to {}", size);
            self.pending.push_back(SurfaceEvent::Resized(size));
        }

        let ctrl = window.is_key_down(Key::LeftCtrl) || window.is_key_down(Key::RightCtrl);
        for key in window.get_keys_pressed(KeyRepeat::No) {
            let symbol = key_to_keysymbol(key, ctrl);
            if symbol != KeySymbol::Unknown {
                self.pending.push_back(SurfaceEvent::Key(symbol));
            }
        }

        // Buttons fire on release, as on X11.
        let left = window.get_mouse_down(minifb::MouseButton::Left);
        let right = window.get_mouse_down(minifb::MouseButton::Right);
        if self.left_down && !left {
            self.pending.push_back(SurfaceEvent::Button(MouseButton::Left));
        }
        if self.right_down && !right {
            self.pending.push_back(SurfaceEvent::Button(MouseButton::Right));
        }
        self.left_down = left;
        self.right_down = right;
        Ok(())
    }
}

impl Surface for NativeSurface {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn allocate(&mut self, requested: Geometry) -> Result<Geometry> {
        let geometry = Geometry::new(
            requested.width.max(self.min_size.width),
            requested.height.max(self.min_size.height),
        );
        let mut window = Window::new(
            "core-view",
            geometry.width as usize,
            geometry.height as usize,
            WindowOptions {
                resize: true,
                ..WindowOptions::default()
            },
        )
        .map_err(|e| anyhow!("failed to open native window: {}", e))?;
        window.set_target_fps(TARGET_FPS);
        self.window = Some(window);
        self.geometry = geometry;
        info!("Native window opened at {}", geometry);
        Ok(geometry)
    }

    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn present(&mut self, frame: &Frame<'_>) -> std::result::Result<(), PresentError> {
        let geometry = self.geometry;
        let stride = geometry.width as usize * 4;
        let mut bytes = vec![0u8; stride * geometry.height as usize];
        compose(
            &mut bytes,
            stride,
            geometry,
            &PixelLayout::XRGB8888,
            frame.image,
            frame.placement,
            self.background,
        );
        let buffer: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|px| u32::from_le_bytes([px[0], px[1], px[2], px[3]]))
            .collect();

        if let Some(window) = self.window.as_mut() {
            window.set_title(&format!(
                "core-view [{} of {}] - {}",
                frame.index + 1,
                frame.total,
                frame.source_id
            ));
        }
        self.bind(buffer, geometry).map_err(PresentError::recoverable)
    }

    fn resize(&mut self, geometry: Geometry) -> Result<()> {
        debug!("Native window: {} -> {}", self.geometry, geometry);
        self.geometry = geometry;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.bound = None;
        if self.window.take().is_some() {
            info!("Native window closed");
        }
        Ok(())
    }

    fn wait_event(&mut self) -> Result<SurfaceEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }
            self.poll()?;
        }
    }
}
