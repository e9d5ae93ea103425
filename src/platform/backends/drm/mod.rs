// src/platform/backends/drm/mod.rs

//! Direct kernel mode-setting backend.
//!
//! Every connected output gets its own dumb buffer and CRTC; the same frame
//! is mirrored to all of them. Keyboard input comes from the controlling
//! terminal in raw mode.

pub mod device;
pub mod ffi;
pub mod lifecycle;

use self::device::CardDevice;
use self::lifecycle::ResourceManager;
use super::tty::RawTty;
use super::{BackendKind, Frame, Surface, SurfaceEvent};
use crate::error::PresentError;
use crate::geometry::Geometry;
use anyhow::{Context, Result};
use log::{error, info};
use std::path::PathBuf;

pub struct DrmSurface {
    card: PathBuf,
    background: [u8; 3],
    outputs: Option<ResourceManager<CardDevice>>,
    tty: Option<RawTty>,
    geometry: Geometry,
}

impl DrmSurface {
    pub fn new(card: PathBuf, background: [u8; 3]) -> Self {
        DrmSurface {
            card,
            background,
            outputs: None,
            tty: None,
            geometry: Geometry::default(),
        }
    }
}

impl Surface for DrmSurface {
    fn kind(&self) -> BackendKind {
        BackendKind::Drm
    }

    fn allocate(&mut self, _requested: Geometry) -> Result<Geometry> {
        info!("DRM: allocating on {}", self.card.display());
        let device = CardDevice::open(&self.card)?;
        let outputs = ResourceManager::acquire(device)
            .with_context(|| format!("mode-setting on {} failed", self.card.display()))?;
        self.geometry = outputs.geometry();
        self.outputs = Some(outputs);

        match RawTty::open() {
            Ok(tty) => self.tty = Some(tty),
            Err(e) => {
                if let Err(release_err) = self.release() {
                    error!("DRM: {:#}", release_err);
                }
                return Err(e.context("DRM backend needs a terminal for input"));
            }
        }
        info!("DRM: surface is {}", self.geometry);
        Ok(self.geometry)
    }

    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn present(&mut self, frame: &Frame<'_>) -> std::result::Result<(), PresentError> {
        let result = match self.outputs.as_mut() {
            Some(outputs) => outputs.present(frame.image, self.background),
            None => Err(anyhow::anyhow!("DRM surface is not allocated")),
        };
        if let Err(e) = result {
            // The outputs are in an unknown state; hand them back before failing.
            if let Err(release_err) = self.release() {
                error!("DRM: {:#}", release_err);
            }
            return Err(PresentError::fatal(e));
        }
        Ok(())
    }

    fn resize(&mut self, _geometry: Geometry) -> Result<()> {
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let tty_result = match self.tty.as_mut() {
            Some(tty) => tty.restore(),
            None => Ok(()),
        };
        self.tty = None;
        if let Some(mut outputs) = self.outputs.take() {
            outputs.release()?;
            info!("DRM: released {}", self.card.display());
        }
        tty_result
    }

    fn wait_event(&mut self) -> Result<SurfaceEvent> {
        let tty = self
            .tty
            .as_mut()
            .context("DRM surface has no terminal")?;
        Ok(match tty.next_key()? {
            Some(key) => SurfaceEvent::Key(key),
            None => SurfaceEvent::CloseRequested,
        })
    }
}

impl Drop for DrmSurface {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("DrmSurface: error during release in drop: {:#}", e);
        }
    }
}
