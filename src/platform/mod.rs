// src/platform/mod.rs
//
// Surface backends and the startup probe that picks one of them.

pub mod backends;
pub mod blit;

use crate::config::{BackendChoice, Config};
use crate::error::StartupError;
use crate::geometry::Geometry;
use anyhow::{anyhow, Result};
use backends::{BackendKind, Surface};
use log::*;

/// Backends to try, in order, for `choice`.
///
/// `Auto` prefers a running X server (`has_display`), then kernel
/// mode-setting, then the framebuffer. Off Linux only the native window exists.
pub fn candidates(choice: BackendChoice, has_display: bool) -> Vec<BackendKind> {
    match choice {
        BackendChoice::X11 => vec![BackendKind::X11],
        BackendChoice::Drm => vec![BackendKind::Drm],
        BackendChoice::Framebuffer => vec![BackendKind::Framebuffer],
        BackendChoice::Native => vec![BackendKind::Native],
        BackendChoice::Auto if cfg!(target_os = "linux") => {
            let mut kinds = Vec::with_capacity(3);
            if has_display {
                kinds.push(BackendKind::X11);
            }
            kinds.push(BackendKind::Drm);
            kinds.push(BackendKind::Framebuffer);
            kinds
        }
        BackendChoice::Auto => vec![BackendKind::Native],
    }
}

/// True if an X server is advertised in the environment.
pub fn display_available() -> bool {
    std::env::var_os("DISPLAY").is_some_and(|display| !display.is_empty())
}

#[cfg(target_os = "linux")]
fn build_surface(kind: BackendKind, config: &Config) -> Result<Box<dyn Surface>> {
    use backends::drm::DrmSurface;
    use backends::framebuffer::{self, FramebufferSurface};
    use backends::x11::X11Surface;

    let background = config.render.background;
    Ok(match kind {
        BackendKind::X11 => Box::new(X11Surface::new(config)),
        BackendKind::Drm => Box::new(DrmSurface::new(config.display.drm_card.clone(), background)),
        BackendKind::Framebuffer => Box::new(FramebufferSurface::new(
            framebuffer::device_path(&config.display.framebuffer_device),
            background,
        )),
        BackendKind::Native => return Err(anyhow!("not available on this platform")),
    })
}

#[cfg(not(target_os = "linux"))]
fn build_surface(kind: BackendKind, config: &Config) -> Result<Box<dyn Surface>> {
    match kind {
        BackendKind::Native => Ok(Box::new(backends::native::NativeSurface::new(config))),
        _ => Err(anyhow!("not available on this platform")),
    }
}

/// Opens and allocates the first backend that works.
///
/// Every failed attempt is recorded; if none succeeds the attempts are
/// reported together. A device whose rollback failed aborts the probe, since
/// the next backend would find the display in an unknown state.
pub fn open_surface(
    config: &Config,
    requested: Geometry,
) -> std::result::Result<Box<dyn Surface>, StartupError> {
    let kinds = candidates(config.display.backend, display_available());
    debug!("Surface candidates: {:?}", kinds);
    let mut attempts = Vec::with_capacity(kinds.len());

    for kind in kinds {
        let attempt = build_surface(kind, config).and_then(|mut surface| {
            let geometry = surface.allocate(requested)?;
            Ok((surface, geometry))
        });
        match attempt {
            Ok((surface, geometry)) => {
                info!("Using {} surface ({})", kind, geometry);
                return Ok(surface);
            }
            Err(e) => {
                if let Some(StartupError::Rollback { .. }) = e.downcast_ref::<StartupError>() {
                    error!("{}: {:#}", kind, e);
                    return Err(match e.downcast::<StartupError>() {
                        Ok(rollback) => rollback,
                        Err(e) => StartupError::NoSurface(vec![format!("{}: {:#}", kind, e)]),
                    });
                }
                warn!("{} backend unavailable: {:#}", kind, e);
                attempts.push(format!("{}: {:#}", kind, e));
            }
        }
    }
    Err(StartupError::NoSurface(attempts))
}
