// src/platform/backends/drm/lifecycle.rs

//! Resource Lifecycle Manager for the mode-setting backend.
//!
//! For every connected output this acquires, in order: the saved CRTC
//! configuration, a dumb buffer, a framebuffer object wrapping it, a CPU
//! mapping of the buffer, and finally the CRTC itself. Startup is
//! all-or-nothing. If any step of any output fails, the resources of that
//! output acquired so far and of every output configured before it are
//! released in reverse order, and the CRTCs are put back as they were.
//!
//! The kernel side is abstracted behind [`ModesetDevice`] so the rollback
//! logic can be exercised against a fake device.

use super::ffi::drm_mode_modeinfo;
use crate::codec::RasterImage;
use crate::error::StartupError;
use crate::geometry::{Geometry, Placement};
use crate::platform::blit::{compose, PixelLayout};
use anyhow::{anyhow, bail, Result};
use log::{debug, error, info, warn};

/// Bits per pixel of every dumb buffer we create (XRGB8888).
pub const DUMB_BPP: u32 = 32;

/// A connector with the CRTC and mode chosen for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    pub connector_id: u32,
    pub crtc_id: u32,
    pub mode: drm_mode_modeinfo,
}

impl Output {
    pub fn size(&self) -> (u32, u32) {
        (self.mode.hdisplay as u32, self.mode.vdisplay as u32)
    }
}

/// The CRTC configuration found before we touched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedCrtc {
    pub crtc_id: u32,
    pub fb_id: u32,
    pub x: u32,
    pub y: u32,
    /// `None` if the CRTC was disabled.
    pub mode: Option<drm_mode_modeinfo>,
}

/// A kernel-allocated, CPU-addressable pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumbBuffer {
    pub handle: u32,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub size: u64,
}

/// Request to program a CRTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrtcConfig {
    pub crtc_id: u32,
    pub fb_id: u32,
    pub x: u32,
    pub y: u32,
    pub connectors: Vec<u32>,
    /// `None` disables the CRTC.
    pub mode: Option<drm_mode_modeinfo>,
}

impl CrtcConfig {
    /// The configuration that puts `saved` back on `connector_id`.
    pub fn restoring(saved: &SavedCrtc, connector_id: u32) -> Self {
        match saved.mode {
            Some(mode) => CrtcConfig {
                crtc_id: saved.crtc_id,
                fb_id: saved.fb_id,
                x: saved.x,
                y: saved.y,
                connectors: vec![connector_id],
                mode: Some(mode),
            },
            None => CrtcConfig {
                crtc_id: saved.crtc_id,
                fb_id: 0,
                x: 0,
                y: 0,
                connectors: Vec::new(),
                mode: None,
            },
        }
    }
}

/// Kernel mode-setting operations needed to show dumb buffers.
pub trait ModesetDevice {
    /// A live CPU mapping of a dumb buffer.
    type Mapping: AsMut<[u8]>;

    fn supports_dumb_buffers(&self) -> Result<bool>;
    /// Connected outputs, each with a distinct CRTC and its preferred mode.
    fn outputs(&self) -> Result<Vec<Output>>;
    fn get_crtc(&self, crtc_id: u32) -> Result<SavedCrtc>;
    fn create_dumb(&mut self, width: u32, height: u32, bpp: u32) -> Result<DumbBuffer>;
    fn add_framebuffer(&mut self, buffer: &DumbBuffer) -> Result<u32>;
    fn map_dumb(&mut self, buffer: &DumbBuffer) -> Result<Self::Mapping>;
    fn set_crtc(&mut self, config: &CrtcConfig) -> Result<()>;
    fn unmap(&mut self, mapping: Self::Mapping) -> Result<()>;
    fn remove_framebuffer(&mut self, fb_id: u32) -> Result<()>;
    fn destroy_dumb(&mut self, handle: u32) -> Result<()>;
}

/// Everything owned for one configured output.
pub struct DisplayResource<M> {
    pub output: Output,
    pub saved: SavedCrtc,
    pub buffer: DumbBuffer,
    pub fb_id: u32,
    mapping: M,
}

/// Resources of an output whose setup has not finished yet. Every field is
/// set as soon as the matching kernel object exists.
struct PartialResource<M> {
    output: Output,
    saved: Option<SavedCrtc>,
    buffer: Option<DumbBuffer>,
    fb_id: Option<u32>,
    mapping: Option<M>,
    crtc_touched: bool,
}

impl<M> PartialResource<M> {
    fn new(output: Output) -> Self {
        PartialResource {
            output,
            saved: None,
            buffer: None,
            fb_id: None,
            mapping: None,
            crtc_touched: false,
        }
    }
}

/// Owns the configured outputs and the device; releases both exactly once.
pub struct ResourceManager<D: ModesetDevice> {
    device: D,
    resources: Vec<DisplayResource<D::Mapping>>,
    released: bool,
}

impl<D: ModesetDevice> ResourceManager<D> {
    /// Configures every connected output, or none of them.
    pub fn acquire(mut device: D) -> Result<Self> {
        if !device.supports_dumb_buffers()? {
            bail!("device does not support dumb buffers");
        }
        let outputs = device.outputs()?;
        if outputs.is_empty() {
            bail!("no connected outputs");
        }

        let mut resources: Vec<DisplayResource<D::Mapping>> = Vec::with_capacity(outputs.len());
        for (index, output) in outputs.into_iter().enumerate() {
            let mut partial = PartialResource::new(output);
            match configure_output(&mut device, &mut partial) {
                Ok(resource) => {
                    debug!(
                        "Output {}: connector {} on CRTC {} at {}x{} (fb {})",
                        index,
                        resource.output.connector_id,
                        resource.output.crtc_id,
                        resource.buffer.width,
                        resource.buffer.height,
                        resource.fb_id
                    );
                    resources.push(resource);
                }
                Err(cause) => {
                    let cause = cause.context(format!(
                        "failed to configure output {} (connector {})",
                        index, output.connector_id
                    ));
                    warn!("{:#}; rolling back {} configured outputs", cause, resources.len());
                    let mut failures = Vec::new();
                    rollback_partial(&mut device, partial, &mut failures);
                    while let Some(resource) = resources.pop() {
                        release_resource(&mut device, resource, &mut failures);
                    }
                    if failures.is_empty() {
                        return Err(cause);
                    }
                    for failure in &failures {
                        error!("Rollback: {}", failure);
                    }
                    return Err(StartupError::Rollback {
                        cause,
                        rollback: failures,
                    }
                    .into());
                }
            }
        }

        info!("Configured {} output(s)", resources.len());
        Ok(ResourceManager {
            device,
            resources,
            released: false,
        })
    }

    /// The largest size that fits on every output.
    pub fn geometry(&self) -> Geometry {
        let width = self.resources.iter().map(|r| r.buffer.width).min();
        let height = self.resources.iter().map(|r| r.buffer.height).min();
        match (width, height) {
            (Some(width), Some(height)) => Geometry::new(width, height),
            _ => Geometry::default(),
        }
    }

    pub fn output_count(&self) -> usize {
        self.resources.len()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// The CPU view of one output's buffer.
    #[cfg(test)]
    pub fn mapping(&mut self, output: usize) -> Option<&mut [u8]> {
        self.resources.get_mut(output).map(|r| r.mapping.as_mut())
    }

    /// Mirrors the image to every output, centered on each.
    pub fn present(&mut self, image: &RasterImage, background: [u8; 3]) -> Result<()> {
        if self.released || self.resources.is_empty() {
            bail!("display resources are released");
        }
        for resource in &mut self.resources {
            let buffer = resource.buffer;
            let mapping = resource.mapping.as_mut();
            let needed = buffer.pitch as usize * buffer.height as usize;
            if mapping.len() < needed {
                bail!(
                    "mapping of dumb buffer {} is {} bytes, expected at least {}",
                    buffer.handle,
                    mapping.len(),
                    needed
                );
            }
            let geometry = Geometry::new(buffer.width, buffer.height);
            compose(
                mapping,
                buffer.pitch as usize,
                geometry,
                &PixelLayout::XRGB8888,
                image,
                Placement::centered(image.dimensions(), geometry),
                background,
            );
        }
        Ok(())
    }

    /// Restores every CRTC and frees every buffer. Idempotent.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let mut failures = Vec::new();
        while let Some(resource) = self.resources.pop() {
            release_resource(&mut self.device, resource, &mut failures);
        }
        if failures.is_empty() {
            info!("Display resources released");
            Ok(())
        } else {
            Err(anyhow!(
                "failed to release display resources: {}",
                failures.join("; ")
            ))
        }
    }
}

impl<D: ModesetDevice> Drop for ResourceManager<D> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("ResourceManager: {:#}", e);
        }
    }
}

fn configure_output<D: ModesetDevice>(
    device: &mut D,
    partial: &mut PartialResource<D::Mapping>,
) -> Result<DisplayResource<D::Mapping>> {
    let output = partial.output;
    let (width, height) = output.size();

    let saved = device.get_crtc(output.crtc_id)?;
    partial.saved = Some(saved);
    let buffer = device.create_dumb(width, height, DUMB_BPP)?;
    partial.buffer = Some(buffer);
    let fb_id = device.add_framebuffer(&buffer)?;
    partial.fb_id = Some(fb_id);
    let mut mapping = device.map_dumb(&buffer)?;
    mapping.as_mut().fill(0);

    partial.crtc_touched = true;
    let programmed = device.set_crtc(&CrtcConfig {
        crtc_id: output.crtc_id,
        fb_id,
        x: 0,
        y: 0,
        connectors: vec![output.connector_id],
        mode: Some(output.mode),
    });
    if let Err(e) = programmed {
        partial.mapping = Some(mapping);
        return Err(e);
    }
    Ok(DisplayResource {
        output,
        saved,
        buffer,
        fb_id,
        mapping,
    })
}

/// Frees whatever a failed output acquired, newest first.
fn rollback_partial<D: ModesetDevice>(
    device: &mut D,
    partial: PartialResource<D::Mapping>,
    failures: &mut Vec<String>,
) {
    let connector_id = partial.output.connector_id;
    if partial.crtc_touched {
        if let Some(saved) = &partial.saved {
            record(
                failures,
                format!("restore CRTC {}", saved.crtc_id),
                device.set_crtc(&CrtcConfig::restoring(saved, connector_id)),
            );
        }
    }
    if let Some(mapping) = partial.mapping {
        record(failures, "unmap dumb buffer".to_string(), device.unmap(mapping));
    }
    if let Some(fb_id) = partial.fb_id {
        record(
            failures,
            format!("remove framebuffer {}", fb_id),
            device.remove_framebuffer(fb_id),
        );
    }
    if let Some(buffer) = partial.buffer {
        record(
            failures,
            format!("destroy dumb buffer {}", buffer.handle),
            device.destroy_dumb(buffer.handle),
        );
    }
}

fn release_resource<D: ModesetDevice>(
    device: &mut D,
    resource: DisplayResource<D::Mapping>,
    failures: &mut Vec<String>,
) {
    debug!(
        "Releasing output on CRTC {} (fb {}, handle {})",
        resource.output.crtc_id, resource.fb_id, resource.buffer.handle
    );
    rollback_partial(
        device,
        PartialResource {
            output: resource.output,
            saved: Some(resource.saved),
            buffer: Some(resource.buffer),
            fb_id: Some(resource.fb_id),
            mapping: Some(resource.mapping),
            crtc_touched: true,
        },
        failures,
    );
}

fn record(failures: &mut Vec<String>, what: String, result: Result<()>) {
    if let Err(e) = result {
        failures.push(format!("{}: {:#}", what, e));
    }
}
