// src/platform/backends/mod.rs

//! Defines the `Surface` trait implemented by every display backend (X11,
//! DRM/KMS, Linux framebuffer, native window) and the types that flow across
//! it: the [`Frame`] handed to `present` and the [`SurfaceEvent`]s a backend
//! reports from its event loop.

use crate::codec::RasterImage;
use crate::error::PresentError;
use crate::geometry::{Geometry, Placement};
pub use crate::keys::{KeySymbol, MouseButton};
use anyhow::Result;

#[cfg(test)]
pub mod mock;

#[cfg(target_os = "linux")]
pub mod drm;
#[cfg(target_os = "linux")]
pub mod framebuffer;
#[cfg(not(target_os = "linux"))]
pub mod native;
#[cfg(target_os = "linux")]
pub mod tty;
#[cfg(target_os = "linux")]
pub mod x11;

/// Which backend a surface belongs to. Used for logging and probe reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    X11,
    Drm,
    Framebuffer,
    Native,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::X11 => "x11",
            BackendKind::Drm => "drm",
            BackendKind::Framebuffer => "framebuffer",
            BackendKind::Native => "native",
        };
        f.write_str(name)
    }
}

/// A scaled raster ready to be composited, with enough context for backends
/// that decorate the output (window titles).
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Pixels already scaled to fit the surface.
    pub image: &'a RasterImage,
    /// Where `image` sits on the surface.
    pub placement: Placement,
    /// Path or URL the frame was decoded from.
    pub source_id: &'a str,
    /// Zero-based position in the image list.
    pub index: usize,
    pub total: usize,
    /// Dimensions of the decoded image before scaling.
    pub original_size: (u32, u32),
}

/// Input and window-system notifications produced by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Key(KeySymbol),
    Button(MouseButton),
    /// The output changed size. The session resizes the surface and rescales.
    Resized(Geometry),
    /// The window system discarded our pixels; the last frame must be shown again.
    Exposed,
    /// The window was closed by the user or window manager.
    CloseRequested,
}

/// Capability interface shared by all display backends.
///
/// A backend is constructed unallocated, then `allocate`d once. `release`
/// must be safe to call at any point, including after a failed `allocate`,
/// and must be idempotent: the session calls it on quit and backends call it
/// again from `Drop`.
pub trait Surface {
    fn kind(&self) -> BackendKind;

    /// Acquires the output resource. `requested` is a hint for windowed
    /// backends; device backends use the size of their current mode.
    ///
    /// Returns the geometry actually obtained.
    fn allocate(&mut self, requested: Geometry) -> Result<Geometry>;

    /// Current output size; the scaling target for every frame.
    fn geometry(&self) -> Geometry;

    /// Composites `frame` onto the output.
    fn present(&mut self, frame: &Frame<'_>) -> std::result::Result<(), PresentError>;

    /// Shows the last presented frame again without recompositing.
    fn repaint(&mut self) -> std::result::Result<(), PresentError> {
        Ok(())
    }

    /// Adapts output resources to a new size. Backends with a fixed mode
    /// ignore this.
    fn resize(&mut self, geometry: Geometry) -> Result<()>;

    /// Frees every resource acquired by `allocate`. Idempotent.
    fn release(&mut self) -> Result<()>;

    /// Blocks until the next input or window event.
    fn wait_event(&mut self) -> Result<SurfaceEvent>;

    /// Switches between windowed and fullscreen. No-op where meaningless.
    fn toggle_fullscreen(&mut self) -> Result<()> {
        Ok(())
    }
}
