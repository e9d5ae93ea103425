// src/platform/backends/x11/mod.rs

//! X11 backend: a dialog-typed top-level window presenting frames through
//! MIT-SHM when the server allows it, and plain `XPutImage` otherwise.

pub mod connection;
pub mod event;
pub mod shm;
pub mod window;

use self::connection::Connection;
use self::shm::ShmImage;
use self::window::Window;
use super::{BackendKind, Frame, Surface, SurfaceEvent};
use crate::config::Config;
use crate::error::PresentError;
use crate::geometry::Geometry;
use crate::platform::blit::{compose, Channel, PixelLayout};
use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use std::ptr;
use x11::xlib;

/// Window title shown for a frame.
pub fn frame_title(frame: &Frame<'_>) -> String {
    format!(
        "core-view [{} of {}] - {} ({}x{})",
        frame.index + 1,
        frame.total,
        frame.source_id,
        frame.original_size.0,
        frame.original_size.1
    )
}

/// A client-side `XImage` whose pixels live in a `Vec`.
struct PlainImage {
    image: *mut xlib::XImage,
    pixels: Vec<u8>,
}

impl PlainImage {
    fn create(connection: &Connection, width: u32, height: u32) -> Result<Self> {
        // SAFETY: created with no data, then pointed at `pixels`, which is
        // never reallocated while the image lives.
        unsafe {
            let image = xlib::XCreateImage(
                connection.display(),
                connection.visual(),
                connection.depth() as u32,
                xlib::ZPixmap,
                0,
                ptr::null_mut(),
                width.max(1),
                height.max(1),
                32,
                0,
            );
            if image.is_null() {
                return Err(anyhow!("XCreateImage failed"));
            }
            let len = (*image).bytes_per_line as usize * (*image).height as usize;
            let mut pixels = vec![0u8; len];
            (*image).data = pixels.as_mut_ptr().cast();
            Ok(PlainImage { image, pixels })
        }
    }

    fn destroy(&mut self) {
        if self.image.is_null() {
            return;
        }
        // SAFETY: the data pointer is ours, so it is detached before Xlib
        // frees the image structure.
        unsafe {
            (*self.image).data = ptr::null_mut();
            xlib::XDestroyImage(self.image);
        }
        self.image = ptr::null_mut();
    }
}

/// What a put must wait for before the image memory may be written again.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum PutCompletion {
    /// The pixels travel with the request.
    Flush,
    /// The server reads the segment after the request; wait until it has.
    Sync,
}

/// The image frames are composited into before being sent to the server.
enum FrameImage {
    Shm(ShmImage),
    Plain(PlainImage),
}

impl FrameImage {
    fn stride(&self) -> usize {
        match self {
            FrameImage::Shm(image) => image.stride(),
            // SAFETY: image is live until destroy.
            FrameImage::Plain(image) => unsafe { (*image.image).bytes_per_line as usize },
        }
    }

    fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameImage::Shm(image) => image.bytes_per_pixel(),
            // SAFETY: image is live until destroy.
            FrameImage::Plain(image) => unsafe { ((*image.image).bits_per_pixel / 8) as usize },
        }
    }

    fn completion(&self) -> PutCompletion {
        match self {
            FrameImage::Shm(_) => PutCompletion::Sync,
            FrameImage::Plain(_) => PutCompletion::Flush,
        }
    }

    fn data_mut(&mut self) -> &mut [u8] {
        match self {
            FrameImage::Shm(image) => image.data_mut(),
            FrameImage::Plain(image) => &mut image.pixels,
        }
    }

    fn put(&mut self, connection: &Connection, window: &Window, geometry: Geometry) {
        match self {
            FrameImage::Shm(image) => image.put(
                connection.display(),
                window.id(),
                window.gc(),
                geometry.width,
                geometry.height,
            ),
            // SAFETY: image, window and gc are live.
            FrameImage::Plain(image) => unsafe {
                xlib::XPutImage(
                    connection.display(),
                    window.id(),
                    window.gc(),
                    image.image,
                    0,
                    0,
                    0,
                    0,
                    geometry.width,
                    geometry.height,
                );
            },
        }
        match self.completion() {
            PutCompletion::Flush => connection.flush(),
            PutCompletion::Sync => connection.sync(),
        }
    }

    fn destroy(&mut self, connection: &Connection) {
        match self {
            FrameImage::Shm(image) => image.destroy(connection.display()),
            FrameImage::Plain(image) => image.destroy(),
        }
    }
}

pub struct X11Surface {
    use_shared_memory: bool,
    min_size: Geometry,
    background: [u8; 3],
    connection: Option<Connection>,
    window: Option<Window>,
    image: Option<FrameImage>,
    /// Size `image` was created for. Lags `geometry` after a resize until
    /// the next present, so the last frame stays on screen.
    image_geometry: Geometry,
    geometry: Geometry,
    has_frame: bool,
}

impl X11Surface {
    pub fn new(config: &Config) -> Self {
        X11Surface {
            use_shared_memory: config.display.x11_shared_memory,
            min_size: Geometry::new(config.window.min_width, config.window.min_height),
            background: config.render.background,
            connection: None,
            window: None,
            image: None,
            image_geometry: Geometry::default(),
            geometry: Geometry::default(),
            has_frame: false,
        }
    }

    /// Creates the frame image for `geometry`, falling back from SHM to a
    /// plain image if the server refuses the segment.
    fn create_image(&mut self, geometry: Geometry) -> Result<FrameImage> {
        let connection = self.connection.as_ref().context("X11 surface is not allocated")?;
        if self.use_shared_memory {
            if shm::is_available(connection.display()) {
                match ShmImage::create(
                    connection.display(),
                    connection.visual(),
                    connection.depth(),
                    geometry.width,
                    geometry.height,
                ) {
                    Ok(image) => return Ok(FrameImage::Shm(image)),
                    Err(e) => warn!("MIT-SHM unusable, using XPutImage: {:#}", e),
                }
            } else {
                info!("MIT-SHM extension not available, using XPutImage");
            }
            self.use_shared_memory = false;
        }
        Ok(FrameImage::Plain(PlainImage::create(
            connection,
            geometry.width,
            geometry.height,
        )?))
    }

    fn pixel_layout(&self, bytes_per_pixel: usize) -> PixelLayout {
        let (red, green, blue) = self
            .connection
            .as_ref()
            .map(Connection::visual_masks)
            .unwrap_or((0xff0000, 0x00ff00, 0x0000ff));
        PixelLayout {
            bytes_per_pixel,
            red: Channel::from_mask(red),
            green: Channel::from_mask(green),
            blue: Channel::from_mask(blue),
        }
    }

    fn destroy_image(&mut self) {
        if let (Some(mut image), Some(connection)) = (self.image.take(), self.connection.as_ref()) {
            image.destroy(connection);
        }
        self.image_geometry = Geometry::default();
    }

    /// Replaces the frame image if the window size changed since it was made.
    fn ensure_image(&mut self) -> Result<()> {
        if self.image.is_some() && self.image_geometry == self.geometry {
            return Ok(());
        }
        debug!("X11: resizing image {} -> {}", self.image_geometry, self.geometry);
        // The old segment must be fully detached before a new one exists.
        self.destroy_image();
        self.has_frame = false;
        let image = self.create_image(self.geometry)?;
        self.image = Some(image);
        self.image_geometry = self.geometry;
        Ok(())
    }
}

impl Surface for X11Surface {
    fn kind(&self) -> BackendKind {
        BackendKind::X11
    }

    fn allocate(&mut self, requested: Geometry) -> Result<Geometry> {
        let connection = Connection::new()?;
        let window = Window::new(&connection, requested, self.min_size, self.background)?;
        self.connection = Some(connection);
        self.window = Some(window);
        self.geometry = requested;
        match self.create_image(requested) {
            Ok(image) => {
                self.image = Some(image);
                self.image_geometry = requested;
            }
            Err(e) => {
                if let Err(release_err) = self.release() {
                    error!("X11: {:#}", release_err);
                }
                return Err(e);
            }
        }
        info!(
            "X11: window {} allocated ({})",
            requested,
            if self.use_shared_memory { "MIT-SHM" } else { "XPutImage" }
        );
        Ok(requested)
    }

    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn present(&mut self, frame: &Frame<'_>) -> std::result::Result<(), PresentError> {
        self.ensure_image().map_err(PresentError::recoverable)?;
        let layout = match self.image.as_ref() {
            Some(image) => self.pixel_layout(image.bytes_per_pixel()),
            None => {
                return Err(PresentError::recoverable(anyhow!(
                    "X11 surface has no image"
                )))
            }
        };
        let geometry = self.geometry;
        let background = self.background;
        let (Some(connection), Some(window), Some(image)) =
            (self.connection.as_ref(), self.window.as_ref(), self.image.as_mut())
        else {
            return Err(PresentError::recoverable(anyhow!(
                "X11 surface is not allocated"
            )));
        };

        let stride = image.stride();
        compose(
            image.data_mut(),
            stride,
            geometry,
            &layout,
            frame.image,
            frame.placement,
            background,
        );
        window
            .set_title(connection, &frame_title(frame))
            .map_err(PresentError::recoverable)?;
        image.put(connection, window, geometry);
        self.has_frame = true;
        Ok(())
    }

    fn repaint(&mut self) -> std::result::Result<(), PresentError> {
        if !self.has_frame {
            return Ok(());
        }
        if let (Some(connection), Some(window), Some(image)) =
            (self.connection.as_ref(), self.window.as_ref(), self.image.as_mut())
        {
            image.put(connection, window, self.image_geometry);
        }
        Ok(())
    }

    /// Records the new window size. The image is rebuilt by the next
    /// present; until then repaints keep showing the previous frame.
    fn resize(&mut self, geometry: Geometry) -> Result<()> {
        debug!("X11: window {} -> {}", self.geometry, geometry);
        self.geometry = geometry;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.destroy_image();
        if let (Some(mut window), Some(connection)) = (self.window.take(), self.connection.as_ref())
        {
            window.destroy(connection);
        }
        if self.connection.take().is_some() {
            info!("X11: released");
        }
        self.has_frame = false;
        Ok(())
    }

    fn wait_event(&mut self) -> Result<SurfaceEvent> {
        let (Some(connection), Some(window)) = (self.connection.as_ref(), self.window.as_mut())
        else {
            return Err(anyhow!("X11 surface is not allocated"));
        };
        loop {
            // SAFETY: blocks on a live connection; the event is fully written.
            let mut xevent: xlib::XEvent = unsafe { std::mem::zeroed() };
            unsafe { xlib::XNextEvent(connection.display(), &mut xevent) };
            if let Some(event) = event::translate(&mut xevent, window) {
                return Ok(event);
            }
        }
    }

    fn toggle_fullscreen(&mut self) -> Result<()> {
        match (self.connection.as_ref(), self.window.as_ref()) {
            (Some(connection), Some(window)) => window.toggle_fullscreen(connection),
            _ => Ok(()),
        }
    }
}

impl Drop for X11Surface {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("X11Surface: error during release in drop: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RasterImage;
    use crate::geometry::Placement;

    #[test]
    fn title_shows_position_source_and_original_size() {
        let image = RasterImage::new(10, 5);
        let frame = Frame {
            image: &image,
            placement: Placement::default(),
            source_id: "/photos/a.jpg",
            index: 2,
            total: 7,
            original_size: (4000, 3000),
        };
        assert_eq!(
            frame_title(&frame),
            "core-view [3 of 7] - /photos/a.jpg (4000x3000)"
        );
    }

    #[test]
    fn unallocated_surface_is_inert() {
        let mut surface = X11Surface::new(&Config::default());
        assert!(surface.wait_event().is_err());
        surface.toggle_fullscreen().unwrap();
        surface.repaint().unwrap();
        surface.release().unwrap();
        surface.release().unwrap();
    }

    #[test]
    fn resize_defers_the_new_image_to_the_next_present() {
        let mut surface = X11Surface::new(&Config::default());
        surface.resize(Geometry::new(1280, 960)).unwrap();
        assert_eq!(surface.geometry(), Geometry::new(1280, 960));
        assert_eq!(surface.image_geometry, Geometry::default());
        assert!(surface.image.is_none());
        surface.repaint().unwrap();
    }

    #[test]
    fn shared_memory_puts_wait_for_the_server() {
        let shared = FrameImage::Shm(ShmImage::detached());
        let plain = FrameImage::Plain(PlainImage {
            image: ptr::null_mut(),
            pixels: Vec::new(),
        });
        assert_eq!(shared.completion(), PutCompletion::Sync);
        assert_eq!(plain.completion(), PutCompletion::Flush);
    }
}
