// src/platform/backends/framebuffer.rs

//! Linux framebuffer (`/dev/fbN`) backend.
//!
//! The device is mapped once at its current mode; there is no resize. Input
//! comes from the controlling terminal in raw mode.
#![allow(non_camel_case_types)]

use super::tty::RawTty;
use super::{BackendKind, Frame, Surface, SurfaceEvent};
use crate::error::PresentError;
use crate::geometry::Geometry;
use crate::platform::blit::{compose, Channel, PixelLayout};
use anyhow::{anyhow, bail, Context, Result};
use libc::{c_char, c_ulong};
use log::{debug, error, info, warn};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr;

/// Environment variable naming the framebuffer device; wins over the config.
pub const FRAMEBUFFER_ENV: &str = "FRAMEBUFFER";

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct fb_bitfield {
    pub offset: u32,
    pub length: u32,
    pub msb_right: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct fb_var_screeninfo {
    pub xres: u32,
    pub yres: u32,
    pub xres_virtual: u32,
    pub yres_virtual: u32,
    pub xoffset: u32,
    pub yoffset: u32,
    pub bits_per_pixel: u32,
    pub grayscale: u32,
    pub red: fb_bitfield,
    pub green: fb_bitfield,
    pub blue: fb_bitfield,
    pub transp: fb_bitfield,
    pub nonstd: u32,
    pub activate: u32,
    pub height: u32,
    pub width: u32,
    pub accel_flags: u32,
    pub pixclock: u32,
    pub left_margin: u32,
    pub right_margin: u32,
    pub upper_margin: u32,
    pub lower_margin: u32,
    pub hsync_len: u32,
    pub vsync_len: u32,
    pub sync: u32,
    pub vmode: u32,
    pub rotate: u32,
    pub colorspace: u32,
    pub reserved: [u32; 4],
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct fb_fix_screeninfo {
    pub id: [c_char; 16],
    pub smem_start: c_ulong,
    pub smem_len: u32,
    pub type_: u32,
    pub type_aux: u32,
    pub visual: u32,
    pub xpanstep: u16,
    pub ypanstep: u16,
    pub ywrapstep: u16,
    pub line_length: u32,
    pub mmio_start: c_ulong,
    pub mmio_len: u32,
    pub accel: u32,
    pub capabilities: u16,
    pub reserved: [u16; 2],
}

nix::ioctl_read_bad!(fbioget_vscreeninfo, 0x4600, fb_var_screeninfo);
nix::ioctl_read_bad!(fbioget_fscreeninfo, 0x4602, fb_fix_screeninfo);

/// Resolves the device node: `$FRAMEBUFFER` if set, else the configured path.
pub fn device_path(configured: &Path) -> PathBuf {
    device_path_from(std::env::var_os(FRAMEBUFFER_ENV), configured)
}

/// `device_path` with the environment value passed in. An empty value is
/// treated as unset.
pub fn device_path_from(env_value: Option<OsString>, configured: &Path) -> PathBuf {
    match env_value {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => configured.to_path_buf(),
    }
}

/// Converts the driver's bitfield description into a `PixelLayout`.
pub fn layout_from_var(var: &fb_var_screeninfo) -> Option<PixelLayout> {
    let channel = |field: &fb_bitfield| Channel::new(field.offset, field.length);
    PixelLayout::from_bitfields(
        var.bits_per_pixel,
        channel(&var.red),
        channel(&var.green),
        channel(&var.blue),
    )
}

/// The mapped framebuffer memory.
struct FbMapping {
    ptr: *mut u8,
    len: usize,
}

impl FbMapping {
    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the mapping is live, writable and `len` bytes long.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    fn unmap(self) -> Result<()> {
        // SAFETY: ptr/len came from a successful mmap; `self` is consumed.
        if unsafe { libc::munmap(self.ptr.cast(), self.len) } != 0 {
            return Err(std::io::Error::last_os_error()).context("munmap of framebuffer failed");
        }
        Ok(())
    }
}

struct FbDevice {
    _file: File,
    mapping: FbMapping,
    /// Byte offset of the visible area inside the mapping.
    visible_offset: usize,
    stride: usize,
    layout: PixelLayout,
}

pub struct FramebufferSurface {
    path: PathBuf,
    background: [u8; 3],
    device: Option<FbDevice>,
    tty: Option<RawTty>,
    geometry: Geometry,
}

impl FramebufferSurface {
    pub fn new(path: PathBuf, background: [u8; 3]) -> Self {
        FramebufferSurface {
            path,
            background,
            device: None,
            tty: None,
            geometry: Geometry::default(),
        }
    }

    fn open_device(&self) -> Result<(FbDevice, Geometry)> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open framebuffer {}", self.path.display()))?;
        let fd = file.as_raw_fd();

        let mut var = fb_var_screeninfo::default();
        let mut fix = fb_fix_screeninfo::default();
        // SAFETY: both structs are plain out-parameters of the right size.
        unsafe {
            fbioget_vscreeninfo(fd, &mut var).context("FBIOGET_VSCREENINFO failed")?;
            fbioget_fscreeninfo(fd, &mut fix).context("FBIOGET_FSCREENINFO failed")?;
        }
        let layout = layout_from_var(&var)
            .ok_or_else(|| anyhow!("unsupported depth: {} bits per pixel", var.bits_per_pixel))?;
        debug!(
            "Framebuffer {}: {}x{} at {} bpp, line length {}",
            self.path.display(),
            var.xres,
            var.yres,
            var.bits_per_pixel,
            fix.line_length
        );

        let stride = fix.line_length as usize;
        let visible_offset =
            var.yoffset as usize * stride + var.xoffset as usize * layout.bytes_per_pixel;
        let len = fix.smem_len as usize;
        if len < visible_offset + stride * var.yres as usize {
            bail!(
                "framebuffer memory ({} bytes) smaller than its visible area",
                len
            );
        }

        // SAFETY: mapping the device's own memory at offset 0.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error()).context("mmap of framebuffer failed");
        }

        Ok((
            FbDevice {
                _file: file,
                mapping: FbMapping {
                    ptr: ptr.cast(),
                    len,
                },
                visible_offset,
                stride,
                layout,
            },
            Geometry::new(var.xres, var.yres),
        ))
    }
}

impl Surface for FramebufferSurface {
    fn kind(&self) -> BackendKind {
        BackendKind::Framebuffer
    }

    fn allocate(&mut self, _requested: Geometry) -> Result<Geometry> {
        let (device, geometry) = self.open_device()?;
        self.device = Some(device);
        self.geometry = geometry;
        match RawTty::open() {
            Ok(tty) => self.tty = Some(tty),
            Err(e) => {
                if let Err(release_err) = self.release() {
                    error!("Framebuffer: {:#}", release_err);
                }
                return Err(e.context("framebuffer backend needs a terminal for input"));
            }
        }
        info!("Framebuffer: {} is {}", self.path.display(), geometry);
        Ok(geometry)
    }

    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn present(&mut self, frame: &Frame<'_>) -> std::result::Result<(), PresentError> {
        let Some(device) = self.device.as_mut() else {
            return Err(PresentError::recoverable(anyhow!(
                "framebuffer is not allocated"
            )));
        };
        let offset = device.visible_offset;
        let stride = device.stride;
        let layout = device.layout;
        let visible = &mut device.mapping.as_mut_slice()[offset..];
        compose(
            visible,
            stride,
            self.geometry,
            &layout,
            frame.image,
            frame.placement,
            self.background,
        );
        Ok(())
    }

    fn resize(&mut self, geometry: Geometry) -> Result<()> {
        if geometry != self.geometry {
            warn!("Framebuffer: ignoring resize to {}", geometry);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let tty_result = match self.tty.as_mut() {
            Some(tty) => tty.restore(),
            None => Ok(()),
        };
        self.tty = None;
        if let Some(device) = self.device.take() {
            device.mapping.unmap()?;
            info!("Framebuffer: released {}", self.path.display());
        }
        tty_result
    }

    fn wait_event(&mut self) -> Result<SurfaceEvent> {
        let tty = self
            .tty
            .as_mut()
            .context("framebuffer surface has no terminal")?;
        Ok(match tty.next_key()? {
            Some(key) => SurfaceEvent::Key(key),
            None => SurfaceEvent::CloseRequested,
        })
    }
}

impl Drop for FramebufferSurface {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("FramebufferSurface: error during release in drop: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screeninfo_sizes_match_the_kernel_abi() {
        assert_eq!(std::mem::size_of::<fb_var_screeninfo>(), 160);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(std::mem::size_of::<fb_fix_screeninfo>(), 80);
    }

    #[test]
    fn layouts_follow_the_driver_bitfields() {
        let mut var = fb_var_screeninfo {
            bits_per_pixel: 16,
            ..Default::default()
        };
        var.red = fb_bitfield { offset: 11, length: 5, msb_right: 0 };
        var.green = fb_bitfield { offset: 5, length: 6, msb_right: 0 };
        var.blue = fb_bitfield { offset: 0, length: 5, msb_right: 0 };
        assert_eq!(layout_from_var(&var), Some(PixelLayout::RGB565));

        var.bits_per_pixel = 8;
        assert_eq!(layout_from_var(&var), None);
    }

    #[test]
    fn environment_overrides_configured_device() {
        let configured = Path::new("/dev/fb0");
        assert_eq!(device_path_from(None, configured), PathBuf::from("/dev/fb0"));
        assert_eq!(
            device_path_from(Some(OsString::new()), configured),
            PathBuf::from("/dev/fb0")
        );
        assert_eq!(
            device_path_from(Some(OsString::from("/dev/fb1")), configured),
            PathBuf::from("/dev/fb1")
        );
    }

    #[test]
    fn unallocated_present_is_recoverable() {
        let mut surface = FramebufferSurface::new(PathBuf::from("/nonexistent/fb"), [0, 0, 0]);
        let image = crate::codec::RasterImage::new(1, 1);
        let frame = Frame {
            image: &image,
            placement: Default::default(),
            source_id: "a.png",
            index: 0,
            total: 1,
            original_size: (1, 1),
        };
        let err = surface.present(&frame).unwrap_err();
        assert!(!err.is_fatal());
        assert!(surface.allocate(Geometry::new(10, 10)).is_err());
        surface.release().unwrap();
    }
}
