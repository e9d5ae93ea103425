// src/platform/backends/drm/device.rs

//! `ModesetDevice` implementation over a real `/dev/dri/cardN` node.

use super::ffi::*;
use super::lifecycle::{CrtcConfig, DumbBuffer, ModesetDevice, Output, SavedCrtc};
use anyhow::{Context, Result};
use libc::c_uint;
use log::{debug, trace, warn};
use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::ptr;

/// An open DRM card.
pub struct CardDevice {
    file: File,
}

impl CardDevice {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open DRM device {}", path.display()))?;
        debug!("Opened DRM device {}", path.display());
        Ok(CardDevice { file })
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn resources(&self) -> Result<(Vec<u32>, Vec<u32>)> {
        let mut res = drm_mode_card_res::default();
        // SAFETY: `res` is a valid, zeroed request; the kernel only fills counts.
        unsafe { drm_ioctl_mode_getresources(self.fd(), &mut res) }
            .context("DRM_IOCTL_MODE_GETRESOURCES failed")?;

        let mut crtcs = vec![0u32; res.count_crtcs as usize];
        let mut connectors = vec![0u32; res.count_connectors as usize];
        let mut request = drm_mode_card_res {
            crtc_id_ptr: crtcs.as_mut_ptr() as u64,
            connector_id_ptr: connectors.as_mut_ptr() as u64,
            count_crtcs: res.count_crtcs,
            count_connectors: res.count_connectors,
            ..Default::default()
        };
        // SAFETY: the id arrays are sized to the counts passed in.
        unsafe { drm_ioctl_mode_getresources(self.fd(), &mut request) }
            .context("DRM_IOCTL_MODE_GETRESOURCES failed")?;
        crtcs.truncate(request.count_crtcs.min(res.count_crtcs) as usize);
        connectors.truncate(request.count_connectors.min(res.count_connectors) as usize);
        Ok((crtcs, connectors))
    }

    fn connector(&self, connector_id: u32) -> Result<Connector> {
        let mut probe = drm_mode_get_connector {
            connector_id,
            ..Default::default()
        };
        // SAFETY: null array pointers with zero counts only query sizes.
        unsafe { drm_ioctl_mode_getconnector(self.fd(), &mut probe) }
            .with_context(|| format!("DRM_IOCTL_MODE_GETCONNECTOR {} failed", connector_id))?;

        let mut modes = vec![drm_mode_modeinfo::default(); probe.count_modes as usize];
        let mut encoders = vec![0u32; probe.count_encoders as usize];
        let mut request = drm_mode_get_connector {
            connector_id,
            modes_ptr: modes.as_mut_ptr() as u64,
            count_modes: probe.count_modes,
            encoders_ptr: encoders.as_mut_ptr() as u64,
            count_encoders: probe.count_encoders,
            ..Default::default()
        };
        // SAFETY: the arrays are sized to the counts passed in.
        unsafe { drm_ioctl_mode_getconnector(self.fd(), &mut request) }
            .with_context(|| format!("DRM_IOCTL_MODE_GETCONNECTOR {} failed", connector_id))?;
        modes.truncate(request.count_modes.min(probe.count_modes) as usize);
        encoders.truncate(request.count_encoders.min(probe.count_encoders) as usize);

        Ok(Connector {
            id: connector_id,
            connected: request.connection == DRM_MODE_CONNECTED,
            encoder_id: request.encoder_id,
            encoders,
            modes,
        })
    }

    fn encoder(&self, encoder_id: u32) -> Result<drm_mode_get_encoder> {
        let mut encoder = drm_mode_get_encoder {
            encoder_id,
            ..Default::default()
        };
        // SAFETY: plain in/out struct.
        unsafe { drm_ioctl_mode_getencoder(self.fd(), &mut encoder) }
            .with_context(|| format!("DRM_IOCTL_MODE_GETENCODER {} failed", encoder_id))?;
        Ok(encoder)
    }
}

struct Connector {
    id: u32,
    connected: bool,
    encoder_id: u32,
    encoders: Vec<u32>,
    modes: Vec<drm_mode_modeinfo>,
}

/// Picks a CRTC for a connector that no earlier output uses.
///
/// The CRTC behind the connector's current encoder wins; otherwise the first
/// free CRTC any of its encoders can drive. `encoders` yields
/// `(crtc_id, possible_crtcs)` per encoder, current encoder first.
pub fn pick_crtc(
    crtcs: &[u32],
    encoders: impl IntoIterator<Item = (u32, u32)>,
    used: &[u32],
) -> Option<u32> {
    let mut fallback = None;
    for (current_crtc, possible) in encoders {
        if current_crtc != 0 && !used.contains(&current_crtc) {
            return Some(current_crtc);
        }
        if fallback.is_none() {
            fallback = crtcs
                .iter()
                .enumerate()
                .filter(|(i, _)| *i < 32 && possible & (1 << i) != 0)
                .map(|(_, crtc)| *crtc)
                .find(|crtc| !used.contains(crtc));
        }
    }
    fallback
}

/// A `mmap`ed dumb buffer, unmapped on drop if not unmapped explicitly.
pub struct DumbMapping {
    ptr: *mut u8,
    len: usize,
}

impl DumbMapping {
    fn unmap(&mut self) -> Result<()> {
        if self.ptr.is_null() {
            return Ok(());
        }
        // SAFETY: ptr/len came from a successful mmap and are unmapped once.
        let rc = unsafe { libc::munmap(self.ptr.cast(), self.len) };
        self.ptr = ptr::null_mut();
        if rc != 0 {
            return Err(std::io::Error::last_os_error()).context("munmap failed");
        }
        Ok(())
    }
}

impl AsMut<[u8]> for DumbMapping {
    fn as_mut(&mut self) -> &mut [u8] {
        if self.ptr.is_null() {
            return &mut [];
        }
        // SAFETY: the mapping is live, writable and `len` bytes long.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for DumbMapping {
    fn drop(&mut self) {
        if let Err(e) = self.unmap() {
            warn!("DumbMapping: {:#}", e);
        }
    }
}

impl ModesetDevice for CardDevice {
    type Mapping = DumbMapping;

    fn supports_dumb_buffers(&self) -> Result<bool> {
        let mut cap = drm_get_cap {
            capability: DRM_CAP_DUMB_BUFFER,
            value: 0,
        };
        // SAFETY: plain in/out struct.
        unsafe { drm_ioctl_get_cap(self.fd(), &mut cap) }.context("DRM_IOCTL_GET_CAP failed")?;
        Ok(cap.value != 0)
    }

    fn outputs(&self) -> Result<Vec<Output>> {
        let (crtcs, connector_ids) = self.resources()?;
        let mut outputs = Vec::new();
        let mut used = Vec::new();
        for connector_id in connector_ids {
            let connector = self.connector(connector_id)?;
            if !connector.connected {
                trace!("Connector {} is disconnected", connector.id);
                continue;
            }
            let Some(mode) = connector.modes.first().copied() else {
                debug!("Connector {} has no modes", connector.id);
                continue;
            };

            let mut encoder_ids = Vec::with_capacity(connector.encoders.len() + 1);
            if connector.encoder_id != 0 {
                encoder_ids.push(connector.encoder_id);
            }
            encoder_ids.extend(connector.encoders.iter().filter(|id| **id != connector.encoder_id));

            let mut candidates = Vec::new();
            for encoder_id in encoder_ids {
                match self.encoder(encoder_id) {
                    Ok(encoder) => candidates.push((encoder.crtc_id, encoder.possible_crtcs)),
                    Err(e) => debug!("Skipping encoder {}: {:#}", encoder_id, e),
                }
            }
            let Some(crtc_id) = pick_crtc(&crtcs, candidates, &used) else {
                warn!("No free CRTC for connector {}; skipping it", connector.id);
                continue;
            };
            used.push(crtc_id);
            debug!(
                "Connector {}: {}x{} on CRTC {}",
                connector.id, mode.hdisplay, mode.vdisplay, crtc_id
            );
            outputs.push(Output {
                connector_id: connector.id,
                crtc_id,
                mode,
            });
        }
        Ok(outputs)
    }

    fn get_crtc(&self, crtc_id: u32) -> Result<SavedCrtc> {
        let mut crtc = drm_mode_crtc {
            crtc_id,
            ..Default::default()
        };
        // SAFETY: plain in/out struct with no connector array.
        unsafe { drm_ioctl_mode_getcrtc(self.fd(), &mut crtc) }
            .with_context(|| format!("DRM_IOCTL_MODE_GETCRTC {} failed", crtc_id))?;
        Ok(SavedCrtc {
            crtc_id,
            fb_id: crtc.fb_id,
            x: crtc.x,
            y: crtc.y,
            mode: (crtc.mode_valid != 0).then_some(crtc.mode),
        })
    }

    fn create_dumb(&mut self, width: u32, height: u32, bpp: u32) -> Result<DumbBuffer> {
        let mut request = drm_mode_create_dumb {
            width,
            height,
            bpp,
            ..Default::default()
        };
        // SAFETY: plain in/out struct.
        unsafe { drm_ioctl_mode_create_dumb(self.fd(), &mut request) }
            .with_context(|| format!("DRM_IOCTL_MODE_CREATE_DUMB {}x{} failed", width, height))?;
        Ok(DumbBuffer {
            handle: request.handle,
            width,
            height,
            pitch: request.pitch,
            size: request.size,
        })
    }

    fn add_framebuffer(&mut self, buffer: &DumbBuffer) -> Result<u32> {
        let mut cmd = drm_mode_fb_cmd {
            width: buffer.width,
            height: buffer.height,
            pitch: buffer.pitch,
            bpp: 32,
            depth: 24,
            handle: buffer.handle,
            ..Default::default()
        };
        // SAFETY: plain in/out struct.
        unsafe { drm_ioctl_mode_addfb(self.fd(), &mut cmd) }
            .with_context(|| format!("DRM_IOCTL_MODE_ADDFB for handle {} failed", buffer.handle))?;
        Ok(cmd.fb_id)
    }

    fn map_dumb(&mut self, buffer: &DumbBuffer) -> Result<DumbMapping> {
        let mut request = drm_mode_map_dumb {
            handle: buffer.handle,
            ..Default::default()
        };
        // SAFETY: plain in/out struct.
        unsafe { drm_ioctl_mode_map_dumb(self.fd(), &mut request) }
            .with_context(|| format!("DRM_IOCTL_MODE_MAP_DUMB {} failed", buffer.handle))?;

        let len = usize::try_from(buffer.size).context("dumb buffer too large")?;
        let offset = libc::off_t::try_from(request.offset).context("mmap offset out of range")?;
        // SAFETY: offset is the fake offset the kernel handed out for this handle.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd(),
                offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("mmap of dumb buffer {} failed", buffer.handle));
        }
        Ok(DumbMapping {
            ptr: ptr.cast(),
            len,
        })
    }

    fn set_crtc(&mut self, config: &CrtcConfig) -> Result<()> {
        let mut connectors = config.connectors.clone();
        let mut crtc = drm_mode_crtc {
            crtc_id: config.crtc_id,
            fb_id: config.fb_id,
            x: config.x,
            y: config.y,
            set_connectors_ptr: connectors.as_mut_ptr() as u64,
            count_connectors: connectors.len() as u32,
            mode_valid: config.mode.is_some() as u32,
            mode: config.mode.unwrap_or_default(),
            ..Default::default()
        };
        // SAFETY: the connector array outlives the call.
        unsafe { drm_ioctl_mode_setcrtc(self.fd(), &mut crtc) }
            .with_context(|| format!("DRM_IOCTL_MODE_SETCRTC {} failed", config.crtc_id))?;
        Ok(())
    }

    fn unmap(&mut self, mut mapping: DumbMapping) -> Result<()> {
        mapping.unmap()
    }

    fn remove_framebuffer(&mut self, fb_id: u32) -> Result<()> {
        let mut id: c_uint = fb_id;
        // SAFETY: the argument is a single framebuffer id.
        unsafe { drm_ioctl_mode_rmfb(self.fd(), &mut id) }
            .with_context(|| format!("DRM_IOCTL_MODE_RMFB {} failed", fb_id))?;
        Ok(())
    }

    fn destroy_dumb(&mut self, handle: u32) -> Result<()> {
        let mut request = drm_mode_destroy_dumb { handle };
        // SAFETY: plain in struct.
        unsafe { drm_ioctl_mode_destroy_dumb(self.fd(), &mut request) }
            .with_context(|| format!("DRM_IOCTL_MODE_DESTROY_DUMB {} failed", handle))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_encoder_crtc_is_preferred() {
        let crtcs = [31, 32, 33];
        assert_eq!(pick_crtc(&crtcs, [(32, 0b111)], &[]), Some(32));
    }

    #[test]
    fn crtcs_are_never_reused() {
        let crtcs = [31, 32, 33];
        // Current CRTC taken: fall back to the first free possible one.
        assert_eq!(pick_crtc(&crtcs, [(31, 0b011)], &[31]), Some(32));
        assert_eq!(pick_crtc(&crtcs, [(0, 0b011)], &[31, 32]), None);
    }

    #[test]
    fn later_encoders_are_considered() {
        let crtcs = [31, 32, 33];
        assert_eq!(pick_crtc(&crtcs, [(0, 0b001), (0, 0b100)], &[31]), Some(33));
    }
}
