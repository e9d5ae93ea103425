// src/platform/backends/x11/shm.rs

//! MIT-SHM images: pixels live in a System V shared memory segment that the
//! X server reads directly, avoiding a copy through the socket on every put.
//!
//! The `x11` crate does not bind `libXext`'s shm functions, so they are
//! declared here; `build.rs` links `Xext`.
#![allow(non_snake_case)]

use anyhow::{anyhow, Result};
use libc::{c_char, c_int, c_uint, c_ulong};
use log::{debug, warn};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use x11::xlib;

#[repr(C)]
#[derive(Debug)]
pub struct XShmSegmentInfo {
    pub shmseg: c_ulong,
    pub shmid: c_int,
    pub shmaddr: *mut c_char,
    pub readOnly: c_int,
}

extern "C" {
    fn XShmQueryExtension(display: *mut xlib::Display) -> c_int;
    fn XShmCreateImage(
        display: *mut xlib::Display,
        visual: *mut xlib::Visual,
        depth: c_uint,
        format: c_int,
        data: *mut c_char,
        shminfo: *mut XShmSegmentInfo,
        width: c_uint,
        height: c_uint,
    ) -> *mut xlib::XImage;
    fn XShmAttach(display: *mut xlib::Display, shminfo: *mut XShmSegmentInfo) -> c_int;
    fn XShmDetach(display: *mut xlib::Display, shminfo: *mut XShmSegmentInfo) -> c_int;
    fn XShmPutImage(
        display: *mut xlib::Display,
        drawable: xlib::Drawable,
        gc: xlib::GC,
        image: *mut xlib::XImage,
        src_x: c_int,
        src_y: c_int,
        dst_x: c_int,
        dst_y: c_int,
        width: c_uint,
        height: c_uint,
        send_event: c_int,
    ) -> c_int;
}

/// Set by [`trap_error`] while an error trap is installed.
static X_ERROR_TRAPPED: AtomicBool = AtomicBool::new(false);

unsafe extern "C" fn trap_error(
    _display: *mut xlib::Display,
    event: *mut xlib::XErrorEvent,
) -> c_int {
    if !event.is_null() {
        debug!("X error trapped: code {}", (*event).error_code);
    }
    X_ERROR_TRAPPED.store(true, Ordering::SeqCst);
    0
}

/// Runs `f` with a temporary error handler and reports whether the server
/// rejected any request it issued.
///
/// # Safety
/// `display` must be a live connection and `f` must only issue requests on it.
unsafe fn with_error_trap<T>(display: *mut xlib::Display, f: impl FnOnce() -> T) -> (T, bool) {
    xlib::XSync(display, xlib::False);
    X_ERROR_TRAPPED.store(false, Ordering::SeqCst);
    let previous = xlib::XSetErrorHandler(Some(trap_error));
    let value = f();
    xlib::XSync(display, xlib::False);
    xlib::XSetErrorHandler(previous);
    (value, X_ERROR_TRAPPED.swap(false, Ordering::SeqCst))
}

/// True if the server offers MIT-SHM at all.
pub fn is_available(display: *mut xlib::Display) -> bool {
    // SAFETY: display is a live connection.
    unsafe { XShmQueryExtension(display) != 0 }
}

/// An `XImage` backed by a shared memory segment attached on both sides.
pub struct ShmImage {
    image: *mut xlib::XImage,
    // Boxed: Xlib keeps a pointer to it for the lifetime of the image.
    info: Box<XShmSegmentInfo>,
    len: usize,
}

impl ShmImage {
    /// Creates the image and segment and attaches the segment to the server.
    ///
    /// Fails (without leaking the segment) if the server cannot attach it,
    /// which is the normal outcome on a remote display.
    pub fn create(
        display: *mut xlib::Display,
        visual: *mut xlib::Visual,
        depth: c_int,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let mut info = Box::new(XShmSegmentInfo {
            shmseg: 0,
            shmid: -1,
            shmaddr: ptr::null_mut(),
            readOnly: xlib::False,
        });

        // SAFETY: info outlives the image; every failure path below undoes
        // what was created before it.
        unsafe {
            let image = XShmCreateImage(
                display,
                visual,
                depth as c_uint,
                xlib::ZPixmap,
                ptr::null_mut(),
                &mut *info,
                width.max(1),
                height.max(1),
            );
            if image.is_null() {
                return Err(anyhow!("XShmCreateImage failed"));
            }

            let len = (*image).bytes_per_line as usize * (*image).height as usize;
            let shmid = libc::shmget(libc::IPC_PRIVATE, len, libc::IPC_CREAT | 0o600);
            if shmid < 0 {
                xlib::XDestroyImage(image);
                return Err(anyhow!(
                    "shmget of {} bytes failed: {}",
                    len,
                    std::io::Error::last_os_error()
                ));
            }
            let addr = libc::shmat(shmid, ptr::null(), 0);
            if addr as isize == -1 {
                let err = std::io::Error::last_os_error();
                libc::shmctl(shmid, libc::IPC_RMID, ptr::null_mut());
                xlib::XDestroyImage(image);
                return Err(anyhow!("shmat failed: {}", err));
            }
            info.shmid = shmid;
            info.shmaddr = addr.cast();
            (*image).data = addr.cast();

            let (_, rejected) = with_error_trap(display, || XShmAttach(display, &mut *info));
            // The segment is freed once both sides have detached.
            libc::shmctl(shmid, libc::IPC_RMID, ptr::null_mut());
            if rejected {
                (*image).data = ptr::null_mut();
                xlib::XDestroyImage(image);
                libc::shmdt(addr);
                return Err(anyhow!("XShmAttach was rejected by the server"));
            }

            debug!("SHM image {}x{} attached (shmid {})", width, height, shmid);
            Ok(ShmImage { image, info, len })
        }
    }

    pub fn stride(&self) -> usize {
        // SAFETY: image is live until destroy.
        unsafe { (*self.image).bytes_per_line as usize }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        // SAFETY: image is live until destroy.
        unsafe { ((*self.image).bits_per_pixel / 8) as usize }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        if self.info.shmaddr.is_null() {
            return &mut [];
        }
        // SAFETY: the segment is attached and `len` bytes long.
        unsafe { std::slice::from_raw_parts_mut(self.info.shmaddr.cast(), self.len) }
    }

    /// Queues a put of the segment. The server reads the segment after the
    /// request is processed, so the caller must sync before writing to it again.
    pub fn put(
        &mut self,
        display: *mut xlib::Display,
        window: xlib::Window,
        gc: xlib::GC,
        width: u32,
        height: u32,
    ) {
        // SAFETY: image and segment are attached; no completion event is
        // requested.
        unsafe {
            XShmPutImage(
                display,
                window,
                gc,
                self.image,
                0,
                0,
                0,
                0,
                width,
                height,
                xlib::False,
            );
        }
    }

    /// Detaches the segment from the server, then from us. The server must
    /// have let go before the memory disappears, hence the sync in between.
    pub fn destroy(&mut self, display: *mut xlib::Display) {
        if self.image.is_null() {
            return;
        }
        // SAFETY: runs once; the image pointer is cleared afterwards.
        unsafe {
            XShmDetach(display, &mut *self.info);
            xlib::XSync(display, xlib::False);
            (*self.image).data = ptr::null_mut();
            xlib::XDestroyImage(self.image);
            if libc::shmdt(self.info.shmaddr.cast()) != 0 {
                warn!("shmdt failed: {}", std::io::Error::last_os_error());
            }
        }
        self.image = ptr::null_mut();
        self.info.shmaddr = ptr::null_mut();
        debug!("SHM image detached");
    }
}

#[cfg(test)]
impl ShmImage {
    /// An image with no segment, as left behind by `destroy`.
    pub(super) fn detached() -> Self {
        ShmImage {
            image: ptr::null_mut(),
            info: Box::new(XShmSegmentInfo {
                shmseg: 0,
                shmid: -1,
                shmaddr: ptr::null_mut(),
                readOnly: xlib::False,
            }),
            len: 0,
        }
    }
}

impl Drop for ShmImage {
    fn drop(&mut self) {
        if !self.image.is_null() {
            warn!("ShmImage dropped while attached; the segment is leaked until exit");
        }
    }
}
