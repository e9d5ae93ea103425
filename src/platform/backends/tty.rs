// src/platform/backends/tty.rs

//! Raw-mode controlling terminal used as the keyboard for the DRM and
//! framebuffer backends, which have no window system to deliver key events.

use crate::input::decode_tty_bytes;
use crate::keys::KeySymbol;
use anyhow::{Context, Result};
use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use termios::{tcsetattr, Termios, ECHO, ICANON, ISIG, TCSANOW, VMIN, VTIME};

const TTY_PATH: &str = "/dev/tty";
const CURSOR_HIDE: &str = "\x1b[?25l";
const CURSOR_SHOW: &str = "\x1b[?25h";

/// The controlling terminal in raw mode. The original attributes are restored
/// by [`RawTty::restore`] or, failing that, on drop.
pub struct RawTty {
    file: File,
    original_termios: Option<Termios>,
    pending: VecDeque<KeySymbol>,
    input_buffer: [u8; 64],
}

impl RawTty {
    pub fn open() -> Result<Self> {
        Self::open_path(Path::new(TTY_PATH))
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let fd = file.as_raw_fd();

        let original = Termios::from_fd(fd)
            .with_context(|| format!("{} is not a terminal", path.display()))?;
        let mut raw = original;
        raw.c_lflag &= !(ECHO | ICANON | ISIG);
        raw.c_iflag &= !(libc::IXON | libc::IXOFF | libc::ICRNL | libc::INLCR | libc::IGNCR);
        // Block until at least one byte arrives.
        raw.c_cc[VMIN] = 1;
        raw.c_cc[VTIME] = 0;
        tcsetattr(fd, TCSANOW, &raw).context("Failed to set raw terminal attributes")?;
        debug!("RawTty: {} set to raw mode.", path.display());

        let mut tty = RawTty {
            file,
            original_termios: Some(original),
            pending: VecDeque::new(),
            input_buffer: [0u8; 64],
        };
        if let Err(e) = tty.write_control(CURSOR_HIDE) {
            warn!("RawTty: failed to hide cursor: {:#}", e);
        }
        info!("RawTty: opened {}", path.display());
        Ok(tty)
    }

    fn write_control(&mut self, sequence: &str) -> Result<()> {
        self.file
            .write_all(sequence.as_bytes())
            .and_then(|_| self.file.flush())
            .context("Failed to write to terminal")
    }

    /// Blocks until the next key. Returns `None` if the terminal hung up.
    pub fn next_key(&mut self) -> Result<Option<KeySymbol>> {
        loop {
            if let Some(symbol) = self.pending.pop_front() {
                return Ok(Some(symbol));
            }
            let count = match self.file.read(&mut self.input_buffer) {
                Ok(0) => return Ok(None),
                Ok(count) => count,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("Failed to read from terminal"),
            };
            let bytes = &self.input_buffer[..count];
            trace!("RawTty: read {:?}", bytes);
            self.pending.extend(decode_tty_bytes(bytes));
        }
    }

    /// Restores the original terminal attributes. Idempotent.
    pub fn restore(&mut self) -> Result<()> {
        let Some(original) = self.original_termios.take() else {
            return Ok(());
        };
        if let Err(e) = self.write_control(CURSOR_SHOW) {
            warn!("RawTty: failed to show cursor: {:#}", e);
        }
        tcsetattr(self.file.as_raw_fd(), TCSANOW, &original)
            .context("Failed to restore original terminal attributes")?;
        debug!("RawTty: terminal attributes restored.");
        Ok(())
    }
}

impl Drop for RawTty {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            error!("RawTty: error restoring terminal in drop: {:#}", e);
        }
    }
}
