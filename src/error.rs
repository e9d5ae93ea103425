// src/error.rs

//! Error taxonomy for the viewer.
//!
//! - [`StartupError`]: no usable surface or nothing to show. Fatal.
//! - [`DecodeError`]: a single source could not be turned into pixels.
//!   Recoverable, the previous frame stays on screen.
//! - [`PresentError`]: a frame could not be shown. Severity depends on the
//!   backend; a mode-setting device failing mid-session is fatal.

use thiserror::Error;

/// Failure while turning a source into a raster.
#[derive(Debug, Error)]
#[error("{source_id}: {cause}")]
pub struct DecodeError {
    /// The path or URL that failed.
    pub source_id: String,
    /// Underlying reason (I/O, network, unsupported format).
    pub cause: anyhow::Error,
}

impl DecodeError {
    pub fn new(source_id: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        DecodeError {
            source_id: source_id.into(),
            cause: cause.into(),
        }
    }
}

/// Failure while handing a frame to the surface.
#[derive(Debug, Error)]
pub enum PresentError {
    /// The surface is still usable; the frame is skipped.
    #[error("present failed: {0:#}")]
    Recoverable(anyhow::Error),
    /// The output is in an undefined state; the session must tear down.
    #[error("present failed fatally: {0:#}")]
    Fatal(anyhow::Error),
}

impl PresentError {
    pub fn recoverable(e: impl Into<anyhow::Error>) -> Self {
        PresentError::Recoverable(e.into())
    }

    pub fn fatal(e: impl Into<anyhow::Error>) -> Self {
        PresentError::Fatal(e.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, PresentError::Fatal(_))
    }
}

/// Failure before the first frame could be shown.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("no images to display")]
    EmptyImageList,
    /// Every candidate backend failed; one message per attempt.
    #[error("no usable display surface: {}", .0.join("; "))]
    NoSurface(Vec<String>),
    /// Rolling back a partially configured device also failed.
    #[error("{cause:#} (rollback also failed: {})", .rollback.join("; "))]
    Rollback {
        cause: anyhow::Error,
        rollback: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_names_the_source() {
        let err = DecodeError::new("missing.png", anyhow::anyhow!("No such file"));
        assert_eq!(err.to_string(), "missing.png: No such file");
    }

    #[test]
    fn no_surface_lists_every_attempt() {
        let err = StartupError::NoSurface(vec!["drm: denied".into(), "fb: missing".into()]);
        assert_eq!(
            err.to_string(),
            "no usable display surface: drm: denied; fb: missing"
        );
    }

    #[test]
    fn present_error_severity() {
        assert!(PresentError::fatal(anyhow::anyhow!("x")).is_fatal());
        assert!(!PresentError::recoverable(anyhow::anyhow!("x")).is_fatal());
    }
}
