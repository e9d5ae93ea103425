// src/pipeline.rs

//! Render Pipeline: the invalidation state machine for the current frame.
//!
//! Readiness is a set of three stages, always acquired in order:
//!
//! ```text
//! {} --Decode--> {DECODED} --Scale--> {DECODED, SCALED} --Present--> {DECODED, SCALED, COMPOSITED}
//! ```
//!
//! Two separate transitions throw work away:
//! - [`FramePipeline::invalidate_navigation`] clears everything. Nothing is
//!   cached across indices.
//! - [`FramePipeline::invalidate_geometry`] clears `SCALED` and `COMPOSITED`
//!   only. The decoded raster survives a resize.

use crate::codec::{Codec, RasterImage};
use crate::error::{DecodeError, PresentError};
use crate::geometry::{Geometry, Placement};
use crate::platform::backends::{Frame, Surface};
use bitflags::bitflags;
use log::{debug, trace};

bitflags! {
    /// Which stages of the current frame are ready.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Readiness: u8 {
        const DECODED = 1 << 0;
        const SCALED = 1 << 1;
        const COMPOSITED = 1 << 2;
    }
}

/// One step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Scale,
    Present,
}

impl Stage {
    /// The flag this stage sets when it succeeds.
    pub fn flag(self) -> Readiness {
        match self {
            Stage::Decode => Readiness::DECODED,
            Stage::Scale => Readiness::SCALED,
            Stage::Present => Readiness::COMPOSITED,
        }
    }
}

/// Why a stage could not complete.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Present(#[from] PresentError),
}

/// The source being rendered and its position in the list.
#[derive(Debug, Clone, Copy)]
pub struct FrameSource<'a> {
    pub id: &'a str,
    pub index: usize,
    pub total: usize,
}

/// A raster scaled for the current geometry and its position on the surface.
#[derive(Debug, Clone)]
pub struct ScaledFrame {
    pub image: RasterImage,
    pub placement: Placement,
}

/// Frame state for the current index only.
///
/// The readiness set is derived from what the pipeline holds, so a flag can
/// never be set without its raster.
#[derive(Debug, Default)]
pub struct FramePipeline {
    decoded: Option<RasterImage>,
    scaled: Option<ScaledFrame>,
    composited: bool,
    geometry: Geometry,
}

impl FramePipeline {
    pub fn new(geometry: Geometry) -> Self {
        FramePipeline {
            geometry,
            ..Default::default()
        }
    }

    pub fn readiness(&self) -> Readiness {
        let mut readiness = Readiness::empty();
        readiness.set(Readiness::DECODED, self.decoded.is_some());
        readiness.set(Readiness::SCALED, self.scaled.is_some());
        readiness.set(Readiness::COMPOSITED, self.composited);
        readiness
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn is_complete(&self) -> bool {
        self.readiness().is_all()
    }

    /// The lowest stage that has not run yet, if any.
    pub fn next_stage(&self) -> Option<Stage> {
        match (&self.decoded, &self.scaled, self.composited) {
            (None, _, _) => Some(Stage::Decode),
            (Some(_), None, _) => Some(Stage::Scale),
            (Some(_), Some(_), false) => Some(Stage::Present),
            (Some(_), Some(_), true) => None,
        }
    }

    /// The index changed: every stage must run again.
    pub fn invalidate_navigation(&mut self) {
        trace!("Pipeline: navigation invalidates {:?}", self.readiness());
        self.decoded = None;
        self.scaled = None;
        self.composited = false;
    }

    /// The surface changed size: rescale and recomposite, keep the decode.
    /// Returns false (and keeps everything) if the size did not change.
    pub fn invalidate_geometry(&mut self, geometry: Geometry) -> bool {
        if geometry == self.geometry {
            return false;
        }
        debug!("Pipeline: geometry {} -> {}", self.geometry, geometry);
        self.geometry = geometry;
        self.scaled = None;
        self.composited = false;
        true
    }

    /// Runs the lowest missing stage and stops.
    ///
    /// Returns the stage that ran, or `None` if the frame was already complete.
    /// On failure the readiness is left exactly as it was.
    pub fn update<C, S>(
        &mut self,
        source: FrameSource<'_>,
        codec: &C,
        surface: &mut S,
    ) -> Result<Option<Stage>, PipelineError>
    where
        C: Codec + ?Sized,
        S: Surface + ?Sized,
    {
        let stage = match (&self.decoded, &self.scaled, self.composited) {
            (None, _, _) => {
                let image = codec.decode(source.id)?;
                debug!(
                    "Decoded {} ({}x{})",
                    source.id,
                    image.width(),
                    image.height()
                );
                self.decoded = Some(image);
                Stage::Decode
            }
            (Some(decoded), None, _) => {
                let image = codec.scale(decoded, self.geometry.width, self.geometry.height);
                let placement = Placement::centered(image.dimensions(), self.geometry);
                self.scaled = Some(ScaledFrame { image, placement });
                Stage::Scale
            }
            (Some(decoded), Some(scaled), false) => {
                let frame = Frame {
                    image: &scaled.image,
                    placement: scaled.placement,
                    source_id: source.id,
                    index: source.index,
                    total: source.total,
                    original_size: decoded.dimensions(),
                };
                surface.present(&frame)?;
                self.composited = true;
                Stage::Present
            }
            (Some(_), Some(_), true) => return Ok(None),
        };
        trace!("Pipeline: {:?} done, readiness {:?}", stage, self.readiness());
        Ok(Some(stage))
    }

    /// Loops [`update`](Self::update) until the frame is complete or a stage fails.
    pub fn run_to_completion<C, S>(
        &mut self,
        source: FrameSource<'_>,
        codec: &C,
        surface: &mut S,
    ) -> Result<(), PipelineError>
    where
        C: Codec + ?Sized,
        S: Surface + ?Sized,
    {
        while self.update(source, codec, surface)?.is_some() {}
        Ok(())
    }
}
