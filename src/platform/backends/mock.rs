// src/platform/backends/mock.rs

use crate::error::PresentError;
use crate::geometry::{Geometry, Placement};
use crate::platform::backends::{BackendKind, Frame, Surface, SurfaceEvent};
use anyhow::{anyhow, Result};
use std::collections::VecDeque;

/// What a `RecordingSurface` saw for one successful present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedFrame {
    pub source_id: String,
    pub index: usize,
    pub total: usize,
    pub placement: Placement,
    pub size: (u32, u32),
}

/// Which failure the next `present` call should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Recoverable,
    Fatal,
}

/// In-memory surface that records presented frames and replays scripted events.
pub struct RecordingSurface {
    geometry: Geometry,
    events: VecDeque<SurfaceEvent>,
    presented: Vec<PresentedFrame>,
    /// Size of the buffer holding the frame on screen. Only a present
    /// changes it; a resize leaves it alone, as real backends do.
    bound: Option<Geometry>,
    pending_failure: Option<InjectedFailure>,
    pub resizes: Vec<Geometry>,
    pub repaints: usize,
    pub fullscreen_toggles: usize,
    pub releases: usize,
    pub allocated: bool,
}

impl RecordingSurface {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            events: VecDeque::new(),
            presented: Vec::new(),
            bound: None,
            pending_failure: None,
            resizes: Vec::new(),
            repaints: 0,
            fullscreen_toggles: 0,
            releases: 0,
            allocated: false,
        }
    }

    pub fn push_event(&mut self, event: SurfaceEvent) {
        self.events.push_back(event);
    }

    pub fn fail_next_present(&mut self, failure: InjectedFailure) {
        self.pending_failure = Some(failure);
    }

    pub fn presented(&self) -> &[PresentedFrame] {
        &self.presented
    }

    /// The frame currently on screen, if any.
    pub fn on_screen(&self) -> Option<&PresentedFrame> {
        self.presented.last()
    }

    /// Size of the buffer the on-screen frame was composed into.
    pub fn bound(&self) -> Option<Geometry> {
        self.bound
    }
}

impl Surface for RecordingSurface {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn allocate(&mut self, requested: Geometry) -> Result<Geometry> {
        self.allocated = true;
        if !requested.is_empty() {
            self.geometry = requested;
        }
        Ok(self.geometry)
    }

    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn present(&mut self, frame: &Frame<'_>) -> std::result::Result<(), PresentError> {
        match self.pending_failure.take() {
            Some(InjectedFailure::Recoverable) => {
                return Err(PresentError::recoverable(anyhow!("injected present failure")))
            }
            Some(InjectedFailure::Fatal) => {
                return Err(PresentError::fatal(anyhow!("injected fatal present failure")))
            }
            None => {}
        }
        self.presented.push(PresentedFrame {
            source_id: frame.source_id.to_string(),
            index: frame.index,
            total: frame.total,
            placement: frame.placement,
            size: frame.image.dimensions(),
        });
        self.bound = Some(self.geometry);
        Ok(())
    }

    fn repaint(&mut self) -> std::result::Result<(), PresentError> {
        self.repaints += 1;
        Ok(())
    }

    fn resize(&mut self, geometry: Geometry) -> Result<()> {
        self.geometry = geometry;
        self.resizes.push(geometry);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.bound = None;
        if self.allocated {
            self.allocated = false;
            self.releases += 1;
        }
        Ok(())
    }

    fn wait_event(&mut self) -> Result<SurfaceEvent> {
        // Once the script runs out, behave like a user closing the window.
        Ok(self
            .events
            .pop_front()
            .unwrap_or(SurfaceEvent::CloseRequested))
    }

    fn toggle_fullscreen(&mut self) -> Result<()> {
        self.fullscreen_toggles += 1;
        Ok(())
    }
}
