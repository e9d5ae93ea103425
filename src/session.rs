// src/session.rs
//! Owns one viewing session: the image list, the navigator, the frame
//! pipeline, and the borrowed surface and codec. Events from the surface are
//! routed to commands, and each event drives the pipeline to completion (or
//! to its first failure) before the next one is read.
//!
//! Collaborators are trait objects so tests can run a whole session against
//! a `RecordingSurface` and a `FakeCodec`.

use crate::codec::Codec;
use crate::error::PresentError;
use crate::input::{route_button, route_key, Command};
use crate::navigation::Navigator;
use crate::pipeline::{FramePipeline, FrameSource, PipelineError};
use crate::platform::backends::{Surface, SurfaceEvent};
use crate::sources::ImageList;
use anyhow::{Context, Result};
use log::{debug, error, info, trace, warn};
use std::io::Write;

/// Whether the session keeps reading events after handling one.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SessionStatus {
    Running,
    /// Quit was requested; the surface must be released.
    Shutdown,
}

pub struct Session<'a> {
    images: ImageList,
    navigator: Navigator,
    pipeline: FramePipeline,
    codec: &'a dyn Codec,
    surface: &'a mut dyn Surface,
    /// Receives `EmitCurrent` lines. Standard output in production.
    output: &'a mut dyn Write,
}

impl<'a> Session<'a> {
    /// Creates a session on an already allocated surface.
    pub fn new(
        images: ImageList,
        jump_distance: usize,
        codec: &'a dyn Codec,
        surface: &'a mut dyn Surface,
        output: &'a mut dyn Write,
    ) -> Self {
        let navigator = Navigator::new(images.len(), jump_distance);
        let pipeline = FramePipeline::new(surface.geometry());
        Session {
            images,
            navigator,
            pipeline,
            codec,
            surface,
            output,
        }
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    /// Source identifier at the current index.
    pub fn current_source(&self) -> &str {
        self.images.get(self.navigator.current()).unwrap_or_default()
    }

    /// Drives the pipeline for the current index as far as it goes.
    ///
    /// Decode failures and recoverable present failures are diagnostics only:
    /// whatever was on screen stays there. A fatal present failure releases
    /// the surface and ends the session.
    pub fn render(&mut self) -> Result<()> {
        let index = self.navigator.current();
        let Some(id) = self.images.get(index) else {
            return Ok(());
        };
        let source = FrameSource {
            id,
            index,
            total: self.images.len(),
        };
        match self
            .pipeline
            .run_to_completion(source, self.codec, &mut *self.surface)
        {
            Ok(()) => Ok(()),
            Err(PipelineError::Decode(e)) => {
                error!("Cannot display {:#}", e);
                Ok(())
            }
            Err(PipelineError::Present(e)) => self.present_failed(e),
        }
    }

    fn present_failed(&mut self, e: PresentError) -> Result<()> {
        match e {
            PresentError::Recoverable(cause) => {
                warn!("Frame not shown: {:#}", cause);
                Ok(())
            }
            PresentError::Fatal(cause) => {
                error!("{} surface failed: {:#}", self.surface.kind(), cause);
                if let Err(release_err) = self.surface.release() {
                    error!("Release after fatal present failed: {:#}", release_err);
                }
                Err(cause.context("display output is no longer usable"))
            }
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Result<SessionStatus> {
        debug!("Session: {:?} at index {}", command, self.navigator.current());
        match command {
            Command::Next
            | Command::Prev
            | Command::JumpForward
            | Command::JumpBackward
            | Command::First
            | Command::Last => {
                if self.navigator.apply(command) {
                    self.pipeline.invalidate_navigation();
                    self.render()?;
                }
            }
            Command::ToggleFullscreen => {
                if let Err(e) = self.surface.toggle_fullscreen() {
                    warn!("Fullscreen toggle failed: {:#}", e);
                }
            }
            Command::EmitCurrent => {
                let index = self.navigator.current();
                let source = self.images.get(index).unwrap_or_default();
                if let Err(e) = writeln!(self.output, "{}", source).and_then(|_| self.output.flush())
                {
                    warn!("Failed to write {} to output: {}", source, e);
                }
            }
            Command::Quit => return Ok(SessionStatus::Shutdown),
        }
        Ok(SessionStatus::Running)
    }

    pub fn handle_event(&mut self, event: SurfaceEvent) -> Result<SessionStatus> {
        trace!("Session: event {:?}", event);
        match event {
            SurfaceEvent::Key(symbol) => match route_key(symbol) {
                Some(command) => self.handle_command(command),
                None => Ok(SessionStatus::Running),
            },
            SurfaceEvent::Button(button) => match route_button(button) {
                Some(command) => self.handle_command(command),
                None => Ok(SessionStatus::Running),
            },
            SurfaceEvent::Resized(geometry) => {
                if let Err(e) = self.surface.resize(geometry) {
                    error!("Resize to {} failed: {:#}", geometry, e);
                }
                if self.pipeline.invalidate_geometry(self.surface.geometry()) {
                    self.render()?;
                }
                Ok(SessionStatus::Running)
            }
            SurfaceEvent::Exposed => {
                if let Err(e) = self.surface.repaint() {
                    self.present_failed(e)?;
                }
                Ok(SessionStatus::Running)
            }
            SurfaceEvent::CloseRequested => Ok(SessionStatus::Shutdown),
        }
    }

    /// Shows the first image, then handles events until quit.
    ///
    /// The surface is released on every way out.
    pub fn run(&mut self) -> Result<()> {
        info!(
            "Session started with {} image(s) on {}",
            self.images.len(),
            self.surface.kind()
        );
        let result = self.event_loop();
        let released = self
            .surface
            .release()
            .with_context(|| format!("failed to release {} surface", self.surface.kind()));
        match (result, released) {
            (Err(e), Err(release_err)) => {
                error!("{:#}", release_err);
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => {
                info!("Session ended");
                Ok(())
            }
        }
    }

    fn event_loop(&mut self) -> Result<()> {
        self.render()?;
        loop {
            let event = self.surface.wait_event()?;
            if self.handle_event(event)? == SessionStatus::Shutdown {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests;
