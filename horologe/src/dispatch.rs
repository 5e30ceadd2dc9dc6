use std::collections::VecDeque;

use crate::render::{DrawState, Renderer};
use crate::surface::{Backend, Surface, SurfaceError};

/// One entry in the dispatcher's inbox, from the backend or the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Resize { width: u32, height: u32 },
    Repaint,
    Dismiss,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Stopped,
}

/// Single owner of the surface and draw state. Nothing else paints or
/// resizes; everything else posts a `Notification`.
pub struct Dispatcher<B: Backend> {
    surface: Surface<B>,
    renderer: Renderer,
    state: DrawState,
    status: Status,
}

impl<B: Backend> Dispatcher<B> {
    /// Paints once unconditionally, then starts running.
    pub fn start(surface: Surface<B>, renderer: Renderer, mut state: DrawState) -> Result<Self, SurfaceError> {
        state.viewport = surface.viewport();
        let mut dispatcher = Self { surface, renderer, state, status: Status::Stopped };
        dispatcher.repaint()?;
        dispatcher.status = Status::Running;
        tracing::info!(width = dispatcher.state.viewport.width, height = dispatcher.state.viewport.height, "running");
        Ok(dispatcher)
    }

    #[cfg(test)]
    pub fn status(&self) -> Status {
        self.status
    }

    #[cfg(test)]
    pub fn state(&self) -> &DrawState {
        &self.state
    }

    pub fn dispatch(&mut self, notification: Notification) -> Result<Status, SurfaceError> {
        if self.status == Status::Stopped {
            return Ok(Status::Stopped);
        }
        tracing::debug!(?notification, "dispatch");
        match notification {
            Notification::Resize { width, height } => {
                self.surface.resize(width, height)?;
                self.state.viewport = self.surface.viewport();
            }
            Notification::Repaint => self.repaint()?,
            Notification::Dismiss => {
                tracing::info!("dismissed");
                self.status = Status::Stopped;
            }
            Notification::Other => {}
        }
        Ok(self.status)
    }

    /// Processes queued notifications in arrival order, stopping at dismiss.
    /// Anything queued behind a dismiss is left untouched.
    pub fn drain(&mut self, inbox: &mut VecDeque<Notification>) -> Result<Status, SurfaceError> {
        while self.status == Status::Running {
            let Some(notification) = inbox.pop_front() else { break };
            self.dispatch(notification)?;
        }
        Ok(self.status)
    }

    /// Releases cached images and the surface, returning the backend so the
    /// connection goes last.
    pub fn close(self) -> B {
        let Dispatcher { surface, mut state, .. } = self;
        tracing::debug!(images = state.cache.size(), "releasing image cache");
        state.cache.clear();
        surface.close()
    }

    fn repaint(&mut self) -> Result<(), SurfaceError> {
        self.renderer.paint(&mut self.surface, &mut self.state)
    }
}
