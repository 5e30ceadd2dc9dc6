use thiserror::Error;
use tiny_skia::{Pixmap, PixmapPaint, Transform};

use crate::geometry::Viewport;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("cannot allocate a {width}x{height} frame")]
    Allocate { width: u32, height: u32 },
    #[error("presentation backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SurfaceError {
    pub fn backend(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        SurfaceError::Backend(Box::new(e))
    }
}

/// The window side of a surface: whatever takes a finished frame and shows it.
pub trait Backend {
    /// Rebinds window resources to the new drawable size.
    fn resize(&mut self, viewport: Viewport) -> Result<(), SurfaceError>;

    /// Makes `frame` visible and flushes any buffered transport.
    fn present(&mut self, frame: &Pixmap) -> Result<(), SurfaceError>;
}

/// Drawable frame bound to a backend window.
pub struct Surface<B: Backend> {
    frame: Pixmap,
    viewport: Viewport,
    backend: B,
}

impl<B: Backend> Surface<B> {
    pub fn create(backend: B, viewport: Viewport) -> Result<Self, SurfaceError> {
        let frame = alloc(viewport)?;
        tracing::debug!(width = viewport.width, height = viewport.height, "surface created");
        Ok(Self { frame, viewport, backend })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn canvas(&mut self) -> &mut Pixmap {
        &mut self.frame
    }

    /// Rebinds to `width` x `height`, keeping what was already drawn.
    ///
    /// Same-size and zero-sized requests are no-ops.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        let viewport = Viewport::new(width, height);
        if viewport == self.viewport || width == 0 || height == 0 {
            return Ok(());
        }
        let mut frame = alloc(viewport)?;
        frame.draw_pixmap(0, 0, self.frame.as_ref(), &PixmapPaint::default(), Transform::identity(), None);
        self.backend.resize(viewport)?;
        self.frame = frame;
        self.viewport = viewport;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SurfaceError> {
        self.backend.present(&self.frame)
    }

    /// Releases the frame and hands the backend back so its connection can be
    /// closed after the surface.
    pub fn close(self) -> B {
        let Surface { frame, backend, .. } = self;
        drop(frame);
        backend
    }
}

fn alloc(viewport: Viewport) -> Result<Pixmap, SurfaceError> {
    Pixmap::new(viewport.width, viewport.height)
        .ok_or(SurfaceError::Allocate { width: viewport.width, height: viewport.height })
}
