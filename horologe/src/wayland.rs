use std::collections::VecDeque;
use std::io;

use smithay_client_toolkit as sctk;
use sctk::compositor::{CompositorHandler, CompositorState};
use sctk::output::{OutputHandler, OutputState};
use sctk::registry::{ProvidesRegistryState, RegistryState};
use sctk::registry_handlers;
use sctk::seat::pointer::{PointerEvent, PointerEventKind, PointerHandler};
use sctk::seat::{Capability, SeatHandler, SeatState};
use sctk::shell::wlr_layer::{
    Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
    LayerSurfaceConfigure,
};
use sctk::shell::WaylandSurface;
use sctk::shm::slot::SlotPool;
use sctk::shm::{CreatePoolError, Shm, ShmHandler};
use sctk::{
    delegate_compositor, delegate_layer, delegate_output, delegate_pointer, delegate_registry,
    delegate_seat, delegate_shm,
};
use thiserror::Error;
use tiny_skia::Pixmap;
use wayland_client::backend::WaylandError;
use wayland_client::globals::{registry_queue_init, BindError, GlobalError};
use wayland_client::protocol::{wl_output, wl_pointer, wl_seat, wl_shm, wl_surface};
use wayland_client::{ConnectError, Connection, DispatchError, EventQueue, QueueHandle};

use crate::dispatch::Notification;
use crate::geometry::Viewport;
use crate::surface::{Backend, SurfaceError};

const NAMESPACE: &str = "horologe";

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("cannot connect to the Wayland compositor: {0}")]
    Connect(#[from] ConnectError),
    #[error("cannot read compositor globals: {0}")]
    Globals(#[from] GlobalError),
    #[error("compositor lacks a required global: {0}")]
    Bind(#[from] BindError),
    #[error("wayland dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("cannot create shm pool: {0}")]
    Pool(#[from] CreatePoolError),
    #[error("layer surface closed before it was configured")]
    Closed,
}

/// Protocol state. Handlers only translate events into notifications.
pub struct App {
    registry_state: RegistryState,
    seat_state: SeatState,
    output_state: OutputState,
    shm: Shm,
    pointer: Option<wl_pointer::WlPointer>,
    configured: Option<Viewport>,
    pub inbox: VecDeque<Notification>,
}

impl App {
    fn post(&mut self, notification: Notification) {
        self.inbox.push_back(notification);
    }

    fn find_output(&self, id: u32) -> Option<wl_output::WlOutput> {
        self.output_state
            .outputs()
            .find(|o| self.output_state.info(o).is_some_and(|info| info.id == id))
    }
}

/// The layer surface and its shm buffers.
pub struct Window {
    layer: LayerSurface,
    pool: SlotPool,
    conn: Connection,
}

impl Window {
    /// Destroys the surface and its buffers, then the connection.
    pub fn close(self) {
        let Window { layer, pool, conn } = self;
        drop(layer);
        drop(pool);
        if let Err(e) = conn.flush() {
            tracing::debug!("flush on close failed: {e}");
        }
        drop(conn);
        tracing::info!("disconnected");
    }
}

impl Backend for Window {
    fn resize(&mut self, viewport: Viewport) -> Result<(), SurfaceError> {
        let len = viewport.width as usize * viewport.height as usize * 4;
        self.pool.resize(len).map_err(SurfaceError::backend)
    }

    fn present(&mut self, frame: &Pixmap) -> Result<(), SurfaceError> {
        let (w, h) = (frame.width() as i32, frame.height() as i32);
        let (buffer, canvas) = self.pool
            .create_buffer(w, h, w * 4, wl_shm::Format::Argb8888)
            .map_err(SurfaceError::backend)?;

        // Copy RGBA premul -> BGRA (ARGB8888 on LE)
        for (dst, src) in canvas.chunks_exact_mut(4).zip(frame.data().chunks_exact(4)) {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
            dst[3] = src[3];
        }

        buffer.attach_to(self.layer.wl_surface()).map_err(SurfaceError::backend)?;
        self.layer.wl_surface().damage_buffer(0, 0, w, h);
        self.layer.wl_surface().commit();
        flushed(self.conn.flush())
    }
}

/// A full socket is not fatal: the commit stays queued in libwayland and goes
/// out with the next flush.
fn flushed(result: Result<(), WaylandError>) -> Result<(), SurfaceError> {
    match result {
        Err(WaylandError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {
            tracing::debug!("compositor socket full, flush deferred");
            Ok(())
        }
        other => other.map_err(SurfaceError::backend),
    }
}

pub struct Session {
    pub conn: Connection,
    pub app: App,
    pub event_queue: EventQueue<App>,
    pub window: Window,
    pub viewport: Viewport,
}

/// Connects, creates a full-output layer surface and waits for its first
/// configure. `parent` selects the output with that global name.
pub fn open(parent: Option<u32>) -> Result<Session, OpenError> {
    let conn = Connection::connect_to_env()?;
    let (globals, mut event_queue) = registry_queue_init::<App>(&conn)?;
    let qh = event_queue.handle();

    let compositor = CompositorState::bind(&globals, &qh)?;
    let layer_shell = LayerShell::bind(&globals, &qh)?;
    let shm = Shm::bind(&globals, &qh)?;

    let mut app = App {
        registry_state: RegistryState::new(&globals),
        seat_state: SeatState::new(&globals, &qh),
        output_state: OutputState::new(&globals, &qh),
        shm,
        pointer: None,
        configured: None,
        inbox: VecDeque::new(),
    };
    event_queue.roundtrip(&mut app)?;

    let output = parent.and_then(|id| {
        let found = app.find_output(id);
        match found {
            Some(_) => tracing::info!(parent = id, "attaching to parent output"),
            None => tracing::warn!(parent = id, "no output with that id, using the default"),
        }
        found
    });

    let surface = compositor.create_surface(&qh);
    let layer = layer_shell.create_layer_surface(&qh, surface, Layer::Overlay, Some(NAMESPACE), output.as_ref());
    layer.set_anchor(Anchor::all());
    layer.set_size(0, 0);
    layer.set_exclusive_zone(-1);
    layer.set_keyboard_interactivity(KeyboardInteractivity::None);
    layer.wl_surface().commit();

    let viewport = loop {
        if let Some(viewport) = app.configured {
            break viewport;
        }
        if app.inbox.contains(&Notification::Dismiss) {
            return Err(OpenError::Closed);
        }
        event_queue.blocking_dispatch(&mut app)?;
    };
    tracing::info!(width = viewport.width, height = viewport.height, "window configured");

    let pool = SlotPool::new(viewport.width as usize * viewport.height as usize * 4, &app.shm)?;
    let window = Window { layer, pool, conn: conn.clone() };
    Ok(Session { conn, app, event_queue, window, viewport })
}

// --- Wayland handler boilerplate ---

impl CompositorHandler for App {
    fn scale_factor_changed(&mut self, _: &Connection, _: &QueueHandle<Self>, _: &wl_surface::WlSurface, _: i32) {}
    fn transform_changed(&mut self, _: &Connection, _: &QueueHandle<Self>, _: &wl_surface::WlSurface, _: wl_output::Transform) {}
    fn frame(&mut self, _: &Connection, _: &QueueHandle<Self>, _: &wl_surface::WlSurface, _: u32) {}
    fn surface_enter(&mut self, _: &Connection, _: &QueueHandle<Self>, _: &wl_surface::WlSurface, _: &wl_output::WlOutput) {}
    fn surface_leave(&mut self, _: &Connection, _: &QueueHandle<Self>, _: &wl_surface::WlSurface, _: &wl_output::WlOutput) {}
}

impl OutputHandler for App {
    fn output_state(&mut self) -> &mut OutputState { &mut self.output_state }
    fn new_output(&mut self, _: &Connection, _: &QueueHandle<Self>, _: wl_output::WlOutput) {}
    fn update_output(&mut self, _: &Connection, _: &QueueHandle<Self>, _: wl_output::WlOutput) {}
    fn output_destroyed(&mut self, _: &Connection, _: &QueueHandle<Self>, _: wl_output::WlOutput) {}
}

impl SeatHandler for App {
    fn seat_state(&mut self) -> &mut SeatState { &mut self.seat_state }
    fn new_seat(&mut self, _: &Connection, _: &QueueHandle<Self>, _: wl_seat::WlSeat) {}
    fn new_capability(&mut self, _: &Connection, qh: &QueueHandle<Self>, seat: wl_seat::WlSeat, capability: Capability) {
        if capability == Capability::Pointer && self.pointer.is_none() {
            match self.seat_state.get_pointer(qh, &seat) {
                Ok(pointer) => self.pointer = Some(pointer),
                Err(e) => tracing::warn!("no pointer, click to dismiss unavailable: {e}"),
            }
        }
    }
    fn remove_capability(&mut self, _: &Connection, _: &QueueHandle<Self>, _: wl_seat::WlSeat, capability: Capability) {
        if capability == Capability::Pointer {
            if let Some(pointer) = self.pointer.take() { pointer.release(); }
        }
    }
    fn remove_seat(&mut self, _: &Connection, _: &QueueHandle<Self>, _: wl_seat::WlSeat) {}
}

impl PointerHandler for App {
    fn pointer_frame(&mut self, _: &Connection, _: &QueueHandle<Self>, _: &wl_pointer::WlPointer, events: &[PointerEvent]) {
        for event in events {
            match event.kind {
                PointerEventKind::Press { .. } => self.post(Notification::Dismiss),
                PointerEventKind::Motion { .. } | PointerEventKind::Axis { .. } => {}
                _ => self.post(Notification::Other),
            }
        }
    }
}

impl ShmHandler for App {
    fn shm_state(&mut self) -> &mut Shm { &mut self.shm }
}

impl LayerShellHandler for App {
    fn closed(&mut self, _: &Connection, _: &QueueHandle<Self>, _: &LayerSurface) {
        self.post(Notification::Dismiss);
    }
    fn configure(&mut self, _: &Connection, _: &QueueHandle<Self>, _: &LayerSurface, configure: LayerSurfaceConfigure, _: u32) {
        let (width, height) = configure.new_size;
        if width == 0 || height == 0 { return; }
        self.configured = Some(Viewport::new(width, height));
        // Wayland has no separate expose; a new size always needs a new buffer.
        self.post(Notification::Resize { width, height });
        self.post(Notification::Repaint);
    }
}

impl ProvidesRegistryState for App {
    fn registry(&mut self) -> &mut RegistryState { &mut self.registry_state }
    registry_handlers![OutputState, SeatState];
}

delegate_compositor!(App);
delegate_output!(App);
delegate_seat!(App);
delegate_pointer!(App);
delegate_shm!(App);
delegate_layer!(App);
delegate_registry!(App);
