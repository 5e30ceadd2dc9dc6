mod cache;
mod clock;
mod config;
mod dispatch;
mod geometry;
mod render;
mod surface;
mod timer;
mod wayland;

use std::time::Instant;

use cosmic_text::fontdb::Database;
use cosmic_text::FontSystem;
use smithay_client_toolkit as sctk;
use sctk::reexports::calloop::{self, EventLoop};
use sctk::reexports::calloop_wayland_source::WaylandSource;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::cache::ImageCache;
use crate::config::{Config, Driver};
use crate::dispatch::{Dispatcher, Notification, Status};
use crate::geometry::Placement;
use crate::render::{DrawState, Renderer, TextStyle};
use crate::surface::{Surface, SurfaceError};
use crate::timer::{Deadline, TimerError};
use crate::wayland::{App, OpenError};

/// Set by screensaver daemons to the window we should draw into.
const PARENT_ENV: &str = "XSCREENSAVER_WINDOW";

#[derive(Debug, Error)]
enum Error {
    #[error("no background image provided")]
    Usage,
    #[error(transparent)]
    Open(#[from] OpenError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error("event loop: {0}")]
    Loop(#[from] calloop::Error),
    #[error(transparent)]
    Timer(#[from] TimerError),
}

#[derive(Debug, PartialEq)]
struct Args {
    image: String,
    placement: Option<Placement>,
}

fn parse_args(args: &[String]) -> Result<Args, Error> {
    let mut image = None;
    let mut placement = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--placement" if i + 1 < args.len() => {
                match args[i + 1].parse() {
                    Ok(p) => placement = Some(p),
                    Err(e) => tracing::warn!("ignoring --placement: {e}"),
                }
                i += 2;
            }
            arg if arg.starts_with("--") => { tracing::warn!("unknown arg: {arg}"); i += 1; }
            arg => { image = Some(arg.to_owned()); i += 1; }
        }
    }
    Ok(Args { image: image.ok_or(Error::Usage)?, placement })
}

fn load_fonts(cfg: &Config) -> (FontSystem, Option<String>) {
    let Some(font) = cfg.font.as_deref() else {
        return (FontSystem::new(), cfg.font_family.clone());
    };
    match std::fs::read(config::expand_path(font)) {
        Ok(data) => match font_db(data) {
            Some((db, family)) => (
                FontSystem::new_with_locale_and_db("en-US".into(), db),
                family.or_else(|| cfg.font_family.clone()),
            ),
            None => {
                tracing::warn!(font, "font file has no usable faces, using system fonts");
                (FontSystem::new(), cfg.font_family.clone())
            }
        },
        Err(e) => {
            tracing::warn!(font, "failed to read font file, using system fonts: {e}");
            (FontSystem::new(), cfg.font_family.clone())
        }
    }
}

/// Database holding only `data`, with the family of its first face.
/// `None` when `data` holds no face.
fn font_db(data: Vec<u8>) -> Option<(Database, Option<String>)> {
    let mut db = Database::new();
    db.load_font_data(data);
    let family = db.faces().next()?.families.first().map(|(name, _)| name.clone());
    Some((db, family))
}

fn run() -> Result<(), Error> {
    let cfg = config::load_config();
    let args = parse_args(&std::env::args().skip(1).collect::<Vec<_>>())?;
    let colors = config::load_colors(cfg.color_file.as_deref());
    let parent = config::parse_parent(std::env::var(PARENT_ENV).ok().as_deref());

    let wayland::Session { conn, mut app, event_queue, window, viewport } = wayland::open(parent)?;

    let mut event_loop: EventLoop<App> = EventLoop::try_new()?;
    WaylandSource::new(conn, event_queue)
        .insert(event_loop.handle())
        .map_err(|e| e.error)?;

    let mut deadline = match cfg.driver {
        Driver::Timer => {
            timer::insert_ticker(&event_loop.handle(), cfg.interval(), |app: &mut App| {
                app.inbox.push_back(Notification::Repaint);
            })?;
            None
        }
        Driver::Poll => Some(Deadline::new(Instant::now(), cfg.interval())),
    };

    let (font_system, family) = load_fonts(&cfg);
    let renderer = Renderer::new(font_system, TextStyle {
        primary_size: cfg.primary_size,
        secondary_size: cfg.secondary_size,
        line_gap: cfg.line_gap,
        color: colors.text,
        alpha: colors.text_alpha,
        background: colors.background,
        family,
    });
    let state = DrawState {
        background: args.image,
        cache: ImageCache::new(),
        placement: args.placement.or(cfg.placement),
        primary_format: cfg.primary_format,
        secondary_format: cfg.secondary_format,
        offset_left: cfg.offset_left,
        offset_bottom: cfg.offset_bottom,
        viewport,
        timestamp: 0,
    };

    let surface = Surface::create(window, viewport)?;
    let mut dispatcher = Dispatcher::start(surface, renderer, state)?;

    while dispatcher.drain(&mut app.inbox)? == Status::Running {
        let wait = deadline.map(|d| d.remaining(Instant::now()));
        event_loop.dispatch(wait, &mut app)?;
        if let Some(deadline) = deadline.as_mut() {
            if deadline.expire(Instant::now()) {
                app.inbox.push_back(Notification::Repaint);
            }
        }
    }

    dispatcher.close().close();
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
