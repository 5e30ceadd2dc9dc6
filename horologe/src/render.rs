use cosmic_text::{Attrs, Buffer, Family, FontSystem, Metrics, Shaping, SwashCache, SwashContent};
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint};

use crate::cache::ImageCache;
use crate::clock;
use crate::geometry::{self, Placement, ScaleTranslate, Viewport};
use crate::surface::{Backend, Surface, SurfaceError};

/// Everything a paint reads, owned by the dispatcher.
pub struct DrawState {
    pub background: String,
    pub cache: ImageCache,
    pub placement: Option<Placement>,
    pub primary_format: String,
    pub secondary_format: String,
    pub offset_left: f32,
    pub offset_bottom: f32,
    pub viewport: Viewport,
    pub timestamp: i64,
}

#[derive(Clone)]
pub struct TextStyle {
    pub primary_size: f32,
    pub secondary_size: f32,
    /// Distance from the secondary baseline up to the primary baseline.
    pub line_gap: f32,
    pub color: [u8; 3],
    pub alpha: u8,
    pub background: [u8; 3],
    pub family: Option<String>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            primary_size: 100.0,
            secondary_size: 50.0,
            line_gap: 60.0,
            color: [0xff, 0xff, 0xff],
            alpha: 0xff,
            background: [0, 0, 0],
            family: None,
        }
    }
}

pub struct Renderer {
    font_system: FontSystem,
    swash_cache: SwashCache,
    style: TextStyle,
    /// cosmic-text panics when shaping against an empty database.
    has_fonts: bool,
}

impl Renderer {
    pub fn new(font_system: FontSystem, style: TextStyle) -> Self {
        let has_fonts = font_system.db().faces().next().is_some();
        if !has_fonts {
            tracing::warn!("no font faces available, the clock text will not be drawn");
        }
        Self { font_system, swash_cache: SwashCache::new(), style, has_fonts }
    }

    /// Composites background and clock into `surface` and flushes it.
    ///
    /// A background that fails to decode is logged and skipped; only a failed
    /// flush is returned.
    pub fn paint<B: Backend>(&mut self, surface: &mut Surface<B>, state: &mut DrawState) -> Result<(), SurfaceError> {
        let viewport = state.viewport;
        let bg = self.style.background;
        let pixmap = surface.canvas();
        pixmap.fill(tiny_skia::Color::from_rgba8(bg[0], bg[1], bg[2], 0xff));

        match state.cache.get_or_decode(&state.background) {
            Ok(image) => {
                let placement = match state.placement {
                    Some(policy) => geometry::compute_placement(viewport, image.width(), image.height(), policy),
                    None => ScaleTranslate::IDENTITY,
                };
                let paint = PixmapPaint { quality: FilterQuality::Bilinear, ..PixmapPaint::default() };
                pixmap.draw_pixmap(0, 0, Pixmap::as_ref(&image), &paint, placement.to_transform(), None);
            }
            Err(e) => tracing::warn!(path = %state.background, error = %e, "unable to open image"),
        }

        state.timestamp = clock::now();
        let primary = clock::format(state.timestamp, &state.primary_format);
        let secondary = clock::format(state.timestamp, &state.secondary_format);

        if !self.has_fonts {
            return surface.flush();
        }

        let baseline = viewport.height as f32 - state.offset_bottom;
        let style = &self.style;
        for (text, size, line_baseline) in [
            (&primary, style.primary_size, baseline - style.line_gap),
            (&secondary, style.secondary_size, baseline),
        ] {
            render_text(
                pixmap, &mut self.font_system, &mut self.swash_cache,
                text, state.offset_left, line_baseline, size,
                viewport.width as f32 - state.offset_left, size * LINE_HEIGHT,
                style.color, style.alpha, &style.family,
            );
        }

        surface.flush()
    }
}

const LINE_HEIGHT: f32 = 1.2;

// --- Text helpers ---

fn make_attrs(family: &Option<String>) -> Attrs<'_> {
    match family {
        Some(name) => Attrs::new().family(Family::Name(name)),
        None => Attrs::new(),
    }
}

fn render_text(
    pixmap: &mut Pixmap, font_system: &mut FontSystem, swash_cache: &mut SwashCache,
    text: &str, x: f32, y: f32, font_size: f32, max_w: f32, max_h: f32, color: [u8; 3], alpha: u8,
    family: &Option<String>,
) {
    if text.is_empty() { return; }
    let mut buf = Buffer::new(font_system, Metrics::new(font_size, font_size * LINE_HEIGHT));
    buf.set_size(font_system, Some(max_w.max(0.0)), Some(max_h));
    buf.set_text(font_system, text, &make_attrs(family), Shaping::Advanced, None);
    buf.shape_until_scroll(font_system, false);

    let pw = pixmap.width() as i32;
    let ph = pixmap.height() as i32;
    for run in buf.layout_runs() {
        for glyph in run.glyphs.iter() {
            let physical = glyph.physical((x, y), 1.0);
            let Some(image) = swash_cache.get_image_uncached(font_system, physical.cache_key) else { continue };
            let x0 = physical.x + image.placement.left;
            let y0 = physical.y - image.placement.top;
            let w = image.placement.width as i32;
            let h = image.placement.height as i32;
            match image.content {
                SwashContent::Mask => blit_mask(pixmap.data_mut(), pw, ph, x0, y0, w, h, &image.data, color, alpha),
                SwashContent::Color => blit_color(pixmap.data_mut(), pw, ph, x0, y0, w, h, &image.data),
                SwashContent::SubpixelMask => {}
            }
        }
    }
}

fn blit_mask(data: &mut [u8], pw: i32, ph: i32, x0: i32, y0: i32, w: i32, h: i32, mask: &[u8], color: [u8; 3], alpha: u8) {
    for gy in 0..h {
        let py = y0 + gy;
        if py < 0 || py >= ph { continue; }
        for gx in 0..w {
            let px = x0 + gx;
            if px < 0 || px >= pw { continue; }
            let a = mask[(gy * w + gx) as usize] as u32 * alpha as u32 / 255;
            if a == 0 { continue; }
            let i = (py * pw + px) as usize * 4;
            let inv = 255 - a;
            data[i]     = ((color[0] as u32 * a + data[i] as u32 * inv) / 255) as u8;
            data[i + 1] = ((color[1] as u32 * a + data[i + 1] as u32 * inv) / 255) as u8;
            data[i + 2] = ((color[2] as u32 * a + data[i + 2] as u32 * inv) / 255) as u8;
            data[i + 3] = (a + data[i + 3] as u32 * inv / 255) as u8;
        }
    }
}

fn blit_color(data: &mut [u8], pw: i32, ph: i32, x0: i32, y0: i32, w: i32, h: i32, rgba: &[u8]) {
    for gy in 0..h {
        let py = y0 + gy;
        if py < 0 || py >= ph { continue; }
        for gx in 0..w {
            let px = x0 + gx;
            if px < 0 || px >= pw { continue; }
            let si = (gy * w + gx) as usize * 4;
            let a = rgba[si + 3] as u32;
            if a == 0 { continue; }
            let i = (py * pw + px) as usize * 4;
            let inv = 255 - a;
            data[i]     = (rgba[si] as u32 * a / 255 + data[i] as u32 * inv / 255) as u8;
            data[i + 1] = (rgba[si + 1] as u32 * a / 255 + data[i + 1] as u32 * inv / 255) as u8;
            data[i + 2] = (rgba[si + 2] as u32 * a / 255 + data[i + 2] as u32 * inv / 255) as u8;
            data[i + 3] = (a + data[i + 3] as u32 * inv / 255) as u8;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::surface::tests::Recorder;

    /// Renderer with no font faces, so paints skip the text lines.
    pub(crate) fn bare_renderer() -> Renderer {
        let db = cosmic_text::fontdb::Database::new();
        Renderer::new(FontSystem::new_with_locale_and_db("en-US".into(), db), TextStyle::default())
    }

    pub(crate) fn state(background: &str, viewport: Viewport) -> DrawState {
        DrawState {
            background: background.into(),
            cache: ImageCache::new(),
            placement: None,
            primary_format: "%T".into(),
            secondary_format: "%A, %B %d".into(),
            offset_left: 25.0,
            offset_bottom: 60.0,
            viewport,
            timestamp: 0,
        }
    }

    fn solid_png(name: &str, w: u32, h: u32, rgb: [u8; 3]) -> String {
        let dir = std::env::temp_dir().join(format!("horologe-render-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        image::RgbaImage::from_pixel(w, h, image::Rgba([rgb[0], rgb[1], rgb[2], 0xff])).save(&path).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn missing_background_still_presents_a_frame() {
        let rec = Recorder::default();
        let vp = Viewport::new(64, 48);
        let mut surface = Surface::create(rec.clone(), vp).unwrap();
        let mut st = state("/nonexistent.png", vp);
        let mut renderer = bare_renderer();
        renderer.paint(&mut surface, &mut st).unwrap();
        renderer.paint(&mut surface, &mut st).unwrap();
        assert_eq!(rec.presented.borrow().len(), 2);
        assert_eq!(st.cache.size(), 0);
        assert!(st.timestamp > 0);
        let px = surface.canvas().pixel(10, 10).unwrap();
        assert_eq!((px.red(), px.green(), px.blue(), px.alpha()), (0, 0, 0, 255));
    }

    #[test]
    fn unscaled_background_sits_at_the_origin() {
        let path = solid_png("small.png", 10, 10, [0xff, 0, 0]);
        let vp = Viewport::new(20, 20);
        let mut surface = Surface::create(Recorder::default(), vp).unwrap();
        let mut st = state(&path, vp);
        bare_renderer().paint(&mut surface, &mut st).unwrap();
        let inside = surface.canvas().pixel(5, 5).unwrap();
        let outside = surface.canvas().pixel(15, 15).unwrap();
        assert_eq!((inside.red(), inside.green()), (0xff, 0));
        assert_eq!((outside.red(), outside.green()), (0, 0));
        assert_eq!(st.cache.size(), 1);
    }

    #[test]
    fn stretched_background_fills_the_viewport() {
        let path = solid_png("stretch.png", 10, 10, [0, 0xff, 0]);
        let vp = Viewport::new(40, 30);
        let mut surface = Surface::create(Recorder::default(), vp).unwrap();
        let mut st = state(&path, vp);
        st.placement = Some(Placement::Stretch);
        bare_renderer().paint(&mut surface, &mut st).unwrap();
        let corner = surface.canvas().pixel(38, 28).unwrap();
        assert_eq!(corner.green(), 0xff);
    }

    #[test]
    fn unusable_font_data_paints_without_text() {
        let mut db = cosmic_text::fontdb::Database::new();
        db.load_font_data(b"not a font".to_vec());
        assert_eq!(db.faces().count(), 0);
        let rec = Recorder::default();
        let vp = Viewport::new(32, 32);
        let mut surface = Surface::create(rec.clone(), vp).unwrap();
        let mut renderer = Renderer::new(FontSystem::new_with_locale_and_db("en-US".into(), db), TextStyle::default());
        let mut st = state("/nonexistent.png", vp);
        renderer.paint(&mut surface, &mut st).unwrap();
        renderer.paint(&mut surface, &mut st).unwrap();
        assert_eq!(rec.presented.borrow().len(), 2);
        assert!(st.timestamp > 0);
        let px = surface.canvas().pixel(30, 30).unwrap();
        assert_eq!((px.red(), px.green(), px.blue()), (0, 0, 0));
    }
}
