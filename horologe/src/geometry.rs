use serde::Deserialize;
use tiny_skia::Transform;

/// Drawable dimensions of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Stretch,
    Fit,
    Cover,
    Center,
}

impl std::str::FromStr for Placement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stretch" => Ok(Placement::Stretch),
            "fit" => Ok(Placement::Fit),
            "cover" => Ok(Placement::Cover),
            "center" => Ok(Placement::Center),
            other => Err(format!("unknown placement '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleTranslate {
    pub scale_x: f64,
    pub scale_y: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl ScaleTranslate {
    pub const IDENTITY: Self = Self { scale_x: 1.0, scale_y: 1.0, translate_x: 0.0, translate_y: 0.0 };

    /// Scale first, then translate in viewport space.
    pub fn to_transform(self) -> Transform {
        Transform::from_row(
            self.scale_x as f32, 0.0, 0.0, self.scale_y as f32,
            self.translate_x as f32, self.translate_y as f32,
        )
    }
}

/// Computes how an `image_width` x `image_height` image is placed into `viewport`.
///
/// All dimensions must be non-zero.
pub fn compute_placement(viewport: Viewport, image_width: u32, image_height: u32, policy: Placement) -> ScaleTranslate {
    let (vw, vh) = (viewport.width as f64, viewport.height as f64);
    let (iw, ih) = (image_width as f64, image_height as f64);
    match policy {
        Placement::Stretch => ScaleTranslate { scale_x: vw / iw, scale_y: vh / ih, translate_x: 0.0, translate_y: 0.0 },
        Placement::Center => ScaleTranslate {
            scale_x: 1.0,
            scale_y: 1.0,
            translate_x: -(iw - vw) / 2.0,
            translate_y: -(ih - vh) / 2.0,
        },
        Placement::Fit | Placement::Cover => {
            let ratio_x = iw / vw;
            let ratio_y = ih / vh;
            let drive_x = match policy {
                Placement::Fit => ratio_x > ratio_y,
                _ => ratio_x < ratio_y,
            };
            if drive_x {
                let scale = 1.0 / ratio_x;
                ScaleTranslate { scale_x: scale, scale_y: scale, translate_x: 0.0, translate_y: -(ih * scale - vh) / 2.0 }
            } else {
                let scale = 1.0 / ratio_y;
                ScaleTranslate { scale_x: scale, scale_y: scale, translate_x: -(iw * scale - vw) / 2.0, translate_y: 0.0 }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    const CASES: &[(u32, u32, u32, u32)] = &[
        (1920, 1080, 1920, 1080),
        (1920, 1080, 3840, 1600),
        (1920, 1080, 800, 1200),
        (800, 600, 1024, 1024),
        (1366, 768, 640, 480),
        (1080, 1920, 2560, 1440),
    ];

    #[test]
    fn stretch_scales_axes_independently() {
        for &(vw, vh, iw, ih) in CASES {
            let st = compute_placement(Viewport::new(vw, vh), iw, ih, Placement::Stretch);
            assert!(close(st.scale_x, vw as f64 / iw as f64));
            assert!(close(st.scale_y, vh as f64 / ih as f64));
            assert_eq!((st.translate_x, st.translate_y), (0.0, 0.0));
        }
    }

    #[test]
    fn fit_matches_the_overflowing_axis_and_centers_the_other() {
        for &(vw, vh, iw, ih) in CASES {
            let st = compute_placement(Viewport::new(vw, vh), iw, ih, Placement::Fit);
            assert!(close(st.scale_x, st.scale_y));
            let (sw, sh) = (iw as f64 * st.scale_x, ih as f64 * st.scale_y);
            assert!(sw <= vw as f64 + EPS && sh <= vh as f64 + EPS);
            if close(st.translate_x, 0.0) && close(sw, vw as f64) {
                assert!(close(st.translate_y, -(sh - vh as f64) / 2.0));
            } else {
                assert!(close(sh, vh as f64));
                assert_eq!(st.translate_y, 0.0);
                assert!(close(st.translate_x, -(sw - vw as f64) / 2.0));
            }
        }
    }

    #[test]
    fn cover_fills_both_axes_and_centers_the_overflow() {
        for &(vw, vh, iw, ih) in CASES {
            let st = compute_placement(Viewport::new(vw, vh), iw, ih, Placement::Cover);
            assert!(close(st.scale_x, st.scale_y));
            let (sw, sh) = (iw as f64 * st.scale_x, ih as f64 * st.scale_y);
            assert!(sw >= vw as f64 - EPS && sh >= vh as f64 - EPS);
            assert!(close(sw, vw as f64) || close(sh, vh as f64));
            assert!(close(st.translate_x, -(sw - vw as f64) / 2.0));
            assert!(close(st.translate_y, -(sh - vh as f64) / 2.0));
            assert!(st.translate_x <= EPS && st.translate_y <= EPS);
        }
    }

    #[test]
    fn cover_on_wide_image_crops_horizontally() {
        let st = compute_placement(Viewport::new(1920, 1080), 3840, 1600, Placement::Cover);
        assert!(close(st.scale_x, 1080.0 / 1600.0));
        assert_eq!(st.translate_y, 0.0);
        assert!(close(st.translate_x, -(3840.0 * 1080.0 / 1600.0 - 1920.0) / 2.0));
    }

    #[test]
    fn center_keeps_native_size() {
        let st = compute_placement(Viewport::new(800, 600), 1000, 500, Placement::Center);
        assert_eq!((st.scale_x, st.scale_y), (1.0, 1.0));
        assert_eq!(st.translate_x, -100.0);
        assert_eq!(st.translate_y, 50.0);
    }

    #[test]
    fn transform_applies_scale_before_translate() {
        let st = ScaleTranslate { scale_x: 2.0, scale_y: 0.5, translate_x: -10.0, translate_y: 4.0 };
        let mut pts = [tiny_skia::Point::from_xy(3.0, 8.0)];
        st.to_transform().map_points(&mut pts);
        assert_eq!((pts[0].x, pts[0].y), (-4.0, 8.0));
    }

    #[test]
    fn placement_parses_case_insensitively() {
        assert_eq!("Cover".parse::<Placement>(), Ok(Placement::Cover));
        assert!("tile".parse::<Placement>().is_err());
    }
}
