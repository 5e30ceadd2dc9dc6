use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::geometry::Placement;

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// Wall-clock aligned ticker thread.
    #[default]
    Timer,
    /// Bounded wait on the event loop; a timeout counts as a tick.
    Poll,
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Config {
    pub primary_format: String,
    pub secondary_format: String,
    pub offset_left: f32,
    pub offset_bottom: f32,
    pub primary_size: f32,
    pub secondary_size: f32,
    pub line_gap: f32,
    pub placement: Option<Placement>,
    pub driver: Driver,
    pub interval_ms: u64,
    pub font: Option<String>,
    pub font_family: Option<String>,
    pub color_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_format: "%T".into(),
            secondary_format: "%A, %B %d".into(),
            offset_left: 25.0,
            offset_bottom: 60.0,
            primary_size: 100.0,
            secondary_size: 50.0,
            line_gap: 60.0,
            placement: None,
            driver: Driver::Timer,
            interval_ms: 1000,
            font: None,
            font_family: None,
            color_file: None,
        }
    }
}

impl Config {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

pub fn load_config() -> Config {
    let path = config_dir().join("horologe.toml");
    match std::fs::read_to_string(&path) {
        Ok(s) => parse_config(&s, &path),
        Err(_) => Config::default(),
    }
}

fn parse_config(content: &str, path: &Path) -> Config {
    match toml::from_str(content) {
        Ok(cfg) => {
            tracing::info!(path = %path.display(), "loaded config");
            cfg
        }
        Err(e) => {
            tracing::error!(path = %path.display(), "failed to parse config: {e}");
            Config::default()
        }
    }
}

fn config_dir() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join(".config"));
    base.join("widgets")
}

fn home() -> PathBuf {
    std::env::var("HOME").map(PathBuf::from).unwrap_or_default()
}

pub fn expand_path(p: &str) -> PathBuf {
    if let Some(rest) = p.strip_prefix("~/") {
        home().join(rest)
    } else {
        PathBuf::from(p)
    }
}

// --- Colors ---

#[derive(Debug, PartialEq)]
pub struct Colors {
    pub background: [u8; 3],
    pub text: [u8; 3],
    pub text_alpha: u8,
}

impl Default for Colors {
    fn default() -> Self {
        Self { background: [0, 0, 0], text: [0xff, 0xff, 0xff], text_alpha: 0xff }
    }
}

fn parse_hex(s: &str) -> Option<[u8; 3]> {
    let s = s.strip_prefix('#').unwrap_or(s);
    if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_hexdigit()) { return None; }
    Some([u8::from_str_radix(&s[0..2], 16).ok()?,
          u8::from_str_radix(&s[2..4], 16).ok()?,
          u8::from_str_radix(&s[4..6], 16).ok()?])
}

pub fn load_colors(path: Option<&str>) -> Colors {
    match path {
        Some(p) => parse_colors(&std::fs::read_to_string(expand_path(p)).unwrap_or_default()),
        None => Colors::default(),
    }
}

fn parse_colors(content: &str) -> Colors {
    let mut colors = Colors::default();
    for line in content.lines() {
        let Some((key, val)) = line.split_once('=') else { continue };
        let (key, val) = (key.trim(), val.trim().trim_matches('"'));
        match key {
            "text_opacity" => {
                if let Ok(f) = val.parse::<f32>() {
                    colors.text_alpha = (f.clamp(0.0, 1.0) * 255.0) as u8;
                }
            }
            "background" | "text" => {
                if let Some(c) = parse_hex(val) {
                    if key == "background" { colors.background = c } else { colors.text = c }
                }
            }
            _ => {}
        }
    }
    colors
}

/// Parent handle from the screensaver environment; `0x` hex or decimal, zero
/// means none.
pub fn parse_parent(value: Option<&str>) -> Option<u32> {
    let v = value?.trim();
    let id = match v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => v.parse().ok()?,
    };
    (id != 0).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg = parse_config("placement = \"cover\"\ndriver = \"poll\"\noffset_left = 40.0\n", Path::new("t.toml"));
        assert_eq!(cfg.placement, Some(Placement::Cover));
        assert_eq!(cfg.driver, Driver::Poll);
        assert_eq!(cfg.offset_left, 40.0);
        assert_eq!(cfg.primary_format, "%T");
        assert_eq!(cfg.interval(), Duration::from_secs(1));
    }

    #[test]
    fn malformed_config_falls_back_to_defaults() {
        let cfg = parse_config("placement = 12", Path::new("t.toml"));
        assert_eq!(cfg.placement, None);
        assert_eq!(cfg.secondary_format, "%A, %B %d");
    }

    #[test]
    fn zero_interval_is_clamped() {
        let cfg = Config { interval_ms: 0, ..Config::default() };
        assert_eq!(cfg.interval(), Duration::from_millis(1));
    }

    #[test]
    fn colors_parse_hex_and_opacity() {
        let colors = parse_colors("background = #102030\ntext=\"ffeedd\"\ntext_opacity = 0.5\nbogus = 1\n");
        assert_eq!(colors.background, [0x10, 0x20, 0x30]);
        assert_eq!(colors.text, [0xff, 0xee, 0xdd]);
        assert_eq!(colors.text_alpha, 127);
    }

    #[test]
    fn bad_color_values_are_skipped() {
        assert_eq!(parse_colors("text = #12\nbackground = zzzzzz\n"), Colors::default());
    }

    #[test]
    fn multibyte_color_values_are_skipped() {
        assert_eq!(parse_colors("text = #€€\nbackground = ééé\n"), Colors::default());
        assert_eq!(parse_hex("+1+2+3"), None);
    }

    #[test]
    fn parent_handle_accepts_hex_and_decimal() {
        assert_eq!(parse_parent(Some("0x1a00007")), Some(0x1a00007));
        assert_eq!(parse_parent(Some("42")), Some(42));
        assert_eq!(parse_parent(Some("0")), None);
        assert_eq!(parse_parent(Some("window")), None);
        assert_eq!(parse_parent(None), None);
    }

    #[test]
    fn tilde_expands_to_home() {
        let p = expand_path("~/pics/bg.png");
        assert!(p.ends_with("pics/bg.png"));
        assert_eq!(expand_path("/abs.png"), PathBuf::from("/abs.png"));
    }
}
