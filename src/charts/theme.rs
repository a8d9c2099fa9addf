//! Chart Theme
//! Dark dashboard colors and the Viridis sequential palette.

use crate::charts::figure::{Font, Layout, Title};

pub const BACKGROUND: &str = "#343a40";
pub const FONT_COLOR: &str = "white";
pub const GRID_COLOR: &str = "#4b545c";

pub const MAP_STYLE: &str = "carto-positron";
pub const MAP_OPACITY: f64 = 0.5;

/// Viridis stops, evenly spaced from 0 to 1.
pub const VIRIDIS: [&str; 10] = [
    "#440154", // Dark purple
    "#482878",
    "#3e4989",
    "#31688e",
    "#26828e", // Teal
    "#1f9e89",
    "#35b779",
    "#6ece58",
    "#b5de2b",
    "#fde725", // Yellow
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        if hex.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(hex.get(0..2)?, 16).ok()?;
        let g = u8::from_str_radix(hex.get(2..4)?, 16).ok()?;
        let b = u8::from_str_radix(hex.get(4..6)?, 16).ok()?;
        Some(Rgb(r, g, b))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }

    fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgb(mix(self.0, other.0), mix(self.1, other.1), mix(self.2, other.2))
    }
}

pub struct Theme;

impl Theme {
    /// Empty layout with the dashboard background and font applied.
    pub fn dark_layout(title: impl Into<String>) -> Layout {
        Layout {
            title: Title::new(title),
            paper_bgcolor: BACKGROUND.to_string(),
            plot_bgcolor: BACKGROUND.to_string(),
            font: Font {
                color: FONT_COLOR.to_string(),
            },
            ..Layout::default()
        }
    }

    /// Plotly colorscale form: `[[0.0, "#440154"], ..., [1.0, "#fde725"]]`.
    pub fn colorscale() -> Vec<(f64, String)> {
        let last = (VIRIDIS.len() - 1) as f64;
        VIRIDIS
            .iter()
            .enumerate()
            .map(|(i, hex)| (i as f64 / last, hex.to_string()))
            .collect()
    }

    /// Interpolated Viridis color at `t` in [0, 1]; out-of-range values clip.
    pub fn sample(t: f64) -> Rgb {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let stops: Vec<Rgb> = VIRIDIS.iter().filter_map(|h| Rgb::from_hex(h)).collect();
        let scaled = t * (stops.len() - 1) as f64;
        let lower = scaled.floor() as usize;
        let upper = (lower + 1).min(stops.len() - 1);
        stops[lower].lerp(stops[upper], scaled - lower as f64)
    }

    /// Color for `value` on a scale running from `min` to `max`.
    pub fn color_for(value: f64, min: f64, max: f64) -> Rgb {
        let span = max - min;
        if span <= 0.0 || !span.is_finite() {
            return Self::sample(0.5);
        }
        Self::sample((value - min) / span)
    }

    /// `n` distinct colors spread evenly along the palette.
    pub fn category_colors(n: usize) -> Vec<String> {
        match n {
            0 => Vec::new(),
            1 => vec![Self::sample(0.5).to_hex()],
            _ => (0..n)
                .map(|i| Self::sample(i as f64 / (n - 1) as f64).to_hex())
                .collect(),
        }
    }
}
