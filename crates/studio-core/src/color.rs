//! CSS color values.
//!
//! Parsing is delegated to `svgtypes`, which understands the same color grammar SVG
//! rasterizers accept (hex, `rgb()`/`rgba()`, `hsl()`/`hsla()` and named colors). Output is
//! always the canonical computed form a browser reports: `rgb(r, g, b)` for opaque colors and
//! `rgba(r, g, b, a)` otherwise.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Self = Self {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parses any CSS color literal. Returns `None` for functions (`var()`, `color-mix()`),
    /// keywords like `none`/`currentColor`, and malformed input.
    pub fn parse(text: &str) -> Option<Self> {
        let s = text.trim();
        if s.is_empty() {
            return None;
        }
        if s.eq_ignore_ascii_case("transparent") {
            return Some(Self::TRANSPARENT);
        }
        let color = svgtypes::Color::from_str(s).ok()?;
        Some(Self {
            r: color.red,
            g: color.green,
            b: color.blue,
            a: color.alpha,
        })
    }

    pub fn is_opaque(&self) -> bool {
        self.a == 255
    }

    pub fn is_fully_transparent(&self) -> bool {
        self.a == 0
    }

    pub fn rgb(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    pub fn to_css(&self) -> String {
        if self.is_opaque() {
            format!("rgb({}, {}, {})", self.r, self.g, self.b)
        } else {
            format!(
                "rgba({}, {}, {}, {})",
                self.r,
                self.g,
                self.b,
                fmt_alpha(self.a)
            )
        }
    }
}

fn fmt_alpha(a: u8) -> String {
    let mut out = format!("{:.2}", f64::from(a) / 255.0);
    while out.ends_with('0') {
        out.pop();
    }
    if out.ends_with('.') {
        out.pop();
    }
    out
}

/// Returns the canonical computed form of `value`, or `None` when it is not a color literal.
pub fn canonicalize_css_color(value: &str) -> Option<String> {
    Rgba::parse(value).map(|c| c.to_css())
}

pub fn parse_css_color_to_rgb(value: &str) -> Option<[u8; 3]> {
    Rgba::parse(value).map(|c| c.rgb())
}

pub fn rgb_to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// Mixes `color_a` into `color_b` in sRGB, `weight_a` percent of `color_a`.
///
/// Channels are interpolated linearly and rounded half away from zero. Alpha is not mixed;
/// the result is always an opaque `rgb()` triplet. When either operand does not parse,
/// `color_a` is returned unchanged.
pub fn mix_colors(color_a: &str, color_b: &str, weight_a: f64) -> String {
    let (Some(a), Some(b)) = (Rgba::parse(color_a), Rgba::parse(color_b)) else {
        return color_a.to_string();
    };
    let weight = if weight_a.is_finite() { weight_a } else { 0.0 };
    let t = weight.clamp(0.0, 100.0) / 100.0;
    let channel = |x: u8, y: u8| -> u8 {
        (f64::from(x) * t + f64::from(y) * (1.0 - t))
            .round()
            .clamp(0.0, 255.0) as u8
    };
    format!(
        "rgb({}, {}, {})",
        channel(a.r, b.r),
        channel(a.g, b.g),
        channel(a.b, b.b)
    )
}
