//! RGB colors, hex parsing, and HSL conversion.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest possible Euclidean distance between two RGB colors (black to white).
pub const MAX_RGB_DISTANCE: f64 = 441.672_955_930_063_7;

/// An 8-bit sRGB color.
///
/// # Serde
///
/// Serializes as `{"r":..,"g":..,"b":..,"hex":"#rrggbb"}`. On input the `hex`
/// field is optional and ignored; the channels are authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ColorRecord", into = "ColorRecord")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Serialize, Deserialize)]
struct ColorRecord {
    r: u8,
    g: u8,
    b: u8,
    #[serde(default, skip_deserializing)]
    hex: String,
}

impl From<ColorRecord> for Rgb {
    fn from(record: ColorRecord) -> Self {
        Self::new(record.r, record.g, record.b)
    }
}

impl From<Rgb> for ColorRecord {
    fn from(color: Rgb) -> Self {
        Self {
            r: color.r,
            g: color.g,
            b: color.b,
            hex: color.hex(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorParseError {
    #[error("hex color must start with '#': {0:?}")]
    MissingHash(String),
    #[error("hex color must have 3 or 6 digits: {0:?}")]
    BadLength(String),
    #[error("invalid hex digit in {0:?}")]
    BadDigit(String),
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Lowercase `#rrggbb`.
    #[must_use]
    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Euclidean distance in RGB space.
    #[must_use]
    pub fn distance(self, other: Rgb) -> f64 {
        let dr = f64::from(self.r) - f64::from(other.r);
        let dg = f64::from(self.g) - f64::from(other.g);
        let db = f64::from(self.b) - f64::from(other.b);
        (dr * dr + dg * dg + db * db).sqrt()
    }

    /// Channel-wise mean of a set of colors, rounded to the nearest integer.
    #[must_use]
    pub fn mean(colors: &[Rgb]) -> Option<Rgb> {
        if colors.is_empty() {
            return None;
        }
        let n = colors.len() as f64;
        let (r, g, b) = colors.iter().fold((0.0, 0.0, 0.0), |(r, g, b), c| {
            (r + f64::from(c.r), g + f64::from(c.g), b + f64::from(c.b))
        });
        Some(Rgb::new(
            channel(r / n),
            channel(g / n),
            channel(b / n),
        ))
    }

    /// Parse `#rrggbb` or the `#rgb` shorthand.
    pub fn parse_hex(raw: &str) -> Result<Rgb, ColorParseError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix('#')
            .ok_or_else(|| ColorParseError::MissingHash(raw.to_string()))?;
        let expanded: String = match digits.len() {
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            6 => digits.to_string(),
            _ => return Err(ColorParseError::BadLength(raw.to_string())),
        };
        let byte = |range: std::ops::Range<usize>| {
            expanded
                .get(range)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| ColorParseError::BadDigit(raw.to_string()))
        };
        Ok(Rgb::new(byte(0..2)?, byte(2..4)?, byte(4..6)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl FromStr for Rgb {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rgb::parse_hex(s)
    }
}

/// A color in hue/saturation/lightness form.
///
/// `hue` is in degrees and wraps; `saturation` and `lightness` are clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub hue: f64,
    pub saturation: f64,
    pub lightness: f64,
}

impl Hsl {
    #[must_use]
    pub fn new(hue: f64, saturation: f64, lightness: f64) -> Self {
        Self {
            hue,
            saturation,
            lightness,
        }
    }

    #[must_use]
    pub fn to_rgb(self) -> Rgb {
        let hue = self.hue.rem_euclid(360.0);
        let s = self.saturation.clamp(0.0, 1.0);
        let l = self.lightness.clamp(0.0, 1.0);

        let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let h_prime = hue / 60.0;
        let x = chroma * (1.0 - (h_prime % 2.0 - 1.0).abs());
        let (r1, g1, b1) = match h_prime.floor() as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = l - chroma / 2.0;
        Rgb::new(
            channel((r1 + m) * 255.0),
            channel((g1 + m) * 255.0),
            channel((b1 + m) * 255.0),
        )
    }
}

fn channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
