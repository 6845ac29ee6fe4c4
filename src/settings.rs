use serde::{Deserialize, Deserializer, Serialize};

use crate::anchor::DEFAULT_BLOCK_PREFIX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FontFamily {
    #[default]
    Serif,
    Sans,
    Mono,
}

impl FontFamily {
    /// CSS font stack for the family.
    pub fn stack(&self) -> &'static str {
        match self {
            FontFamily::Serif => "\"Merriweather\", \"Georgia\", serif",
            FontFamily::Sans => "\"Inter\", \"Helvetica\", sans-serif",
            FontFamily::Mono => "\"Fira Code\", \"Courier New\", monospace",
        }
    }

    /// Average glyph advance relative to the font size, used by the layout
    /// model to estimate characters per line.
    pub fn advance_ratio(&self) -> f32 {
        match self {
            FontFamily::Serif => 0.5,
            FontFamily::Sans => 0.48,
            FontFamily::Mono => 0.6,
        }
    }
}

impl std::str::FromStr for FontFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serif" => Ok(FontFamily::Serif),
            "sans" | "sans-serif" => Ok(FontFamily::Sans),
            "mono" | "monospace" => Ok(FontFamily::Mono),
            other => Err(format!("unknown font family '{}'", other)),
        }
    }
}

/// Display settings for one viewport class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayProfile {
    /// Percent of the base font size.
    pub font_size: u32,
    pub line_height: f32,
    /// Content column width in px.
    pub max_width: u32,
    pub theme: Theme,
    pub font_family: FontFamily,
}

impl Default for DisplayProfile {
    fn default() -> Self {
        Self {
            font_size: 100,
            line_height: 1.6,
            max_width: 800,
            theme: Theme::Light,
            font_family: FontFamily::Serif,
        }
    }
}

impl DisplayProfile {
    pub fn compact() -> Self {
        Self {
            line_height: 1.5,
            max_width: 640,
            ..Self::default()
        }
    }

    /// Pulls every numeric field into `clamps`. Bounds given in the wrong
    /// order are swapped; a non-finite line height falls to the minimum.
    pub fn clamped(mut self, clamps: &ProfileClamps) -> Self {
        self.font_size = bound(self.font_size, clamps.font_size);
        self.line_height = if self.line_height.is_finite() {
            bound(self.line_height, clamps.line_height)
        } else {
            bound(f32::MIN, clamps.line_height)
        };
        self.max_width = bound(self.max_width, clamps.max_width);
        self
    }
}

/// Fields present in a stored profile, laid over a base profile so that
/// missing ones keep the base's values rather than the wide defaults.
#[derive(Debug, Default, Deserialize)]
struct ProfileOverrides {
    font_size: Option<u32>,
    line_height: Option<f32>,
    max_width: Option<u32>,
    theme: Option<Theme>,
    font_family: Option<FontFamily>,
}

impl ProfileOverrides {
    fn over(self, base: DisplayProfile) -> DisplayProfile {
        DisplayProfile {
            font_size: self.font_size.unwrap_or(base.font_size),
            line_height: self.line_height.unwrap_or(base.line_height),
            max_width: self.max_width.unwrap_or(base.max_width),
            theme: self.theme.unwrap_or(base.theme),
            font_family: self.font_family.unwrap_or(base.font_family),
        }
    }
}

fn compact_profile<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DisplayProfile, D::Error> {
    ProfileOverrides::deserialize(deserializer).map(|overrides| overrides.over(DisplayProfile::compact()))
}

fn bound<T: PartialOrd + Copy>(value: T, (a, b): (T, T)) -> T {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if value < lo {
        lo
    } else if value > hi {
        hi
    } else {
        value
    }
}

/// Inclusive `(min, max)` bounds a profile's adjustments are held to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileClamps {
    pub font_size: (u32, u32),
    pub line_height: (f32, f32),
    pub max_width: (u32, u32),
}

impl Default for ProfileClamps {
    fn default() -> Self {
        Self {
            font_size: (50, 250),
            line_height: (1.2, 2.4),
            max_width: (480, 1400),
        }
    }
}

impl ProfileClamps {
    pub fn compact() -> Self {
        Self {
            font_size: (50, 200),
            line_height: (1.2, 2.2),
            max_width: (280, 800),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub block_id_prefix: String,
    pub decoration_class_prefix: String,
    pub progress_debounce_ms: u64,
    pub sample_offset_px: f32,
    /// Viewports narrower than this use the compact profile.
    pub compact_breakpoint_px: f32,
    #[serde(deserialize_with = "compact_profile")]
    pub compact_profile: DisplayProfile,
    pub wide_profile: DisplayProfile,
    pub compact_clamps: ProfileClamps,
    pub wide_clamps: ProfileClamps,
}

impl Settings {
    pub fn merge(&mut self, other: Self) {
        if !other.api_base_url.trim().is_empty() {
            self.api_base_url = other.api_base_url;
        }
        self.request_timeout_secs = other.request_timeout_secs;
        if !other.block_id_prefix.is_empty() {
            self.block_id_prefix = other.block_id_prefix;
        }
        if !other.decoration_class_prefix.is_empty() {
            self.decoration_class_prefix = other.decoration_class_prefix;
        }
        self.progress_debounce_ms = other.progress_debounce_ms;
        self.sample_offset_px = other.sample_offset_px.max(0.0);
        self.compact_breakpoint_px = other.compact_breakpoint_px;
        self.compact_clamps = other.compact_clamps;
        self.wide_clamps = other.wide_clamps;
        self.compact_profile = other.compact_profile.clamped(&self.compact_clamps);
        self.wide_profile = other.wide_profile.clamped(&self.wide_clamps);
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            request_timeout_secs: 10,
            block_id_prefix: DEFAULT_BLOCK_PREFIX.to_string(),
            decoration_class_prefix: "folio-annotation".to_string(),
            progress_debounce_ms: 250,
            sample_offset_px: 8.0,
            compact_breakpoint_px: 768.0,
            compact_profile: DisplayProfile::compact(),
            wide_profile: DisplayProfile::default(),
            compact_clamps: ProfileClamps::compact(),
            wide_clamps: ProfileClamps::default(),
        }
    }
}
