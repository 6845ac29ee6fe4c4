//! Per-viewport-class display profiles.

use serde::{Deserialize, Serialize};

use crate::layout::LayoutModel;
use crate::models::RestoreOutcome;
use crate::progress::{ProgressTracker, Viewport};
use crate::settings::{DisplayProfile, FontFamily, ProfileClamps, Settings};
use crate::state::DurableState;

/// Profiles are device preferences, shared by every book.
pub const PROFILE_SCOPE: &str = "*";

pub const FONT_SIZE_STEP: u32 = 10;
pub const LINE_HEIGHT_STEP: f32 = 0.1;
pub const WIDTH_STEP: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewportClass {
    /// Narrow, touch-first screens.
    Compact,
    /// Wide, pointer-first screens.
    Wide,
}

impl ViewportClass {
    pub fn classify(width: f32, breakpoint: f32) -> Self {
        if width < breakpoint {
            ViewportClass::Compact
        } else {
            ViewportClass::Wide
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewportClass::Compact => "compact",
            ViewportClass::Wide => "wide",
        }
    }

    pub fn storage_key(&self) -> String {
        format!("profile:{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    FontLarger,
    FontSmaller,
    LineHeightUp,
    LineHeightDown,
    Wider,
    Narrower,
    ToggleTheme,
    FontFamily(FontFamily),
}

/// Something that can be laid out again under a new profile or width.
pub trait Relayout: Viewport {
    fn relayout(&mut self, profile: &DisplayProfile);
    fn resize(&mut self, width: f32, profile: &DisplayProfile);
}

impl Relayout for LayoutModel {
    fn relayout(&mut self, profile: &DisplayProfile) {
        LayoutModel::relayout(self, profile)
    }

    fn resize(&mut self, width: f32, profile: &DisplayProfile) {
        let client_height = self.client_height();
        self.set_viewport(width, client_height, profile);
    }
}

/// Captures the reading position, runs `change`, then restores the position.
pub fn preserving_position<V, F>(tracker: &mut ProgressTracker, viewport: &mut V, change: F) -> RestoreOutcome
where
    V: Viewport + ?Sized,
    F: FnOnce(&mut V),
{
    let snapshot = tracker.capture(viewport);
    change(viewport);
    tracker.restore(viewport, Some(&snapshot))
}

#[derive(Debug, Clone)]
pub struct ProfileManager {
    compact: DisplayProfile,
    wide: DisplayProfile,
    compact_clamps: ProfileClamps,
    wide_clamps: ProfileClamps,
    breakpoint: f32,
    active: ViewportClass,
}

impl ProfileManager {
    pub fn from_settings(settings: &Settings, viewport_width: f32) -> Self {
        Self {
            compact: settings.compact_profile.clamped(&settings.compact_clamps),
            wide: settings.wide_profile.clamped(&settings.wide_clamps),
            compact_clamps: settings.compact_clamps,
            wide_clamps: settings.wide_clamps,
            breakpoint: settings.compact_breakpoint_px,
            active: ViewportClass::classify(viewport_width, settings.compact_breakpoint_px),
        }
    }

    /// Replaces the configured profiles with the persisted ones. Missing or
    /// malformed entries keep the configured defaults.
    pub fn load(&mut self, state: &mut DurableState) {
        for class in [ViewportClass::Compact, ViewportClass::Wide] {
            if let Some(stored) = state.load_json::<DisplayProfile>(PROFILE_SCOPE, &class.storage_key()) {
                let clamps = *self.clamps(class);
                *self.profile_mut(class) = stored.clamped(&clamps);
            }
        }
    }

    pub fn persist(&self, state: &mut DurableState) {
        state.save_json(PROFILE_SCOPE, &self.active.storage_key(), self.active());
    }

    pub fn active_class(&self) -> ViewportClass {
        self.active
    }

    pub fn active(&self) -> &DisplayProfile {
        self.profile(self.active)
    }

    pub fn profile(&self, class: ViewportClass) -> &DisplayProfile {
        match class {
            ViewportClass::Compact => &self.compact,
            ViewportClass::Wide => &self.wide,
        }
    }

    fn profile_mut(&mut self, class: ViewportClass) -> &mut DisplayProfile {
        match class {
            ViewportClass::Compact => &mut self.compact,
            ViewportClass::Wide => &mut self.wide,
        }
    }

    pub fn clamps(&self, class: ViewportClass) -> &ProfileClamps {
        match class {
            ViewportClass::Compact => &self.compact_clamps,
            ViewportClass::Wide => &self.wide_clamps,
        }
    }

    /// Switches the active profile if `width` crosses the breakpoint.
    /// Returns the new class on a transition.
    pub fn observe_width(&mut self, width: f32) -> Option<ViewportClass> {
        let class = ViewportClass::classify(width, self.breakpoint);
        if class == self.active {
            return None;
        }
        tracing::info!(from = self.active.as_str(), to = class.as_str(), "switching display profile");
        self.active = class;
        Some(class)
    }

    /// Applies `adjustment` to the active profile, clamped to its ranges.
    /// Returns whether anything changed.
    pub fn adjust(&mut self, adjustment: Adjustment) -> bool {
        let clamps = *self.clamps(self.active);
        let profile = self.profile_mut(self.active);
        let before = *profile;
        match adjustment {
            Adjustment::FontLarger => profile.font_size = profile.font_size.saturating_add(FONT_SIZE_STEP),
            Adjustment::FontSmaller => profile.font_size = profile.font_size.saturating_sub(FONT_SIZE_STEP),
            Adjustment::LineHeightUp => profile.line_height = round_tenth(profile.line_height + LINE_HEIGHT_STEP),
            Adjustment::LineHeightDown => profile.line_height = round_tenth(profile.line_height - LINE_HEIGHT_STEP),
            Adjustment::Wider => profile.max_width = profile.max_width.saturating_add(WIDTH_STEP),
            Adjustment::Narrower => profile.max_width = profile.max_width.saturating_sub(WIDTH_STEP),
            Adjustment::ToggleTheme => profile.theme = profile.theme.toggled(),
            Adjustment::FontFamily(family) => profile.font_family = family,
        }
        *profile = profile.clamped(&clamps);
        *profile != before
    }

    /// Reflows for a new viewport width, swapping profiles when the width
    /// crosses the breakpoint, and keeps the reading position across it.
    /// Returns the new class on a transition.
    pub fn on_viewport_width<V: Relayout + ?Sized>(
        &mut self,
        width: f32,
        tracker: &mut ProgressTracker,
        viewport: &mut V,
    ) -> Option<ViewportClass> {
        let snapshot = tracker.capture(viewport);
        let changed = self.observe_width(width);
        let profile = *self.active();
        viewport.resize(width, &profile);
        tracker.restore(viewport, Some(&snapshot));
        changed
    }

    /// Adjustment with position kept across the relayout.
    pub fn apply<V: Relayout + ?Sized>(
        &mut self,
        adjustment: Adjustment,
        tracker: &mut ProgressTracker,
        viewport: &mut V,
    ) -> Option<RestoreOutcome> {
        if !self.adjust(adjustment) {
            return None;
        }
        let profile = *self.active();
        Some(preserving_position(tracker, viewport, |v| v.relayout(&profile)))
    }
}

fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
