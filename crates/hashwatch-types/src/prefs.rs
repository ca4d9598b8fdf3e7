use serde::{Deserialize, Serialize};

/// UI color scheme, a plain dark/light toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

/// Persisted dashboard toggles, the analog of the browser UI's saved
/// controls: active-only filter, freshness window, chart window, theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiPrefs {
    #[serde(default = "default_active_only")]
    pub active_only: bool,
    #[serde(default = "default_fresh_within_mins")]
    pub fresh_within_mins: u32,
    #[serde(default = "default_chart_hours")]
    pub chart_hours: u32,
    #[serde(default)]
    pub theme: Theme,
}

const CHART_HOURS_STEPS: [u32; 4] = [1, 6, 24, 72];

impl UiPrefs {
    /// Advance the chart window through the preset steps, wrapping.
    pub fn cycle_chart_hours(&mut self) {
        let next = CHART_HOURS_STEPS
            .iter()
            .position(|&h| h == self.chart_hours)
            .map(|i| CHART_HOURS_STEPS[(i + 1) % CHART_HOURS_STEPS.len()])
            .unwrap_or(CHART_HOURS_STEPS[0]);
        self.chart_hours = next;
    }

    pub fn widen_fresh_window(&mut self) {
        self.fresh_within_mins = (self.fresh_within_mins + 5).min(240);
    }

    pub fn narrow_fresh_window(&mut self) {
        self.fresh_within_mins = self.fresh_within_mins.saturating_sub(5).max(5);
    }
}

impl Default for UiPrefs {
    fn default() -> Self {
        Self {
            active_only: default_active_only(),
            fresh_within_mins: default_fresh_within_mins(),
            chart_hours: default_chart_hours(),
            theme: Theme::default(),
        }
    }
}

fn default_active_only() -> bool {
    true
}

fn default_fresh_within_mins() -> u32 {
    30
}

fn default_chart_hours() -> u32 {
    24
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_dashboard_controls() {
        let prefs = UiPrefs::default();
        assert!(prefs.active_only);
        assert_eq!(prefs.fresh_within_mins, 30);
        assert_eq!(prefs.chart_hours, 24);
        assert_eq!(prefs.theme, Theme::Dark);
    }

    #[test]
    fn chart_hours_cycle_wraps() {
        let mut prefs = UiPrefs::default();
        prefs.cycle_chart_hours();
        assert_eq!(prefs.chart_hours, 72);
        prefs.cycle_chart_hours();
        assert_eq!(prefs.chart_hours, 1);
        // Unknown stored value resets to the first step.
        prefs.chart_hours = 13;
        prefs.cycle_chart_hours();
        assert_eq!(prefs.chart_hours, 1);
    }

    #[test]
    fn fresh_window_stays_in_bounds() {
        let mut prefs = UiPrefs {
            fresh_within_mins: 5,
            ..UiPrefs::default()
        };
        prefs.narrow_fresh_window();
        assert_eq!(prefs.fresh_within_mins, 5);
        prefs.fresh_within_mins = 240;
        prefs.widen_fresh_window();
        assert_eq!(prefs.fresh_within_mins, 240);
    }

    #[test]
    fn partial_prefs_file_fills_defaults() {
        let prefs: UiPrefs = toml::from_str("active_only = false\n").expect("parse partial prefs");
        assert!(!prefs.active_only);
        assert_eq!(prefs.chart_hours, 24);
    }
}
