//! Engine configuration
//!
//! Settings can come from a JSON file, environment variables, or be built
//! programmatically with the `with_*` methods.

use page_editor_cache::PageNumber;
use page_editor_render::ColorMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_RENDER_SCALE: &str = "PAGE_EDITOR_RENDER_SCALE";
pub const ENV_EAGER_PAGES: &str = "PAGE_EDITOR_EAGER_PAGES";
pub const ENV_EXPORT_SCALE: &str = "PAGE_EDITOR_EXPORT_SCALE";
pub const ENV_COLOR_MODE: &str = "PAGE_EDITOR_COLOR_MODE";

/// How pages are grouped for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Layout {
    #[default]
    Single,
    TwoUp,
}

impl Layout {
    /// Sheet containing `page`, or `None` in single-page layout
    ///
    /// Sheets pair pages (1,2), (3,4), ...; an odd trailing page sits alone
    /// on `Sheet(n, n)`.
    pub fn sheet_for(self, page: u32, page_count: u32) -> Option<PageNumber> {
        match self {
            Layout::Single => None,
            Layout::TwoUp if page == 0 || page > page_count => None,
            Layout::TwoUp => {
                let left = if page % 2 == 1 { page } else { page - 1 };
                let right = if left < page_count { left + 1 } else { left };
                Some(PageNumber::Sheet(left, right))
            }
        }
    }
}

impl FromStr for Layout {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "single" | "1up" | "1-up" => Ok(Layout::Single),
            "twoup" | "two-up" | "2up" | "2-up" => Ok(Layout::TwoUp),
            other => Err(format!("unknown layout: {other}")),
        }
    }
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Raster density for previews, pixels per point
    pub render_scale: f64,
    /// Leading pages owned by the sweep until it completes
    pub eager_viewport_pages: u32,
    /// Pause between sweep pages in milliseconds
    pub sweep_idle_delay_ms: u64,
    /// Raster density for pages exported as images, pixels per point
    pub export_raster_scale: f64,
    /// Gap between two-up slots in pixels
    pub sheet_gap: u32,
    pub color_mode: ColorMode,
    pub layout: Layout,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            render_scale: 1.5,
            eager_viewport_pages: 5,
            sweep_idle_delay_ms: 0,
            export_raster_scale: 2.0,
            sheet_gap: page_editor_render::DEFAULT_SHEET_GAP,
            color_mode: ColorMode::Color,
            layout: Layout::Single,
        }
    }
}

impl EngineConfig {
    pub fn with_render_scale(mut self, scale: f64) -> Self {
        self.render_scale = scale;
        self
    }

    pub fn with_eager_viewport_pages(mut self, pages: u32) -> Self {
        self.eager_viewport_pages = pages;
        self
    }

    pub fn with_sweep_idle_delay_ms(mut self, delay_ms: u64) -> Self {
        self.sweep_idle_delay_ms = delay_ms;
        self
    }

    pub fn with_export_raster_scale(mut self, scale: f64) -> Self {
        self.export_raster_scale = scale;
        self
    }

    pub fn with_sheet_gap(mut self, gap: u32) -> Self {
        self.sheet_gap = gap;
        self
    }

    pub fn with_color_mode(mut self, color_mode: ColorMode) -> Self {
        self.color_mode = color_mode;
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn sweep_idle_delay(&self) -> Duration {
        Duration::from_millis(self.sweep_idle_delay_ms)
    }

    /// Defaults overridden by environment variables
    ///
    /// - `PAGE_EDITOR_RENDER_SCALE`: preview pixels per point
    /// - `PAGE_EDITOR_EAGER_PAGES`: pages reserved for the sweep
    /// - `PAGE_EDITOR_EXPORT_SCALE`: export raster pixels per point
    /// - `PAGE_EDITOR_COLOR_MODE`: `color` or `grayscale`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Apply environment overrides on top of `self`
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Some(value) = env_value(ENV_RENDER_SCALE) {
            self.render_scale = parse_env(ENV_RENDER_SCALE, &value)?;
        }
        if let Some(value) = env_value(ENV_EAGER_PAGES) {
            self.eager_viewport_pages = parse_env(ENV_EAGER_PAGES, &value)?;
        }
        if let Some(value) = env_value(ENV_EXPORT_SCALE) {
            self.export_raster_scale = parse_env(ENV_EXPORT_SCALE, &value)?;
        }
        if let Some(value) = env_value(ENV_COLOR_MODE) {
            self.color_mode = parse_env(ENV_COLOR_MODE, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Load a JSON configuration file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject scales that would produce empty or unbounded rasters
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_scale("renderScale", self.render_scale)?;
        check_scale("exportRasterScale", self.export_raster_scale)
    }
}

fn check_scale(key: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 16.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::env;

    // Saves and restores environment variables around a test
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(names: &[&str]) -> Self {
            let vars = names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in names {
                env::remove_var(name);
            }
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ALL_VARS: [&str; 4] = [ENV_RENDER_SCALE, ENV_EAGER_PAGES, ENV_EXPORT_SCALE, ENV_COLOR_MODE];

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.render_scale, 1.5);
        assert_eq!(config.eager_viewport_pages, 5);
        assert_eq!(config.export_raster_scale, 2.0);
        assert_eq!(config.sheet_gap, 24);
        assert_eq!(config.layout, Layout::Single);
        assert_eq!(config.sweep_idle_delay(), Duration::ZERO);
    }

    #[test]
    fn test_builder_methods() {
        let config = EngineConfig::default()
            .with_render_scale(2.0)
            .with_eager_viewport_pages(3)
            .with_sweep_idle_delay_ms(10)
            .with_export_raster_scale(3.0)
            .with_sheet_gap(8)
            .with_color_mode(ColorMode::Grayscale)
            .with_layout(Layout::TwoUp);

        assert_eq!(config.render_scale, 2.0);
        assert_eq!(config.eager_viewport_pages, 3);
        assert_eq!(config.sweep_idle_delay(), Duration::from_millis(10));
        assert_eq!(config.export_raster_scale, 3.0);
        assert_eq!(config.sheet_gap, 8);
        assert_eq!(config.color_mode, ColorMode::Grayscale);
        assert_eq!(config.layout, Layout::TwoUp);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&ALL_VARS);
        env::set_var(ENV_RENDER_SCALE, "2.5");
        env::set_var(ENV_EAGER_PAGES, "2");
        env::set_var(ENV_EXPORT_SCALE, "1.0");
        env::set_var(ENV_COLOR_MODE, "grayscale");

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.render_scale, 2.5);
        assert_eq!(config.eager_viewport_pages, 2);
        assert_eq!(config.export_raster_scale, 1.0);
        assert_eq!(config.color_mode, ColorMode::Grayscale);
    }

    #[test]
    #[serial]
    fn test_from_env_partial_keeps_defaults() {
        let _guard = EnvGuard::new(&ALL_VARS);
        env::set_var(ENV_EAGER_PAGES, "0");

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.eager_viewport_pages, 0);
        assert_eq!(config.render_scale, 1.5);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&ALL_VARS);
        env::set_var(ENV_RENDER_SCALE, "not_a_number");
        assert!(matches!(
            EngineConfig::from_env(),
            Err(ConfigError::InvalidValue { .. })
        ));

        env::set_var(ENV_RENDER_SCALE, "-1");
        assert!(EngineConfig::from_env().is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let config = EngineConfig::default().with_layout(Layout::TwoUp).with_sheet_gap(12);

        config.save_to_file(&path).unwrap();
        assert_eq!(EngineConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{ "renderScale": 2.0, "colorMode": "grayscale", "layout": "twoUp" }"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.render_scale, 2.0);
        assert_eq!(config.color_mode, ColorMode::Grayscale);
        assert_eq!(config.layout, Layout::TwoUp);
        assert_eq!(config.eager_viewport_pages, 5);
    }

    #[test]
    fn test_bad_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(EngineConfig::from_file(&path), Err(ConfigError::Parse(_))));
        assert!(matches!(
            EngineConfig::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_two_up_sheets() {
        assert_eq!(Layout::Single.sheet_for(1, 4), None);
        assert_eq!(Layout::TwoUp.sheet_for(1, 4), Some(PageNumber::Sheet(1, 2)));
        assert_eq!(Layout::TwoUp.sheet_for(4, 4), Some(PageNumber::Sheet(3, 4)));
        assert_eq!(Layout::TwoUp.sheet_for(5, 5), Some(PageNumber::Sheet(5, 5)));
        assert_eq!(Layout::TwoUp.sheet_for(6, 5), None);
        assert_eq!("2-up".parse::<Layout>().unwrap(), Layout::TwoUp);
    }
}
