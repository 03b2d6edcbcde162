//! Configuration management for marquee.
//!
//! This module handles loading, parsing and validating configuration from
//! TOML files: window identity and initial geometry, plus the label's
//! text and appearance.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::render::Argb;

/// Main configuration struct containing all marquee settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MarqueeConfig {
    /// Window identity and initial geometry
    #[serde(default)]
    pub window: WindowConfig,

    /// Label text and appearance
    #[serde(default)]
    pub label: LabelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowConfig {
    /// Top-level title shown by decorations and taskbars
    pub title: String,

    /// Application id used by compositor matching rules
    pub app_id: String,

    /// Width used until the compositor proposes a size (pixels)
    pub width: i32,

    /// Height used until the compositor proposes a size (pixels)
    pub height: i32,

    /// Ask for server-side decorations when the compositor offers them
    #[serde(default = "WindowConfig::default_server_side_decorations")]
    pub server_side_decorations: bool,
}

impl WindowConfig {
    fn default_server_side_decorations() -> bool {
        true
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "marquee".to_string(),
            app_id: "org.marquee_wm.marquee".to_string(),
            width: 1000,
            height: 400,
            server_side_decorations: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelConfig {
    /// Text drawn in the middle of the window
    pub text: String,

    /// Font family passed to the rasterizer
    pub font_family: String,

    /// Point size before scaling
    pub font_size: f64,

    /// Extra scale factor applied to the point size
    pub font_scale: f64,

    /// Text color ("AARRGGBB" hex)
    pub foreground: String,

    /// Fill color ("AARRGGBB" hex)
    pub background: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            text: "Hi, mom".to_string(),
            font_family: "Sans".to_string(),
            font_size: 200.0,
            font_scale: 1.0,
            foreground: "ff000000".to_string(),
            background: "ffffffff".to_string(),
        }
    }
}

impl MarqueeConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Path::new(&home).join(path.strip_prefix("~").unwrap_or(path))
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: MarqueeConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.window.width <= 0 || self.window.height <= 0 {
            anyhow::bail!(
                "Invalid window size {}x{}: both sides must be positive",
                self.window.width,
                self.window.height
            );
        }

        if self.label.font_size <= 0.0 {
            anyhow::bail!("Invalid font_size: must be positive");
        }

        if self.label.font_scale <= 0.0 {
            anyhow::bail!("Invalid font_scale: must be positive");
        }

        Argb::parse(&self.label.foreground).context("Invalid label.foreground")?;
        Argb::parse(&self.label.background).context("Invalid label.background")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = MarqueeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window.width, 1000);
        assert_eq!(config.window.height, 400);
        assert_eq!(config.label.text, "Hi, mom");
        assert!(config.window.server_side_decorations);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: MarqueeConfig = toml::from_str(
            r#"
            [label]
            text = "status: ok"
            font_family = "Monospace"
            font_size = 24.0
            font_scale = 1.0
            foreground = "ffffffff"
            background = "ff202020"
            "#,
        )
        .unwrap();
        assert_eq!(config.label.text, "status: ok");
        // Window section was absent entirely.
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn load_round_trips_through_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let config = MarqueeConfig {
            label: LabelConfig {
                text: "build passing".to_string(),
                ..LabelConfig::default()
            },
            ..MarqueeConfig::default()
        };
        file.write_all(toml::to_string(&config).unwrap().as_bytes())
            .unwrap();

        let loaded = MarqueeConfig::load(file.path()).unwrap();
        assert_eq!(loaded.label.text, "build passing");
        assert_eq!(loaded.window.width, 1000);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = MarqueeConfig::default();
        config.window.width = 0;
        assert!(config.validate().is_err());

        let mut config = MarqueeConfig::default();
        config.label.font_size = -1.0;
        assert!(config.validate().is_err());

        let mut config = MarqueeConfig::default();
        config.label.background = "magenta".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        assert!(MarqueeConfig::load("/nonexistent/marquee.toml").is_err());
    }
}
