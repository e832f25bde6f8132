use thiserror::Error;

use crate::methods::WindowSize;

pub const ENV_API_BASE: &str = "LINKPEEK_API_BASE";
pub const ENV_TOKEN: &str = "FIGMA_TOKEN";
pub const ENV_WINDOW_MIN: &str = "LINKPEEK_WINDOW_MIN";
pub const ENV_WINDOW_MAX: &str = "LINKPEEK_WINDOW_MAX";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must look like WIDTHxHEIGHT, got {value:?}")]
    InvalidSize { var: &'static str, value: String },
    #[error("window minimum {min:?} exceeds maximum {max:?}")]
    InvertedBounds { min: WindowSize, max: WindowSize },
}

/// Host-imposed limits on the surface frame. Every resize request is clamped
/// into this range before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub min: WindowSize,
    pub max: WindowSize,
}

impl Default for WindowBounds {
    fn default() -> Self {
        Self {
            min: WindowSize::new(240, 320),
            max: WindowSize::new(1280, 900),
        }
    }
}

impl WindowBounds {
    pub fn new(min: WindowSize, max: WindowSize) -> Result<Self, ConfigError> {
        if min.width > max.width || min.height > max.height {
            return Err(ConfigError::InvertedBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn clamp(&self, size: WindowSize) -> WindowSize {
        WindowSize {
            width: size.width.clamp(self.min.width, self.max.width),
            height: size.height.clamp(self.min.height, self.max.height),
        }
    }
}

/// Frame sizes the surface switches between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLayout {
    pub compact_width: u32,
    pub desktop_width: u32,
    pub height: u32,
}

impl Default for WindowLayout {
    fn default() -> Self {
        Self {
            compact_width: 340,
            desktop_width: 960,
            height: 632,
        }
    }
}

impl WindowLayout {
    pub fn compact(&self) -> WindowSize {
        WindowSize::new(self.compact_width, self.height)
    }

    pub fn desktop(&self) -> WindowSize {
        WindowSize::new(self.desktop_width, self.height)
    }
}

/// Bridge configuration shared by both contexts.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub api_base: String,
    pub token: Option<String>,
    pub layout: WindowLayout,
    pub bounds: WindowBounds,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_base: remote_docs::DEFAULT_API_BASE.to_string(),
            token: None,
            layout: WindowLayout::default(),
            bounds: WindowBounds::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let api_base = lookup(ENV_API_BASE)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.api_base);
        let token = lookup(ENV_TOKEN).filter(|value| !value.is_empty());

        let min = match lookup(ENV_WINDOW_MIN) {
            Some(value) => parse_size(ENV_WINDOW_MIN, &value)?,
            None => defaults.bounds.min,
        };
        let max = match lookup(ENV_WINDOW_MAX) {
            Some(value) => parse_size(ENV_WINDOW_MAX, &value)?,
            None => defaults.bounds.max,
        };

        Ok(Self {
            api_base,
            token,
            layout: defaults.layout,
            bounds: WindowBounds::new(min, max)?,
        })
    }
}

fn parse_size(var: &'static str, value: &str) -> Result<WindowSize, ConfigError> {
    let invalid = || ConfigError::InvalidSize {
        var,
        value: value.to_string(),
    };
    let (width, height) = value.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
    let width = width.trim().parse().map_err(|_| invalid())?;
    let height = height.trim().parse().map_err(|_| invalid())?;
    Ok(WindowSize::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = BridgeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_base, remote_docs::DEFAULT_API_BASE);
        assert_eq!(config.token, None);
        assert_eq!(config.bounds, WindowBounds::default());
        assert_eq!(config.layout.compact(), WindowSize::new(340, 632));
        assert_eq!(config.layout.desktop(), WindowSize::new(960, 632));
    }

    #[test]
    fn env_overrides() {
        let config = BridgeConfig::from_lookup(lookup(&[
            (ENV_API_BASE, "http://localhost:9000/v1"),
            (ENV_TOKEN, "secret"),
            (ENV_WINDOW_MIN, "100x100"),
            (ENV_WINDOW_MAX, "800 X 700"),
        ]))
        .unwrap();
        assert_eq!(config.api_base, "http://localhost:9000/v1");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.bounds.min, WindowSize::new(100, 100));
        assert_eq!(config.bounds.max, WindowSize::new(800, 700));
    }

    #[test]
    fn rejects_bad_sizes() {
        assert_eq!(
            BridgeConfig::from_lookup(lookup(&[(ENV_WINDOW_MAX, "wide")])).unwrap_err(),
            ConfigError::InvalidSize {
                var: ENV_WINDOW_MAX,
                value: "wide".into()
            }
        );
        assert!(matches!(
            BridgeConfig::from_lookup(lookup(&[(ENV_WINDOW_MIN, "2000x2000")])),
            Err(ConfigError::InvertedBounds { .. })
        ));
    }

    #[test]
    fn clamps_into_bounds() {
        let bounds = WindowBounds::default();
        assert_eq!(
            bounds.clamp(WindowSize::new(10, 5000)),
            WindowSize::new(240, 900)
        );
        assert_eq!(
            bounds.clamp(WindowSize::new(960, 632)),
            WindowSize::new(960, 632)
        );
    }
}
