//! Configuration model

use std::{path::PathBuf, time::Duration};

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::color::LedColor;

mod channels;
pub use channels::*;

mod geometry;
pub use geometry::*;

mod outputs;
pub use outputs::*;

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SolidCapture {
    #[serde(
        serialize_with = "crate::serde::serialize_color_as_array",
        deserialize_with = "crate::serde::deserialize_color_from_array"
    )]
    pub color: LedColor,
}

/// Still image standing in for the screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ImageCapture {
    pub path: PathBuf,
    /// Virtual screen rectangle covered by the image
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[validate(range(min = 1))]
    pub width: u32,
    #[validate(range(min = 1))]
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", deny_unknown_fields)]
pub enum Capture {
    Solid(SolidCapture),
    Image(ImageCapture),
}

impl Validate for Capture {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            Capture::Solid(capture) => capture.validate(),
            Capture::Image(capture) => capture.validate(),
        }
    }
}

fn default_refresh_interval() -> u64 {
    33
}

/// One LED device and the screen layout feeding it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DeviceEntry {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Time between two refresh cycles, in milliseconds
    #[serde(default = "default_refresh_interval")]
    #[validate(range(min = 1))]
    pub refresh_interval: u64,
    #[validate(nested)]
    pub geometry: GeometrySource,
    /// Channel receiving the whole frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub channel: Option<Channel>,
    /// Channels receiving parts of the frame
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[validate(nested)]
    pub outputs: Vec<Output>,
}

impl DeviceEntry {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval)
    }

    /// Every channel of this device, `channel` first
    pub fn outputs(&self) -> impl Iterator<Item = Output> + '_ {
        self.channel
            .iter()
            .cloned()
            .map(Output::from)
            .chain(self.outputs.iter().cloned())
    }

    /// Check the geometry and the frame routing, returning the frame length
    pub fn check(&self) -> Result<usize, ConfigError> {
        let frame_len = self
            .geometry
            .resolve()
            .check()
            .map_err(|source| ConfigError::Geometry {
                device: self.name.clone(),
                source,
            })?;

        let mapping_error = |source| ConfigError::Mapping {
            device: self.name.clone(),
            source,
        };

        if self.channel.is_none() && self.outputs.is_empty() {
            return Err(mapping_error(MappingError::NoOutputs));
        }

        for (i, output) in self.outputs().enumerate() {
            output.check(i, frame_len).map_err(mapping_error)?;
        }

        Ok(frame_len)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("device '{device}': {source}")]
    Geometry {
        device: String,
        source: GeometryError,
    },
    #[error("device '{device}': {source}")]
    Mapping {
        device: String,
        source: MappingError,
    },
    #[error("duplicate device name '{0}'")]
    DuplicateDevice(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[validate(nested)]
    pub capture: Capture,
    #[serde(default)]
    #[validate(nested)]
    pub devices: Vec<DeviceEntry>,
}

impl Config {
    /// Parse and check a TOML configuration
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;

        for (i, device) in config.devices.iter().enumerate() {
            if config.devices[..i].iter().any(|d| d.name == device.name) {
                return Err(ConfigError::DuplicateDevice(device.name.clone()));
            }

            device.check()?;
        }

        Ok(config)
    }

    pub async fn load_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        use tokio::io::AsyncReadExt;

        let mut file = tokio::fs::File::open(path).await?;
        let mut full = String::new();
        file.read_to_string(&mut full).await?;

        Self::from_toml(&full)
    }

    pub fn to_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("ambientled");
            path.push("config.toml");
            path
        })
    }
}
