use ambassador::{delegatable_trait, Delegate};
use derive_more::From;
use serde_derive::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;
use validator::Validate;

#[delegatable_trait]
pub trait ChannelConfig: Sync + Send {
    fn led_count(&self) -> usize;
}

macro_rules! impl_channel_config {
    ($t:ty) => {
        impl ChannelConfig for $t {
            fn led_count(&self) -> usize {
                self.led_count as _
            }
        }
    };
}

fn default_baud_rate() -> u32 {
    38400
}

fn default_serial_led_count() -> u32 {
    180
}

/// Arduino-style strip behind a serial port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Serial {
    /// Case-insensitive substring of the port description, e.g. "arduino"
    #[validate(length(min = 1))]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    #[validate(range(min = 1))]
    pub baud_rate: u32,
    /// The frame format addresses at most 256 LEDs
    #[serde(default = "default_serial_led_count")]
    #[validate(range(min = 1, max = 256))]
    pub led_count: u32,
}

impl_channel_config!(Serial);

fn default_max_brightness() -> u32 {
    255
}

fn default_multipliers() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_lerp() -> f32 {
    0.5
}

fn default_rate() -> u32 {
    60
}

/// Strip driven by a networked single-board computer
///
/// Every setting except `address` is forwarded to the remote end when connecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Network {
    /// `host:port` of the LED server
    #[validate(length(min = 1))]
    pub address: String,
    #[validate(range(min = 1, max = 65535))]
    pub led_count: u32,
    #[serde(default = "default_max_brightness")]
    #[validate(range(max = 255))]
    pub max_brightness: u32,
    /// Per-channel multipliers for red, green and blue
    #[serde(default = "default_multipliers")]
    pub multipliers: [f32; 3],
    /// Interpolation factor between consecutive frames
    #[serde(default = "default_lerp")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub lerp: f32,
    /// Refresh rate of the remote strip, in Hz
    #[serde(default = "default_rate")]
    #[validate(range(min = 1))]
    pub rate: u32,
}

impl_channel_config!(Network);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DummyChannelMode {
    Text,
    Ansi,
}

impl Default for DummyChannelMode {
    fn default() -> Self {
        Self::Text
    }
}

/// Channel logging frames instead of driving hardware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct Dummy {
    #[validate(range(min = 1, max = 65535))]
    pub led_count: u32,
    pub mode: DummyChannelMode,
}

impl_channel_config!(Dummy);

impl Default for Dummy {
    fn default() -> Self {
        Self {
            led_count: 1,
            mode: Default::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr, Delegate, From)]
#[serde(rename_all = "lowercase", tag = "type", deny_unknown_fields)]
#[delegate(ChannelConfig)]
pub enum Channel {
    Serial(Serial),
    Network(Network),
    Dummy(Dummy),
}

impl Default for Channel {
    fn default() -> Self {
        Self::Dummy(Dummy::default())
    }
}

impl Validate for Channel {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            Channel::Serial(channel) => channel.validate(),
            Channel::Network(channel) => channel.validate(),
            Channel::Dummy(channel) => channel.validate(),
        }
    }
}
