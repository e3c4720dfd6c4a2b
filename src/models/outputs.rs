use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use super::{Channel, ChannelConfig};

/// Run of consecutive frame LEDs copied onto a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct FrameRange {
    /// First frame index of the run
    pub frame_offset: usize,
    /// Channel index receiving the first LED of the run
    pub led_offset: usize,
    #[validate(range(min = 1))]
    pub length: usize,
}

/// Channel fed with parts of a device frame
///
/// Without ranges, the whole frame is sent as is. Channel LEDs not covered by any range stay
/// off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Output {
    #[validate(nested)]
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[validate(nested)]
    pub ranges: Vec<FrameRange>,
}

impl From<Channel> for Output {
    fn from(channel: Channel) -> Self {
        Self {
            channel,
            ranges: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("device has no channel")]
    NoOutputs,
    #[error("output {output}: range {range} reads past the {frame_len} frame leds")]
    FrameOverflow {
        output: usize,
        range: usize,
        frame_len: usize,
    },
    #[error("output {output}: range {range} writes past the {led_count} channel leds")]
    ChannelOverflow {
        output: usize,
        range: usize,
        led_count: usize,
    },
    #[error("output {output}: channel led {index} is written by more than one range")]
    Overlap { output: usize, index: usize },
}

impl Output {
    /// Check the ranges of output number `output` against a frame of `frame_len` LEDs
    pub fn check(&self, output: usize, frame_len: usize) -> Result<(), MappingError> {
        let led_count = self.channel.led_count();
        let mut written = vec![false; led_count];

        for (range_idx, range) in self.ranges.iter().enumerate() {
            match range.frame_offset.checked_add(range.length) {
                Some(end) if end <= frame_len => {}
                _ => {
                    return Err(MappingError::FrameOverflow {
                        output,
                        range: range_idx,
                        frame_len,
                    })
                }
            }

            let end = match range.led_offset.checked_add(range.length) {
                Some(end) if end <= led_count => end,
                _ => {
                    return Err(MappingError::ChannelOverflow {
                        output,
                        range: range_idx,
                        led_count,
                    })
                }
            };

            for index in range.led_offset..end {
                if std::mem::replace(&mut written[index], true) {
                    return Err(MappingError::Overlap { output, index });
                }
            }
        }

        Ok(())
    }
}
