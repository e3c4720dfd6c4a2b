use async_trait::async_trait;

use super::{ChannelError, DeviceChannel};
use crate::{
    color::{LedColor, OFF},
    models,
};

/// Truecolor block per LED, followed by an attribute reset
fn ansi_line(leds: &[LedColor]) -> String {
    leds.iter()
        .map(|led| format!("\x1B[38;2;{};{};{}m\u{2588}", led.red, led.green, led.blue))
        .chain(std::iter::once("\x1B[0m".to_owned()))
        .collect()
}

/// Channel logging every flushed frame
pub struct DummyChannel {
    leds: Vec<LedColor>,
    mode: models::DummyChannelMode,
    closed: bool,
}

impl DummyChannel {
    pub fn new(config: &models::Dummy) -> Self {
        Self {
            leds: vec![OFF; config.led_count as _],
            mode: config.mode,
            closed: false,
        }
    }

    fn check_open(&self) -> Result<(), ChannelError> {
        if self.closed {
            Err(ChannelError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DeviceChannel for DummyChannel {
    fn led_count(&self) -> usize {
        self.leds.len()
    }

    async fn write(&mut self, index: usize, color: LedColor) -> Result<(), ChannelError> {
        self.check_open()?;

        let led_count = self.leds.len();
        *self
            .leds
            .get_mut(index)
            .ok_or(ChannelError::IndexOutOfRange { index, led_count })? = color;

        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ChannelError> {
        self.check_open()?;

        match self.mode {
            models::DummyChannelMode::Text => {
                for (i, led) in self.leds.iter().enumerate() {
                    info!(led = i, red = led.red, green = led.green, blue = led.blue);
                }
            }
            models::DummyChannelMode::Ansi => info!("{}", ansi_line(&self.leds)),
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.clear().await?;
        self.flush().await?;
        self.closed = true;
        Ok(())
    }
}
