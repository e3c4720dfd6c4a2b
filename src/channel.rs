//! Connections to the LED hardware

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    color::{LedColor, OFF},
    frame::LedFrame,
    models::{self, ChannelConfig},
};

// Channel implementation modules

mod dummy;
pub use dummy::DummyChannel;

mod network;
pub use network::NetworkChannel;

mod serial;
pub use serial::SerialChannel;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("no serial port matching '{0}'")]
    PortNotFound(String),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("led index {index} out of range ({led_count} leds)")]
    IndexOutOfRange { index: usize, led_count: usize },
    #[error("channel is closed")]
    Closed,
}

/// Write side of an LED strip connection
///
/// Writes may be buffered until [`DeviceChannel::flush`]. Once [`DeviceChannel::close`]
/// returned, every operation fails with [`ChannelError::Closed`].
#[async_trait]
pub trait DeviceChannel: Send {
    /// Number of addressable LEDs
    fn led_count(&self) -> usize;

    /// Queue the color of one LED
    async fn write(&mut self, index: usize, color: LedColor) -> Result<(), ChannelError>;

    /// Push queued writes to the hardware
    async fn flush(&mut self) -> Result<(), ChannelError>;

    /// Queue every LED as off, without flushing
    async fn clear(&mut self) -> Result<(), ChannelError> {
        for index in 0..self.led_count() {
            self.write(index, OFF).await?;
        }

        Ok(())
    }

    /// Turn the strip off and release the connection
    async fn close(&mut self) -> Result<(), ChannelError>;
}

/// Named channel fed with complete frames
///
/// A device with frame ranges only receives those parts of each frame.
pub struct Device {
    name: String,
    inner: Box<dyn DeviceChannel>,
    ranges: Vec<models::FrameRange>,
    notified_inconsistent_led_data: bool,
}

impl Device {
    async fn build_inner(
        config: models::Channel,
    ) -> Result<Box<dyn DeviceChannel>, ChannelError> {
        let inner: Box<dyn DeviceChannel> = match config {
            models::Channel::Serial(serial) => Box::new(SerialChannel::open(&serial)?),
            models::Channel::Network(network) => Box::new(NetworkChannel::connect(&network).await?),
            models::Channel::Dummy(dummy) => Box::new(DummyChannel::new(&dummy)),
        };

        Ok(inner)
    }

    #[instrument(skip(config))]
    pub async fn new(name: &str, config: models::Channel) -> Result<Self, ChannelError> {
        let kind: &'static str = (&config).into();
        let led_count = config.led_count();
        let inner = Self::build_inner(config).await?;

        info!(kind, led_count, "opened channel");

        Ok(Self::from_channel(name, inner))
    }

    /// Open the channel of an output and route its frame ranges to it
    pub async fn from_output(name: &str, output: models::Output) -> Result<Self, ChannelError> {
        Ok(Self::new(name, output.channel).await?.with_ranges(output.ranges))
    }

    pub fn from_channel(name: &str, inner: Box<dyn DeviceChannel>) -> Self {
        Self {
            name: name.to_owned(),
            inner,
            ranges: Vec::new(),
            notified_inconsistent_led_data: false,
        }
    }

    pub fn with_ranges(mut self, ranges: Vec<models::FrameRange>) -> Self {
        self.ranges = ranges;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write a frame to every LED of the strip and flush once
    ///
    /// Without ranges, a frame longer than the strip is truncated and a shorter one is padded
    /// with LEDs off. With ranges, LEDs outside every range are off.
    #[instrument(skip(frame))]
    pub async fn push_frame(&mut self, frame: &LedFrame) -> Result<(), ChannelError> {
        if !self.ranges.is_empty() {
            let mut colors = vec![OFF; self.inner.led_count()];

            for range in &self.ranges {
                for i in 0..range.length {
                    if let (Some(color), Some(slot)) = (
                        frame.get(range.frame_offset.saturating_add(i)),
                        colors.get_mut(range.led_offset.saturating_add(i)),
                    ) {
                        *slot = color;
                    }
                }
            }

            for (index, color) in colors.into_iter().enumerate() {
                self.inner.write(index, color).await?;
            }

            return self.inner.flush().await;
        }

        let led_count = frame.len();
        let hw_led_count = self.inner.led_count();

        if led_count == hw_led_count {
            self.notified_inconsistent_led_data = false;
        } else if !self.notified_inconsistent_led_data {
            self.notified_inconsistent_led_data = true;

            if led_count > hw_led_count {
                warn!(
                    "too much LED data for device: {} extra",
                    led_count - hw_led_count
                );
            } else {
                warn!(
                    "not enough LED data for device: {} missing",
                    hw_led_count - led_count
                );
            }
        }

        for index in 0..hw_led_count {
            let color = frame.get(index).unwrap_or(OFF);
            self.inner.write(index, color).await?;
        }

        self.inner.flush().await
    }

    /// Turn the strip off and release it
    #[instrument]
    pub async fn close(mut self) -> Result<(), ChannelError> {
        let result = self.inner.close().await;

        match &result {
            Ok(()) => info!("closed channel"),
            Err(error) => error!(%error, "failed to close channel"),
        }

        result
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device").field("name", &self.name).finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    };

    use super::*;

    /// Operation observed by a [`RecordingChannel`]
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Op {
        Write(usize, LedColor),
        Flush,
        Close,
    }

    /// Channel recording every operation into a shared log
    #[derive(Debug, Clone)]
    pub struct RecordingChannel {
        led_count: usize,
        pub ops: Arc<Mutex<Vec<Op>>>,
        fail_flush: Arc<AtomicBool>,
    }

    impl RecordingChannel {
        pub fn new(led_count: usize) -> Self {
            Self {
                led_count,
                ops: Arc::new(Mutex::new(Vec::new())),
                fail_flush: Arc::new(AtomicBool::new(false)),
            }
        }

        /// Make flushes of this channel and its clones fail
        pub fn set_fail_flush(&self, fail: bool) {
            self.fail_flush.store(fail, Ordering::SeqCst);
        }

        pub fn ops(&self) -> Vec<Op> {
            self.ops.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeviceChannel for RecordingChannel {
        fn led_count(&self) -> usize {
            self.led_count
        }

        async fn write(&mut self, index: usize, color: LedColor) -> Result<(), ChannelError> {
            self.ops.lock().unwrap().push(Op::Write(index, color));
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ChannelError> {
            if self.fail_flush.load(Ordering::SeqCst) {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged").into());
            }

            self.ops.lock().unwrap().push(Op::Flush);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ChannelError> {
            self.clear().await?;
            self.flush().await?;
            self.ops.lock().unwrap().push(Op::Close);
            Ok(())
        }
    }
}
