//! Periodic capture-to-device refresh loop

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use thiserror::Error;
use tokio::{
    select,
    sync::watch,
    time::{self, MissedTickBehavior},
};

use crate::{
    channel::{ChannelError, Device},
    image::{sampler, CaptureError, RegionSampler},
    mapper::LedMapper,
    models::{Config, DeviceEntry, GeometryError},
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),
}

/// Shared switch suspending refresh cycles
///
/// Clones observe the same flag. A cycle reads it once, before capturing anything.
#[derive(Debug, Clone, Default)]
pub struct PauseFlag(Arc<AtomicBool>);

impl PauseFlag {
    pub fn new(paused: bool) -> Self {
        Self(Arc::new(AtomicBool::new(paused)))
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.0.store(paused, Ordering::Release);
    }

    /// Flip the flag, returning the new state
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::AcqRel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The pause flag was set, nothing was captured or written
    Paused,
    /// A complete frame was written and flushed
    Pushed,
}

/// Close every device, returning the first failure
async fn close_devices(devices: Vec<Device>) -> Result<(), ChannelError> {
    let mut result = Ok(());

    for device in devices {
        let closed = device.close().await;
        if result.is_ok() {
            result = closed;
        }
    }

    result
}

/// Drives the channels of one device from its screen geometry
pub struct Pipeline {
    name: String,
    mapper: LedMapper,
    devices: Vec<Device>,
    interval: Duration,
    pause: PauseFlag,
}

impl Pipeline {
    pub fn new(
        name: &str,
        mapper: LedMapper,
        devices: Vec<Device>,
        interval: Duration,
        pause: PauseFlag,
    ) -> Self {
        Self {
            name: name.to_owned(),
            mapper,
            devices,
            interval,
            pause,
        }
    }

    /// Build the mapper and open every channel of a configured device
    ///
    /// If one channel fails to open, the ones already opened are closed again.
    #[instrument(skip(entry, pause), fields(device = %entry.name))]
    pub async fn from_config(
        entry: &DeviceEntry,
        pause: PauseFlag,
    ) -> Result<Self, PipelineError> {
        let mapper = LedMapper::new(&entry.geometry.resolve())?;

        let outputs: Vec<_> = entry.outputs().collect();
        let output_count = outputs.len();
        let mut devices = Vec::with_capacity(output_count);

        for (i, output) in outputs.into_iter().enumerate() {
            let name = if output_count == 1 {
                entry.name.clone()
            } else {
                format!("{}/{}", entry.name, i)
            };

            match Device::from_output(&name, output).await {
                Ok(device) => devices.push(device),
                Err(error) => {
                    close_devices(devices).await.ok();
                    return Err(error.into());
                }
            }
        }

        debug!(
            led_count = mapper.led_count(),
            channels = devices.len(),
            interval = ?entry.refresh_interval(),
            "created pipeline"
        );

        Ok(Self::new(
            &entry.name,
            mapper,
            devices,
            entry.refresh_interval(),
            pause,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capture, map and push one frame unless paused
    ///
    /// The frame goes to every channel even if one of them fails. The first failure is
    /// returned.
    pub async fn run_cycle(
        &mut self,
        sampler: &mut dyn RegionSampler,
    ) -> Result<CycleOutcome, PipelineError> {
        let frame = match self.mapper.refresh(sampler, &self.pause)? {
            Some(frame) => frame,
            None => return Ok(CycleOutcome::Paused),
        };

        let mut result = Ok(CycleOutcome::Pushed);

        for device in &mut self.devices {
            if let Err(error) = device.push_frame(&frame).await {
                if result.is_ok() {
                    result = Err(error.into());
                } else {
                    warn!(channel = %device.name(), %error, "push failed");
                }
            }
        }

        result
    }

    /// Refresh the device until `shutdown` turns true, then close it
    ///
    /// Failed cycles are logged and skipped. Ticks missed by a slow cycle are dropped so two
    /// cycles never overlap, and the close sequence only starts once the current cycle is over.
    #[instrument(skip(self, sampler, shutdown), fields(device = %self.name))]
    pub async fn run(
        mut self,
        mut sampler: Box<dyn RegionSampler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), PipelineError> {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !*shutdown.borrow() {
            select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender dropped
                        break;
                    }
                },
                _ = ticker.tick() => {
                    match self.run_cycle(sampler.as_mut()).await {
                        Ok(outcome) => trace!(?outcome, "refresh cycle"),
                        Err(error) => warn!(%error, "refresh cycle failed"),
                    }
                },
            }
        }

        close_devices(self.devices).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("devices", &self.devices)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Pipelines ready to run, and the devices that could not be started
pub struct Startup {
    pub pipelines: Vec<(Pipeline, Box<dyn RegionSampler>)>,
    pub failed: Vec<String>,
}

/// Start the pipeline of every enabled device
///
/// A device that fails to start is logged and left out. The other devices are not affected.
pub async fn start_all(config: &Config, pause: &PauseFlag) -> Startup {
    let mut startup = Startup {
        pipelines: Vec::new(),
        failed: Vec::new(),
    };

    for entry in config.devices.iter().filter(|entry| entry.enabled) {
        let started = match sampler::build(&config.capture) {
            Ok(sampler) => Pipeline::from_config(entry, pause.clone())
                .await
                .map(|pipeline| (pipeline, sampler)),
            Err(error) => Err(error.into()),
        };

        match started {
            Ok(started) => startup.pipelines.push(started),
            Err(error) => {
                error!(device = %entry.name, %error, "cannot start device");
                startup.failed.push(entry.name.clone());
            }
        }
    }

    startup
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{
        channel::testing::{Op, RecordingChannel},
        color::{LedColor, OFF},
        image::CaptureBuffer,
        models::{Geometry, ScreenRegion},
    };

    /// Uniform sampler counting captures, failing the first `failures` of them
    struct CountingSampler {
        captures: Arc<AtomicUsize>,
        failures: usize,
    }

    impl CountingSampler {
        fn new(failures: usize) -> (Self, Arc<AtomicUsize>) {
            let captures = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    captures: captures.clone(),
                    failures,
                },
                captures,
            )
        }
    }

    impl RegionSampler for CountingSampler {
        fn capture(&mut self, region: &ScreenRegion) -> Result<CaptureBuffer, CaptureError> {
            let n = self.captures.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(CaptureError::OutOfBounds { region: *region });
            }

            Ok(CaptureBuffer::solid(
                region.width,
                region.height,
                LedColor::new(10, 20, 30),
            ))
        }
    }

    fn pipeline_with(channels: &[&RecordingChannel], pause: PauseFlag) -> Pipeline {
        Pipeline::new(
            "test",
            LedMapper::new(&Geometry::single_board()).unwrap(),
            channels
                .iter()
                .map(|channel| Device::from_channel("test", Box::new((*channel).clone())))
                .collect(),
            Duration::from_millis(1),
            pause,
        )
    }

    fn pipeline(channel: &RecordingChannel, pause: PauseFlag) -> Pipeline {
        pipeline_with(&[channel], pause)
    }

    #[test]
    fn pause_flag_is_shared() {
        let pause = PauseFlag::default();
        let other = pause.clone();

        assert!(!other.is_paused());
        assert!(pause.toggle());
        assert!(other.is_paused());
        assert!(!other.toggle());
        assert!(!pause.is_paused());
    }

    #[tokio::test]
    async fn paused_cycle_does_nothing() {
        let channel = RecordingChannel::new(288);
        let mut pipeline = pipeline(&channel, PauseFlag::new(true));
        let (mut sampler, captures) = CountingSampler::new(0);

        assert_eq!(
            pipeline.run_cycle(&mut sampler).await.unwrap(),
            CycleOutcome::Paused
        );
        assert_eq!(captures.load(Ordering::SeqCst), 0);
        assert!(channel.ops().is_empty());
    }

    #[tokio::test]
    async fn cycle_writes_every_led_then_flushes() {
        let channel = RecordingChannel::new(288);
        let mut pipeline = pipeline(&channel, PauseFlag::default());
        let (mut sampler, captures) = CountingSampler::new(0);

        assert_eq!(
            pipeline.run_cycle(&mut sampler).await.unwrap(),
            CycleOutcome::Pushed
        );
        assert_eq!(captures.load(Ordering::SeqCst), 2);

        let ops = channel.ops();
        assert_eq!(ops.len(), 289);
        for (i, op) in ops[..288].iter().enumerate() {
            assert_eq!(*op, Op::Write(i, LedColor::new(10, 20, 30)));
        }
        assert_eq!(ops[288], Op::Flush);
    }

    #[tokio::test]
    async fn failed_cycle_is_independent_of_the_next() {
        let channel = RecordingChannel::new(288);
        let mut pipeline = pipeline(&channel, PauseFlag::default());
        let (mut sampler, _) = CountingSampler::new(1);

        assert!(matches!(
            pipeline.run_cycle(&mut sampler).await,
            Err(PipelineError::Capture(_))
        ));
        assert!(channel.ops().is_empty());

        assert_eq!(
            pipeline.run_cycle(&mut sampler).await.unwrap(),
            CycleOutcome::Pushed
        );
    }

    #[tokio::test]
    async fn channel_failure_only_fails_its_cycle() {
        let channel = RecordingChannel::new(288);
        let mut pipeline = pipeline(&channel, PauseFlag::default());
        let (mut sampler, _) = CountingSampler::new(0);

        channel.set_fail_flush(true);
        assert!(matches!(
            pipeline.run_cycle(&mut sampler).await,
            Err(PipelineError::Channel(ChannelError::Io(_)))
        ));

        channel.set_fail_flush(false);
        assert_eq!(
            pipeline.run_cycle(&mut sampler).await.unwrap(),
            CycleOutcome::Pushed
        );
        assert_eq!(channel.ops().last(), Some(&Op::Flush));
    }

    #[tokio::test]
    async fn frame_reaches_every_channel_when_one_fails() {
        let broken = RecordingChannel::new(288);
        let healthy = RecordingChannel::new(288);
        let mut pipeline = pipeline_with(&[&broken, &healthy], PauseFlag::default());
        let (mut sampler, _) = CountingSampler::new(0);

        broken.set_fail_flush(true);
        assert!(matches!(
            pipeline.run_cycle(&mut sampler).await,
            Err(PipelineError::Channel(_))
        ));
        assert_eq!(healthy.ops().len(), 289);
        assert_eq!(healthy.ops().last(), Some(&Op::Flush));
    }

    #[tokio::test]
    async fn failed_cycles_do_not_stop_the_loop() {
        let channel = RecordingChannel::new(288);
        let (sampler, captures) = CountingSampler::new(3);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(
            pipeline(&channel, PauseFlag::default()).run(Box::new(sampler), rx),
        );

        time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        // Three failed captures, then at least one complete cycle of two captures
        assert!(captures.load(Ordering::SeqCst) >= 5);

        let ops = channel.ops();
        assert_eq!(ops.last(), Some(&Op::Close));
        assert!(ops.len() > 290);
        for (i, op) in ops[..288].iter().enumerate() {
            assert_eq!(*op, Op::Write(i, LedColor::new(10, 20, 30)));
        }
        assert_eq!(ops[288], Op::Flush);
    }

    #[tokio::test]
    async fn shutdown_clears_and_closes() {
        let channel = RecordingChannel::new(288);
        let (sampler, _) = CountingSampler::new(0);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(
            pipeline(&channel, PauseFlag::default()).run(Box::new(sampler), rx),
        );

        time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let ops = channel.ops();
        assert_eq!(ops.last(), Some(&Op::Close));

        // The close sequence follows the last complete frame
        let tail = &ops[ops.len() - 290..];
        for (i, op) in tail[..288].iter().enumerate() {
            assert_eq!(*op, Op::Write(i, OFF));
        }
        assert_eq!(tail[288], Op::Flush);
        assert_eq!(ops[..ops.len() - 290].last(), Some(&Op::Flush));
    }

    #[tokio::test]
    async fn shutdown_before_start_only_closes() {
        let channel = RecordingChannel::new(288);
        let (sampler, captures) = CountingSampler::new(0);
        let (_tx, rx) = watch::channel(true);

        pipeline(&channel, PauseFlag::default())
            .run(Box::new(sampler), rx)
            .await
            .unwrap();

        assert_eq!(captures.load(Ordering::SeqCst), 0);
        assert_eq!(channel.ops().len(), 290);
    }

    #[tokio::test]
    async fn close_failure_is_reported() {
        let channel = RecordingChannel::new(4);
        channel.set_fail_flush(true);
        let (sampler, _) = CountingSampler::new(0);
        let (_tx, rx) = watch::channel(true);

        assert!(matches!(
            pipeline(&channel, PauseFlag::default())
                .run(Box::new(sampler), rx)
                .await,
            Err(PipelineError::Channel(ChannelError::Io(_)))
        ));
    }

    #[tokio::test]
    async fn every_channel_is_closed_on_shutdown() {
        let first = RecordingChannel::new(4);
        let second = RecordingChannel::new(4);
        first.set_fail_flush(true);
        let (sampler, _) = CountingSampler::new(0);
        let (_tx, rx) = watch::channel(true);

        assert!(pipeline_with(&[&first, &second], PauseFlag::default())
            .run(Box::new(sampler), rx)
            .await
            .is_err());
        assert_eq!(second.ops().last(), Some(&Op::Close));
    }

    #[tokio::test]
    async fn failing_device_does_not_block_the_others() {
        let config = Config::from_toml(
            r#"
            [capture]
            type = "solid"
            color = [1, 2, 3]

            [[devices]]
            name = "unreachable"
            geometry = "single-board"
            channel = { type = "network", address = "127.0.0.1:1", led_count = 288 }

            [[devices]]
            name = "desk"
            geometry = "single-board"
            channel = { type = "dummy", led_count = 288 }

            [[devices]]
            name = "spare"
            enabled = false
            geometry = "single-board"
            channel = { type = "dummy", led_count = 288 }
            "#,
        )
        .unwrap();

        let startup = start_all(&config, &PauseFlag::default()).await;

        assert_eq!(startup.failed, vec!["unreachable".to_owned()]);
        assert_eq!(
            startup
                .pipelines
                .iter()
                .map(|(pipeline, _)| pipeline.name())
                .collect::<Vec<_>>(),
            vec!["desk"]
        );
    }
}
