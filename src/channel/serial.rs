use std::{
    io::{BufWriter, Write},
    time::Duration,
};

use async_trait::async_trait;
use serialport::{SerialPort, SerialPortInfo, SerialPortType};

use super::{ChannelError, DeviceChannel};
use crate::{color::LedColor, models};

/// Bytes sent per LED update
pub const FRAME_LEN: usize = 5;

const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Encode one LED update as `[index high][index low][R][G][B]`
///
/// The high byte keeps the firmware's historical `(index << 8)` truncation, which leaves it
/// zero: only the low byte addresses the LED.
pub fn encode_frame(index: usize, color: LedColor) -> [u8; FRAME_LEN] {
    let (r, g, b) = color.into_components();
    [(index << 8) as u8, index as u8, r, g, b]
}

/// Human readable description of a port, as matched by [`find_port`]
fn describe(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => format!(
            "{} {} ({})",
            usb.manufacturer.as_deref().unwrap_or_default(),
            usb.product.as_deref().unwrap_or_default(),
            info.port_name
        ),
        SerialPortType::BluetoothPort => format!("Bluetooth ({})", info.port_name),
        SerialPortType::PciPort => format!("PCI ({})", info.port_name),
        SerialPortType::Unknown => info.port_name.clone(),
    }
}

/// Find the first port whose description contains `pattern`, ignoring case
pub fn find_port<I, S>(candidates: I, pattern: &str) -> Option<S>
where
    I: IntoIterator<Item = (S, String)>,
{
    let pattern = pattern.to_lowercase();

    candidates
        .into_iter()
        .find(|(_, description)| description.to_lowercase().contains(&pattern))
        .map(|(port, _)| port)
}

/// Arduino-style strip on a serial port
///
/// Updates are buffered and only reach the wire on [`DeviceChannel::flush`]. The buffer holds
/// two full strips so the close sequence goes out in a single flush. After an I/O error the
/// buffer is emptied, so a later flush never sends the remains of a failed frame.
pub struct SerialChannel<W: Write + Send = Box<dyn SerialPort>> {
    writer: Option<BufWriter<W>>,
    led_count: usize,
}

impl SerialChannel {
    /// Open the first serial port whose description matches the configured name
    #[instrument(skip(config), fields(port = %config.port))]
    pub fn open(config: &models::Serial) -> Result<Self, ChannelError> {
        let ports = serialport::available_ports()?;

        for port in &ports {
            debug!(name = %port.port_name, description = %describe(port), "found serial port");
        }

        let path = find_port(
            ports.iter().map(|port| (port.port_name.clone(), describe(port))),
            &config.port,
        )
        .ok_or_else(|| ChannelError::PortNotFound(config.port.clone()))?;

        let port = serialport::new(&path, config.baud_rate)
            .timeout(WRITE_TIMEOUT)
            .open()?;

        info!(%path, baud_rate = config.baud_rate, "opened serial port");

        Ok(Self::from_writer(port, config.led_count as _))
    }
}

impl<W: Write + Send> SerialChannel<W> {
    pub fn from_writer(writer: W, led_count: usize) -> Self {
        Self {
            writer: Some(BufWriter::with_capacity(
                2 * led_count * FRAME_LEN,
                writer,
            )),
            led_count,
        }
    }

    fn writer(&mut self) -> Result<&mut BufWriter<W>, ChannelError> {
        self.writer.as_mut().ok_or(ChannelError::Closed)
    }

    /// Drop buffered updates without sending them
    fn discard(&mut self) {
        if let Some(writer) = self.writer.take() {
            let capacity = writer.capacity();
            let (inner, _) = writer.into_parts();
            self.writer = Some(BufWriter::with_capacity(capacity, inner));
        }
    }

    async fn blank(&mut self) -> Result<(), ChannelError> {
        // The first clear is sometimes dropped by the firmware
        self.clear().await?;
        self.clear().await?;
        self.flush().await
    }
}

#[async_trait]
impl<W: Write + Send> DeviceChannel for SerialChannel<W> {
    fn led_count(&self) -> usize {
        self.led_count
    }

    async fn write(&mut self, index: usize, color: LedColor) -> Result<(), ChannelError> {
        if index >= self.led_count {
            return Err(ChannelError::IndexOutOfRange {
                index,
                led_count: self.led_count,
            });
        }

        let result = self.writer()?.write_all(&encode_frame(index, color));
        if let Err(error) = result {
            self.discard();
            return Err(error.into());
        }

        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ChannelError> {
        let result = self.writer()?.flush();
        if let Err(error) = result {
            warn!(%error, "dropping unsent led updates");
            self.discard();
            return Err(error.into());
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        if self.writer.is_none() {
            return Err(ChannelError::Closed);
        }

        let result = self.blank().await;

        // Dropping the writer releases the port
        self.writer.take();

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use super::*;

    /// Writer standing in for the serial port
    #[derive(Debug, Clone, Default)]
    struct Wire {
        bytes: Arc<Mutex<Vec<u8>>>,
        flushes: Arc<AtomicUsize>,
        unplugged: Arc<AtomicBool>,
    }

    impl Wire {
        fn bytes(&self) -> Vec<u8> {
            self.bytes.lock().unwrap().clone()
        }

        fn flushes(&self) -> usize {
            self.flushes.load(Ordering::SeqCst)
        }

        fn set_unplugged(&self, unplugged: bool) {
            self.unplugged.store(unplugged, Ordering::SeqCst);
        }
    }

    impl Write for Wire {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.unplugged.load(Ordering::SeqCst) {
                return Err(std::io::ErrorKind::BrokenPipe.into());
            }

            self.bytes.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn frame_layout() {
        assert_eq!(encode_frame(5, LedColor::new(1, 2, 3)), [0, 5, 1, 2, 3]);
        assert_eq!(encode_frame(179, LedColor::new(255, 0, 7)), [0, 179, 255, 0, 7]);
        assert_eq!(encode_frame(255, LedColor::new(0, 0, 0)), [0, 255, 0, 0, 0]);
    }

    #[tokio::test]
    async fn writes_are_buffered_until_flush() {
        let wire = Wire::default();
        let mut channel = SerialChannel::from_writer(wire.clone(), 180);

        channel.write(0, LedColor::new(1, 2, 3)).await.unwrap();
        channel.write(130, LedColor::new(4, 5, 6)).await.unwrap();
        assert!(wire.bytes().is_empty());

        channel.flush().await.unwrap();
        assert_eq!(wire.bytes(), vec![0, 0, 1, 2, 3, 0, 130, 4, 5, 6]);
        assert_eq!(wire.flushes(), 1);
    }

    #[tokio::test]
    async fn failed_flush_drops_pending_updates() {
        let wire = Wire::default();
        let mut channel = SerialChannel::from_writer(wire.clone(), 2);

        channel.write(0, LedColor::new(1, 2, 3)).await.unwrap();
        wire.set_unplugged(true);
        assert!(matches!(channel.flush().await, Err(ChannelError::Io(_))));

        wire.set_unplugged(false);
        channel.write(1, LedColor::new(4, 5, 6)).await.unwrap();
        channel.flush().await.unwrap();
        assert_eq!(wire.bytes(), vec![0, 1, 4, 5, 6]);
    }

    #[tokio::test]
    async fn failed_write_drops_pending_updates() {
        let wire = Wire::default();
        // Two updates fit in the buffer, the third one spills onto the wire
        let mut channel = SerialChannel::from_writer(wire.clone(), 1);

        channel.write(0, LedColor::new(1, 1, 1)).await.unwrap();
        channel.write(0, LedColor::new(2, 2, 2)).await.unwrap();
        wire.set_unplugged(true);
        assert!(matches!(
            channel.write(0, LedColor::new(3, 3, 3)).await,
            Err(ChannelError::Io(_))
        ));

        wire.set_unplugged(false);
        channel.write(0, LedColor::new(4, 4, 4)).await.unwrap();
        channel.flush().await.unwrap();
        assert_eq!(wire.bytes(), vec![0, 0, 4, 4, 4]);
    }

    #[tokio::test]
    async fn rejects_out_of_range_index() {
        let mut channel = SerialChannel::from_writer(Wire::default(), 180);

        assert!(matches!(
            channel.write(180, LedColor::new(0, 0, 0)).await,
            Err(ChannelError::IndexOutOfRange {
                index: 180,
                led_count: 180
            })
        ));
    }

    #[tokio::test]
    async fn close_blanks_strip_twice_then_flushes() {
        let wire = Wire::default();
        let mut channel = SerialChannel::from_writer(wire.clone(), 180);

        channel.close().await.unwrap();

        let bytes = wire.bytes();
        assert_eq!(bytes.len(), 2 * 180 * FRAME_LEN);
        for (i, frame) in bytes.chunks(FRAME_LEN).enumerate() {
            assert_eq!(frame, &[0, (i % 180) as u8, 0, 0, 0][..]);
        }
        assert_eq!(wire.flushes(), 1);
    }

    #[tokio::test]
    async fn closed_channel_rejects_operations() {
        let mut channel = SerialChannel::from_writer(Wire::default(), 4);
        channel.close().await.unwrap();

        assert!(matches!(
            channel.write(0, LedColor::new(0, 0, 0)).await,
            Err(ChannelError::Closed)
        ));
        assert!(matches!(channel.flush().await, Err(ChannelError::Closed)));
        assert!(matches!(channel.close().await, Err(ChannelError::Closed)));
    }

    #[test]
    fn finds_port_by_description() {
        let ports = vec![
            ("/dev/ttyS0", "/dev/ttyS0".to_owned()),
            (
                "/dev/ttyACM0",
                "Arduino LLC Arduino Leonardo (/dev/ttyACM0)".to_owned(),
            ),
        ];

        assert_eq!(find_port(ports.clone(), "leonardo"), Some("/dev/ttyACM0"));
        assert_eq!(find_port(ports.clone(), "ARDUINO"), Some("/dev/ttyACM0"));
        assert_eq!(find_port(ports, "ch340"), None);
    }
}
