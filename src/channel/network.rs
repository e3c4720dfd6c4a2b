use async_trait::async_trait;
use byteorder::{BigEndian, WriteBytesExt};
use tokio::{io::AsyncWriteExt, net::TcpStream};

use super::{ChannelError, DeviceChannel};
use crate::{
    color::{LedColor, OFF},
    models,
};

/// Size of the parameter block sent when connecting
pub const HEADER_LEN: usize = 28;

/// Encode the strip parameters sent to the LED server
///
/// All fields are big-endian: max brightness, LED count, red/green/blue multipliers, lerp
/// factor and refresh rate.
pub fn encode_header(config: &models::Network) -> std::io::Result<Vec<u8>> {
    // Vec<u8> is also an AsyncWrite, so the byteorder calls are spelled out
    let mut header = Vec::with_capacity(HEADER_LEN);
    WriteBytesExt::write_u32::<BigEndian>(&mut header, config.max_brightness)?;
    WriteBytesExt::write_u32::<BigEndian>(&mut header, config.led_count)?;
    for &multiplier in &config.multipliers {
        WriteBytesExt::write_f32::<BigEndian>(&mut header, multiplier)?;
    }
    WriteBytesExt::write_f32::<BigEndian>(&mut header, config.lerp)?;
    WriteBytesExt::write_u32::<BigEndian>(&mut header, config.rate)?;
    Ok(header)
}

/// Strip driven by a single-board computer over TCP
///
/// The whole strip is sent as packed RGB triplets on every flush.
pub struct NetworkChannel {
    stream: Option<TcpStream>,
    colors: Vec<LedColor>,
    buf: Vec<u8>,
}

impl NetworkChannel {
    #[instrument(skip(config), fields(address = %config.address))]
    pub async fn connect(config: &models::Network) -> Result<Self, ChannelError> {
        let mut stream = TcpStream::connect(&config.address).await?;
        stream.set_nodelay(true)?;
        stream.write_all(&encode_header(config)?).await?;

        info!("connected to LED server");

        let led_count = config.led_count as usize;
        Ok(Self {
            stream: Some(stream),
            colors: vec![OFF; led_count],
            buf: Vec::with_capacity(led_count * 3),
        })
    }
}

#[async_trait]
impl DeviceChannel for NetworkChannel {
    fn led_count(&self) -> usize {
        self.colors.len()
    }

    async fn write(&mut self, index: usize, color: LedColor) -> Result<(), ChannelError> {
        if self.stream.is_none() {
            return Err(ChannelError::Closed);
        }

        let led_count = self.colors.len();
        let slot = self
            .colors
            .get_mut(index)
            .ok_or(ChannelError::IndexOutOfRange { index, led_count })?;

        *slot = color;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ChannelError> {
        self.buf.clear();
        for color in &self.colors {
            let (r, g, b) = color.into_components();
            self.buf.extend_from_slice(&[r, g, b]);
        }

        let stream = self.stream.as_mut().ok_or(ChannelError::Closed)?;
        stream.write_all(&self.buf).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.clear().await?;
        let result = self.flush().await;

        let mut stream = self.stream.take().ok_or(ChannelError::Closed)?;
        stream.shutdown().await?;

        result
    }
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncReadExt, net::TcpListener};

    use super::*;

    fn config(address: String, led_count: u32) -> models::Network {
        models::Network {
            address,
            led_count,
            max_brightness: 230,
            multipliers: [1.0, 0.5, 0.25],
            lerp: 0.5,
            rate: 60,
        }
    }

    #[test]
    fn header_layout() {
        let header = encode_header(&config("localhost:5163".to_owned(), 144)).unwrap();

        assert_eq!(header.len(), HEADER_LEN);
        assert_eq!(&header[0..4], &230u32.to_be_bytes());
        assert_eq!(&header[4..8], &144u32.to_be_bytes());
        assert_eq!(&header[8..12], &1.0f32.to_be_bytes());
        assert_eq!(&header[12..16], &0.5f32.to_be_bytes());
        assert_eq!(&header[16..20], &0.25f32.to_be_bytes());
        assert_eq!(&header[20..24], &0.5f32.to_be_bytes());
        assert_eq!(&header[24..28], &60u32.to_be_bytes());
    }

    #[tokio::test]
    async fn sends_header_frames_and_blank_on_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let mut channel = NetworkChannel::connect(&config(address, 2)).await.unwrap();
        channel.write(1, LedColor::new(7, 8, 9)).await.unwrap();
        channel.flush().await.unwrap();
        channel.close().await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(received.len(), HEADER_LEN + 2 * 6);
        assert_eq!(&received[HEADER_LEN..HEADER_LEN + 6], &[0, 0, 0, 7, 8, 9]);
        assert_eq!(&received[HEADER_LEN + 6..], &[0; 6]);

        assert!(matches!(
            channel.write(0, OFF).await,
            Err(ChannelError::Closed)
        ));
    }
}
