//! Byte transports feeding each physical segment.
//!
//! Anything implementing [`std::io::Write`] is a transport. On the Pi that is
//! a `spidev` handle (behind the `hardware` feature); in tests it is an
//! in-memory recorder.

use std::io::{self, Write};

/// A byte-oriented link to one LED chain. Each call carries one full,
/// already-framed buffer.
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl<W: Write + ?Sized> Transport for W {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }
}

/// Open a spidev device in mode 0, 8 bits per word, at `speed_hz`.
#[cfg(feature = "hardware")]
pub fn open_spi(address: &str, speed_hz: u32) -> io::Result<spidev::Spidev> {
    use spidev::{SpiModeFlags, Spidev, SpidevOptions};

    let mut spi = Spidev::open(address)?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(speed_hz)
        .mode(SpiModeFlags::SPI_MODE_0)
        .build();
    spi.configure(&options)?;
    tracing::info!("Opened {} at {} Hz", address, speed_hz);
    Ok(spi)
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingTransport;
    use super::*;

    #[test]
    fn any_writer_is_a_transport() {
        let mut buf: Vec<u8> = Vec::new();
        buf.send(&[1, 2, 3]).unwrap();
        buf.send(&[4]).unwrap();
        assert_eq!(buf, vec![1, 2, 3, 4]);
    }

    #[test]
    fn each_send_is_one_recorded_buffer() {
        let recorder = RecordingTransport::new();
        let mut transport = recorder.clone();
        transport.send(&[0, 0, 0, 0]).unwrap();
        transport.send(&[0xFF]).unwrap();
        assert_eq!(recorder.sent(), vec![vec![0, 0, 0, 0], vec![0xFF]]);
    }
}
