//! Bit-banged UART, 8N1, LSB first
//!
//! Transmission is synchronous: `put` drives the pin for the whole frame.
//! Reception runs from the falling-edge (pin change) interrupt of the RX
//! pin, samples the frame in the middle of each bit and pushes the byte into
//! a receive ring, after which it looks exactly like the hardware UART to
//! everything above.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_io::{ErrorKind, ErrorType, Write};

use super::queue::{ByteProducer, ByteQueue};
use super::{Uart, UartRx};
use crate::config::{LinkConfig, UartConfig};
use crate::error::{IwrapError, Result};

/// A GPIO operation of the software UART failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinError;

impl embedded_io::Error for PinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Constructor for the software UART halves
pub struct SoftUart;

impl SoftUart {
    /// Idle the TX line, reset the receive ring and hand out the two halves
    pub fn init<'a, T, TD, R, RD, const N: usize>(
        config: UartConfig,
        tx_pin: T,
        tx_delay: TD,
        rx_pin: R,
        rx_delay: RD,
        rx_queue: &'a mut ByteQueue<N>,
    ) -> Result<(Uart<'a, SoftUartTx<T, TD>, N>, SoftUartRx<'a, R, RD, N>)>
    where
        T: OutputPin,
        TD: DelayNs,
        R: InputPin,
        RD: DelayNs,
    {
        if !config.validate() {
            return Err(IwrapError::InvalidConfig);
        }
        let bit_ns = config.bit_time_ns();

        let mut tx = SoftUartTx {
            pin: tx_pin,
            delay: tx_delay,
            bit_ns,
        };
        tx.pin.set_high().map_err(|_| IwrapError::Transport)?;

        rx_queue.reset();
        let (producer, consumer) = rx_queue.split();
        let rx = SoftUartRx {
            pin: rx_pin,
            delay: rx_delay,
            bit_ns,
            rx: producer,
        };
        debug!("Soft UART: {} baud, bit time {}ns", config.baud, bit_ns);
        Ok((Uart::new(tx, UartRx::new(consumer)), rx))
    }
}

/// Transmitting end of the software UART
pub struct SoftUartTx<P, D> {
    pin: P,
    delay: D,
    bit_ns: u32,
}

impl<P: OutputPin, D: DelayNs> SoftUartTx<P, D> {
    /// Shift one frame out, returning once the stop bit has elapsed
    pub fn put(&mut self, byte: u8) -> core::result::Result<(), PinError> {
        self.pin.set_low().map_err(|_| PinError)?;
        self.delay.delay_ns(self.bit_ns);
        for bit in 0..8 {
            if byte & (1 << bit) != 0 {
                self.pin.set_high().map_err(|_| PinError)?;
            } else {
                self.pin.set_low().map_err(|_| PinError)?;
            }
            self.delay.delay_ns(self.bit_ns);
        }
        self.pin.set_high().map_err(|_| PinError)?;
        self.delay.delay_ns(self.bit_ns);
        Ok(())
    }
}

impl<P: OutputPin, D: DelayNs> ErrorType for SoftUartTx<P, D> {
    type Error = PinError;
}

impl<P: OutputPin, D: DelayNs> Write for SoftUartTx<P, D> {
    fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Self::Error> {
        for byte in buf {
            self.put(*byte)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }
}

/// Receiving end of the software UART, owned by the pin-change interrupt
pub struct SoftUartRx<'a, P, D, const N: usize> {
    pin: P,
    delay: D,
    bit_ns: u32,
    rx: ByteProducer<'a, N>,
}

impl<P: InputPin, D: DelayNs, const N: usize> SoftUartRx<'_, P, D, N> {
    /// Pin-change interrupt body
    ///
    /// Returns `None` for the rising edges the pin-change interrupt also
    /// reports. A received byte is queued, or dropped if the ring is full.
    pub fn on_start_edge(&mut self) -> core::result::Result<Option<u8>, PinError> {
        if self.pin.is_high().map_err(|_| PinError)? {
            return Ok(None);
        }

        // Middle of data bit 0
        self.delay.delay_ns(self.bit_ns + self.bit_ns / 2);
        let mut byte = 0u8;
        for bit in 0..8 {
            if self.pin.is_high().map_err(|_| PinError)? {
                byte |= 1 << bit;
            }
            self.delay.delay_ns(self.bit_ns);
        }

        self.rx.enqueue(byte);
        Ok(Some(byte))
    }

    /// Received bytes dropped so far
    pub fn overflows(&self) -> usize {
        self.rx.dropped()
    }
}
