//! Interrupt-driven byte transport
//!
//! Two interchangeable line drivers share the same shape: an interrupt half
//! that owns the hardware and one end of each ring, and a foreground [`Uart`]
//! that owns the other ends.
//!
//! - [`hardware`]: a UART peripheral with receive-complete and
//!   transmit-ready interrupts, buffered in both directions.
//! - [`soft`]: a bit-banged line, transmitting synchronously and receiving
//!   from a start-bit edge interrupt.
//!
//! Upper layers only see `embedded_io::{Read, ReadReady, Write}`, so the MUX
//! codec and parser do not care which driver carries them.
//!
//! # Wiring
//!
//! ```ignore
//! static RX: StaticCell<ByteQueue<RX_BUFFER_SIZE>> = StaticCell::new();
//! static TX: StaticCell<ByteQueue<TX_BUFFER_SIZE>> = StaticCell::new();
//!
//! let (uart, irq) = HardwareUart::init(
//!     UartConfig::new(115_200),
//!     RX.init(ByteQueue::new()),
//!     TX.init(ByteQueue::new()),
//!     registers,
//!     tx_enable,
//! )?;
//! // move `irq` into the interrupt handler, keep `uart` in the foreground
//! ```

pub mod hardware;
pub mod queue;
pub mod soft;

use core::convert::Infallible;

use embedded_io::{ErrorType, Read, ReadReady, Write};

pub use hardware::{HardwareUart, HardwareUartTx, TxInterruptEnable, UartIrq, UartRegisters};
pub use queue::{ByteConsumer, ByteProducer, ByteQueue, RX_BUFFER_SIZE, TX_BUFFER_SIZE};
pub use soft::{PinError, SoftUart, SoftUartRx, SoftUartTx};

/// Foreground end of a receive ring
pub struct UartRx<'a, const N: usize> {
    rx: ByteConsumer<'a, N>,
}

impl<'a, const N: usize> UartRx<'a, N> {
    pub fn new(rx: ByteConsumer<'a, N>) -> Self {
        Self { rx }
    }

    /// Block until a byte arrives and return it
    ///
    /// Spins with interrupts enabled; the receive interrupt is the only thing
    /// that can end the wait.
    pub fn get(&mut self) -> u8 {
        loop {
            if let Some(byte) = self.rx.dequeue() {
                return byte;
            }
            core::hint::spin_loop();
        }
    }

    /// Number of received bytes waiting, without blocking
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    /// Bytes lost because the receive ring was full
    pub fn overflows(&self) -> usize {
        self.rx.dropped()
    }
}

impl<const N: usize> ErrorType for UartRx<'_, N> {
    type Error = Infallible;
}

impl<const N: usize> Read for UartRx<'_, N> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        buf[0] = self.get();
        let mut n = 1;
        while n < buf.len() {
            match self.rx.dequeue() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl<const N: usize> ReadReady for UartRx<'_, N> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

/// Foreground side of a serial line: blocking `put`/`get`, polled `available`
pub struct Uart<'a, T, const RX: usize> {
    tx: T,
    rx: UartRx<'a, RX>,
}

impl<'a, T: Write, const RX: usize> Uart<'a, T, RX> {
    pub fn new(tx: T, rx: UartRx<'a, RX>) -> Self {
        Self { tx, rx }
    }

    /// Queue one byte for transmission, blocking while the line is busy
    pub fn put(&mut self, byte: u8) -> Result<(), T::Error> {
        self.tx.write_all(&[byte])
    }

    /// Block until a byte is received
    pub fn get(&mut self) -> u8 {
        self.rx.get()
    }

    /// Number of received bytes waiting
    pub fn available(&self) -> usize {
        self.rx.available()
    }

    /// Separate the transmit and receive ends, e.g. to hand the receive end
    /// to the MUX parser
    pub fn split(self) -> (T, UartRx<'a, RX>) {
        (self.tx, self.rx)
    }
}

impl<T: Write, const RX: usize> ErrorType for Uart<'_, T, RX> {
    type Error = T::Error;
}

impl<T: Write, const RX: usize> Write for Uart<'_, T, RX> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.tx.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.tx.flush()
    }
}

impl<T: Write, const RX: usize> Read for Uart<'_, T, RX> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        // The receive end cannot fail
        match self.rx.read(buf) {
            Ok(n) => Ok(n),
            Err(e) => match e {},
        }
    }
}

impl<T: Write, const RX: usize> ReadReady for Uart<'_, T, RX> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.available() > 0)
    }
}
