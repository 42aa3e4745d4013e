//! Buffered UART peripheral driven by receive and transmit-ready interrupts

use core::convert::Infallible;

use embedded_io::{ErrorType, Write};

use super::queue::{ByteConsumer, ByteProducer, ByteQueue};
use super::{Uart, UartRx};
use crate::config::{LinkConfig, UartConfig};
use crate::error::{IwrapError, Result};

/// Register access needed by the interrupt half
pub trait UartRegisters {
    /// Program the baud generator and enable receiver, transmitter and the
    /// receive-complete interrupt
    fn configure(&mut self, config: &UartConfig);

    /// Read the received data register
    fn read_data(&mut self) -> u8;

    /// Write the transmit data register
    fn write_data(&mut self, byte: u8);

    /// Mask the transmit-ready interrupt
    fn disable_tx_interrupt(&mut self);
}

/// Unmasks the transmit-ready interrupt from foreground code
///
/// Usually a single atomic register bit set, so it can live outside the
/// interrupt half that owns the rest of the peripheral.
pub trait TxInterruptEnable {
    fn enable_tx_interrupt(&mut self);
}

/// Constructor for the hardware UART halves
pub struct HardwareUart;

impl HardwareUart {
    /// Reset both rings, configure the line and hand out the two halves
    pub fn init<'a, R, K, const RX: usize, const TX: usize>(
        config: UartConfig,
        rx_queue: &'a mut ByteQueue<RX>,
        tx_queue: &'a mut ByteQueue<TX>,
        mut registers: R,
        tx_enable: K,
    ) -> Result<(Uart<'a, HardwareUartTx<'a, K, TX>, RX>, UartIrq<'a, R, RX, TX>)>
    where
        R: UartRegisters,
        K: TxInterruptEnable,
    {
        if !config.validate() {
            return Err(IwrapError::InvalidConfig);
        }

        rx_queue.reset();
        tx_queue.reset();
        let (rx_producer, rx_consumer) = rx_queue.split();
        let (tx_producer, tx_consumer) = tx_queue.split();

        registers.configure(&config);
        debug!("UART: {} baud, divisor {}", config.baud, config.divisor());

        let uart = Uart::new(
            HardwareUartTx {
                tx: tx_producer,
                tx_enable,
            },
            UartRx::new(rx_consumer),
        );
        let irq = UartIrq {
            registers,
            rx: rx_producer,
            tx: tx_consumer,
        };
        Ok((uart, irq))
    }
}

/// Foreground transmit end of the hardware UART
pub struct HardwareUartTx<'a, K, const TX: usize> {
    tx: ByteProducer<'a, TX>,
    tx_enable: K,
}

impl<K: TxInterruptEnable, const TX: usize> HardwareUartTx<'_, K, TX> {
    /// Queue `byte`, spinning until there is room
    ///
    /// Must run with interrupts enabled: only the transmit-ready interrupt
    /// makes room in the ring.
    pub fn put(&mut self, byte: u8) {
        let mut byte = byte;
        loop {
            match self.tx.try_enqueue(byte) {
                Ok(()) => break,
                Err(b) => {
                    byte = b;
                    core::hint::spin_loop();
                }
            }
        }
        self.tx_enable.enable_tx_interrupt();
    }
}

impl<K: TxInterruptEnable, const TX: usize> ErrorType for HardwareUartTx<'_, K, TX> {
    type Error = Infallible;
}

impl<K: TxInterruptEnable, const TX: usize> Write for HardwareUartTx<'_, K, TX> {
    fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Self::Error> {
        for byte in buf {
            self.put(*byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        while !self.tx.is_empty() {
            core::hint::spin_loop();
        }
        Ok(())
    }
}

/// Interrupt half of the hardware UART
pub struct UartIrq<'a, R, const RX: usize, const TX: usize> {
    registers: R,
    rx: ByteProducer<'a, RX>,
    tx: ByteConsumer<'a, TX>,
}

impl<R: UartRegisters, const RX: usize, const TX: usize> UartIrq<'_, R, RX, TX> {
    /// Receive-complete interrupt body
    ///
    /// A byte that arrives while the ring is full is dropped; what is already
    /// queued is kept.
    pub fn on_receive(&mut self) {
        let byte = self.registers.read_data();
        self.rx.enqueue(byte);
    }

    /// Transmit-ready interrupt body
    pub fn on_transmit_ready(&mut self) {
        match self.tx.dequeue() {
            Some(byte) => self.registers.write_data(byte),
            None => self.registers.disable_tx_interrupt(),
        }
    }

    /// Received bytes dropped so far
    pub fn rx_overflows(&self) -> usize {
        self.rx.dropped()
    }

    pub fn registers(&self) -> &R {
        &self.registers
    }
}
