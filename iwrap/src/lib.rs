//! Bluegiga iWRAP transport for keyboard firmware
//!
//! Talks to an iWRAP Bluetooth module over a serial line in MUX mode and
//! presents it to the keyboard core as a HID host.
//!
//! # Layers
//!
//! - [`uart`]: interrupt-driven byte transport, hardware or bit-banged,
//!   over lock-free single-producer single-consumer rings
//! - [`mux`]: MUX envelope encoder and the receive-side de-framing parser
//! - [`manager`]: module command sequencing and connection state
//! - [`storage`]: the persisted ring of three paired hosts
//! - [`hid`] and [`host`]: HID raw-mode reports and the host driver
//!
//! # Example
//!
//! ```no_run
//! use iwrap::{ByteQueue, ConnectionManager, IwrapHost, MuxReceiver, RESPONSE_BUFFER_SIZE};
//!
//! static RESPONSES: StaticCell<ByteQueue<RESPONSE_BUFFER_SIZE>> = StaticCell::new();
//!
//! // Receive interrupt: raw UART bytes go through the parser
//! let (producer, consumer) = RESPONSES.init(ByteQueue::new()).split();
//! let mut receiver = MuxReceiver::new(producer);
//! receiver.pump(&mut uart_rx)?;
//!
//! // Foreground
//! let mut manager = ConnectionManager::new(uart_tx, consumer, delay);
//! manager.initialize()?;
//! if !manager.is_connected() {
//!     manager.call_persisted(&mut store)?;
//! }
//! let mut host = IwrapHost::new(manager);
//! host.run().await;
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod config;
pub mod error;
pub mod hid;
pub mod host;
pub mod manager;
pub mod mux;
pub mod storage;
pub mod uart;

#[cfg(test)]
pub(crate) mod mock;

pub use config::{IwrapTiming, LinkConfig, UartConfig};
pub use error::{IwrapError, Result};
pub use hid::{ConsumerUsage, HidReport};
pub use host::{HostDriver, IwrapHost, REPORT_CHANNEL, REPORT_CHANNEL_SIZE};
pub use manager::{CallOutcome, CommandLine, ConnectionManager, ConnectionState};
pub use mux::{MuxParser, MuxReceiver, MuxWriter, RESPONSE_BUFFER_SIZE};
#[cfg(feature = "storage")]
pub use storage::FlashPairingStore;
pub use storage::{MacAddress, PairedDevices, PairingStore, RamPairingStore};
pub use uart::{ByteConsumer, ByteProducer, ByteQueue, HardwareUart, SoftUart, Uart, UartRx};
