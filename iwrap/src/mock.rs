//! Test doubles for the UART registers, the module and flash
//!
//! [`SimulatedModule`] stands in for an iWRAP module in MUX mode. Commands
//! written through its [`ModuleLink`] are de-framed and answered right away;
//! answers are framed and pushed through a [`MuxReceiver`] into the
//! de-framed queue, the way the receive interrupt would. Time only passes
//! through its [`ModuleClock`], which is also when an incoming host rings.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;
use std::string::{String, ToString};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_io::{ErrorType, Write};

use crate::config::UartConfig;
use crate::mux::{COMMAND_LINK, MAX_PAYLOAD, MuxFrame, MuxReceiver};
use crate::uart::{ByteProducer, TxInterruptEnable, UartRegisters};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// UART registers backed by plain fields
#[derive(Debug, Default)]
pub struct FakeRegisters {
    /// Divisor programmed by `configure`
    pub divisor: Option<u16>,

    /// Bytes written to the data register
    pub written: Vec<u8>,

    /// Bytes the data register will return, 0 once empty
    pub incoming: VecDeque<u8>,

    /// Times the transmit-ready interrupt was masked
    pub tx_disables: usize,
}

impl UartRegisters for FakeRegisters {
    fn configure(&mut self, config: &UartConfig) {
        self.divisor = Some(config.divisor());
    }

    fn read_data(&mut self) -> u8 {
        self.incoming.pop_front().unwrap_or(0)
    }

    fn write_data(&mut self, byte: u8) {
        self.written.push(byte);
    }

    fn disable_tx_interrupt(&mut self) {
        self.tx_disables += 1;
    }
}

/// Counts transmit-ready interrupt enables, shareable across threads
#[derive(Debug, Default, Clone)]
pub struct FakeTxEnable(Arc<AtomicUsize>);

impl FakeTxEnable {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl TxInterruptEnable for FakeTxEnable {
    fn enable_tx_interrupt(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct ModuleState<'a, const N: usize> {
    receiver: MuxReceiver<'a, N>,
    pending: Vec<u8>,
    raw: Vec<u8>,
    commands: Vec<String>,
    hid_reports: Vec<Vec<u8>>,
    delays: Vec<u32>,
    pair_records: Vec<String>,
    reachable: Vec<String>,
    connected: Option<String>,
    ringing: Option<String>,
    scheduled: VecDeque<String>,
}

impl<const N: usize> ModuleState<'_, N> {
    fn receive(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        loop {
            match MuxFrame::deserialize(&self.pending) {
                Ok(Some((frame, used))) => {
                    self.pending.drain(..used);
                    self.handle(&frame);
                }
                Ok(None) => break,
                // Outside an envelope: plain command mode text
                Err(_) => {
                    let byte = self.pending.remove(0);
                    self.raw.push(byte);
                }
            }
        }
    }

    fn handle(&mut self, frame: &MuxFrame) {
        if frame.link != COMMAND_LINK {
            self.hid_reports.push(frame.payload.to_vec());
            return;
        }
        let command = String::from_utf8_lossy(&frame.payload).into_owned();
        let reply = self.execute(command.trim_end());
        self.commands.push(command);
        self.emit(&reply);
    }

    fn execute(&mut self, command: &str) -> String {
        let words: Vec<&str> = command.split(' ').collect();
        match words.as_slice() {
            ["LIST"] => match &self.connected {
                Some(mac) => format!(
                    "LIST 1\r\nLIST 0 CONNECTED HID 672 0 0 3 8d 8d {mac} 1 OUTGOING ACTIVE MASTER ENCRYPTED 0\r\n"
                ),
                None => "LIST 0\r\n".to_string(),
            },
            ["CALL", mac, "11", "HID"] => {
                if self.reachable.iter().any(|m| m == mac) {
                    self.connected = Some(mac.to_string());
                }
                "CALL 0\r\n".to_string()
            }
            ["KILL", mac] => {
                if self.connected.as_deref() == Some(*mac) {
                    self.connected = None;
                }
                "NO CARRIER 0 ERROR 0\r\n".to_string()
            }
            ["SET", "BT", "PAIR"] => self
                .pair_records
                .iter()
                .map(|mac| format!("SET BT PAIR {mac} 0123456789abcdef0123456789abcdef\r\n"))
                .collect(),
            ["SET", "BT", "PAIR", mac] => {
                self.pair_records.retain(|m| m != mac);
                String::new()
            }
            ["RESET"] | ["SLEEP"] => String::new(),
            _ => "SYNTAX ERROR\r\n".to_string(),
        }
    }

    fn emit(&mut self, text: &str) {
        for chunk in text.as_bytes().chunks(MAX_PAYLOAD) {
            let frame = MuxFrame::new(COMMAND_LINK, chunk).unwrap();
            for byte in frame.serialize() {
                self.receiver.feed(byte);
            }
        }
    }

    fn tick(&mut self, ms: u32) {
        self.delays.push(ms);
        if let Some(text) = self.scheduled.pop_front() {
            self.emit(&text);
        }
        if let Some(mac) = self.ringing.clone() {
            if self.connected.as_deref() != Some(mac.as_str()) {
                self.emit(&format!("RING 0 {mac} 11 HID\r\n"));
            }
        }
    }
}

/// Scripted iWRAP module
pub struct SimulatedModule<'a, const N: usize> {
    state: Rc<RefCell<ModuleState<'a, N>>>,
}

impl<'a, const N: usize> SimulatedModule<'a, N> {
    /// Module answering into the de-framed queue behind `responses`
    pub fn new(responses: ByteProducer<'a, N>) -> Self {
        Self {
            state: Rc::new(RefCell::new(ModuleState {
                receiver: MuxReceiver::new(responses),
                pending: Vec::new(),
                raw: Vec::new(),
                commands: Vec::new(),
                hid_reports: Vec::new(),
                delays: Vec::new(),
                pair_records: Vec::new(),
                reachable: Vec::new(),
                connected: None,
                ringing: None,
                scheduled: VecDeque::new(),
            })),
        }
    }

    /// Serial line into the module
    pub fn link(&self) -> ModuleLink<'a, N> {
        ModuleLink {
            state: self.state.clone(),
        }
    }

    /// Delay source that advances the module's time
    pub fn clock(&self) -> ModuleClock<'a, N> {
        ModuleClock {
            state: self.state.clone(),
        }
    }

    /// Host at `mac` accepts calls
    pub fn reachable(&self, mac: &str) {
        self.state.borrow_mut().reachable.push(mac.to_string());
    }

    /// Host at `mac` is in the module's pairing table
    pub fn pair_record(&self, mac: &str) {
        self.state.borrow_mut().pair_records.push(mac.to_string());
    }

    /// Host at `mac` rings on every delay until it is called back
    pub fn incoming(&self, mac: &str) {
        let mut state = self.state.borrow_mut();
        state.reachable.push(mac.to_string());
        state.ringing = Some(mac.to_string());
    }

    /// Connection already up
    pub fn connect(&self, mac: &str) {
        self.state.borrow_mut().connected = Some(mac.to_string());
    }

    /// Every host goes away
    pub fn disconnect_all(&self) {
        let mut state = self.state.borrow_mut();
        state.connected = None;
        state.ringing = None;
        state.reachable.clear();
    }

    /// Unsolicited text from the module
    pub fn notify(&self, text: &str) {
        self.state.borrow_mut().emit(text);
    }

    /// Unsolicited text sent during a later delay, one entry per delay
    pub fn schedule(&self, text: &str) {
        self.state.borrow_mut().scheduled.push_back(text.to_string());
    }

    /// Bytes received outside MUX envelopes
    pub fn raw(&self) -> Vec<u8> {
        self.state.borrow().raw.clone()
    }

    /// Command link payloads, as sent
    pub fn commands(&self) -> Vec<String> {
        self.state.borrow().commands.clone()
    }

    /// Payloads received on links other than the command link
    pub fn hid_reports(&self) -> Vec<Vec<u8>> {
        self.state.borrow().hid_reports.clone()
    }

    /// Every delay, in milliseconds
    pub fn delays(&self) -> Vec<u32> {
        self.state.borrow().delays.clone()
    }

    pub fn pair_records(&self) -> Vec<String> {
        self.state.borrow().pair_records.clone()
    }

    pub fn connected(&self) -> Option<String> {
        self.state.borrow().connected.clone()
    }
}

/// Writing end of the simulated serial line
pub struct ModuleLink<'a, const N: usize> {
    state: Rc<RefCell<ModuleState<'a, N>>>,
}

impl<const N: usize> ErrorType for ModuleLink<'_, N> {
    type Error = Infallible;
}

impl<const N: usize> Write for ModuleLink<'_, N> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.state.borrow_mut().receive(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Delay that records instead of sleeping
pub struct ModuleClock<'a, const N: usize> {
    state: Rc<RefCell<ModuleState<'a, N>>>,
}

impl<const N: usize> DelayNs for ModuleClock<'_, N> {
    fn delay_ns(&mut self, ns: u32) {
        self.state.borrow_mut().tick(ns / 1_000_000);
    }

    fn delay_us(&mut self, us: u32) {
        self.state.borrow_mut().tick(us / 1_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.state.borrow_mut().tick(ms);
    }
}

#[cfg(feature = "storage")]
pub use flash::RamFlash;

#[cfg(feature = "storage")]
mod flash {
    use std::vec;
    use std::vec::Vec;

    use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};

    const CAPACITY: usize = 4096;

    /// NOR flash in RAM: erase sets bytes to 0xFF, writes can only clear bits
    pub struct RamFlash {
        data: Vec<u8>,
        erases: usize,
    }

    impl RamFlash {
        pub fn new() -> Self {
            Self {
                data: vec![0xFF; CAPACITY],
                erases: 0,
            }
        }

        pub fn erases(&self) -> usize {
            self.erases
        }

        fn check(offset: u32, len: usize, align: usize) -> Result<usize, NorFlashErrorKind> {
            let offset = offset as usize;
            if offset % align != 0 || len % align != 0 {
                return Err(NorFlashErrorKind::NotAligned);
            }
            if offset + len > CAPACITY {
                return Err(NorFlashErrorKind::OutOfBounds);
            }
            Ok(offset)
        }
    }

    impl ErrorType for RamFlash {
        type Error = NorFlashErrorKind;
    }

    impl ReadNorFlash for RamFlash {
        const READ_SIZE: usize = 1;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            let offset = Self::check(offset, bytes.len(), Self::READ_SIZE)?;
            bytes.copy_from_slice(&self.data[offset..offset + bytes.len()]);
            Ok(())
        }

        fn capacity(&self) -> usize {
            CAPACITY
        }
    }

    impl NorFlash for RamFlash {
        const WRITE_SIZE: usize = 4;
        const ERASE_SIZE: usize = 1024;

        fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
            let len = to.saturating_sub(from) as usize;
            let from = Self::check(from, len, Self::ERASE_SIZE)?;
            self.data[from..from + len].fill(0xFF);
            self.erases += 1;
            Ok(())
        }

        fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            let offset = Self::check(offset, bytes.len(), Self::WRITE_SIZE)?;
            for (cell, byte) in self.data[offset..].iter_mut().zip(bytes) {
                *cell &= *byte;
            }
            Ok(())
        }
    }
}
