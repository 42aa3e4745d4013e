//! iWRAP command sequencing and connection state
//!
//! The module is driven with plain text commands on the MUX command link.
//! Responses land in the de-framed receive queue; each command clears that
//! queue before it is sent, so after the settle delay the queue holds the
//! answer to that command and nothing older.
//!
//! The connection state is never pushed by the module. It is derived from
//! the `LIST` response: connected when the answer starts with `LIST ` but
//! not with `LIST 0`.

use embedded_hal::delay::DelayNs;
use embedded_io::Write;
use heapless::Vec;

use crate::config::IwrapTiming;
use crate::error::{IwrapError, Result};
use crate::fmt::ascii;
use crate::mux::{COMMAND_LINK, HID_LINK, MuxWriter, RESPONSE_BUFFER_SIZE};
use crate::storage::{MAC_LEN, MacAddress, PAIRED_DEVICE_SLOTS, PairingStore};
use crate::uart::ByteConsumer;

/// Capacity of a single command, terminator included
pub const COMMAND_BUFFER_SIZE: usize = 64;

const PAIR_QUERY: &[u8] = b"SET BT PAIR";

/// `SET BT PAIR {mac} {link key}\r\n`
const PAIR_RECORD_LEN: usize = 64;

/// Address column of a pairing record
const PAIR_ADDRESS_OFFSET: usize = 12;

/// `SET BT PAIR {mac}`, the command that forgets a pairing
const UNPAIR_COMMAND_LEN: usize = PAIR_ADDRESS_OFFSET + MAC_LEN;

/// Spaces before the address column of a `LIST` connection line
const LIST_ADDRESS_FIELD: usize = 10;

const RING: &[u8] = b"RING";

/// Link id column and the spaces around it, between `RING` and the address
const RING_ADDRESS_GAP: usize = 3;

/// Connection state as last observed through `LIST`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    /// No HID connection
    Disconnected,
    /// A `CALL` is outstanding
    Connecting,
    /// `LIST` reports at least one connection
    Connected,
}

/// How [`ConnectionManager::call_persisted`] got connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CallOutcome {
    /// A remembered host answered
    Reconnected { slot: usize },
    /// A new host rang in and was stored in `slot`
    Paired { slot: usize },
}

/// Drives the module's command interface
pub struct ConnectionManager<'a, W, D, const N: usize = RESPONSE_BUFFER_SIZE> {
    writer: MuxWriter<W>,
    responses: ByteConsumer<'a, N>,
    delay: D,
    timing: IwrapTiming,
    state: ConnectionState,
    last_response: Vec<u8, N>,
}

impl<'a, W: Write, D: DelayNs, const N: usize> ConnectionManager<'a, W, D, N> {
    /// Manager writing to `writer` and reading answers from the de-framed
    /// queue fed by a [`MuxReceiver`](crate::mux::MuxReceiver)
    pub fn new(writer: W, responses: ByteConsumer<'a, N>, delay: D) -> Self {
        Self {
            writer: MuxWriter::new(writer),
            responses,
            delay,
            timing: IwrapTiming::default(),
            state: ConnectionState::Disconnected,
            last_response: Vec::new(),
        }
    }

    /// Manager with shortened settle delays
    #[cfg(test)]
    pub(crate) fn with_timing(writer: W, responses: ByteConsumer<'a, N>, delay: D, timing: IwrapTiming) -> Result<Self> {
        use crate::config::LinkConfig;

        if !timing.validate() {
            return Err(IwrapError::InvalidConfig);
        }
        let mut manager = Self::new(writer, responses, delay);
        manager.timing = timing;
        Ok(manager)
    }

    /// Reset the module, switch it to MUX mode and probe for a connection
    ///
    /// The first `RESET` is sent raw in case the module is still in command
    /// mode, the second framed in case it is already multiplexing.
    pub fn initialize(&mut self) -> Result<bool> {
        info!("iWRAP: resetting module");
        self.send_raw(b"RESET")?;
        self.send_command(b"RESET")?;
        self.wait(self.timing.reset_ms);
        self.send_raw(b"\r\nSET CONTROL MUX 1\r\n")?;
        self.wait(self.timing.mux_enable_ms);
        self.check_connection()
    }

    /// Write text outside any MUX envelope
    pub fn send_raw(&mut self, text: &[u8]) -> Result<()> {
        debug!("iWRAP raw <- {}", ascii(text));
        self.writer.send_raw(text)
    }

    /// Clear the response queue and send `command` on the command link
    pub fn send_command(&mut self, command: &[u8]) -> Result<()> {
        self.responses.clear();
        debug!("iWRAP <- {}", ascii(command));
        self.writer.send(COMMAND_LINK, command)
    }

    /// Send a raw-mode HID payload on the HID link
    ///
    /// Leaves the response queue alone.
    pub fn send_hid(&mut self, payload: &[u8]) -> Result<()> {
        self.writer.send(HID_LINK, payload)
    }

    /// Drain whatever the module has answered so far
    ///
    /// The bytes stay available through [`last_response`](Self::last_response)
    /// until the next read.
    pub fn read_response(&mut self) -> &[u8] {
        self.last_response.clear();
        while let Some(byte) = self.responses.dequeue() {
            if self.last_response.push(byte).is_err() {
                break;
            }
        }
        trace!("iWRAP -> {}", ascii(&self.last_response));
        &self.last_response
    }

    pub fn last_response(&self) -> &[u8] {
        &self.last_response
    }

    /// Whether the last response read was a syntax error
    pub fn command_failed(&self) -> bool {
        self.last_response.starts_with(b"SYNTAX ERROR")
    }

    /// Ask the module for its connection list and update the state
    pub fn check_connection(&mut self) -> Result<bool> {
        self.send_command(b"LIST")?;
        self.wait(self.timing.list_ms);
        let response = self.read_response();
        let connected = response.starts_with(b"LIST ") && !response.starts_with(b"LIST 0");
        self.set_state(if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        });
        Ok(connected)
    }

    /// Connected state, refreshed with a `LIST` when it is not known to be up
    pub fn ensure_connected(&mut self) -> Result<bool> {
        if self.is_connected() {
            Ok(true)
        } else {
            self.check_connection()
        }
    }

    /// Call every host in the module's own pairing table, in table order,
    /// until one connects
    pub fn call_interactive(&mut self) -> Result<bool> {
        self.send_command(PAIR_QUERY)?;
        self.wait(self.timing.pair_query_ms);
        self.read_response();
        let response = self.last_response.clone();

        let mut dialed = false;
        for record in response.chunks(PAIR_RECORD_LEN) {
            if !record.starts_with(PAIR_QUERY) {
                break;
            }
            let Some(address) = record.get(PAIR_ADDRESS_OFFSET..PAIR_ADDRESS_OFFSET + MAC_LEN) else {
                break;
            };
            dialed = true;
            if self.call(address, b"\n", self.timing.interactive_call_ms)? {
                return Ok(true);
            }
        }

        if dialed { Ok(false) } else { self.check_connection() }
    }

    /// Reconnect to a remembered host, or wait for a new one to ring in
    ///
    /// Stored slots are tried in order 0, 1, 2. When none answers, the
    /// manager listens for `RING` with no timeout; the caller is dialed back
    /// and, once connected, remembered in the next slot of the ring, evicting
    /// the oldest entry when all three are taken.
    pub fn call_persisted<S: PairingStore>(&mut self, store: &mut S) -> Result<CallOutcome> {
        let mut devices = store.load()?;
        for slot in 0..PAIRED_DEVICE_SLOTS {
            let Some(mac) = devices.get(slot).copied() else {
                continue;
            };
            info!("iWRAP: calling {} from slot {}", mac.as_str(), slot);
            if self.call(mac.as_bytes(), b"", self.timing.persisted_call_ms)? {
                return Ok(CallOutcome::Reconnected { slot });
            }
            self.wait(self.timing.retry_gap_ms);
        }

        info!("iWRAP: waiting for an incoming connection");
        self.responses.clear();
        let mut pending: Vec<u8, N> = Vec::new();
        loop {
            let Some(mac) = self.poll_ring(&mut pending) else {
                self.wait(self.timing.ring_poll_ms);
                continue;
            };
            if self.call(mac.as_bytes(), b"", self.timing.dial_back_ms)? {
                let slot = devices.record(mac);
                store.commit(&devices)?;
                info!("iWRAP: paired {} into slot {}", mac.as_str(), slot);
                return Ok(CallOutcome::Paired { slot });
            }
            pending.clear();
            self.wait(self.timing.retry_gap_ms);
        }
    }

    /// Disconnect the first connection `LIST` reports
    pub fn kill(&mut self) -> Result<()> {
        self.send_command(b"LIST")?;
        self.wait(self.timing.kill_ms);
        self.read_response();
        let response = self.last_response.clone();

        let Some(address) = connection_address(&response) else {
            warn!("iWRAP: no connection to kill");
            return Err(IwrapError::NoConnection);
        };
        let command: Vec<u8, COMMAND_BUFFER_SIZE> = build_command(&[b"KILL ", address, b"\n"])?;
        self.send_command(&command)?;
        self.wait(self.timing.kill_ms);
        self.check_connection()?;
        Ok(())
    }

    /// Forget the first entry of the module's pairing table
    ///
    /// Returns `false` when the table is empty.
    pub fn unpair(&mut self) -> Result<bool> {
        self.send_command(PAIR_QUERY)?;
        self.wait(self.timing.pair_query_ms);
        self.read_response();
        let response = self.last_response.clone();

        if !response.starts_with(PAIR_QUERY) || response.len() < UNPAIR_COMMAND_LEN {
            debug!("iWRAP: pairing table is empty");
            return Ok(false);
        }
        let command: Vec<u8, COMMAND_BUFFER_SIZE> = build_command(&[&response[..UNPAIR_COMMAND_LEN], b"\n"])?;
        self.send_command(&command)?;
        Ok(true)
    }

    /// Put the module into its low power mode
    pub fn sleep(&mut self) -> Result<()> {
        self.send_command(b"SLEEP")
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn timing(&self) -> &IwrapTiming {
        &self.timing
    }

    /// Frames written on either link so far
    pub fn frames_sent(&self) -> usize {
        self.writer.frames_sent()
    }

    /// Response bytes lost because the de-framed queue was full
    pub fn responses_dropped(&self) -> usize {
        self.responses.dropped()
    }

    /// `CALL {address} 11 HID`, then settle and check
    fn call(&mut self, address: &[u8], terminator: &[u8], settle_ms: u32) -> Result<bool> {
        let command: Vec<u8, COMMAND_BUFFER_SIZE> = build_command(&[b"CALL ", address, b" 11 HID", terminator])?;
        self.set_state(ConnectionState::Connecting);
        self.send_command(&command)?;
        self.wait(settle_ms);
        self.check_connection()
    }

    /// Look for `RING {link} {address} ...` in what has arrived so far
    ///
    /// Bytes of an incomplete notification are kept in `pending` for the
    /// next poll.
    fn poll_ring(&mut self, pending: &mut Vec<u8, N>) -> Option<MacAddress> {
        while let Some(byte) = self.responses.dequeue() {
            if pending.push(byte).is_err() {
                pending.clear();
                let _ = pending.push(byte);
            }
        }

        let start = pending.windows(RING.len()).position(|w| w == RING)?;
        let address_start = start + RING.len() + RING_ADDRESS_GAP;
        let address_end = address_start + MAC_LEN;
        if pending.len() < address_end {
            return None;
        }

        let mac = MacAddress::parse(&pending[address_start..address_end]);
        *pending = Vec::from_slice(&pending[address_end..]).unwrap_or_default();
        if mac.is_none() {
            warn!("iWRAP: ignoring RING without a valid address");
        }
        mac
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            info!("iWRAP: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn wait(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}

/// Address column of the first connection line of a `LIST` response
fn connection_address(response: &[u8]) -> Option<&[u8]> {
    let newline = response.iter().position(|&b| b == b'\n')?;
    let line = &response[newline + 1..];
    if !line.starts_with(b"LIST ") {
        return None;
    }
    line.splitn(LIST_ADDRESS_FIELD + 1, |&b| b == b' ')
        .nth(LIST_ADDRESS_FIELD)?
        .get(..MAC_LEN)
}

fn build_command<const M: usize>(parts: &[&[u8]]) -> Result<Vec<u8, M>> {
    let mut command = Vec::new();
    for part in parts {
        command
            .extend_from_slice(part)
            .map_err(|_| IwrapError::CommandTooLong)?;
    }
    Ok(command)
}

/// Line editor for typing iWRAP commands on the keyboard itself
#[derive(Debug, Default)]
pub struct CommandLine {
    buffer: Vec<u8, COMMAND_BUFFER_SIZE>,
}

impl CommandLine {
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append a character, keeping one byte of the buffer free
    ///
    /// Returns `false` when the line is full and `c` was not added.
    pub fn push(&mut self, c: u8) -> bool {
        if self.buffer.len() >= COMMAND_BUFFER_SIZE - 1 {
            return false;
        }
        self.buffer.push(c).is_ok()
    }

    pub fn backspace(&mut self) -> Option<u8> {
        self.buffer.pop()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Send the line as a command and start a new one
    pub fn submit<W: Write, D: DelayNs, const N: usize>(
        &mut self,
        manager: &mut ConnectionManager<'_, W, D, N>,
    ) -> Result<()> {
        let result = manager.send_command(&self.buffer);
        self.buffer.clear();
        result
    }
}
