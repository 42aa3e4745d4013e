//! Inbound MUX de-framing
//!
//! [`MuxParser`] is a byte-at-a-time state machine small enough to run
//! inside the receive interrupt. It counts payload bytes rather than
//! scanning for the next SOF, so a `0xBF` inside a payload is data. The
//! price is that a stream that loses or gains a byte mid-frame is misread
//! until a later `0xBF` happens to land in `WaitSof`.
//!
//! [`MuxReceiver`] couples the parser with the producer end of the de-framed
//! queue that the connection manager reads.

use embedded_io::{Read, ReadReady};

use super::{SOF, footer};
use crate::error::{IwrapError, Result};
use crate::uart::ByteProducer;

/// Position of the parser inside the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParserState {
    /// Hunting for `0xBF`
    WaitSof,
    /// Next byte is the link id
    WaitLink,
    /// Next byte is the flags byte, ignored
    WaitFlags,
    /// Next byte is the payload length
    WaitLength,
    /// This many payload bytes still to come
    Payload(u8),
}

/// Counters exposing what the parser has had to throw away
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParserStats {
    /// Frames whose payload was fully read
    pub frames: usize,

    /// Bytes discarded while hunting for SOF, footers excluded
    pub skipped: usize,

    /// Payload bytes the de-framed queue had no room for
    pub dropped: usize,
}

/// MUX envelope state machine
#[derive(Debug, Clone)]
pub struct MuxParser {
    state: ParserState,
    link: u8,
    expected_footer: Option<u8>,
    frames: usize,
    skipped: usize,
}

impl MuxParser {
    pub const fn new() -> Self {
        Self {
            state: ParserState::WaitSof,
            link: 0xFF,
            expected_footer: None,
            frames: 0,
            skipped: 0,
        }
    }

    /// Advance by one received byte
    ///
    /// Returns the byte when it is payload.
    pub fn feed(&mut self, byte: u8) -> Option<u8> {
        let expected_footer = self.expected_footer.take();
        match self.state {
            ParserState::WaitSof => {
                if byte == SOF {
                    self.state = ParserState::WaitLink;
                } else if expected_footer != Some(byte) {
                    self.skipped = self.skipped.wrapping_add(1);
                }
                None
            }
            ParserState::WaitLink => {
                self.link = byte;
                self.state = ParserState::WaitFlags;
                None
            }
            ParserState::WaitFlags => {
                self.state = ParserState::WaitLength;
                None
            }
            ParserState::WaitLength => {
                if byte == 0 {
                    self.finish_frame();
                } else {
                    self.state = ParserState::Payload(byte);
                }
                None
            }
            ParserState::Payload(remaining) => {
                let remaining = remaining - 1;
                if remaining == 0 {
                    self.finish_frame();
                } else {
                    self.state = ParserState::Payload(remaining);
                }
                Some(byte)
            }
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Link id of the frame being, or last, received
    pub fn link(&self) -> u8 {
        self.link
    }

    /// Drop any partial frame and hunt for SOF again
    pub fn reset(&mut self) {
        self.state = ParserState::WaitSof;
        self.expected_footer = None;
    }

    fn finish_frame(&mut self) {
        self.state = ParserState::WaitSof;
        self.expected_footer = Some(footer(self.link));
        self.frames = self.frames.wrapping_add(1);
    }
}

impl Default for MuxParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Receive-interrupt side of the MUX link: raw bytes in, payload bytes out
pub struct MuxReceiver<'a, const N: usize> {
    parser: MuxParser,
    output: ByteProducer<'a, N>,
}

impl<'a, const N: usize> MuxReceiver<'a, N> {
    pub fn new(output: ByteProducer<'a, N>) -> Self {
        Self {
            parser: MuxParser::new(),
            output,
        }
    }

    /// Run one raw byte through the parser
    ///
    /// Payload bytes that do not fit the de-framed queue are dropped, keeping
    /// the older bytes already queued.
    pub fn feed(&mut self, byte: u8) {
        if let Some(payload) = self.parser.feed(byte) {
            self.output.enqueue(payload);
        }
    }

    /// Drain every byte currently readable from `rx`
    ///
    /// Returns the number of raw bytes consumed.
    pub fn pump<R: Read + ReadReady>(&mut self, rx: &mut R) -> Result<usize> {
        let mut count = 0;
        let mut byte = [0u8; 1];
        while rx.read_ready().map_err(|_| IwrapError::Transport)? {
            if rx.read(&mut byte).map_err(|_| IwrapError::Transport)? == 0 {
                break;
            }
            self.feed(byte[0]);
            count += 1;
        }
        Ok(count)
    }

    /// Abandon any partial frame
    pub fn reset(&mut self) {
        self.parser.reset();
    }

    pub fn parser(&self) -> &MuxParser {
        &self.parser
    }

    pub fn stats(&self) -> ParserStats {
        ParserStats {
            frames: self.parser.frames,
            skipped: self.parser.skipped,
            dropped: self.output.dropped(),
        }
    }
}
