//! iWRAP MUX mode framing
//!
//! In MUX mode every message between host and module travels in an envelope
//! that names the logical link it belongs to:
//!
//! ```text
//! +------+------+-------+--------+-----------------+-------------+
//! | 0xBF | link | flags | length | payload (len B) | link ^ 0xFF |
//! +------+------+-------+--------+-----------------+-------------+
//! ```
//!
//! Link `0xFF` is the module's command channel, link `0x01` carries HID
//! raw-mode reports.

pub mod codec;
pub mod parser;

pub use codec::{MuxFrame, MuxWriter};
pub use parser::{MuxParser, MuxReceiver, ParserState, ParserStats};

/// Start of frame
pub const SOF: u8 = 0xBF;

/// Link id of the iWRAP command channel
pub const COMMAND_LINK: u8 = 0xFF;

/// Link id of the HID connection
pub const HID_LINK: u8 = 0x01;

/// Flags byte sent in every frame
pub const FLAGS: u8 = 0x00;

/// Largest payload the length byte can describe
pub const MAX_PAYLOAD: usize = 255;

/// SOF, link, flags and length
pub const HEADER_LEN: usize = 4;

/// Size of the de-framed receive queue
pub const RESPONSE_BUFFER_SIZE: usize = 256;

/// Trailer byte closing a frame on `link`
pub const fn footer(link: u8) -> u8 {
    link ^ 0xFF
}
