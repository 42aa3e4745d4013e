//! HID raw-mode payloads
//!
//! In raw mode the module forwards a report verbatim to the host once it is
//! wrapped in a small header:
//!
//! ```text
//! +------+--------+------------------+-----------+-------------+
//! | 0x9F | length | 0xA1 (DATA, in)  | report id | report body |
//! +------+--------+------------------+-----------+-------------+
//! ```
//!
//! `length` counts everything after itself.

use strum::FromRepr;
use usbd_hid::descriptor::{KeyboardReport, MouseReport};

/// Raw-mode marker
pub const RAW_MODE_HEADER: u8 = 0x9F;

/// HIDP DATA transaction, input report
pub const DATA_INPUT: u8 = 0xA1;

pub const KEYBOARD_REPORT_ID: u8 = 0x01;
pub const MOUSE_REPORT_ID: u8 = 0x02;
pub const CONSUMER_REPORT_ID: u8 = 0x03;

pub const KEYBOARD_PAYLOAD_LEN: usize = 12;
pub const MOUSE_PAYLOAD_LEN: usize = 9;
pub const CONSUMER_PAYLOAD_LEN: usize = 7;

/// Consumer page usages the module's consumer report can express
///
/// Each usage owns one bit of the three-byte report body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ConsumerUsage {
    VolumeIncrement = 0x00E9,
    VolumeDecrement = 0x00EA,
    Mute = 0x00E2,
    PlayPause = 0x00CD,
    ScanNextTrack = 0x00B5,
    ScanPreviousTrack = 0x00B6,
    Stop = 0x00B7,
    Eject = 0x00B8,
    Email = 0x018A,
    Search = 0x0221,
    Bookmarks = 0x022A,
    Home = 0x0223,
    Back = 0x0224,
    Forward = 0x0225,
    AcStop = 0x0226,
    Refresh = 0x0227,
    ControlConfig = 0x0183,
    Calculator = 0x0192,
    Lock = 0x019E,
    LocalBrowser = 0x0194,
    Minimize = 0x0206,
    Record = 0x00B2,
    Rewind = 0x00B4,
}

impl ConsumerUsage {
    /// Report body bits for this usage
    pub const fn bits(self) -> [u8; 3] {
        match self {
            Self::VolumeIncrement => [0x01, 0, 0],
            Self::VolumeDecrement => [0x02, 0, 0],
            Self::Mute => [0x04, 0, 0],
            Self::PlayPause => [0x08, 0, 0],
            Self::ScanNextTrack => [0x10, 0, 0],
            Self::ScanPreviousTrack => [0x20, 0, 0],
            Self::Stop => [0x40, 0, 0],
            Self::Eject => [0x80, 0, 0],
            Self::Email => [0, 0x01, 0],
            Self::Search => [0, 0x02, 0],
            Self::Bookmarks => [0, 0x04, 0],
            Self::Home => [0, 0x08, 0],
            Self::Back => [0, 0x10, 0],
            Self::Forward => [0, 0x20, 0],
            Self::AcStop => [0, 0x40, 0],
            Self::Refresh => [0, 0x80, 0],
            Self::ControlConfig => [0, 0, 0x01],
            Self::Calculator => [0, 0, 0x04],
            Self::Lock => [0, 0, 0x08],
            Self::LocalBrowser => [0, 0, 0x10],
            Self::Minimize => [0, 0, 0x20],
            Self::Record => [0, 0, 0x40],
            Self::Rewind => [0, 0, 0x80],
        }
    }
}

/// Report body for a raw consumer usage code
///
/// Unknown codes, including 0 (release), clear every bit.
pub fn consumer_bits(usage: u16) -> [u8; 3] {
    ConsumerUsage::from_repr(usage).map_or([0; 3], ConsumerUsage::bits)
}

/// `9F 0A A1 01 mods 00 k0..k5`
pub fn keyboard_payload(report: &KeyboardReport) -> [u8; KEYBOARD_PAYLOAD_LEN] {
    let mut payload = [0u8; KEYBOARD_PAYLOAD_LEN];
    payload[..4].copy_from_slice(&header(KEYBOARD_PAYLOAD_LEN, KEYBOARD_REPORT_ID));
    payload[4] = report.modifier;
    payload[5] = 0x00;
    payload[6..].copy_from_slice(&report.keycodes);
    payload
}

/// `9F 07 A1 02 buttons x y wheel pan`
pub fn mouse_payload(report: &MouseReport) -> [u8; MOUSE_PAYLOAD_LEN] {
    let [h0, h1, h2, h3] = header(MOUSE_PAYLOAD_LEN, MOUSE_REPORT_ID);
    [
        h0,
        h1,
        h2,
        h3,
        report.buttons,
        report.x as u8,
        report.y as u8,
        report.wheel as u8,
        report.pan as u8,
    ]
}

/// `9F 05 A1 03 b1 b2 b3`
pub fn consumer_payload(usage: u16) -> [u8; CONSUMER_PAYLOAD_LEN] {
    let [h0, h1, h2, h3] = header(CONSUMER_PAYLOAD_LEN, CONSUMER_REPORT_ID);
    let [b1, b2, b3] = consumer_bits(usage);
    [h0, h1, h2, h3, b1, b2, b3]
}

const fn header(payload_len: usize, report_id: u8) -> [u8; 4] {
    [RAW_MODE_HEADER, (payload_len - 2) as u8, DATA_INPUT, report_id]
}

/// A report queued for the Bluetooth host
pub enum HidReport {
    Keyboard(KeyboardReport),
    Mouse(MouseReport),
    /// Consumer page usage code, 0 for release
    Consumer(u16),
    /// System control usage code
    System(u16),
}
