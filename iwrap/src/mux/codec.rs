//! Outbound MUX framing

use embedded_io::Write;
use heapless::Vec;

use super::{FLAGS, HEADER_LEN, MAX_PAYLOAD, SOF, footer};
use crate::error::{IwrapError, Result};

/// Largest encoded frame: header, full payload and footer
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD + 1;

/// One logical MUX message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxFrame {
    /// Logical link the payload belongs to
    pub link: u8,

    /// Flags byte, always 0 on the wire today
    pub flags: u8,

    /// Payload, at most 255 bytes
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

impl MuxFrame {
    /// Create a frame carrying `payload` on `link`
    pub fn new(link: u8, payload: &[u8]) -> Result<Self> {
        let payload = Vec::from_slice(payload).map_err(|_| IwrapError::FrameTooLarge)?;
        Ok(Self {
            link,
            flags: FLAGS,
            payload,
        })
    }

    /// Serialize the frame
    ///
    /// # Returns
    ///
    /// `[0xBF, link, flags, len, ...payload, link ^ 0xFF]`
    pub fn serialize(&self) -> Vec<u8, MAX_FRAME_LEN> {
        let mut buf = Vec::new();
        // Capacity covers the largest payload, pushes cannot fail
        let _ = buf.extend_from_slice(&[SOF, self.link, self.flags, self.payload.len() as u8]);
        let _ = buf.extend_from_slice(&self.payload);
        let _ = buf.push(footer(self.link));
        buf
    }

    /// Decode the frame at the start of `data`
    ///
    /// # Returns
    ///
    /// * `Ok(Some((frame, consumed)))` - A complete frame
    /// * `Ok(None)` - More bytes are needed
    /// * `Err(IwrapError::InvalidFrame)` - Wrong start or footer byte
    pub fn deserialize(data: &[u8]) -> Result<Option<(Self, usize)>> {
        if data.is_empty() {
            return Ok(None);
        }
        if data[0] != SOF {
            return Err(IwrapError::InvalidFrame);
        }
        if data.len() < HEADER_LEN {
            return Ok(None);
        }

        let link = data[1];
        let len = data[3] as usize;
        let total = HEADER_LEN + len + 1;
        if data.len() < total {
            return Ok(None);
        }
        if data[total - 1] != footer(link) {
            return Err(IwrapError::InvalidFrame);
        }

        let mut frame = Self::new(link, &data[HEADER_LEN..HEADER_LEN + len])?;
        frame.flags = data[2];
        Ok(Some((frame, total)))
    }
}

/// Writes MUX frames, and un-muxed text, to a byte transport
pub struct MuxWriter<W> {
    writer: W,
    frames_sent: usize,
}

impl<W: Write> MuxWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frames_sent: 0,
        }
    }

    /// Frame `payload` on `link` and write it out, blocking until every byte
    /// has been handed to the transport
    ///
    /// Bytes go out as they are produced, without staging the frame.
    pub fn send(&mut self, link: u8, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD {
            return Err(IwrapError::FrameTooLarge);
        }
        self.write(&[SOF, link, FLAGS, payload.len() as u8])?;
        self.write(payload)?;
        self.write(&[footer(link)])?;
        self.frames_sent += 1;
        trace!("MUX: sent {} bytes on link {}", payload.len(), link);
        Ok(())
    }

    /// Write bytes without an envelope, for talking to the module before MUX
    /// mode is switched on
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.write(bytes)
    }

    /// Frames written so far
    pub fn frames_sent(&self) -> usize {
        self.frames_sent
    }

    pub fn inner(&self) -> &W {
        &self.writer
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).map_err(|_| IwrapError::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::{COMMAND_LINK, HID_LINK};

    #[test]
    fn test_encode_command_frame() {
        let mut writer = MuxWriter::new(std::vec::Vec::new());
        writer.send(0x01, &[0x41, 0x42]).unwrap();
        assert_eq!(writer.inner().as_slice(), &[0xBF, 0x01, 0x00, 0x02, 0x41, 0x42, 0xFE]);
        assert_eq!(writer.frames_sent(), 1);
    }

    #[test]
    fn test_encode_on_command_link() {
        let mut writer = MuxWriter::new(std::vec::Vec::new());
        writer.send(COMMAND_LINK, b"LIST").unwrap();
        assert_eq!(
            writer.inner().as_slice(),
            &[0xBF, 0xFF, 0x00, 0x04, b'L', b'I', b'S', b'T', 0x00]
        );
    }

    #[test]
    fn test_empty_payload() {
        let frame = MuxFrame::new(HID_LINK, &[]).unwrap();
        assert_eq!(frame.serialize().as_slice(), &[0xBF, 0x01, 0x00, 0x00, 0xFE]);
    }

    #[test]
    fn test_payload_too_large() {
        let payload = [0u8; 256];
        let mut writer = MuxWriter::new(std::vec::Vec::new());
        assert_eq!(writer.send(HID_LINK, &payload), Err(IwrapError::FrameTooLarge));
        assert!(writer.inner().is_empty());
        assert_eq!(MuxFrame::new(HID_LINK, &payload), Err(IwrapError::FrameTooLarge));

        // The length byte still covers 255
        assert!(writer.send(HID_LINK, &payload[..255]).is_ok());
        assert_eq!(writer.inner().len(), MAX_FRAME_LEN);
    }

    #[test]
    fn test_send_matches_serialized_frame() {
        let frame = MuxFrame::new(COMMAND_LINK, b"SLEEP").unwrap();
        let mut writer = MuxWriter::new(std::vec::Vec::new());
        writer.send(COMMAND_LINK, b"SLEEP").unwrap();
        assert_eq!(writer.inner().as_slice(), frame.serialize().as_slice());
    }

    #[test]
    fn test_deserialize() {
        let data = [0xBF, 0x01, 0x00, 0x02, 0x41, 0x42, 0xFE, 0xBF];
        let (frame, used) = MuxFrame::deserialize(&data).unwrap().unwrap();
        assert_eq!(used, 7);
        assert_eq!(frame.link, 0x01);
        assert_eq!(frame.payload.as_slice(), &[0x41, 0x42]);

        assert_eq!(MuxFrame::deserialize(&data[..5]), Ok(None));
        assert_eq!(MuxFrame::deserialize(&data[1..]), Err(IwrapError::InvalidFrame));

        let bad_footer = [0xBF, 0x01, 0x00, 0x00, 0x01];
        assert_eq!(MuxFrame::deserialize(&bad_footer), Err(IwrapError::InvalidFrame));
    }

    #[test]
    fn test_raw_send_has_no_envelope() {
        let mut writer = MuxWriter::new(std::vec::Vec::new());
        writer.send_raw(b"RESET").unwrap();
        assert_eq!(writer.inner().as_slice(), b"RESET");
        assert_eq!(writer.frames_sent(), 0);
    }
}
