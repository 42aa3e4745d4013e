//! Error type shared by the transport, codec and connection manager

use core::fmt;

/// Errors that can occur while driving the iWRAP module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IwrapError {
    /// The byte transport reported an I/O error
    Transport,

    /// The pairing store could not be read or written
    Storage,

    /// Command text does not fit the command buffer
    CommandTooLong,

    /// Payload exceeds the 255-byte MUX length field
    FrameTooLarge,

    /// Envelope with a wrong start or footer byte
    InvalidFrame,

    /// No active connection was found
    NoConnection,

    /// Invalid configuration
    InvalidConfig,
}

impl fmt::Display for IwrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "Transport error"),
            Self::Storage => write!(f, "Pairing storage error"),
            Self::CommandTooLong => write!(f, "Command too long"),
            Self::FrameTooLarge => write!(f, "Frame too large"),
            Self::InvalidFrame => write!(f, "Invalid MUX frame"),
            Self::NoConnection => write!(f, "No active connection"),
            Self::InvalidConfig => write!(f, "Invalid configuration"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for IwrapError {}

/// Result type for iWRAP operations
pub type Result<T> = core::result::Result<T, IwrapError>;
