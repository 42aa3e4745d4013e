//! Configuration for the serial line and the iWRAP command sequencing
//!
//! Every delay the connection manager waits after a command is a named
//! field of [`IwrapTiming`]. The defaults are the timings the module is
//! known to work with; they are waits, not timeouts, so shortening them
//! only makes responses more likely to be missed.

/// Common trait for link configurations
///
/// # Example
///
/// ```no_run
/// use iwrap::{LinkConfig, UartConfig};
///
/// let config = UartConfig::default();
/// assert!(config.validate());
/// ```
pub trait LinkConfig {
    /// Validate configuration parameters
    ///
    /// Returns `true` if all parameters are within valid ranges.
    fn validate(&self) -> bool;

    /// Get a human-readable description of the configuration
    fn description(&self) -> &'static str {
        "Link configuration"
    }
}

/// Serial line configuration, 8N1 framing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    /// Baud rate in bits per second
    pub baud: u32,

    /// Peripheral clock feeding the baud generator, in Hz
    pub clock_hz: u32,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baud: 115_200,
            clock_hz: 16_000_000,
        }
    }
}

impl LinkConfig for UartConfig {
    fn validate(&self) -> bool {
        self.baud != 0 && self.clock_hz / 8 >= self.baud
    }

    fn description(&self) -> &'static str {
        "UART 8N1"
    }
}

impl UartConfig {
    pub fn new(baud: u32) -> Self {
        Self {
            baud,
            ..Default::default()
        }
    }

    /// Baud generator divisor for a double-speed (8x oversampling) UART
    ///
    /// Rounds to nearest: `(clock / 4 / baud - 1) / 2`.
    pub fn divisor(&self) -> u16 {
        ((self.clock_hz / 4 / self.baud).saturating_sub(1) / 2) as u16
    }

    /// Duration of one bit on the wire, used by the software UART
    pub fn bit_time_ns(&self) -> u32 {
        1_000_000_000 / self.baud
    }
}

/// Fixed settle delays used by the connection manager, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IwrapTiming {
    /// After `RESET`, before switching MUX mode on
    pub reset_ms: u32,

    /// After `SET CONTROL MUX 1`
    pub mux_enable_ms: u32,

    /// After `LIST` in a connection check
    pub list_ms: u32,

    /// After `LIST` when looking for a connection to kill, and after `KILL`
    pub kill_ms: u32,

    /// After `SET BT PAIR` (interactive call and unpair)
    pub pair_query_ms: u32,

    /// After each `CALL` of the interactive policy
    pub interactive_call_ms: u32,

    /// After each `CALL` to a stored address
    pub persisted_call_ms: u32,

    /// Gap between failed attempts
    pub retry_gap_ms: u32,

    /// After dialling back an address announced by `RING`
    pub dial_back_ms: u32,

    /// Poll interval while listening for `RING`
    pub ring_poll_ms: u32,
}

impl Default for IwrapTiming {
    fn default() -> Self {
        Self {
            reset_ms: 3000,
            mux_enable_ms: 500,
            list_ms: 100,
            kill_ms: 500,
            pair_query_ms: 500,
            interactive_call_ms: 5000,
            persisted_call_ms: 5000,
            retry_gap_ms: 500,
            dial_back_ms: 500,
            ring_poll_ms: 100,
        }
    }
}

impl LinkConfig for IwrapTiming {
    fn validate(&self) -> bool {
        // A zero poll interval turns the RING wait into a hot spin
        self.ring_poll_ms > 0 && self.list_ms > 0
    }

    fn description(&self) -> &'static str {
        "iWRAP command timing"
    }
}
