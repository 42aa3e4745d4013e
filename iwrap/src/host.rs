//! Host driver over the iWRAP HID link
//!
//! [`IwrapHost`] is what the keyboard core talks to. Every send first makes
//! sure a connection is up, asking the module with `LIST` when it is not
//! known to be; reports produced while disconnected are dropped, not queued.

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::channel::{Channel, Receiver};
use embedded_hal::delay::DelayNs;
use embedded_io::Write;
use usbd_hid::descriptor::{KeyboardReport, MouseReport};

use crate::error::Result;
use crate::hid::{HidReport, consumer_payload, keyboard_payload, mouse_payload};
use crate::manager::ConnectionManager;

/// Reports buffered between the keyboard core and the forwarder
pub const REPORT_CHANNEL_SIZE: usize = 8;

/// Reports waiting to be sent to the Bluetooth host
///
/// Producers send, [`IwrapHost::run`] is the only receiver.
pub static REPORT_CHANNEL: Channel<CriticalSectionRawMutex, HidReport, REPORT_CHANNEL_SIZE> = Channel::new();

/// What a keyboard core needs from a host connection
pub trait HostDriver {
    /// Current LED state reported by the host
    fn keyboard_leds(&mut self) -> u8;

    fn send_keyboard(&mut self, report: &KeyboardReport) -> Result<()>;

    fn send_mouse(&mut self, report: &MouseReport) -> Result<()>;

    fn send_system(&mut self, usage: u16) -> Result<()>;

    fn send_consumer(&mut self, usage: u16) -> Result<()>;
}

/// [`HostDriver`] sending HID raw-mode reports through the module
pub struct IwrapHost<'a, W, D, const N: usize> {
    manager: ConnectionManager<'a, W, D, N>,
    last_consumer: u16,
    dropped_reports: usize,
}

impl<'a, W: Write, D: DelayNs, const N: usize> IwrapHost<'a, W, D, N> {
    pub fn new(manager: ConnectionManager<'a, W, D, N>) -> Self {
        Self {
            manager,
            last_consumer: 0,
            dropped_reports: 0,
        }
    }

    pub fn manager(&mut self) -> &mut ConnectionManager<'a, W, D, N> {
        &mut self.manager
    }

    /// Reports discarded because no host was connected
    pub fn dropped_reports(&self) -> usize {
        self.dropped_reports
    }

    /// Send any kind of report
    pub fn send_report(&mut self, report: &HidReport) -> Result<()> {
        match report {
            HidReport::Keyboard(report) => self.send_keyboard(report),
            HidReport::Mouse(report) => self.send_mouse(report),
            HidReport::Consumer(usage) => self.send_consumer(*usage),
            HidReport::System(usage) => self.send_system(*usage),
        }
    }

    /// Receive one report from `receiver` and send it
    ///
    /// A failed send is logged and the report is lost.
    pub async fn forward_next<M: RawMutex, const S: usize>(&mut self, receiver: &Receiver<'_, M, HidReport, S>) {
        let report = receiver.receive().await;
        if let Err(e) = self.send_report(&report) {
            error!("iWRAP: failed to send report: {:?}", e);
        }
    }

    /// Forward reports from [`REPORT_CHANNEL`] forever
    pub async fn run(&mut self) -> ! {
        let receiver = REPORT_CHANNEL.receiver();
        loop {
            self.forward_next(&receiver).await;
        }
    }

    fn connected(&mut self) -> Result<bool> {
        let connected = self.manager.ensure_connected()?;
        if !connected {
            self.dropped_reports = self.dropped_reports.wrapping_add(1);
            trace!("iWRAP: not connected, report dropped");
        }
        Ok(connected)
    }
}

impl<W: Write, D: DelayNs, const N: usize> HostDriver for IwrapHost<'_, W, D, N> {
    /// Raw mode carries no output reports
    fn keyboard_leds(&mut self) -> u8 {
        0
    }

    fn send_keyboard(&mut self, report: &KeyboardReport) -> Result<()> {
        if !self.connected()? {
            return Ok(());
        }
        self.manager.send_hid(&keyboard_payload(report))
    }

    fn send_mouse(&mut self, report: &MouseReport) -> Result<()> {
        if !self.connected()? {
            return Ok(());
        }
        self.manager.send_hid(&mouse_payload(report))
    }

    /// The module's raw mode has no system control report
    fn send_system(&mut self, _usage: u16) -> Result<()> {
        Ok(())
    }

    /// Repeats of the last usage are not sent
    fn send_consumer(&mut self, usage: u16) -> Result<()> {
        if !self.connected()? {
            return Ok(());
        }
        if usage == self.last_consumer {
            return Ok(());
        }
        self.last_consumer = usage;
        self.manager.send_hid(&consumer_payload(usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ModuleClock, ModuleLink, SimulatedModule, init_logger};
    use crate::mux::RESPONSE_BUFFER_SIZE;
    use crate::uart::ByteQueue;
    use embassy_futures::block_on;

    const HOST: &str = "00:07:80:80:52:27";

    type Host<'a> = IwrapHost<'a, ModuleLink<'a, RESPONSE_BUFFER_SIZE>, ModuleClock<'a, RESPONSE_BUFFER_SIZE>, RESPONSE_BUFFER_SIZE>;

    fn setup(queue: &mut ByteQueue<RESPONSE_BUFFER_SIZE>) -> (SimulatedModule<'_, RESPONSE_BUFFER_SIZE>, Host<'_>) {
        init_logger();
        let (producer, consumer) = queue.split();
        let module = SimulatedModule::new(producer);
        let manager = ConnectionManager::new(module.link(), consumer, module.clock());
        (module, IwrapHost::new(manager))
    }

    fn key(keycode: u8) -> KeyboardReport {
        KeyboardReport {
            modifier: 0,
            reserved: 0,
            leds: 0,
            keycodes: [keycode, 0, 0, 0, 0, 0],
        }
    }

    #[test]
    fn test_keyboard_report_frame() {
        let mut queue = ByteQueue::new();
        let (module, mut host) = setup(&mut queue);
        module.connect(HOST);

        host.send_keyboard(&key(0x04)).unwrap();
        assert_eq!(
            module.hid_reports(),
            [vec![0x9F, 0x0A, 0xA1, 0x01, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]]
        );
        // One LIST to learn the state, none after
        host.send_keyboard(&key(0x00)).unwrap();
        assert_eq!(module.commands(), ["LIST"]);
        assert_eq!(module.hid_reports().len(), 2);
    }

    #[test]
    fn test_reports_dropped_while_disconnected() {
        let mut queue = ByteQueue::new();
        let (module, mut host) = setup(&mut queue);

        host.send_keyboard(&key(0x04)).unwrap();
        host.send_consumer(0x00E9).unwrap();
        assert!(module.hid_reports().is_empty());
        assert_eq!(module.commands(), ["LIST", "LIST"]);
        assert_eq!(host.dropped_reports(), 2);
    }

    #[test]
    fn test_consumer_sent_once() {
        let mut queue = ByteQueue::new();
        let (module, mut host) = setup(&mut queue);
        module.connect(HOST);

        host.send_consumer(0x00E9).unwrap();
        host.send_consumer(0x00E9).unwrap();
        assert_eq!(module.hid_reports(), [vec![0x9F, 0x05, 0xA1, 0x03, 0x01, 0x00, 0x00]]);

        // Release, then the same key again
        host.send_consumer(0).unwrap();
        host.send_consumer(0x00E9).unwrap();
        assert_eq!(module.hid_reports().len(), 3);
    }

    #[test]
    fn test_mouse_and_system() {
        let mut queue = ByteQueue::new();
        let (module, mut host) = setup(&mut queue);
        module.connect(HOST);

        let report = MouseReport {
            buttons: 0x02,
            x: 3,
            y: -3,
            wheel: 0,
            pan: 0,
        };
        host.send_mouse(&report).unwrap();
        host.send_system(0x0081).unwrap();
        assert_eq!(module.hid_reports(), [vec![0x9F, 0x07, 0xA1, 0x02, 0x02, 0x03, 0xFD, 0x00, 0x00]]);
        assert_eq!(host.keyboard_leds(), 0);
    }

    #[test]
    fn test_forward_from_channel() {
        let mut queue = ByteQueue::new();
        let (module, mut host) = setup(&mut queue);
        module.connect(HOST);

        let channel: Channel<CriticalSectionRawMutex, HidReport, 4> = Channel::new();
        assert!(channel.try_send(HidReport::Keyboard(key(0x05))).is_ok());
        assert!(channel.try_send(HidReport::Consumer(0x00CD)).is_ok());

        let receiver = channel.receiver();
        block_on(host.forward_next(&receiver));
        block_on(host.forward_next(&receiver));

        let reports = module.hid_reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0][6], 0x05);
        assert_eq!(reports[1], [0x9F, 0x05, 0xA1, 0x03, 0x08, 0x00, 0x00]);
    }
}
