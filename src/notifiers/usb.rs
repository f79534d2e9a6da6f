//! Serial USB light notifier.
//!
//! The light is a USB serial device accepting one color command per line,
//! terminated by a carriage return. Devices are recognized by their
//! `VID:PID` identifier and discovered in the background until one is
//! plugged in.

use std::{collections::HashMap, fmt, io::Write, sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info, warn};
use mockall::automock;
use serialport::{DataBits, Parity, SerialPortType, StopBits};
use tokio::{sync::Mutex, task::spawn_blocking};
use tokio_util::sync::CancellationToken;

use crate::notifiers::{InFlight, Notifier, NotifierContext};
use crate::schedule::{NotificationTier, TierSignal};

/// Delay between two discovery attempts.
pub const DISCOVERY_BACKOFF: Duration = Duration::from_secs(2);

const BAUD_RATE: u32 = 9600;
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// A USB serial port seen on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbPort {
    pub name: String,
    pub vid: u16,
    pub pid: u16,
}

impl UsbPort {
    /// Returns the `VID:PID` identifier in upper-case hexadecimal.
    pub fn device_id(&self) -> String {
        format!("{:04X}:{:04X}", self.vid, self.pid)
    }
}

/// Access to the serial ports of the host.
#[automock]
#[async_trait]
pub trait SerialPorts: Send + Sync {
    /// Lists the USB serial ports currently plugged in.
    async fn usb_ports(&self) -> anyhow::Result<Vec<UsbPort>>;

    /// Writes `command` to the serial port named `port`.
    async fn write(&self, port: &str, command: &str) -> anyhow::Result<()>;
}

/// [`SerialPorts`] backed by the operating system.
pub struct SystemSerialPorts;

#[async_trait]
impl SerialPorts for SystemSerialPorts {
    async fn usb_ports(&self) -> anyhow::Result<Vec<UsbPort>> {
        let ports = spawn_blocking(serialport::available_ports)
            .await?
            .context("failed to list serial ports")?;

        Ok(ports
            .into_iter()
            .filter_map(|port| match port.port_type {
                SerialPortType::UsbPort(usb) => Some(UsbPort {
                    name: port.port_name,
                    vid: usb.vid,
                    pid: usb.pid,
                }),
                _ => None,
            })
            .collect())
    }

    async fn write(&self, port: &str, command: &str) -> anyhow::Result<()> {
        let port = port.to_owned();
        let command = command.to_owned();

        spawn_blocking(move || -> anyhow::Result<()> {
            let mut serial = serialport::new(&port, BAUD_RATE)
                .data_bits(DataBits::Eight)
                .stop_bits(StopBits::One)
                .parity(Parity::None)
                .timeout(WRITE_TIMEOUT)
                .open()
                .with_context(|| format!("failed to open {}", port))?;

            serial
                .write_all(command.as_bytes())
                .with_context(|| format!("failed to write to {}", port))?;
            serial.flush()?;
            Ok(())
        })
        .await?
    }
}

/// Connection state of the USB light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbState {
    /// No device bound and no discovery running
    NoDevice,
    /// Looking for a supported device
    Discovering,
    /// A device is bound and idle
    Bound,
    /// A command is being written to the bound device
    Busy,
}

impl fmt::Display for UsbState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            UsbState::NoDevice => "no device",
            UsbState::Discovering => "discovering",
            UsbState::Bound => "bound",
            UsbState::Busy => "busy",
        };
        write!(f, "{}", name)
    }
}

#[derive(Default)]
struct UsbBinding {
    assigned_port: Option<String>,
    discovering: bool,
}

struct UsbShared {
    ports: Arc<dyn SerialPorts>,
    supported_devices: HashMap<String, String>,
    binding: Mutex<UsbBinding>,
    in_flight: InFlight,
    context: Mutex<Option<NotifierContext>>,
}

/// Drives a USB serial light with the tier of the tracked event.
///
/// Without a bound device, notifications are dropped and a discovery task
/// looks for a supported device every [`DISCOVERY_BACKOFF`] until one shows
/// up or the daemon stops. A failed write releases the device so the next
/// notification starts a new discovery.
pub struct UsbNotifier {
    shared: Arc<UsbShared>,
}

/// Light command for a tier.
pub fn command_for(tier: NotificationTier) -> &'static str {
    match tier {
        NotificationTier::Waiting | NotificationTier::Stop => "off",
        NotificationTier::Pending => "green",
        NotificationTier::AlmostThere => "yellow",
        NotificationTier::Starting => "red",
    }
}

impl UsbNotifier {
    /// Creates a notifier recognizing the `VID:PID` keys of `supported_devices`,
    /// compared case-insensitively.
    pub fn new(ports: Arc<dyn SerialPorts>, supported_devices: &HashMap<String, String>) -> Self {
        let supported_devices = supported_devices
            .iter()
            .map(|(id, label)| (id.to_uppercase(), label.clone()))
            .collect();

        UsbNotifier {
            shared: Arc::new(UsbShared {
                ports,
                supported_devices,
                binding: Mutex::new(UsbBinding::default()),
                in_flight: InFlight::default(),
                context: Mutex::new(None),
            }),
        }
    }

    pub async fn state(&self) -> UsbState {
        let binding = self.shared.binding.lock().await;
        match (&binding.assigned_port, binding.discovering) {
            (Some(_), _) if self.shared.in_flight.is_busy() => UsbState::Busy,
            (Some(_), _) => UsbState::Bound,
            (None, true) => UsbState::Discovering,
            (None, false) => UsbState::NoDevice,
        }
    }

    /// Starts a discovery task unless one is already running.
    async fn trigger_discovery(&self) {
        let Some(ctx) = self.shared.context.lock().await.clone() else {
            debug!("usb notifier is not initialized, no discovery");
            return;
        };

        {
            let mut binding = self.shared.binding.lock().await;
            if binding.discovering || binding.assigned_port.is_some() {
                return;
            }
            binding.discovering = true;
        }

        info!("looking for a usb light");
        let shared = self.shared.clone();
        let token = ctx.token.clone();
        ctx.tracker.spawn(async move {
            shared.discover(token).await;
        });
    }
}

impl UsbShared {
    async fn discover(&self, token: CancellationToken) {
        loop {
            match self.find_device().await {
                Ok(Some(port)) => {
                    let mut binding = self.binding.lock().await;
                    binding.assigned_port = Some(port);
                    binding.discovering = false;
                    return;
                }
                Ok(None) => debug!("no supported usb light plugged in"),
                Err(e) => warn!("failed to enumerate usb devices: {:#}", e),
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(DISCOVERY_BACKOFF) => {}
            }
        }

        self.binding.lock().await.discovering = false;
    }

    async fn find_device(&self) -> anyhow::Result<Option<String>> {
        let ports = self.ports.usb_ports().await?;

        for port in ports {
            let device_id = port.device_id();
            if let Some(label) = self.supported_devices.get(&device_id) {
                info!("usb light {} ({}) found on {}", label, device_id, port.name);
                return Ok(Some(port.name));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl Notifier for UsbNotifier {
    async fn initialize(&self, ctx: NotifierContext) {
        *self.shared.context.lock().await = Some(ctx);
        self.trigger_discovery().await;
    }

    async fn notify(&self, signal: TierSignal) {
        let port = self.shared.binding.lock().await.assigned_port.clone();
        let Some(port) = port else {
            debug!("usb light {}, dropping {}", self.state().await, signal);
            self.trigger_discovery().await;
            return;
        };

        let Some(_guard) = self.shared.in_flight.try_acquire() else {
            debug!("usb light busy, dropping {}", signal);
            return;
        };

        let command = format!("{}\r", command_for(signal.tier));
        if let Err(e) = self.shared.ports.write(&port, &command).await {
            warn!("usb light on {} is gone: {:#}", port, e);
            let mut binding = self.shared.binding.lock().await;
            if binding.assigned_port.as_deref() == Some(port.as_str()) {
                binding.assigned_port = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::{
        Mutex as StdMutex,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio_util::task::TaskTracker;

    fn create_signal(tier: NotificationTier) -> TierSignal {
        TierSignal {
            title: "Standup".to_string(),
            start: Utc::now(),
            tier,
        }
    }

    fn supported_devices() -> HashMap<String, String> {
        HashMap::from([("239a:80f4".to_string(), "MeetingMinder".to_string())])
    }

    fn light_port() -> UsbPort {
        UsbPort {
            name: "/dev/ttyACM0".to_string(),
            vid: 0x239A,
            pid: 0x80F4,
        }
    }

    fn create_context() -> NotifierContext {
        NotifierContext {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    async fn wait_for_state(notifier: &UsbNotifier, state: UsbState) {
        for _ in 0..100 {
            if notifier.state().await == state {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("usb notifier never reached {}", state);
    }

    #[test]
    fn test_device_id() {
        let port = UsbPort {
            name: "COM3".to_string(),
            vid: 0x1a,
            pid: 0xbeef,
        };
        assert_eq!(port.device_id(), "001A:BEEF");
    }

    #[test]
    fn test_command_for() {
        assert_eq!(command_for(NotificationTier::Waiting), "off");
        assert_eq!(command_for(NotificationTier::Pending), "green");
        assert_eq!(command_for(NotificationTier::AlmostThere), "yellow");
        assert_eq!(command_for(NotificationTier::Starting), "red");
        assert_eq!(command_for(NotificationTier::Stop), "off");
    }

    #[tokio::test]
    async fn test_uninitialized_notifier_has_no_device() {
        let notifier = UsbNotifier::new(Arc::new(MockSerialPorts::new()), &supported_devices());

        notifier.notify(create_signal(NotificationTier::Pending)).await;

        assert_eq!(notifier.state().await, UsbState::NoDevice);
    }

    #[tokio::test]
    async fn test_binds_device_and_writes_command() {
        let written = Arc::new(StdMutex::new(vec![]));
        let written_clone = written.clone();
        let mut mock_ports = MockSerialPorts::new();
        mock_ports
            .expect_usb_ports()
            .returning(|| Ok(vec![light_port()]));
        mock_ports.expect_write().returning(move |port, command| {
            written_clone
                .lock()
                .unwrap()
                .push((port.to_string(), command.to_string()));
            Ok(())
        });

        let notifier = UsbNotifier::new(Arc::new(mock_ports), &supported_devices());
        notifier.initialize(create_context()).await;
        wait_for_state(&notifier, UsbState::Bound).await;

        notifier
            .notify(create_signal(NotificationTier::AlmostThere))
            .await;

        let written = written.lock().unwrap();
        assert_eq!(
            *written,
            vec![("/dev/ttyACM0".to_string(), "yellow\r".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unsupported_device_is_ignored() {
        let mut mock_ports = MockSerialPorts::new();
        mock_ports.expect_usb_ports().returning(|| {
            Ok(vec![UsbPort {
                name: "/dev/ttyUSB0".to_string(),
                vid: 0x0403,
                pid: 0x6001,
            }])
        });
        mock_ports.expect_write().times(0);

        let ctx = create_context();
        let notifier = UsbNotifier::new(Arc::new(mock_ports), &supported_devices());
        notifier.initialize(ctx.clone()).await;
        wait_for_state(&notifier, UsbState::Discovering).await;

        notifier.notify(create_signal(NotificationTier::Starting)).await;

        ctx.token.cancel();
        ctx.tracker.close();
        ctx.tracker.wait().await;
        assert_eq!(notifier.state().await, UsbState::NoDevice);
    }

    #[tokio::test]
    async fn test_failed_write_releases_device_and_rediscovers() {
        let listings = Arc::new(AtomicUsize::new(0));
        let listings_clone = listings.clone();
        let mut mock_ports = MockSerialPorts::new();
        mock_ports.expect_usb_ports().returning(move || {
            listings_clone.fetch_add(1, Ordering::SeqCst);
            Ok(vec![light_port()])
        });
        mock_ports
            .expect_write()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("device unplugged")));

        let ctx = create_context();
        let notifier = UsbNotifier::new(Arc::new(mock_ports), &supported_devices());
        notifier.initialize(ctx.clone()).await;
        wait_for_state(&notifier, UsbState::Bound).await;

        notifier.notify(create_signal(NotificationTier::Pending)).await;
        assert_eq!(notifier.state().await, UsbState::NoDevice);

        notifier.notify(create_signal(NotificationTier::Pending)).await;
        wait_for_state(&notifier, UsbState::Bound).await;
        assert_eq!(listings.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_retries_after_backoff() {
        let listings = Arc::new(AtomicUsize::new(0));
        let listings_clone = listings.clone();
        let mut mock_ports = MockSerialPorts::new();
        mock_ports.expect_usb_ports().returning(move || {
            if listings_clone.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow::anyhow!("enumeration failed"))
            } else {
                Ok(vec![light_port()])
            }
        });

        let ctx = create_context();
        let notifier = UsbNotifier::new(Arc::new(mock_ports), &supported_devices());
        notifier.initialize(ctx.clone()).await;

        wait_for_state(&notifier, UsbState::Discovering).await;
        tokio::time::sleep(DISCOVERY_BACKOFF * 2 + Duration::from_millis(100)).await;

        assert_eq!(notifier.state().await, UsbState::Bound);
        assert_eq!(listings.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_repeated_stop_keeps_device_bound() {
        let written = Arc::new(StdMutex::new(vec![]));
        let written_clone = written.clone();
        let mut mock_ports = MockSerialPorts::new();
        mock_ports
            .expect_usb_ports()
            .times(1)
            .returning(|| Ok(vec![light_port()]));
        mock_ports.expect_write().times(2).returning(move |_, command| {
            written_clone.lock().unwrap().push(command.to_string());
            Ok(())
        });

        let notifier = UsbNotifier::new(Arc::new(mock_ports), &supported_devices());
        notifier.initialize(create_context()).await;
        wait_for_state(&notifier, UsbState::Bound).await;

        notifier.notify(create_signal(NotificationTier::Stop)).await;
        notifier.notify(create_signal(NotificationTier::Stop)).await;

        assert_eq!(*written.lock().unwrap(), vec!["off\r", "off\r"]);
        assert_eq!(notifier.state().await, UsbState::Bound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_keeps_retrying_until_cancelled() {
        let listings = Arc::new(AtomicUsize::new(0));
        let listings_clone = listings.clone();
        let mut mock_ports = MockSerialPorts::new();
        mock_ports.expect_usb_ports().returning(move || {
            listings_clone.fetch_add(1, Ordering::SeqCst);
            Ok(vec![UsbPort {
                name: "/dev/ttyUSB0".to_string(),
                vid: 0x0403,
                pid: 0x6001,
            }])
        });
        mock_ports.expect_write().times(0);

        let ctx = create_context();
        let notifier = UsbNotifier::new(Arc::new(mock_ports), &supported_devices());
        notifier.initialize(ctx.clone()).await;

        tokio::time::sleep(DISCOVERY_BACKOFF * 3 + Duration::from_millis(100)).await;
        assert_eq!(listings.load(Ordering::SeqCst), 4);
        assert_eq!(notifier.state().await, UsbState::Discovering);

        notifier.notify(create_signal(NotificationTier::Starting)).await;

        ctx.token.cancel();
        ctx.tracker.close();
        let drained = tokio::time::timeout(Duration::from_millis(10), ctx.tracker.wait()).await;
        assert!(drained.is_ok());
        assert_eq!(notifier.state().await, UsbState::NoDevice);
        assert_eq!(listings.load(Ordering::SeqCst), 4);
    }

    struct SlowPorts {
        writes: AtomicUsize,
    }

    #[async_trait]
    impl SerialPorts for SlowPorts {
        async fn usb_ports(&self) -> anyhow::Result<Vec<UsbPort>> {
            Ok(vec![light_port()])
        }

        async fn write(&self, _port: &str, _command: &str) -> anyhow::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_device_drops_overlapping_notifications() {
        let ports = Arc::new(SlowPorts {
            writes: AtomicUsize::new(0),
        });
        let notifier = UsbNotifier::new(ports.clone(), &supported_devices());
        notifier.initialize(create_context()).await;
        wait_for_state(&notifier, UsbState::Bound).await;

        tokio::join!(
            notifier.notify(create_signal(NotificationTier::Pending)),
            async {
                tokio::task::yield_now().await;
                assert_eq!(notifier.state().await, UsbState::Busy);
                notifier.notify(create_signal(NotificationTier::Pending)).await;
            }
        );

        assert_eq!(ports.writes.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.state().await, UsbState::Bound);
    }
}
