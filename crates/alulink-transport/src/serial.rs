use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPortType, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::LinkStream;

/// Baud rate the ALU's UART receiver is synthesized for.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default timeout for blocking reads and writes on the port.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// How to open the serial port.
///
/// The line is always 8N1 without flow control; only the device path, baud
/// rate and blocking timeout vary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path (`/dev/ttyUSB0`, `COM12`, ...).
    pub path: String,
    /// Line speed in bits per second. Default: 9600.
    pub baud_rate: u32,
    /// Timeout for blocking reads and writes. Default: 1s.
    pub timeout: Duration,
}

impl SerialConfig {
    /// Config for `path` with default line settings.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

/// Open a serial port as a [`LinkStream`].
pub fn open(config: &SerialConfig) -> Result<LinkStream> {
    debug!(port = %config.path, baud = config.baud_rate, "opening serial port");

    let port = serialport::new(config.path.as_str(), config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(config.timeout)
        .open()
        .map_err(|source| TransportError::Open {
            port: config.path.clone(),
            source,
        })?;

    info!(port = %config.path, baud = config.baud_rate, "serial port open");
    Ok(LinkStream::from_serial(port))
}

/// Kind of hardware behind a serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortKind {
    Usb {
        vid: u16,
        pid: u16,
        product: Option<String>,
    },
    Pci,
    Bluetooth,
    Unknown,
}

impl PortKind {
    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            PortKind::Usb { .. } => "usb",
            PortKind::Pci => "pci",
            PortKind::Bluetooth => "bluetooth",
            PortKind::Unknown => "unknown",
        }
    }
}

impl From<SerialPortType> for PortKind {
    fn from(kind: SerialPortType) -> Self {
        match kind {
            SerialPortType::UsbPort(usb) => PortKind::Usb {
                vid: usb.vid,
                pid: usb.pid,
                product: usb.product,
            },
            SerialPortType::PciPort => PortKind::Pci,
            SerialPortType::BluetoothPort => PortKind::Bluetooth,
            SerialPortType::Unknown => PortKind::Unknown,
        }
    }
}

/// A serial port visible to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub kind: PortKind,
}

/// List the serial ports the host can see, sorted by name.
pub fn available_ports() -> Result<Vec<PortInfo>> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .map_err(TransportError::Enumerate)?
        .into_iter()
        .map(|info| PortInfo {
            name: info.port_name,
            kind: info.port_type.into(),
        })
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_alu_uart() {
        let cfg = SerialConfig::new("/dev/ttyUSB0");
        assert_eq!(cfg.path, "/dev/ttyUSB0");
        assert_eq!(cfg.baud_rate, 9600);
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);

        let fast = cfg.with_baud_rate(115_200);
        assert_eq!(fast.baud_rate, 115_200);
    }

    #[test]
    #[cfg(unix)]
    fn open_missing_device_reports_port() {
        let cfg = SerialConfig::new(format!("/dev/alulink-missing-{}", std::process::id()));
        let err = open(&cfg).unwrap_err();
        match err {
            TransportError::Open { port, .. } => assert_eq!(port, cfg.path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn port_kind_labels() {
        assert_eq!(PortKind::from(SerialPortType::PciPort).label(), "pci");
        assert_eq!(
            PortKind::from(SerialPortType::BluetoothPort),
            PortKind::Bluetooth
        );
        assert_eq!(PortKind::from(SerialPortType::Unknown).label(), "unknown");
    }
}
