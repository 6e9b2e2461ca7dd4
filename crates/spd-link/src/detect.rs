//! Instrument discovery
//!
//! The SPD3303X presents as a USB virtual serial port on macOS/Windows and as
//! `/dev/usbtmc*` (USBTMC class) on Linux. Discovery tries USB serial ports
//! first, then USBTMC devices, then falls back to every serial port.

use std::path::Path;

use serialport::{available_ports, SerialPortType};
use tracing::info;

use crate::error::DetectError;

/// Which transport a discovered device uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// USB virtual serial port
    Serial,
    /// USBTMC character device
    UsbTmc,
}

/// A candidate instrument connection
#[derive(Debug, Clone)]
pub struct DetectedDevice {
    /// Transport to open this device with
    pub kind: TransportKind,
    /// Device path (e.g. /dev/ttyUSB0, COM3, /dev/usbtmc0)
    pub path: String,
    /// Human-readable description, when the OS provides one
    pub description: Option<String>,
}

impl DetectedDevice {
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        let description = match port_type {
            SerialPortType::UsbPort(usb) => {
                let product = usb.product.as_deref().unwrap_or("USB serial");
                Some(format!(
                    "{}  VID:PID={:04X}:{:04X}",
                    product, usb.vid, usb.pid
                ))
            }
            _ => None,
        };
        Self {
            kind: TransportKind::Serial,
            path: name,
            description,
        }
    }
}

/// Classify an explicitly given device path by name
pub fn classify_path(path: &str) -> TransportKind {
    if path.contains("usbtmc") {
        TransportKind::UsbTmc
    } else {
        TransportKind::Serial
    }
}

/// Whether a serial port looks like a USB device
fn is_usb_port(name: &str, port_type: &SerialPortType) -> bool {
    if matches!(port_type, SerialPortType::UsbPort(_)) {
        return true;
    }
    let lower = name.to_lowercase();
    ["ttyusb", "ttyacm", "cu.usb", "cu.wch"]
        .iter()
        .any(|s| lower.contains(s))
}

/// Enumerate candidate instrument devices, best matches first
///
/// Returns USB serial ports if any exist, otherwise USBTMC devices,
/// otherwise every serial port. An empty system yields
/// [`DetectError::NoDevice`].
pub fn discover() -> Result<Vec<DetectedDevice>, DetectError> {
    let ports = available_ports().map_err(|e| DetectError::EnumerationFailed(e.to_string()))?;

    let usb: Vec<DetectedDevice> = ports
        .iter()
        .filter(|p| is_usb_port(&p.port_name, &p.port_type))
        .map(|p| DetectedDevice::from_serialport(p.port_name.clone(), &p.port_type))
        .collect();
    if !usb.is_empty() {
        info!("Found {} USB serial port(s)", usb.len());
        return Ok(usb);
    }

    let tmc = usbtmc_devices("/dev");
    if !tmc.is_empty() {
        info!("Found {} USBTMC device(s)", tmc.len());
        return Ok(tmc);
    }

    if !ports.is_empty() {
        info!(
            "No USB devices; falling back to {} serial port(s)",
            ports.len()
        );
        return Ok(ports
            .into_iter()
            .map(|p| DetectedDevice::from_serialport(p.port_name, &p.port_type))
            .collect());
    }

    Err(DetectError::NoDevice)
}

/// Scan a directory for usbtmc character devices
fn usbtmc_devices(dev_dir: impl AsRef<Path>) -> Vec<DetectedDevice> {
    let Ok(entries) = std::fs::read_dir(dev_dir) else {
        return Vec::new();
    };

    let mut devices: Vec<DetectedDevice> = entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name().to_string_lossy().into_owned();
            name.starts_with("usbtmc").then(|| DetectedDevice {
                kind: TransportKind::UsbTmc,
                path: entry.path().to_string_lossy().into_owned(),
                description: Some("USBTMC instrument".to_string()),
            })
        })
        .collect();
    devices.sort_by(|a, b| a.path.cmp(&b.path));
    devices
}
