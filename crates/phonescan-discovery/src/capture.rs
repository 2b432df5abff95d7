//! Capture device abstraction and its pcap implementation
//!
//! The scanner only sees [`DeviceSource`], [`CaptureDevice`] and
//! [`CaptureHandle`], so a scan can run against the host's interfaces or a
//! scripted device list.

use pcap::{Active, Capture, Device, Linktype};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Maximum bytes captured per frame
const SNAPLEN: i32 = 65535;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to enumerate capture devices: {0}")]
    Enumerate(String),
    #[error("Failed to open device {device}: {reason}")]
    Open { device: String, reason: String },
    #[error("Failed to set filter on {device}: {reason}")]
    Filter { device: String, reason: String },
    #[error("Failed to read from {device}: {reason}")]
    Read { device: String, reason: String },
}

/// Link-layer type of an open capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// Any other DLT value
    Other(i32),
}

/// How a device is opened
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub promiscuous: bool,
    /// Longest a single [`CaptureHandle::next_frame`] call may block
    pub read_timeout: Duration,
}

/// Lists the devices available for capture, in a stable order
pub trait DeviceSource: Send + Sync {
    fn devices(&self) -> Result<Vec<Box<dyn CaptureDevice>>, CaptureError>;
}

/// A network interface that can be opened for capture
pub trait CaptureDevice: Send {
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str>;

    fn open(&self, options: &OpenOptions) -> Result<Box<dyn CaptureHandle>, CaptureError>;

    /// Description when the driver provides one, interface name otherwise
    fn label(&self) -> &str {
        self.description().unwrap_or_else(|| self.name())
    }
}

/// An open capture on one device
pub trait CaptureHandle: Send {
    fn link_type(&self) -> LinkType;

    fn set_filter(&mut self, filter: &str) -> Result<(), CaptureError>;

    /// Next frame, or `None` once the read timeout elapses without one
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, CaptureError>;

    /// Release the device
    fn close(self: Box<Self>) {}
}

/// Devices reported by libpcap
#[derive(Debug, Default, Clone, Copy)]
pub struct PcapDeviceSource;

impl DeviceSource for PcapDeviceSource {
    fn devices(&self) -> Result<Vec<Box<dyn CaptureDevice>>, CaptureError> {
        let devices = Device::list().map_err(|e| CaptureError::Enumerate(e.to_string()))?;
        debug!("Found {} capture devices", devices.len());

        Ok(devices
            .into_iter()
            .map(|device| Box::new(PcapDevice { device }) as Box<dyn CaptureDevice>)
            .collect())
    }
}

pub struct PcapDevice {
    device: Device,
}

impl CaptureDevice for PcapDevice {
    fn name(&self) -> &str {
        &self.device.name
    }

    fn description(&self) -> Option<&str> {
        self.device.desc.as_deref()
    }

    fn open(&self, options: &OpenOptions) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let open_error = |e: pcap::Error| CaptureError::Open {
            device: self.label().to_string(),
            reason: e.to_string(),
        };

        // libpcap reads a zero timeout as "no timeout"
        let timeout_ms = i32::try_from(options.read_timeout.as_millis())
            .unwrap_or(i32::MAX)
            .max(1);
        let capture = Capture::from_device(self.device.clone())
            .map_err(open_error)?
            .promisc(options.promiscuous)
            .snaplen(SNAPLEN)
            .timeout(timeout_ms)
            .immediate_mode(true)
            .open()
            .map_err(open_error)?;

        Ok(Box::new(PcapHandle {
            device: self.label().to_string(),
            capture,
        }))
    }
}

struct PcapHandle {
    device: String,
    capture: Capture<Active>,
}

impl CaptureHandle for PcapHandle {
    fn link_type(&self) -> LinkType {
        let linktype = self.capture.get_datalink();
        if linktype == Linktype::ETHERNET {
            LinkType::Ethernet
        } else {
            LinkType::Other(linktype.0)
        }
    }

    fn set_filter(&mut self, filter: &str) -> Result<(), CaptureError> {
        self.capture
            .filter(filter, true)
            .map_err(|e| CaptureError::Filter {
                device: self.device.clone(),
                reason: e.to_string(),
            })
    }

    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(Some(packet.data.to_vec())),
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(e) => Err(CaptureError::Read {
                device: self.device.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn close(self: Box<Self>) {
        debug!(device = %self.device, "Closing capture");
    }
}
