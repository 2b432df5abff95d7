//! Device scanner: one LLDP frame per capture device, one web query per phone

use phonescan_core::PhoneRecord;
use phonescan_web::{PhoneQuery, ServiceQueryError};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::capture::{CaptureDevice, CaptureError, CaptureHandle, LinkType, OpenOptions};
use crate::lldp::{inspect_frame, Classification, DecodeError, LLDP_FILTER};

/// Default per-device capture budget in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 33;

/// Longest single blocking read; bounds how late a cancel is noticed
pub const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Shortest read timeout handed to the capture; libpcap treats zero as "block forever"
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Scanner configuration
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// How long to wait for an LLDP frame on each device
    pub timeout: Duration,
    /// Devices whose description contains any of these are never opened
    pub skip_descriptions: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            skip_descriptions: vec!["VMware".to_string()],
        }
    }
}

/// Why a device produced no phone
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("Device {device} is a virtual adapter")]
    VirtualAdapter { device: String },
    #[error("Device {device} is not an Ethernet device ({link:?})")]
    NotEthernet { device: String, link: LinkType },
    #[error("No LLDP frame on {device} within {timeout:?}")]
    Timeout { device: String, timeout: Duration },
    #[error("Capture on {device} was cancelled")]
    Cancelled { device: String },
    #[error("Undecodable LLDP frame: {0}")]
    Decode(#[from] DecodeError),
    #[error("LLDP sender is not a telephone")]
    NotAPhone,
    #[error("Telephone did not advertise an IPv4 chassis address")]
    NoAddress,
    #[error(transparent)]
    Query(#[from] ServiceQueryError),
    #[error("Capture task failed: {0}")]
    Task(String),
}

/// Per-pass counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub devices: usize,
    pub probed: usize,
    pub skipped: usize,
    pub open_failures: usize,
    pub timeouts: usize,
    pub rejected_frames: usize,
    pub query_failures: usize,
    pub phones: usize,
    pub cancelled: bool,
}

impl ScanSummary {
    fn record(&mut self, error: &ProbeError) {
        match error {
            ProbeError::Capture(CaptureError::Open { .. }) => self.open_failures += 1,
            ProbeError::VirtualAdapter { .. } | ProbeError::NotEthernet { .. } => {
                self.skipped += 1
            }
            ProbeError::Timeout { .. } => self.timeouts += 1,
            ProbeError::Decode(_) | ProbeError::NotAPhone | ProbeError::NoAddress => {
                self.rejected_frames += 1
            }
            ProbeError::Query(_) => self.query_failures += 1,
            ProbeError::Cancelled { .. } => self.cancelled = true,
            ProbeError::Capture(_) | ProbeError::Task(_) => {}
        }
    }
}

/// Check the cancel signal; a dropped sender counts as cancelled
pub(crate) fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow() || cancel.has_changed().is_err()
}

/// Discovery scanner over a list of capture devices
pub struct DeviceScanner {
    config: ScannerConfig,
    query: Arc<dyn PhoneQuery>,
}

impl DeviceScanner {
    pub fn new(config: ScannerConfig, query: Arc<dyn PhoneQuery>) -> Self {
        Self { config, query }
    }

    /// Probe each device once, in order, sending phones as they are found
    ///
    /// Stops early when cancelled or when the receiving side goes away.
    pub async fn scan(
        &self,
        devices: Vec<Box<dyn CaptureDevice>>,
        phones: mpsc::Sender<PhoneRecord>,
        cancel: watch::Receiver<bool>,
    ) -> ScanSummary {
        let mut summary = ScanSummary {
            devices: devices.len(),
            ..Default::default()
        };

        for device in devices {
            if is_cancelled(&cancel) {
                info!("Scan cancelled, remaining devices not probed");
                summary.cancelled = true;
                break;
            }

            let label = device.label().to_string();
            if let Some(pattern) = self.skip_pattern(device.as_ref()) {
                debug!(device = %label, pattern = %pattern, "Matched virtual adapter pattern");
                let e = ProbeError::VirtualAdapter { device: label.clone() };
                log_probe_error(&label, &e);
                summary.record(&e);
                continue;
            }
            summary.probed += 1;

            match self.probe(device, &cancel).await {
                Ok(phone) => {
                    info!(device = %label, phone = %phone, ip = %phone.ip_address(), "Found IP phone");
                    summary.phones += 1;
                    if phones.send(phone).await.is_err() {
                        debug!("Phone receiver dropped, stopping scan");
                        summary.cancelled = true;
                        break;
                    }
                }
                Err(e) => {
                    log_probe_error(&label, &e);
                    summary.record(&e);
                }
            }
        }

        info!(
            devices = summary.devices,
            skipped = summary.skipped,
            open_failures = summary.open_failures,
            timeouts = summary.timeouts,
            rejected = summary.rejected_frames,
            query_failures = summary.query_failures,
            phones = summary.phones,
            "Scan complete"
        );
        summary
    }

    /// Virtual-adapter pattern matching this device, if any
    fn skip_pattern(&self, device: &dyn CaptureDevice) -> Option<&str> {
        self.config
            .skip_descriptions
            .iter()
            .map(String::as_str)
            .find(|p| device.label().contains(p))
    }

    /// Capture one frame on a device and resolve it into a phone
    async fn probe(
        &self,
        device: Box<dyn CaptureDevice>,
        cancel: &watch::Receiver<bool>,
    ) -> Result<PhoneRecord, ProbeError> {
        let label = device.label().to_string();
        let timeout = self.config.timeout;
        let cancel = cancel.clone();
        let frame = tokio::task::spawn_blocking(move || capture_frame(device.as_ref(), timeout, &cancel))
            .await
            .map_err(|e| ProbeError::Task(e.to_string()))??;

        info!(device = %label, bytes = frame.len(), "Received LLDP frame, processing");
        match inspect_frame(&frame)? {
            Classification::Phone(ip) => {
                info!(device = %label, ip = %ip, "Frame has Telephone capability and IPv4 chassis address");
                Ok(self.query.query(ip).await?)
            }
            Classification::NotAPhone => Err(ProbeError::NotAPhone),
            Classification::NoIpv4Address => Err(ProbeError::NoAddress),
        }
    }
}

/// Open, filter, read one frame, close. Blocking.
fn capture_frame(
    device: &dyn CaptureDevice,
    timeout: Duration,
    cancel: &watch::Receiver<bool>,
) -> Result<Vec<u8>, ProbeError> {
    info!(device = %device.label(), "Opening device for capturing in promiscuous mode");
    let options = OpenOptions {
        promiscuous: true,
        read_timeout: read_timeout(timeout),
    };

    let mut handle = device.open(&options)?;
    let result = read_one_frame(handle.as_mut(), device.label(), timeout, cancel);
    handle.close();
    result
}

/// Per-read timeout: one poll slice, never longer than the whole budget, never zero
fn read_timeout(timeout: Duration) -> Duration {
    timeout.min(CAPTURE_POLL_INTERVAL).max(MIN_READ_TIMEOUT)
}

fn read_one_frame(
    handle: &mut dyn CaptureHandle,
    device: &str,
    timeout: Duration,
    cancel: &watch::Receiver<bool>,
) -> Result<Vec<u8>, ProbeError> {
    let link = handle.link_type();
    if link != LinkType::Ethernet {
        return Err(ProbeError::NotEthernet {
            device: device.to_string(),
            link,
        });
    }

    handle.set_filter(LLDP_FILTER)?;

    debug!(device = %device, timeout = ?timeout, "Capturing a single frame");
    // An unrepresentable deadline means wait until cancelled
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if is_cancelled(cancel) {
            return Err(ProbeError::Cancelled {
                device: device.to_string(),
            });
        }
        if let Some(frame) = handle.next_frame()? {
            return Ok(frame);
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(ProbeError::Timeout {
                device: device.to_string(),
                timeout,
            });
        }
    }
}

fn log_probe_error(device: &str, error: &ProbeError) {
    match error {
        ProbeError::VirtualAdapter { .. } | ProbeError::NotEthernet { .. } => {
            info!(device = %device, reason = %error, "Ignoring device")
        }
        ProbeError::Timeout { .. } => info!(
            device = %device,
            "No LLDP frame before the timeout. The timeout may be too short, no phone \
             may be attached to this interface, a firewall may drop LLDP, or the phone \
             may not speak LLDP"
        ),
        ProbeError::NotAPhone => info!(device = %device, "Frame was not sent by an IP phone, ignoring"),
        ProbeError::Cancelled { .. } => info!(device = %device, "Capture cancelled"),
        _ => warn!(device = %device, error = %error, "Device yielded no phone"),
    }
}
