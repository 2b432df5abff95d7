//! Phonescan Discovery - LLDP-based discovery of IP phones
//!
//! This crate provides the discovery engine:
//! - LLDP frame decoding (Telephone capability, IPv4 Chassis ID)
//! - Capture device abstraction over libpcap
//! - A scanner probing each capture device once for a phone's LLDP frame
//! - A session driving the scanner and streaming the phones it finds

pub mod capture;
pub mod lldp;
pub mod scanner;
pub mod session;

#[cfg(test)]
mod testing;

pub use capture::{CaptureDevice, CaptureError, CaptureHandle, DeviceSource, PcapDeviceSource};
pub use lldp::{Classification, DecodeError};
pub use scanner::{DeviceScanner, ProbeError, ScanSummary, ScannerConfig};
pub use session::{
    discover, AlwaysAvailable, CaptureService, DiscoveryError, DiscoverySession, PhoneStream,
    SessionConfig,
};
