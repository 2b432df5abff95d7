//! Scripted capture devices, phone queries and capture services for tests

use async_trait::async_trait;
use phonescan_core::PhoneRecord;
use phonescan_web::{PhoneQuery, ServiceQueryError};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::capture::{
    CaptureDevice, CaptureError, CaptureHandle, DeviceSource, LinkType, OpenOptions,
};
use crate::session::CaptureService;

/// Shared record of device operations, e.g. `open:eth0`, `filter:eth0`, `close:eth0`
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events().iter().any(|e| e == event)
    }
}

/// What a scripted device does when probed
#[derive(Debug, Clone)]
pub enum Behavior {
    FailOpen,
    /// Opens, but no frame ever arrives
    Silent,
    /// Opens and delivers this frame on the first read
    Frame(Vec<u8>),
    /// Opens with a non-Ethernet link layer
    LinkType(i32),
}

#[derive(Debug, Clone)]
pub struct FakeDevice {
    name: String,
    description: Option<String>,
    behavior: Behavior,
    log: EventLog,
}

impl FakeDevice {
    pub fn new(name: &str, behavior: Behavior, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            behavior,
            log: log.clone(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

impl CaptureDevice for FakeDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn open(&self, options: &OpenOptions) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        self.log.push(format!("open:{}", self.name));
        assert!(options.promiscuous);
        assert!(!options.read_timeout.is_zero());

        let (link_type, frame) = match &self.behavior {
            Behavior::FailOpen => {
                return Err(CaptureError::Open {
                    device: self.name.clone(),
                    reason: "permission denied".to_string(),
                })
            }
            Behavior::Silent => (LinkType::Ethernet, None),
            Behavior::Frame(frame) => (LinkType::Ethernet, Some(frame.clone())),
            Behavior::LinkType(dlt) => (LinkType::Other(*dlt), None),
        };

        Ok(Box::new(FakeHandle {
            name: self.name.clone(),
            link_type,
            frame,
            read_timeout: options.read_timeout,
            log: self.log.clone(),
        }))
    }
}

struct FakeHandle {
    name: String,
    link_type: LinkType,
    frame: Option<Vec<u8>>,
    read_timeout: std::time::Duration,
    log: EventLog,
}

impl CaptureHandle for FakeHandle {
    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn set_filter(&mut self, filter: &str) -> Result<(), CaptureError> {
        self.log.push(format!("filter:{}:{}", self.name, filter));
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        match self.frame.take() {
            Some(frame) => Ok(Some(frame)),
            None => {
                std::thread::sleep(self.read_timeout);
                Ok(None)
            }
        }
    }

    fn close(self: Box<Self>) {
        self.log.push(format!("close:{}", self.name));
    }
}

pub struct FakeSource {
    devices: Option<Vec<FakeDevice>>,
}

impl FakeSource {
    pub fn new(devices: Vec<FakeDevice>) -> Self {
        Self {
            devices: Some(devices),
        }
    }

    /// Enumeration itself fails
    pub fn unavailable() -> Self {
        Self { devices: None }
    }
}

impl DeviceSource for FakeSource {
    fn devices(&self) -> Result<Vec<Box<dyn CaptureDevice>>, CaptureError> {
        match &self.devices {
            Some(devices) => Ok(devices
                .iter()
                .cloned()
                .map(|d| Box::new(d) as Box<dyn CaptureDevice>)
                .collect()),
            None => Err(CaptureError::Enumerate("driver not loaded".to_string())),
        }
    }
}

/// Web service answers keyed by phone address; unknown addresses fail
#[derive(Default)]
pub struct FakeQuery {
    phones: HashMap<Ipv4Addr, PhoneRecord>,
    queried: Mutex<Vec<Ipv4Addr>>,
}

impl FakeQuery {
    pub fn with_phone(mut self, phone: PhoneRecord) -> Self {
        self.phones.insert(phone.ip_address(), phone);
        self
    }

    pub fn queried(&self) -> Vec<Ipv4Addr> {
        self.queried.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhoneQuery for FakeQuery {
    async fn query(&self, address: Ipv4Addr) -> Result<PhoneRecord, ServiceQueryError> {
        self.queried.lock().unwrap().push(address);
        self.phones.get(&address).cloned().ok_or(ServiceQueryError {
            address,
            reason: "connection refused".to_string(),
        })
    }
}

#[derive(Default)]
pub struct FakeService {
    pub fail: bool,
    pub started: AtomicUsize,
    pub released: AtomicUsize,
}

impl FakeService {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl CaptureService for FakeService {
    fn ensure_running(&self) -> anyhow::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("capture service could not be started");
        }
        Ok(())
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn phone(mac: &str, ip: Ipv4Addr, extension: &str, model: &str, serial: &str) -> PhoneRecord {
    PhoneRecord::new(mac.parse().unwrap(), ip, extension, model, serial)
}
