//! Discovery session: one scan over every capture device, exposed as a stream

use futures_util::Stream;
use phonescan_core::PhoneRecord;
use phonescan_web::{ClientBuildError, PhoneQuery, ServiceabilityClient, DEFAULT_HTTP_TIMEOUT_SECS};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::capture::{DeviceSource, PcapDeviceSource};
use crate::scanner::{DeviceScanner, ScanSummary, ScannerConfig, DEFAULT_TIMEOUT_SECS};

/// Phones buffered ahead of a slow consumer
const PHONE_BUFFER: usize = 16;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Packet capture is unavailable: {0}")]
    CaptureUnavailable(String),
    #[error(transparent)]
    Client(#[from] ClientBuildError),
    #[error("Scan task failed: {0}")]
    Aborted(String),
}

/// Control over the OS service backing packet capture
///
/// Owned by the host; the session only asks for capture before a scan and
/// says when it is done with it.
pub trait CaptureService: Send + Sync {
    /// Make capture available, or explain why it cannot be
    fn ensure_running(&self) -> anyhow::Result<()>;

    /// Capture is no longer needed by this session
    fn release(&self);
}

/// For hosts where capture needs no service management
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAvailable;

impl CaptureService for AlwaysAvailable {
    fn ensure_running(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn release(&self) {}
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Per-device capture timeout in seconds
    pub timeout_secs: u64,
    /// Bound on each phone web service request in seconds
    pub http_timeout_secs: u64,
    /// Forward proxy for web service requests
    pub proxy: Option<String>,
    /// Description patterns of adapters that are never opened
    pub skip_descriptions: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            proxy: None,
            skip_descriptions: ScannerConfig::default().skip_descriptions,
        }
    }
}

impl SessionConfig {
    pub fn to_scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            skip_descriptions: self.skip_descriptions.clone(),
        }
    }
}

/// Top-level discovery entry point
pub struct DiscoverySession {
    config: SessionConfig,
    source: Arc<dyn DeviceSource>,
    query: Arc<dyn PhoneQuery>,
    service: Arc<dyn CaptureService>,
}

impl DiscoverySession {
    /// Session over the host's pcap devices, querying phones over HTTP
    pub fn new(config: SessionConfig) -> Result<Self, DiscoveryError> {
        let client = ServiceabilityClient::new(
            config.proxy.as_deref(),
            Duration::from_secs(config.http_timeout_secs),
        )?;

        Ok(Self::with_parts(
            config,
            Arc::new(PcapDeviceSource),
            Arc::new(client),
            Arc::new(AlwaysAvailable),
        ))
    }

    pub fn with_parts(
        config: SessionConfig,
        source: Arc<dyn DeviceSource>,
        query: Arc<dyn PhoneQuery>,
        service: Arc<dyn CaptureService>,
    ) -> Self {
        Self {
            config,
            source,
            query,
            service,
        }
    }

    /// Use the host's capture service control
    pub fn with_capture_service(mut self, service: Arc<dyn CaptureService>) -> Self {
        self.service = service;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start one scan and return its phones as they are found
    ///
    /// Fails only when capture as a whole is unavailable; per-device failures
    /// just mean fewer phones.
    pub async fn discover(&self) -> Result<PhoneStream, DiscoveryError> {
        let service = self.service.clone();
        let started = tokio::task::spawn_blocking(move || service.ensure_running())
            .await
            .map_err(|e| DiscoveryError::Aborted(e.to_string()))?;
        if let Err(e) = started {
            return Err(DiscoveryError::CaptureUnavailable(format!("{:#}", e)));
        }

        let devices = match self.source.devices() {
            Ok(devices) => devices,
            Err(e) => {
                release(self.service.clone()).await;
                return Err(DiscoveryError::CaptureUnavailable(e.to_string()));
            }
        };

        info!(
            devices = devices.len(),
            timeout_ms = self.config.timeout_secs.saturating_mul(1000),
            "Starting capture process"
        );

        let (phone_tx, phone_rx) = mpsc::channel(PHONE_BUFFER);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let scanner = DeviceScanner::new(self.config.to_scanner_config(), self.query.clone());
        let service = self.service.clone();

        let task = tokio::spawn(async move {
            let summary = scanner.scan(devices, phone_tx, cancel_rx).await;
            release(service).await;
            summary
        });

        Ok(PhoneStream {
            phones: phone_rx,
            cancel: cancel_tx,
            task,
        })
    }
}

async fn release(service: Arc<dyn CaptureService>) {
    info!("Releasing capture service");
    if let Err(e) = tokio::task::spawn_blocking(move || service.release()).await {
        warn!(error = %e, "Capture service release failed");
    }
}

/// Run a single scan with default collaborators
pub async fn discover(timeout_secs: u64, proxy: Option<&str>) -> Result<PhoneStream, DiscoveryError> {
    let config = SessionConfig {
        timeout_secs,
        proxy: proxy.map(str::to_string),
        ..Default::default()
    };
    DiscoverySession::new(config)?.discover().await
}

/// Phones of one scan, in device order
///
/// Single pass: once exhausted the scan is over. Dropping the stream cancels
/// the scan.
pub struct PhoneStream {
    phones: mpsc::Receiver<PhoneRecord>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<ScanSummary>,
}

impl PhoneStream {
    /// Stop probing further devices; an in-flight capture ends within one poll interval
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Wait for the scan to end and return its counters
    ///
    /// Phones not yet taken from the stream are discarded.
    pub async fn finish(mut self) -> Result<ScanSummary, DiscoveryError> {
        while self.phones.recv().await.is_some() {}
        self.task
            .await
            .map_err(|e| DiscoveryError::Aborted(e.to_string()))
    }
}

impl Stream for PhoneStream {
    type Item = PhoneRecord;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().phones.poll_recv(cx)
    }
}
