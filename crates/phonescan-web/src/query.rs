//! Device information queries using the phone's serviceability endpoint

use async_trait::async_trait;
use phonescan_core::{MacAddress, PhoneRecord};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Path and query of the device information document
pub const SERVICEABILITY_PATH: &str = "/CGI/Java/Serviceability?adapterX=device.statistics.device";

/// Default bound on one web service request
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Port the phone's web service listens on
const HTTP_PORT: u16 = 80;

/// A phone address that did not yield a phone
///
/// Connection failures, non-success statuses, unreadable bodies and missing
/// fields all collapse into this one error; `reason` is for logs only.
#[derive(Error, Debug)]
#[error("Web service at {address} did not return device information: {reason}")]
pub struct ServiceQueryError {
    pub address: Ipv4Addr,
    pub reason: String,
}

impl ServiceQueryError {
    fn new(address: Ipv4Addr, reason: impl Into<String>) -> Self {
        Self {
            address,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ClientBuildError {
    #[error("Invalid proxy URL '{url}': {source}")]
    InvalidProxy {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Resolves a confirmed phone address into a complete record
#[async_trait]
pub trait PhoneQuery: Send + Sync {
    async fn query(&self, address: Ipv4Addr) -> Result<PhoneRecord, ServiceQueryError>;
}

/// Response document of the serviceability endpoint
///
/// The phone sends many more elements; only the identity fields are read.
#[derive(Debug, Deserialize)]
struct DeviceInformation {
    #[serde(rename = "MACAddress")]
    mac_address: String,
    #[serde(rename = "phoneDN")]
    phone_dn: String,
    #[serde(rename = "serialNumber")]
    serial_number: String,
    #[serde(rename = "modelNumber")]
    model_number: String,
}

/// Map a device information document into a phone record
///
/// `phoneDN` may be empty (no line configured); every other field must carry
/// a value.
pub fn parse_device_information(
    address: Ipv4Addr,
    body: &str,
) -> Result<PhoneRecord, ServiceQueryError> {
    let info: DeviceInformation = from_str(body)
        .map_err(|e| ServiceQueryError::new(address, format!("malformed response: {}", e)))?;

    let required = |name: &str, value: &str| {
        let value = value.trim();
        if value.is_empty() {
            Err(ServiceQueryError::new(address, format!("{} is empty", name)))
        } else {
            Ok(value.to_string())
        }
    };

    let mac_text = required("MACAddress", &info.mac_address)?;
    let serial = required("serialNumber", &info.serial_number)?;
    let model = required("modelNumber", &info.model_number)?;
    let mac: MacAddress = mac_text
        .parse()
        .map_err(|e| ServiceQueryError::new(address, format!("{}", e)))?;

    Ok(PhoneRecord::new(
        mac,
        address,
        info.phone_dn.trim(),
        model,
        serial,
    ))
}

/// HTTP client for the phone web service
pub struct ServiceabilityClient {
    client: reqwest::Client,
    port: u16,
}

impl ServiceabilityClient {
    /// Create a client, optionally routed through a forward proxy
    ///
    /// Without a proxy requests go directly to the phone; proxy environment
    /// variables are not consulted.
    pub fn new(proxy: Option<&str>, timeout: Duration) -> Result<Self, ClientBuildError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);

        builder = match proxy {
            Some(url) => {
                info!(proxy = %url, "Using web proxy");
                let proxy = reqwest::Proxy::http(url).map_err(|source| {
                    ClientBuildError::InvalidProxy {
                        url: url.to_string(),
                        source,
                    }
                })?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        Ok(Self {
            client: builder.build()?,
            port: HTTP_PORT,
        })
    }

    /// Query a port other than 80 (lab setups behind port forwarding)
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// URL of the device information document on a phone
    pub fn serviceability_url(&self, address: Ipv4Addr) -> String {
        if self.port == HTTP_PORT {
            format!("http://{}{}", address, SERVICEABILITY_PATH)
        } else {
            format!("http://{}:{}{}", address, self.port, SERVICEABILITY_PATH)
        }
    }
}

#[async_trait]
impl PhoneQuery for ServiceabilityClient {
    async fn query(&self, address: Ipv4Addr) -> Result<PhoneRecord, ServiceQueryError> {
        let url = self.serviceability_url(address);
        info!(ip = %address, "Querying phone web service");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ServiceQueryError::new(address, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceQueryError::new(
                address,
                format!("HTTP status {}", status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ServiceQueryError::new(address, format!("failed to read body: {}", e)))?;

        debug!(ip = %address, bytes = body.len(), "Received device information");
        parse_device_information(address, &body)
    }
}
