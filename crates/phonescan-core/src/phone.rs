//! Phone records produced by a discovery scan

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::mac::MacAddress;

/// One identified IP phone
///
/// A record only exists once the phone has announced itself as a telephone
/// over LLDP and its web service has answered with every identity field, so
/// all fields are always populated (the extension may legitimately be empty
/// for a phone without a configured line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneRecord {
    mac_address: MacAddress,
    ip_address: Ipv4Addr,
    extension: String,
    model: String,
    serial_number: String,
}

impl PhoneRecord {
    pub fn new(
        mac_address: MacAddress,
        ip_address: Ipv4Addr,
        extension: impl Into<String>,
        model: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> Self {
        Self {
            mac_address,
            ip_address,
            extension: extension.into(),
            model: model.into(),
            serial_number: serial_number.into(),
        }
    }

    /// Hardware address; the record's identity key
    pub fn mac_address(&self) -> MacAddress {
        self.mac_address
    }

    pub fn ip_address(&self) -> Ipv4Addr {
        self.ip_address
    }

    /// Directory number, empty if the phone has none
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }
}

impl fmt::Display for PhoneRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cisco IP Phone model {}, SN: {}, MAC address: {}",
            self.model, self.serial_number, self.mac_address
        )
    }
}
