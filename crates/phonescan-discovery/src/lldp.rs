//! LLDP (Link Layer Discovery Protocol) frame decoding
//!
//! Phones announce themselves with LLDP-MED frames that carry the Telephone
//! system capability and, on Cisco phones, a Chassis ID holding the phone's
//! IPv4 address. Only those two TLVs are interpreted; every other TLV is kept
//! as a raw `(type, value)` pair.

use bitflags::bitflags;
use phonescan_core::MacAddress;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::vlan::VlanPacket;
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::{debug, trace};

/// LLDP ethertype
pub const LLDP_ETHERTYPE: u16 = 0x88cc;

/// Capture filter selecting LLDP frames only
pub const LLDP_FILTER: &str = "ether proto 0x88cc";

/// IANA address family number for IPv4
const ADDRESS_FAMILY_IPV4: u8 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Frame too short for an Ethernet header ({0} bytes)")]
    ShortFrame(usize),
    #[error("Not an LLDP frame (ethertype 0x{0:04x})")]
    NotLldp(u16),
    #[error("TLV at offset {offset} runs past the end of the LLDPDU ({needed} bytes needed, {available} available)")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("Invalid {tlv:?} TLV: {reason}")]
    InvalidValue { tlv: TlvType, reason: &'static str },
}

/// LLDP TLV types (IEEE 802.1AB)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvType {
    End,
    ChassisId,
    PortId,
    TimeToLive,
    PortDescription,
    SystemName,
    SystemDescription,
    SystemCapabilities,
    ManagementAddress,
    OrganizationSpecific,
    Reserved(u8),
}

impl From<u8> for TlvType {
    fn from(value: u8) -> Self {
        match value {
            0 => TlvType::End,
            1 => TlvType::ChassisId,
            2 => TlvType::PortId,
            3 => TlvType::TimeToLive,
            4 => TlvType::PortDescription,
            5 => TlvType::SystemName,
            6 => TlvType::SystemDescription,
            7 => TlvType::SystemCapabilities,
            8 => TlvType::ManagementAddress,
            127 => TlvType::OrganizationSpecific,
            other => TlvType::Reserved(other),
        }
    }
}

bitflags! {
    /// System capability bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u16 {
        const OTHER = 0x0001;
        const REPEATER = 0x0002;
        const BRIDGE = 0x0004;
        const WLAN_ACCESS_POINT = 0x0008;
        const ROUTER = 0x0010;
        const TELEPHONE = 0x0020;
        const DOCSIS_CABLE_DEVICE = 0x0040;
        const STATION_ONLY = 0x0080;
        const C_VLAN = 0x0100;
        const S_VLAN = 0x0200;
        const TWO_PORT_MAC_RELAY = 0x0400;
    }
}

/// Decoded System Capabilities TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemCapabilities {
    /// Capabilities the system supports
    pub system: Capabilities,
    /// Capabilities currently enabled
    pub enabled: Capabilities,
}

impl SystemCapabilities {
    /// Telephone capability is enabled
    pub fn is_telephone(&self) -> bool {
        self.enabled.contains(Capabilities::TELEPHONE)
    }
}

/// Chassis ID subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChassisIdSubtype {
    ChassisComponent,
    InterfaceAlias,
    PortComponent,
    MacAddress,
    NetworkAddress,
    InterfaceName,
    LocallyAssigned,
    Reserved(u8),
}

impl From<u8> for ChassisIdSubtype {
    fn from(value: u8) -> Self {
        match value {
            1 => ChassisIdSubtype::ChassisComponent,
            2 => ChassisIdSubtype::InterfaceAlias,
            3 => ChassisIdSubtype::PortComponent,
            4 => ChassisIdSubtype::MacAddress,
            5 => ChassisIdSubtype::NetworkAddress,
            6 => ChassisIdSubtype::InterfaceName,
            7 => ChassisIdSubtype::LocallyAssigned,
            other => ChassisIdSubtype::Reserved(other),
        }
    }
}

/// Address carried by a network-address Chassis ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkAddress {
    Ipv4(Ipv4Addr),
    /// Any other address family (IPv6, ...), kept undecoded
    Other { family: u8, address: Vec<u8> },
}

/// Decoded Chassis ID TLV
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChassisId {
    MacAddress(MacAddress),
    NetworkAddress(NetworkAddress),
    Other { subtype: ChassisIdSubtype, id: Vec<u8> },
}

impl ChassisId {
    pub fn subtype(&self) -> ChassisIdSubtype {
        match self {
            ChassisId::MacAddress(_) => ChassisIdSubtype::MacAddress,
            ChassisId::NetworkAddress(_) => ChassisIdSubtype::NetworkAddress,
            ChassisId::Other { subtype, .. } => *subtype,
        }
    }

    /// IPv4 address, for the network-address subtype only
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        match self {
            ChassisId::NetworkAddress(NetworkAddress::Ipv4(ip)) => Some(*ip),
            _ => None,
        }
    }
}

/// One TLV of an LLDPDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tlv_type: TlvType,
    pub value: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Decode as System Capabilities; `None` for any other TLV type
    pub fn system_capabilities(&self) -> Result<Option<SystemCapabilities>, DecodeError> {
        if self.tlv_type != TlvType::SystemCapabilities {
            return Ok(None);
        }
        if self.value.len() < 4 {
            return Err(DecodeError::InvalidValue {
                tlv: self.tlv_type,
                reason: "expected 4 bytes",
            });
        }

        let system = u16::from_be_bytes([self.value[0], self.value[1]]);
        let enabled = u16::from_be_bytes([self.value[2], self.value[3]]);

        Ok(Some(SystemCapabilities {
            system: Capabilities::from_bits_retain(system),
            enabled: Capabilities::from_bits_retain(enabled),
        }))
    }

    /// Decode as Chassis ID; `None` for any other TLV type
    pub fn chassis_id(&self) -> Result<Option<ChassisId>, DecodeError> {
        if self.tlv_type != TlvType::ChassisId {
            return Ok(None);
        }
        let invalid = |reason| DecodeError::InvalidValue {
            tlv: TlvType::ChassisId,
            reason,
        };

        let (&subtype, id) = self.value.split_first().ok_or(invalid("empty value"))?;

        let chassis = match ChassisIdSubtype::from(subtype) {
            ChassisIdSubtype::MacAddress => {
                let octets: [u8; 6] = id.try_into().map_err(|_| invalid("MAC address is not 6 bytes"))?;
                ChassisId::MacAddress(MacAddress::new(octets))
            }
            ChassisIdSubtype::NetworkAddress => {
                let (&family, address) = id.split_first().ok_or(invalid("missing address family"))?;
                if family == ADDRESS_FAMILY_IPV4 {
                    let octets: [u8; 4] = address
                        .try_into()
                        .map_err(|_| invalid("IPv4 address is not 4 bytes"))?;
                    ChassisId::NetworkAddress(NetworkAddress::Ipv4(Ipv4Addr::from(octets)))
                } else {
                    ChassisId::NetworkAddress(NetworkAddress::Other {
                        family,
                        address: address.to_vec(),
                    })
                }
            }
            other => ChassisId::Other {
                subtype: other,
                id: id.to_vec(),
            },
        };

        Ok(Some(chassis))
    }
}

/// What an LLDP frame says about its sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// A telephone advertising this IPv4 chassis address
    Phone(Ipv4Addr),
    /// Telephone capability not enabled
    NotAPhone,
    /// A telephone, but without an IPv4 network-address Chassis ID
    NoIpv4Address,
}

/// Extract the LLDPDU from an Ethernet II frame
///
/// A single 802.1Q tag is skipped.
pub fn lldp_payload(frame: &[u8]) -> Result<&[u8], DecodeError> {
    let ethernet = EthernetPacket::new(frame).ok_or(DecodeError::ShortFrame(frame.len()))?;
    let mut offset = EthernetPacket::minimum_packet_size();
    let mut ethertype = ethernet.get_ethertype();

    if ethertype == EtherTypes::Vlan {
        let vlan = VlanPacket::new(&frame[offset..]).ok_or(DecodeError::ShortFrame(frame.len()))?;
        ethertype = vlan.get_ethertype();
        offset += VlanPacket::minimum_packet_size();
    }

    if ethertype != EtherTypes::Lldp {
        return Err(DecodeError::NotLldp(ethertype.0));
    }

    Ok(&frame[offset..])
}

/// Split an LLDPDU into its TLVs, in frame order
///
/// Decoding stops at the End TLV; anything after it is padding.
pub fn decode_tlvs(payload: &[u8]) -> Result<Vec<Tlv<'_>>, DecodeError> {
    let mut tlvs = Vec::new();
    let mut offset = 0;

    while offset < payload.len() {
        if payload.len() - offset < 2 {
            return Err(DecodeError::Truncated {
                offset,
                needed: 2,
                available: payload.len() - offset,
            });
        }

        let header = u16::from_be_bytes([payload[offset], payload[offset + 1]]);
        let tlv_type = TlvType::from((header >> 9) as u8);
        let length = (header & 0x01ff) as usize;
        let start = offset + 2;

        if start + length > payload.len() {
            return Err(DecodeError::Truncated {
                offset,
                needed: length,
                available: payload.len() - start,
            });
        }

        if tlv_type == TlvType::End {
            break;
        }

        trace!(?tlv_type, length, "LLDP TLV");
        tlvs.push(Tlv {
            tlv_type,
            value: &payload[start..start + length],
        });
        offset = start + length;
    }

    Ok(tlvs)
}

/// Decide whether decoded TLVs come from a telephone, and where it lives
///
/// The capability check runs over the whole frame before any Chassis ID is
/// looked at: a switch or PC may well advertise an IPv4 chassis address.
pub fn classify(tlvs: &[Tlv<'_>]) -> Result<Classification, DecodeError> {
    let mut telephone = false;
    for tlv in tlvs {
        if let Some(caps) = tlv.system_capabilities()? {
            telephone |= caps.is_telephone();
        }
    }

    if !telephone {
        return Ok(Classification::NotAPhone);
    }

    for tlv in tlvs {
        if let Some(chassis) = tlv.chassis_id()? {
            if let Some(ip) = chassis.ipv4() {
                return Ok(Classification::Phone(ip));
            }
            debug!(subtype = ?chassis.subtype(), "Chassis ID carries no IPv4 address");
        }
    }

    Ok(Classification::NoIpv4Address)
}

/// Decode a captured Ethernet frame and classify its sender
pub fn inspect_frame(frame: &[u8]) -> Result<Classification, DecodeError> {
    let payload = lldp_payload(frame)?;
    let tlvs = decode_tlvs(payload)?;
    classify(&tlvs)
}


#[cfg(test)]
mod tests {
    use super::frames::*;
    use super::*;

    fn phone_ip() -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, 5)
    }

    #[test]
    fn test_phone_frame_classifies_as_phone() {
        assert_eq!(
            inspect_frame(&phone_frame(phone_ip())),
            Ok(Classification::Phone(phone_ip()))
        );
    }

    #[test]
    fn test_switch_with_ipv4_chassis_is_not_a_phone() {
        assert_eq!(
            inspect_frame(&switch_frame(phone_ip())),
            Ok(Classification::NotAPhone)
        );
    }

    #[test]
    fn test_capabilities_after_chassis_still_checked() {
        // Chassis ID comes first on the wire; the rejection must not depend on order
        let frame = frame(&[
            chassis_ipv4(phone_ip()),
            capabilities(Capabilities::STATION_ONLY, Capabilities::STATION_ONLY),
        ]);
        assert_eq!(inspect_frame(&frame), Ok(Classification::NotAPhone));
    }

    #[test]
    fn test_telephone_supported_but_not_enabled() {
        let frame = frame(&[
            chassis_ipv4(phone_ip()),
            capabilities(Capabilities::TELEPHONE, Capabilities::empty()),
        ]);
        assert_eq!(inspect_frame(&frame), Ok(Classification::NotAPhone));
    }

    #[test]
    fn test_missing_capabilities_is_not_a_phone() {
        let frame = frame(&[chassis_ipv4(phone_ip()), tlv(3, &[0x00, 0x78])]);
        assert_eq!(inspect_frame(&frame), Ok(Classification::NotAPhone));
    }

    #[test]
    fn test_phone_with_mac_chassis_has_no_address() {
        let frame = frame(&[
            chassis_mac(SWITCH_MAC),
            capabilities(Capabilities::TELEPHONE, Capabilities::TELEPHONE),
        ]);
        assert_eq!(inspect_frame(&frame), Ok(Classification::NoIpv4Address));
    }

    #[test]
    fn test_ipv6_chassis_is_not_used() {
        let mut value = vec![5, 2];
        value.extend_from_slice(&[0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        let frame = frame(&[
            tlv(1, &value),
            capabilities(Capabilities::TELEPHONE, Capabilities::TELEPHONE),
        ]);
        assert_eq!(inspect_frame(&frame), Ok(Classification::NoIpv4Address));
    }

    #[test]
    fn test_decode_tlvs_in_order() {
        let frame = phone_frame(phone_ip());
        let tlvs = decode_tlvs(lldp_payload(&frame).unwrap()).unwrap();
        let types: Vec<TlvType> = tlvs.iter().map(|t| t.tlv_type).collect();
        assert_eq!(
            types,
            vec![
                TlvType::ChassisId,
                TlvType::PortId,
                TlvType::TimeToLive,
                TlvType::SystemName,
                TlvType::SystemCapabilities,
            ]
        );

        let chassis = tlvs[0].chassis_id().unwrap().unwrap();
        assert_eq!(chassis.subtype(), ChassisIdSubtype::NetworkAddress);
        assert_eq!(chassis.ipv4(), Some(phone_ip()));
        assert_eq!(tlvs[0].system_capabilities(), Ok(None));
    }

    #[test]
    fn test_padding_after_end_is_ignored() {
        let mut frame = phone_frame(phone_ip());
        frame.extend_from_slice(&[0xff; 8]);
        assert_eq!(inspect_frame(&frame), Ok(Classification::Phone(phone_ip())));
    }

    #[test]
    fn test_vlan_tagged_frame() {
        let untagged = phone_frame(phone_ip());
        let mut tagged = untagged[..12].to_vec();
        tagged.extend_from_slice(&[0x81, 0x00, 0x00, 0x64]);
        tagged.extend_from_slice(&untagged[12..]);
        assert_eq!(inspect_frame(&tagged), Ok(Classification::Phone(phone_ip())));
    }

    #[test]
    fn test_truncated_tlv() {
        let mut frame = phone_frame(phone_ip());
        // Drop the End TLV and half of the capabilities value
        frame.truncate(frame.len() - 4);
        assert!(matches!(
            inspect_frame(&frame),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_short_capabilities_value() {
        let frame = frame(&[chassis_ipv4(phone_ip()), tlv(7, &[0x00, 0x20])]);
        assert!(matches!(
            inspect_frame(&frame),
            Err(DecodeError::InvalidValue {
                tlv: TlvType::SystemCapabilities,
                ..
            })
        ));
    }

    #[test]
    fn test_bad_ipv4_length() {
        let frame = frame(&[
            tlv(1, &[5, 1, 10, 0, 0]),
            capabilities(Capabilities::TELEPHONE, Capabilities::TELEPHONE),
        ]);
        assert!(matches!(
            inspect_frame(&frame),
            Err(DecodeError::InvalidValue {
                tlv: TlvType::ChassisId,
                ..
            })
        ));
    }

    #[test]
    fn test_not_lldp() {
        let mut frame = phone_frame(phone_ip());
        frame[12] = 0x08;
        frame[13] = 0x00;
        assert_eq!(inspect_frame(&frame), Err(DecodeError::NotLldp(0x0800)));
    }

    #[test]
    fn test_short_frame() {
        assert_eq!(inspect_frame(&[0u8; 10]), Err(DecodeError::ShortFrame(10)));
    }
}
