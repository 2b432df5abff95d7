//! Phonescan Core - Core types shared by the discovery engine
//!
//! This crate provides the value types produced by a discovery scan:
//! - Phone records describing one identified IP phone
//! - Hardware (MAC) addresses in the forms phones and tools emit

pub mod mac;
pub mod phone;

pub use mac::{MacAddress, MacAddressError};
pub use phone::PhoneRecord;
