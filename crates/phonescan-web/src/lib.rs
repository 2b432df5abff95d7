//! Phonescan Web - Identity queries against a phone's embedded web service
//!
//! Cisco IP phones serve their device information as XML over plain HTTP.
//! This crate fetches and maps that document into a [`PhoneRecord`].
//!
//! [`PhoneRecord`]: phonescan_core::PhoneRecord

pub mod query;

pub use query::{
    parse_device_information, ClientBuildError, PhoneQuery, ServiceQueryError,
    ServiceabilityClient, DEFAULT_HTTP_TIMEOUT_SECS, SERVICEABILITY_PATH,
};
