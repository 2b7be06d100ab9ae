//! NextGCore Diameter Protocol Library
//!
//! This crate provides Diameter message handling for the SWx interface
//! (3GPP AAA Server <-> HSS, Non-3GPP Access):
//! - RFC 6733 codec for headers and AVPs
//! - SWx dictionary with MAR/SAR builders and MAA/SAA/RTR parsers
//! - TCP client connections with capabilities exchange and watchdog
//! - Session-Id keyed request/answer correlation

pub mod common;
pub mod avp;
pub mod message;
pub mod swx;
pub mod error;
pub mod config;
pub mod transport;
pub mod peer;
pub mod connection;
pub mod tracker;
mod property_tests;

pub use common::*;
pub use avp::*;
pub use message::*;
pub use error::*;
pub use config::*;
pub use transport::*;
pub use peer::*;
pub use connection::*;
pub use tracker::*;

/// 3GPP Vendor ID
pub const OGS_3GPP_VENDOR_ID: u32 = 10415;

/// Diameter protocol version
pub const DIAMETER_VERSION: u8 = 1;

/// Default Diameter port
pub const DIAMETER_PORT: u16 = 3868;
