//! Diameter configuration types

use std::net::SocketAddr;
use std::time::Duration;

/// Local identity and connection policy of a Diameter client
#[derive(Debug, Clone)]
pub struct DiameterClientConfig {
    /// Diameter Identity of the local peer (FQDN)
    pub host: String,

    /// Diameter realm of the local peer
    pub realm: String,

    /// Product-Name advertised in CER
    pub product_name: String,

    /// Request resends on a fresh connection after a send failure
    pub retransmits: u32,

    /// Interval between Device-Watchdog-Requests
    pub watchdog_interval: Duration,

    /// Unanswered watchdogs tolerated before the connection is closed
    pub retry_count: u32,

    /// Upper bound on TCP connect plus capabilities exchange
    pub connect_timeout: Duration,
}

impl Default for DiameterClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            realm: String::new(),
            product_name: "nextgcore".to_string(),
            retransmits: 3,
            watchdog_interval: Duration::from_secs(1),
            retry_count: 5,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Remote Diameter server a client connects to
#[derive(Debug, Clone)]
pub struct DiameterServerConfig {
    /// Transport address of the server
    pub address: SocketAddr,

    /// Destination-Host for requests (omitted when `None`)
    pub dest_host: Option<String>,

    /// Destination-Realm for requests
    pub dest_realm: String,
}

impl DiameterServerConfig {
    pub fn new(address: SocketAddr, dest_realm: impl Into<String>) -> Self {
        Self {
            address,
            dest_host: None,
            dest_realm: dest_realm.into(),
        }
    }
}
