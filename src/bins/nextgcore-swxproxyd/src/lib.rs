//! NextGCore SWx Proxy Library
//!
//! Proxies subscriber authentication and registration for non-3GPP access
//! onto the SWx Diameter interface of one or more HSSs:
//! - Authentication vector caching per subscriber
//! - MAR/SAR orchestration with authorization checks
//! - IMSI based routing across several HSS backends
//! - HLR subscriber relay
//! - Health reporting from request failure ratios
//! - JSON RPC over HTTP/2

pub mod cache;
pub mod config;
pub mod context;
pub mod handler;
pub mod health;
pub mod hlr;
pub mod metrics;
pub mod proxy;
pub mod router;
pub mod rpc;
pub mod types;


// Re-export commonly used types
pub use cache::VectorCache;
pub use config::{Config, ConfigError, SwxProxyConfig};
pub use context::SwxProxyContext;
pub use handler::SwxMessageHandler;
pub use health::HealthTracker;
pub use hlr::{HlrRelay, HlrRouter};
pub use metrics::{HealthSnapshot, MetricsRecorder, SwxEvent, SwxMetrics};
pub use proxy::{ServiceFuture, SwxProxy, SwxProxyOptions, SwxProxyService};
pub use router::{imsi_modulo, SwxProxyMux};
pub use rpc::{handle_rpc, RpcError, RpcResponse, RpcServer};
pub use types::*;
