//! Request, answer and error types of the SWx proxy service

use ogs_diameter::DiameterError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// EAP method the vectors are generated for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationScheme {
    #[default]
    EapAka,
    EapAkaPrime,
}

impl AuthenticationScheme {
    /// SIP-Authentication-Scheme value on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthenticationScheme::EapAka => ogs_diameter::swx::auth_scheme::EAP_AKA,
            AuthenticationScheme::EapAkaPrime => ogs_diameter::swx::auth_scheme::EAP_AKA_PRIME,
        }
    }

    pub fn from_wire(scheme: &str) -> Self {
        if scheme == ogs_diameter::swx::auth_scheme::EAP_AKA_PRIME {
            AuthenticationScheme::EapAkaPrime
        } else {
            AuthenticationScheme::EapAka
        }
    }
}

/// Hex encoding for binary fields in JSON
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// One single-use authentication vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipAuthVector {
    pub authentication_scheme: AuthenticationScheme,
    /// RAND || AUTN
    #[serde(with = "hex_bytes")]
    pub rand_autn: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub xres: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub confidentiality_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub integrity_key: Vec<u8>,
}

impl From<&ogs_diameter::swx::SipAuthDataItem> for SipAuthVector {
    fn from(item: &ogs_diameter::swx::SipAuthDataItem) -> Self {
        Self {
            authentication_scheme: AuthenticationScheme::from_wire(&item.authentication_scheme),
            rand_autn: item.sip_authenticate.to_vec(),
            xres: item.sip_authorization.to_vec(),
            confidentiality_key: item.confidentiality_key.to_vec(),
            integrity_key: item.integrity_key.to_vec(),
        }
    }
}

/// Subscriber profile returned by the HSS in a Server-Assignment-Answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub msisdn: String,
    pub apns: Vec<String>,
    pub context_identifier: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticationRequest {
    pub user_name: String,
    pub sip_num_auth_vectors: u32,
    pub authentication_scheme: AuthenticationScheme,
    /// RAND || AUTS after a synchronisation failure; empty otherwise
    #[serde(with = "hex_bytes")]
    pub resync_info: Vec<u8>,
    pub retrieve_user_profile: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationAnswer {
    pub user_name: String,
    pub session_id: String,
    pub sip_auth_vectors: Vec<SipAuthVector>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_profile: Option<UserProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationRequest {
    pub user_name: String,
    /// Generated when absent
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationAnswer {
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisableMessage {
    pub disable_period_secs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub health: Health,
    pub health_message: String,
}

impl HealthStatus {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            health: Health::Healthy,
            health_message: message.into(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            health: Health::Unhealthy,
            health_message: message.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health == Health::Healthy
    }
}

/// Status classes surfaced to RPC callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    InvalidArgument,
    NotFound,
    PermissionDenied,
    DeadlineExceeded,
    Unavailable,
    Internal,
}

impl StatusCode {
    /// HTTP status used by the JSON RPC surface
    pub fn http_status(&self) -> u16 {
        match self {
            StatusCode::InvalidArgument => 400,
            StatusCode::PermissionDenied => 403,
            StatusCode::NotFound => 404,
            StatusCode::Internal => 500,
            StatusCode::Unavailable => 503,
            StatusCode::DeadlineExceeded => 504,
        }
    }
}

/// SWx proxy error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwxProxyError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SwxProxyError {
    pub fn code(&self) -> StatusCode {
        match self {
            SwxProxyError::InvalidArgument(_) => StatusCode::InvalidArgument,
            SwxProxyError::NotFound(_) => StatusCode::NotFound,
            SwxProxyError::PermissionDenied(_) => StatusCode::PermissionDenied,
            SwxProxyError::DeadlineExceeded(_) => StatusCode::DeadlineExceeded,
            SwxProxyError::Unavailable(_) => StatusCode::Unavailable,
            SwxProxyError::Internal(_) => StatusCode::Internal,
        }
    }

    /// Message without the status prefix
    pub fn message(&self) -> &str {
        match self {
            SwxProxyError::InvalidArgument(m)
            | SwxProxyError::NotFound(m)
            | SwxProxyError::PermissionDenied(m)
            | SwxProxyError::DeadlineExceeded(m)
            | SwxProxyError::Unavailable(m)
            | SwxProxyError::Internal(m) => m,
        }
    }
}

impl From<DiameterError> for SwxProxyError {
    fn from(e: DiameterError) -> Self {
        if e.is_parse_error() {
            SwxProxyError::Internal(e.to_string())
        } else {
            SwxProxyError::Unavailable(e.to_string())
        }
    }
}

/// SWx proxy result type
pub type SwxProxyResult<T> = Result<T, SwxProxyError>;
