//! Diameter base protocol per RFC 6733 Section 5
//!
//! Builds and answers the peer-level messages:
//! - Capabilities Exchange (CER/CEA) for initial handshake
//! - Device Watchdog (DWR/DWA) for liveness detection
//! - Disconnect Peer (DPR/DPA) for graceful shutdown

use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime};

use bytes::{BufMut, BytesMut};

use crate::avp::{Avp, AvpData};
use crate::common::{avp_code, vendor_specific_application_id, DisconnectCause};
use crate::error::{DiameterError, DiameterResult, ResultCode};
use crate::message::{base_cmd, DiameterMessage, BASE_APPLICATION_ID};
use crate::transport::DiameterTransport;
use crate::OGS_3GPP_VENDOR_ID;

/// Identity of the local Diameter node
#[derive(Debug)]
pub struct LocalPeer {
    pub host: String,
    pub realm: String,
    pub product_name: String,
    /// Auth-Application-Ids advertised in CER/CEA
    pub applications: Vec<u32>,
    origin_state_id: u32,
    hop_by_hop_seq: AtomicU32,
    end_to_end_seq: AtomicU32,
}

impl LocalPeer {
    pub fn new(host: impl Into<String>, realm: impl Into<String>, product_name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            realm: realm.into(),
            product_name: product_name.into(),
            applications: Vec::new(),
            origin_state_id: origin_state_id(),
            hop_by_hop_seq: AtomicU32::new(rand::random()),
            end_to_end_seq: AtomicU32::new(rand::random()),
        }
    }

    /// Advertise `application_id` during capabilities exchange
    pub fn with_application(mut self, application_id: u32) -> Self {
        self.applications.push(application_id);
        self
    }

    /// Stamp fresh hop-by-hop and end-to-end identifiers on a request
    pub fn stamp(&self, msg: &mut DiameterMessage) {
        msg.header.hop_by_hop_id = self.hop_by_hop_seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        msg.header.end_to_end_id = self.end_to_end_seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
    }

    fn add_capabilities(&self, msg: &mut DiameterMessage, local_ip: IpAddr) {
        msg.add_origin(&self.host, &self.realm);
        msg.add_avp(host_ip_address(local_ip));
        msg.add_avp(Avp::mandatory(
            avp_code::VENDOR_ID,
            AvpData::Unsigned32(OGS_3GPP_VENDOR_ID),
        ));
        msg.add_avp(Avp::new(
            avp_code::PRODUCT_NAME,
            0,
            None,
            AvpData::Utf8String(self.product_name.clone()),
        ));
        msg.add_avp(Avp::mandatory(
            avp_code::ORIGIN_STATE_ID,
            AvpData::Unsigned32(self.origin_state_id),
        ));
        msg.add_avp(Avp::mandatory(
            avp_code::SUPPORTED_VENDOR_ID,
            AvpData::Unsigned32(OGS_3GPP_VENDOR_ID),
        ));
        for app in &self.applications {
            msg.add_avp(vendor_specific_application_id(*app));
        }
    }

    /// Build Capabilities-Exchange-Request
    pub fn cer(&self, local_ip: IpAddr) -> DiameterMessage {
        let mut msg = DiameterMessage::new_request(base_cmd::CAPABILITIES_EXCHANGE, BASE_APPLICATION_ID);
        self.stamp(&mut msg);
        self.add_capabilities(&mut msg, local_ip);
        msg
    }

    /// Build Capabilities-Exchange-Answer for `cer`
    pub fn cea(&self, cer: &DiameterMessage, local_ip: IpAddr) -> DiameterMessage {
        let mut cea = DiameterMessage::new_answer(cer);
        cea.add_avp(Avp::mandatory(
            avp_code::RESULT_CODE,
            AvpData::Unsigned32(ResultCode::Success as u32),
        ));
        self.add_capabilities(&mut cea, local_ip);
        cea
    }

    /// Build Device-Watchdog-Request
    pub fn dwr(&self) -> DiameterMessage {
        let mut dwr = DiameterMessage::new_request(base_cmd::DEVICE_WATCHDOG, BASE_APPLICATION_ID);
        self.stamp(&mut dwr);
        dwr.add_origin(&self.host, &self.realm);
        dwr.add_avp(Avp::mandatory(
            avp_code::ORIGIN_STATE_ID,
            AvpData::Unsigned32(self.origin_state_id),
        ));
        dwr
    }

    /// Build Device-Watchdog-Answer for `dwr`
    pub fn dwa(&self, dwr: &DiameterMessage) -> DiameterMessage {
        let mut dwa = DiameterMessage::new_answer_with_result(
            dwr,
            &self.host,
            &self.realm,
            ResultCode::Success as u32,
        );
        dwa.add_avp(Avp::mandatory(
            avp_code::ORIGIN_STATE_ID,
            AvpData::Unsigned32(self.origin_state_id),
        ));
        dwa
    }

    /// Build Disconnect-Peer-Request
    pub fn dpr(&self, cause: DisconnectCause) -> DiameterMessage {
        let mut dpr = DiameterMessage::new_request(base_cmd::DISCONNECT_PEER, BASE_APPLICATION_ID);
        self.stamp(&mut dpr);
        dpr.add_origin(&self.host, &self.realm);
        dpr.add_avp(Avp::mandatory(
            avp_code::DISCONNECT_CAUSE,
            AvpData::Enumerated(cause as i32),
        ));
        dpr
    }

    /// Build Disconnect-Peer-Answer for `dpr`
    pub fn dpa(&self, dpr: &DiameterMessage) -> DiameterMessage {
        DiameterMessage::new_answer_with_result(dpr, &self.host, &self.realm, ResultCode::Success as u32)
    }
}

/// Remote peer identity learned during capabilities exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePeer {
    pub host: String,
    pub realm: String,
}

impl RemotePeer {
    fn from_message(msg: &DiameterMessage) -> DiameterResult<Self> {
        Ok(Self {
            host: msg
                .origin_host()
                .ok_or_else(|| DiameterError::MissingAvp("Origin-Host".into()))?
                .to_string(),
            realm: msg
                .origin_realm()
                .ok_or_else(|| DiameterError::MissingAvp("Origin-Realm".into()))?
                .to_string(),
        })
    }
}

/// Initiator side of the capabilities exchange: send CER and wait for CEA
pub async fn initiate_capabilities(
    transport: &mut DiameterTransport,
    local: &LocalPeer,
    timeout: Duration,
) -> DiameterResult<RemotePeer> {
    let cer = local.cer(transport.local_addr().ip());
    transport.send(&cer).await?;

    let exchange = async {
        loop {
            let msg = transport.recv().await?;
            if msg.header.command_code == base_cmd::CAPABILITIES_EXCHANGE && msg.header.is_answer() {
                return Ok::<_, DiameterError>(msg);
            }
            log::debug!(
                "Ignoring command {} before capabilities exchange completed",
                msg.header.command_code
            );
        }
    };
    let cea = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| DiameterError::ConnectTimeout(transport.peer_addr().to_string()))??;

    let result_code = cea
        .result_code()
        .ok_or_else(|| DiameterError::MissingAvp("Result-Code".into()))?;
    if !ResultCode::is_success_code(result_code) {
        return Err(DiameterError::Protocol(format!(
            "CEA returned non-success result code: {result_code}"
        )));
    }

    RemotePeer::from_message(&cea)
}

/// Responder side of the capabilities exchange: wait for CER and answer it
pub async fn accept_capabilities(
    transport: &mut DiameterTransport,
    local: &LocalPeer,
) -> DiameterResult<RemotePeer> {
    let cer = transport.recv().await?;
    if cer.header.command_code != base_cmd::CAPABILITIES_EXCHANGE || !cer.header.is_request() {
        return Err(DiameterError::Protocol(format!(
            "expected CER, got command {} (request={})",
            cer.header.command_code,
            cer.header.is_request()
        )));
    }
    let remote = RemotePeer::from_message(&cer)?;
    let cea = local.cea(&cer, transport.local_addr().ip());
    transport.send(&cea).await?;
    Ok(remote)
}

/// Host-IP-Address AVP (Address type: 2-byte family followed by the address)
fn host_ip_address(ip: IpAddr) -> Avp {
    let mut buf = BytesMut::with_capacity(18);
    match ip {
        IpAddr::V4(v4) => {
            buf.put_u16(1);
            buf.put_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            buf.put_u16(2);
            buf.put_slice(&v6.octets());
        }
    }
    Avp::mandatory(avp_code::HOST_IP_ADDRESS, AvpData::OctetString(buf.freeze()))
}

/// Origin-State-Id: seconds since the epoch at startup
fn origin_state_id() -> u32 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
