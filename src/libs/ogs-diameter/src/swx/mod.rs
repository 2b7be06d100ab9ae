//! SWx Interface - 3GPP AAA Server <-> HSS (3GPP TS 29.273)
//!
//! The SWx interface is used for Non-3GPP Access authentication:
//! - Multimedia-Auth-Request/Answer (MAR/MAA)
//! - Server-Assignment-Request/Answer (SAR/SAA)
//! - Registration-Termination-Request/Answer (RTR/RTA)
//!
//! Requests are built for the AAA side; answers are parsed into typed
//! structs. The answer builders exist for HSS emulation in tests.

use bytes::Bytes;

use crate::avp::{find_all_avps, find_avp, Avp, AvpData};
use crate::common::{avp_code, vendor_specific_application_id, AuthSessionState, ExperimentalResult};
use crate::error::{DiameterError, DiameterResult, ResultCode};
use crate::message::DiameterMessage;
use crate::OGS_3GPP_VENDOR_ID;

/// SWx Application ID (3GPP TS 29.273)
pub const SWX_APPLICATION_ID: u32 = 16777265;

/// SWx Command Codes
pub mod cmd {
    pub const SERVER_ASSIGNMENT: u32 = 301;
    pub const MULTIMEDIA_AUTH: u32 = 303;
    pub const REGISTRATION_TERMINATION: u32 = 304;
}

/// SWx AVP Codes (3GPP vendor)
pub mod avp {
    pub const AAA_SERVER_NAME: u32 = 318;
    pub const SIP_NUMBER_AUTH_ITEMS: u32 = 607;
    pub const SIP_AUTHENTICATION_SCHEME: u32 = 608;
    pub const SIP_AUTHENTICATE: u32 = 609;
    pub const SIP_AUTHORIZATION: u32 = 610;
    pub const SIP_AUTH_DATA_ITEM: u32 = 612;
    pub const SIP_ITEM_NUMBER: u32 = 613;
    pub const SERVER_ASSIGNMENT_TYPE: u32 = 614;
    pub const DEREGISTRATION_REASON: u32 = 615;
    pub const REASON_CODE: u32 = 616;
    pub const CONFIDENTIALITY_KEY: u32 = 625;
    pub const INTEGRITY_KEY: u32 = 626;
    pub const MSISDN: u32 = 701;
    pub const CONTEXT_IDENTIFIER: u32 = 1423;
    pub const APN_CONFIGURATION: u32 = 1430;
    pub const NON_3GPP_USER_DATA: u32 = 1500;
    pub const NON_3GPP_IP_ACCESS: u32 = 1501;
    pub const NON_3GPP_IP_ACCESS_APN: u32 = 1502;
    /// Service-Selection is an IETF AVP
    pub const SERVICE_SELECTION: u32 = 493;
}

/// Experimental-Result-Code values returned by the HSS
pub mod experimental_result {
    pub const USER_UNKNOWN: u32 = 5001;
    pub const IDENTITY_ALREADY_REGISTERED: u32 = 5005;
    pub const USER_NO_NON_3GPP_SUBSCRIPTION: u32 = 5450;
}

/// Authentication schemes for SWx
pub mod auth_scheme {
    pub const EAP_AKA: &str = "EAP-AKA";
    pub const EAP_AKA_PRIME: &str = "EAP-AKA'";
}

/// Non-3GPP-IP-Access values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Non3GppIpAccess {
    SubscriptionAllowed = 0,
    SubscriptionBarred = 1,
}

impl Non3GppIpAccess {
    fn from_i32(value: i32) -> Self {
        match value {
            0 => Non3GppIpAccess::SubscriptionAllowed,
            _ => Non3GppIpAccess::SubscriptionBarred,
        }
    }
}

/// Non-3GPP-IP-Access-APN values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Non3GppIpAccessApn {
    ApnsEnable = 0,
    ApnsDisable = 1,
}

/// Server-Assignment-Type values (same as Cx)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ServerAssignmentType {
    NoAssignment = 0,
    Registration = 1,
    ReRegistration = 2,
    UnregisteredUser = 3,
    TimeoutDeregistration = 4,
    UserDeregistration = 5,
    AdministrativeDeregistration = 8,
    AuthenticationFailure = 9,
    AuthenticationTimeout = 10,
    AaaUserDataRequest = 12,
    PgwUpdate = 13,
}

/// Origin and destination identities stamped on every outbound SWx request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwxEndpoint {
    pub origin_host: String,
    pub origin_realm: String,
    pub destination_host: Option<String>,
    pub destination_realm: String,
}

/// Generate a Session-Id of the form `<origin-host>;<prefix>;<uuid>`
pub fn generate_session_id(origin_host: &str, prefix: &str) -> String {
    format!("{};{};{}", origin_host, prefix, uuid::Uuid::new_v4().simple())
}

fn new_swx_request(command_code: u32, session_id: &str, endpoint: &SwxEndpoint, user_name: &str) -> DiameterMessage {
    let mut msg = DiameterMessage::new_request(command_code, SWX_APPLICATION_ID);

    msg.add_avp(Avp::mandatory(
        avp_code::SESSION_ID,
        AvpData::Utf8String(session_id.to_string()),
    ));
    msg.add_avp(vendor_specific_application_id(SWX_APPLICATION_ID));
    msg.add_avp(Avp::mandatory(
        avp_code::AUTH_SESSION_STATE,
        AvpData::Enumerated(AuthSessionState::NoStateMaintained as i32),
    ));
    msg.add_origin(&endpoint.origin_host, &endpoint.origin_realm);
    if let Some(host) = &endpoint.destination_host {
        msg.add_avp(Avp::mandatory(
            avp_code::DESTINATION_HOST,
            AvpData::DiameterIdentity(host.clone()),
        ));
    }
    msg.add_avp(Avp::mandatory(
        avp_code::DESTINATION_REALM,
        AvpData::DiameterIdentity(endpoint.destination_realm.clone()),
    ));
    msg.add_avp(Avp::mandatory(
        avp_code::USER_NAME,
        AvpData::Utf8String(user_name.to_string()),
    ));

    msg
}

fn swx_avp(code: u32, data: AvpData) -> Avp {
    Avp::vendor_mandatory(code, OGS_3GPP_VENDOR_ID, data)
}

/// Create a Multimedia-Auth-Request (MAR)
///
/// `resync_info` (RAND || AUTS) is sent as SIP-Authorization inside the
/// SIP-Auth-Data-Item when the UE reported a sequence number failure.
pub fn create_mar(
    session_id: &str,
    endpoint: &SwxEndpoint,
    user_name: &str,
    num_auth_items: u32,
    auth_scheme: &str,
    resync_info: Option<&[u8]>,
) -> DiameterMessage {
    let mut msg = new_swx_request(cmd::MULTIMEDIA_AUTH, session_id, endpoint, user_name);

    msg.add_avp(swx_avp(
        avp::SIP_NUMBER_AUTH_ITEMS,
        AvpData::Unsigned32(num_auth_items),
    ));

    let mut auth_data = vec![swx_avp(
        avp::SIP_AUTHENTICATION_SCHEME,
        AvpData::Utf8String(auth_scheme.to_string()),
    )];
    if let Some(resync) = resync_info.filter(|r| !r.is_empty()) {
        auth_data.push(swx_avp(
            avp::SIP_AUTHORIZATION,
            AvpData::OctetString(Bytes::copy_from_slice(resync)),
        ));
    }
    msg.add_avp(swx_avp(avp::SIP_AUTH_DATA_ITEM, AvpData::Grouped(auth_data)));

    msg
}

/// Create a Server-Assignment-Request (SAR)
pub fn create_sar(
    session_id: &str,
    endpoint: &SwxEndpoint,
    user_name: &str,
    assignment_type: ServerAssignmentType,
) -> DiameterMessage {
    let mut msg = new_swx_request(cmd::SERVER_ASSIGNMENT, session_id, endpoint, user_name);

    msg.add_avp(swx_avp(
        avp::SERVER_ASSIGNMENT_TYPE,
        AvpData::Enumerated(assignment_type as i32),
    ));

    msg
}

/// Outcome of an SWx answer, from Result-Code or Experimental-Result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwxResult {
    Success(u32),
    Failure(u32),
    ExperimentalFailure(u32),
}

impl SwxResult {
    pub fn from_message(msg: &DiameterMessage) -> DiameterResult<Self> {
        if let Some(code) = msg.result_code() {
            return Ok(if ResultCode::is_success_code(code) {
                SwxResult::Success(code)
            } else {
                SwxResult::Failure(code)
            });
        }
        match msg.experimental_result() {
            Some(exp) if ResultCode::is_success_code(exp.experimental_result_code) => {
                Ok(SwxResult::Success(exp.experimental_result_code))
            }
            Some(exp) => Ok(SwxResult::ExperimentalFailure(exp.experimental_result_code)),
            None => Err(DiameterError::MissingAvp(
                "Result-Code or Experimental-Result".into(),
            )),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SwxResult::Success(_))
    }

    /// Numeric code regardless of where it came from
    pub fn code(&self) -> u32 {
        match *self {
            SwxResult::Success(c) | SwxResult::Failure(c) | SwxResult::ExperimentalFailure(c) => c,
        }
    }
}

/// One authentication vector as carried in SIP-Auth-Data-Item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipAuthDataItem {
    pub item_number: Option<u32>,
    pub authentication_scheme: String,
    /// RAND || AUTN
    pub sip_authenticate: Bytes,
    /// XRES
    pub sip_authorization: Bytes,
    /// CK
    pub confidentiality_key: Bytes,
    /// IK
    pub integrity_key: Bytes,
}

impl SipAuthDataItem {
    fn from_avp(item: &Avp) -> DiameterResult<Self> {
        let children = item.grouped()?;
        let octets = |code: u32| {
            find_avp(&children, code)
                .and_then(Avp::as_octet_string)
                .cloned()
                .unwrap_or_default()
        };
        Ok(Self {
            item_number: find_avp(&children, avp::SIP_ITEM_NUMBER).and_then(Avp::as_u32),
            authentication_scheme: find_avp(&children, avp::SIP_AUTHENTICATION_SCHEME)
                .and_then(Avp::as_utf8_string)
                .unwrap_or_default()
                .to_string(),
            sip_authenticate: octets(avp::SIP_AUTHENTICATE),
            sip_authorization: octets(avp::SIP_AUTHORIZATION),
            confidentiality_key: octets(avp::CONFIDENTIALITY_KEY),
            integrity_key: octets(avp::INTEGRITY_KEY),
        })
    }

    fn to_avp(&self) -> Avp {
        let mut children = Vec::with_capacity(6);
        if let Some(n) = self.item_number {
            children.push(swx_avp(avp::SIP_ITEM_NUMBER, AvpData::Unsigned32(n)));
        }
        children.push(swx_avp(
            avp::SIP_AUTHENTICATION_SCHEME,
            AvpData::Utf8String(self.authentication_scheme.clone()),
        ));
        children.push(swx_avp(avp::SIP_AUTHENTICATE, AvpData::OctetString(self.sip_authenticate.clone())));
        children.push(swx_avp(avp::SIP_AUTHORIZATION, AvpData::OctetString(self.sip_authorization.clone())));
        children.push(swx_avp(avp::CONFIDENTIALITY_KEY, AvpData::OctetString(self.confidentiality_key.clone())));
        children.push(swx_avp(avp::INTEGRITY_KEY, AvpData::OctetString(self.integrity_key.clone())));
        swx_avp(avp::SIP_AUTH_DATA_ITEM, AvpData::Grouped(children))
    }
}

fn expect_answer(msg: &DiameterMessage, command_code: u32) -> DiameterResult<()> {
    if msg.header.command_code != command_code {
        return Err(DiameterError::UnexpectedCommand {
            expected: command_code,
            actual: msg.header.command_code,
        });
    }
    if msg.header.is_request() {
        return Err(DiameterError::InvalidMessage(format!(
            "expected answer for command {command_code}, got request"
        )));
    }
    Ok(())
}

fn required_session_id(msg: &DiameterMessage) -> DiameterResult<String> {
    msg.session_id()
        .map(str::to_string)
        .ok_or_else(|| DiameterError::MissingAvp("Session-Id".into()))
}

/// Parsed Multimedia-Auth-Answer
#[derive(Debug, Clone)]
pub struct MultimediaAuthAnswer {
    pub session_id: String,
    pub user_name: Option<String>,
    pub result: SwxResult,
    pub aaa_server_name: Option<String>,
    pub num_auth_items: u32,
    pub auth_data_items: Vec<SipAuthDataItem>,
}

impl MultimediaAuthAnswer {
    pub fn parse(msg: &DiameterMessage) -> DiameterResult<Self> {
        expect_answer(msg, cmd::MULTIMEDIA_AUTH)?;

        let auth_data_items = find_all_avps(&msg.avps, avp::SIP_AUTH_DATA_ITEM)
            .into_iter()
            .map(SipAuthDataItem::from_avp)
            .collect::<DiameterResult<Vec<_>>>()?;

        Ok(Self {
            session_id: required_session_id(msg)?,
            user_name: msg.user_name().map(str::to_string),
            result: SwxResult::from_message(msg)?,
            aaa_server_name: msg
                .find_avp(avp::AAA_SERVER_NAME)
                .and_then(Avp::as_utf8_string)
                .map(str::to_string),
            num_auth_items: msg
                .find_avp(avp::SIP_NUMBER_AUTH_ITEMS)
                .and_then(Avp::as_u32)
                .unwrap_or(auth_data_items.len() as u32),
            auth_data_items,
        })
    }
}

/// Subscriber profile carried in Non-3GPP-User-Data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Non3gppUserData {
    pub msisdn: Option<String>,
    pub non_3gpp_ip_access: Non3GppIpAccess,
    pub non_3gpp_ip_access_apn: Option<Non3GppIpAccessApn>,
    pub context_identifier: Option<u32>,
    /// Service-Selection of each APN-Configuration
    pub apns: Vec<String>,
}

impl Non3gppUserData {
    fn from_avp(user_data: &Avp) -> DiameterResult<Self> {
        let children = user_data.grouped()?;

        let mut apns = Vec::new();
        for apn in find_all_avps(&children, avp::APN_CONFIGURATION) {
            let apn_children = apn.grouped()?;
            if let Some(name) = find_avp(&apn_children, avp::SERVICE_SELECTION).and_then(Avp::as_utf8_string) {
                apns.push(name.to_string());
            }
        }

        Ok(Self {
            msisdn: find_avp(&children, avp::MSISDN)
                .and_then(Avp::as_octet_string)
                .map(|b| decode_tbcd(b)),
            // Absent Non-3GPP-IP-Access means access is allowed (TS 29.273 8.2.3.3)
            non_3gpp_ip_access: find_avp(&children, avp::NON_3GPP_IP_ACCESS)
                .and_then(Avp::as_i32)
                .map(Non3GppIpAccess::from_i32)
                .unwrap_or(Non3GppIpAccess::SubscriptionAllowed),
            non_3gpp_ip_access_apn: find_avp(&children, avp::NON_3GPP_IP_ACCESS_APN)
                .and_then(Avp::as_i32)
                .map(|v| match v {
                    0 => Non3GppIpAccessApn::ApnsEnable,
                    _ => Non3GppIpAccessApn::ApnsDisable,
                }),
            context_identifier: find_avp(&children, avp::CONTEXT_IDENTIFIER).and_then(Avp::as_u32),
            apns,
        })
    }

    fn to_avp(&self) -> Avp {
        let mut children = Vec::new();
        if let Some(msisdn) = &self.msisdn {
            children.push(swx_avp(avp::MSISDN, AvpData::OctetString(encode_tbcd(msisdn))));
        }
        children.push(swx_avp(
            avp::NON_3GPP_IP_ACCESS,
            AvpData::Enumerated(self.non_3gpp_ip_access as i32),
        ));
        if let Some(apn_access) = self.non_3gpp_ip_access_apn {
            children.push(swx_avp(avp::NON_3GPP_IP_ACCESS_APN, AvpData::Enumerated(apn_access as i32)));
        }
        if let Some(ctx) = self.context_identifier {
            children.push(swx_avp(avp::CONTEXT_IDENTIFIER, AvpData::Unsigned32(ctx)));
        }
        for apn in &self.apns {
            children.push(swx_avp(
                avp::APN_CONFIGURATION,
                AvpData::Grouped(vec![Avp::mandatory(
                    avp::SERVICE_SELECTION,
                    AvpData::Utf8String(apn.clone()),
                )]),
            ));
        }
        swx_avp(avp::NON_3GPP_USER_DATA, AvpData::Grouped(children))
    }
}

/// Parsed Server-Assignment-Answer
#[derive(Debug, Clone)]
pub struct ServerAssignmentAnswer {
    pub session_id: String,
    pub user_name: Option<String>,
    pub result: SwxResult,
    pub non_3gpp_user_data: Option<Non3gppUserData>,
}

impl ServerAssignmentAnswer {
    pub fn parse(msg: &DiameterMessage) -> DiameterResult<Self> {
        expect_answer(msg, cmd::SERVER_ASSIGNMENT)?;

        Ok(Self {
            session_id: required_session_id(msg)?,
            user_name: msg.user_name().map(str::to_string),
            result: SwxResult::from_message(msg)?,
            non_3gpp_user_data: msg
                .find_avp(avp::NON_3GPP_USER_DATA)
                .map(Non3gppUserData::from_avp)
                .transpose()?,
        })
    }
}

/// Parsed Registration-Termination-Request sent by the HSS
#[derive(Debug, Clone)]
pub struct RegistrationTerminationRequest {
    pub session_id: String,
    pub user_name: String,
    pub reason_code: Option<u32>,
}

impl RegistrationTerminationRequest {
    pub fn parse(msg: &DiameterMessage) -> DiameterResult<Self> {
        if msg.header.command_code != cmd::REGISTRATION_TERMINATION || !msg.header.is_request() {
            return Err(DiameterError::UnexpectedCommand {
                expected: cmd::REGISTRATION_TERMINATION,
                actual: msg.header.command_code,
            });
        }

        let reason_code = match msg.find_avp(avp::DEREGISTRATION_REASON) {
            Some(reason) => find_avp(&reason.grouped()?, avp::REASON_CODE).and_then(Avp::as_u32),
            None => None,
        };

        Ok(Self {
            session_id: required_session_id(msg)?,
            user_name: msg
                .user_name()
                .map(str::to_string)
                .ok_or_else(|| DiameterError::MissingAvp("User-Name".into()))?,
            reason_code,
        })
    }
}

/// Registration-Termination-Answer acknowledging `rtr`
pub fn create_rta(rtr: &DiameterMessage, origin_host: &str, origin_realm: &str, result_code: u32) -> DiameterMessage {
    let mut rta = DiameterMessage::new_answer_with_result(rtr, origin_host, origin_realm, result_code);
    rta.add_avp(vendor_specific_application_id(SWX_APPLICATION_ID));
    rta.add_avp(Avp::mandatory(
        avp_code::AUTH_SESSION_STATE,
        AvpData::Enumerated(AuthSessionState::NoStateMaintained as i32),
    ));
    rta
}

/// Registration-Termination-Request as the HSS sends it
pub fn create_rtr(session_id: &str, endpoint: &SwxEndpoint, user_name: &str, reason_code: u32) -> DiameterMessage {
    let mut msg = new_swx_request(cmd::REGISTRATION_TERMINATION, session_id, endpoint, user_name);
    msg.add_avp(swx_avp(
        avp::DEREGISTRATION_REASON,
        AvpData::Grouped(vec![swx_avp(avp::REASON_CODE, AvpData::Enumerated(reason_code as i32))]),
    ));
    msg
}

fn add_result(answer: &mut DiameterMessage, result: SwxResult) {
    match result {
        SwxResult::Success(code) | SwxResult::Failure(code) => answer.add_avp(Avp::mandatory(
            avp_code::RESULT_CODE,
            AvpData::Unsigned32(code),
        )),
        SwxResult::ExperimentalFailure(code) => answer.add_avp(ExperimentalResult::new(code).to_avp()),
    }
}

/// Multimedia-Auth-Answer as an HSS would produce it for `mar`
pub fn create_maa(
    mar: &DiameterMessage,
    origin_host: &str,
    origin_realm: &str,
    result: SwxResult,
    aaa_server_name: Option<&str>,
    items: &[SipAuthDataItem],
) -> DiameterMessage {
    let mut maa = DiameterMessage::new_answer(mar);
    if let Some(session_id) = mar.session_id() {
        maa.add_avp(Avp::mandatory(avp_code::SESSION_ID, AvpData::Utf8String(session_id.to_string())));
    }
    add_result(&mut maa, result);
    maa.add_origin(origin_host, origin_realm);
    if let Some(user_name) = mar.user_name() {
        maa.add_avp(Avp::mandatory(avp_code::USER_NAME, AvpData::Utf8String(user_name.to_string())));
    }
    if let Some(name) = aaa_server_name {
        maa.add_avp(swx_avp(avp::AAA_SERVER_NAME, AvpData::DiameterIdentity(name.to_string())));
    }
    maa.add_avp(swx_avp(avp::SIP_NUMBER_AUTH_ITEMS, AvpData::Unsigned32(items.len() as u32)));
    for item in items {
        maa.add_avp(item.to_avp());
    }
    maa
}

/// Server-Assignment-Answer as an HSS would produce it for `sar`
pub fn create_saa(
    sar: &DiameterMessage,
    origin_host: &str,
    origin_realm: &str,
    result: SwxResult,
    user_data: Option<&Non3gppUserData>,
) -> DiameterMessage {
    let mut saa = DiameterMessage::new_answer(sar);
    if let Some(session_id) = sar.session_id() {
        saa.add_avp(Avp::mandatory(avp_code::SESSION_ID, AvpData::Utf8String(session_id.to_string())));
    }
    add_result(&mut saa, result);
    saa.add_origin(origin_host, origin_realm);
    if let Some(user_name) = sar.user_name() {
        saa.add_avp(Avp::mandatory(avp_code::USER_NAME, AvpData::Utf8String(user_name.to_string())));
    }
    if let Some(data) = user_data {
        saa.add_avp(data.to_avp());
    }
    saa
}

/// Number of auth items requested by a MAR
pub fn requested_auth_items(mar: &DiameterMessage) -> Option<u32> {
    mar.find_avp(avp::SIP_NUMBER_AUTH_ITEMS).and_then(Avp::as_u32)
}

/// Server-Assignment-Type of a SAR
pub fn server_assignment_type(sar: &DiameterMessage) -> Option<i32> {
    sar.find_avp(avp::SERVER_ASSIGNMENT_TYPE).and_then(Avp::as_i32)
}

/// Decode TBCD-encoded digits (MSISDN), stopping at the 0xF filler
pub fn decode_tbcd(bytes: &[u8]) -> String {
    let mut digits = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        for nibble in [b & 0x0F, b >> 4] {
            if nibble > 9 {
                return digits;
            }
            digits.push(char::from(b'0' + nibble));
        }
    }
    digits
}

/// Encode decimal digits as TBCD, padding an odd count with 0xF
pub fn encode_tbcd(digits: &str) -> Bytes {
    let nibbles: Vec<u8> = digits
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|d| d - b'0')
        .collect();
    nibbles
        .chunks(2)
        .map(|pair| pair[0] | (pair.get(1).copied().unwrap_or(0x0F) << 4))
        .collect::<Vec<u8>>()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> SwxEndpoint {
        SwxEndpoint {
            origin_host: "aaa.epc.mnc001.mcc001.3gppnetwork.org".into(),
            origin_realm: "epc.mnc001.mcc001.3gppnetwork.org".into(),
            destination_host: Some("hss.epc.mnc001.mcc001.3gppnetwork.org".into()),
            destination_realm: "epc.mnc001.mcc001.3gppnetwork.org".into(),
        }
    }

    fn wire(msg: &DiameterMessage) -> DiameterMessage {
        DiameterMessage::decode(&mut msg.encode().freeze()).unwrap()
    }

    fn vector(n: u8) -> SipAuthDataItem {
        SipAuthDataItem {
            item_number: Some(n as u32),
            authentication_scheme: auth_scheme::EAP_AKA.into(),
            sip_authenticate: Bytes::from(vec![n; 32]),
            sip_authorization: Bytes::from(vec![n; 8]),
            confidentiality_key: Bytes::from(vec![n; 16]),
            integrity_key: Bytes::from(vec![n; 16]),
        }
    }

    #[test]
    fn test_create_mar() {
        let msg = create_mar("s1", &endpoint(), "001010123456789", 5, auth_scheme::EAP_AKA_PRIME, None);

        assert_eq!(msg.header.command_code, cmd::MULTIMEDIA_AUTH);
        assert_eq!(msg.header.application_id, SWX_APPLICATION_ID);
        assert!(msg.header.is_request());
        assert_eq!(requested_auth_items(&wire(&msg)), Some(5));
        assert_eq!(msg.user_name(), Some("001010123456789"));
    }

    #[test]
    fn test_create_mar_with_resync() {
        let resync = [0xAB; 30];
        let msg = wire(&create_mar("s1", &endpoint(), "001010123456789", 1, auth_scheme::EAP_AKA, Some(&resync)));

        let item = msg.find_avp(avp::SIP_AUTH_DATA_ITEM).unwrap().grouped().unwrap();
        let authz = find_avp(&item, avp::SIP_AUTHORIZATION).and_then(Avp::as_octet_string).unwrap();
        assert_eq!(authz.as_ref(), &resync[..]);
    }

    #[test]
    fn test_create_sar() {
        let msg = wire(&create_sar("s2", &endpoint(), "001010123456789", ServerAssignmentType::AaaUserDataRequest));

        assert_eq!(msg.header.command_code, cmd::SERVER_ASSIGNMENT);
        assert_eq!(server_assignment_type(&msg), Some(12));
        assert_eq!(msg.session_id(), Some("s2"));
    }

    #[test]
    fn test_parse_maa() {
        let mar = wire(&create_mar("s3", &endpoint(), "001010123456789", 2, auth_scheme::EAP_AKA, None));
        let maa = create_maa(
            &mar,
            "hss.example.org",
            "example.org",
            SwxResult::Success(2001),
            Some("aaa.example.org"),
            &[vector(1), vector(2)],
        );

        let parsed = MultimediaAuthAnswer::parse(&wire(&maa)).unwrap();
        assert_eq!(parsed.session_id, "s3");
        assert!(parsed.result.is_success());
        assert_eq!(parsed.aaa_server_name.as_deref(), Some("aaa.example.org"));
        assert_eq!(parsed.num_auth_items, 2);
        assert_eq!(parsed.auth_data_items, vec![vector(1), vector(2)]);
    }

    #[test]
    fn test_parse_maa_experimental_failure() {
        let mar = wire(&create_mar("s4", &endpoint(), "001010123456789", 1, auth_scheme::EAP_AKA, None));
        let maa = create_maa(
            &mar,
            "hss",
            "realm",
            SwxResult::ExperimentalFailure(experimental_result::IDENTITY_ALREADY_REGISTERED),
            None,
            &[],
        );

        let parsed = MultimediaAuthAnswer::parse(&wire(&maa)).unwrap();
        assert_eq!(
            parsed.result,
            SwxResult::ExperimentalFailure(experimental_result::IDENTITY_ALREADY_REGISTERED)
        );
        assert!(parsed.auth_data_items.is_empty());
    }

    #[test]
    fn test_parse_rejects_wrong_command() {
        let sar = wire(&create_sar("s5", &endpoint(), "001010123456789", ServerAssignmentType::Registration));
        let saa = create_saa(&sar, "hss", "realm", SwxResult::Success(2001), None);

        let err = MultimediaAuthAnswer::parse(&wire(&saa)).unwrap_err();
        assert!(err.is_parse_error());
        // A request is never an answer
        assert!(ServerAssignmentAnswer::parse(&sar).is_err());
    }

    #[test]
    fn test_parse_saa_with_user_data() {
        let sar = wire(&create_sar("s6", &endpoint(), "001010123456789", ServerAssignmentType::AaaUserDataRequest));
        let data = Non3gppUserData {
            msisdn: Some("14155550100".into()),
            non_3gpp_ip_access: Non3GppIpAccess::SubscriptionBarred,
            non_3gpp_ip_access_apn: Some(Non3GppIpAccessApn::ApnsEnable),
            context_identifier: Some(1),
            apns: vec!["internet".into(), "ims".into()],
        };
        let saa = create_saa(&sar, "hss", "realm", SwxResult::Success(2001), Some(&data));

        let parsed = ServerAssignmentAnswer::parse(&wire(&saa)).unwrap();
        assert_eq!(parsed.non_3gpp_user_data, Some(data));
    }

    #[test]
    fn test_parse_rtr_and_answer() {
        let rtr = wire(&create_rtr("hss;rtr;1", &endpoint(), "001010123456789", 0));

        let parsed = RegistrationTerminationRequest::parse(&rtr).unwrap();
        assert_eq!(parsed.user_name, "001010123456789");
        assert_eq!(parsed.reason_code, Some(0));

        let rta = wire(&create_rta(&rtr, "aaa", "realm", ResultCode::Success as u32));
        assert!(rta.header.is_answer());
        assert_eq!(rta.header.command_code, cmd::REGISTRATION_TERMINATION);
        assert_eq!(rta.session_id(), Some("hss;rtr;1"));
        assert_eq!(rta.result_code(), Some(2001));
    }

    #[test]
    fn test_tbcd() {
        assert_eq!(encode_tbcd("12345").as_ref(), &[0x21, 0x43, 0xF5]);
        assert_eq!(decode_tbcd(&[0x21, 0x43, 0xF5]), "12345");
        assert_eq!(decode_tbcd(&encode_tbcd("14155550100")), "14155550100");
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = generate_session_id("aaa.example.org", "swx");
        let b = generate_session_id("aaa.example.org", "swx");
        assert!(a.starts_with("aaa.example.org;swx;"));
        assert_ne!(a, b);
    }
}
