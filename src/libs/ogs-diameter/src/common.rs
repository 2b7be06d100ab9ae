//! Common Diameter types and constants

use crate::avp::{find_avp, Avp, AvpData};
use crate::error::{DiameterError, DiameterResult};
use crate::OGS_3GPP_VENDOR_ID;

/// AVP codes for base protocol AVPs (RFC 6733)
pub mod avp_code {
    pub const USER_NAME: u32 = 1;
    pub const HOST_IP_ADDRESS: u32 = 257;
    pub const AUTH_APPLICATION_ID: u32 = 258;
    pub const VENDOR_SPECIFIC_APPLICATION_ID: u32 = 260;
    pub const SESSION_ID: u32 = 263;
    pub const ORIGIN_HOST: u32 = 264;
    pub const SUPPORTED_VENDOR_ID: u32 = 265;
    pub const VENDOR_ID: u32 = 266;
    pub const RESULT_CODE: u32 = 268;
    pub const PRODUCT_NAME: u32 = 269;
    pub const DISCONNECT_CAUSE: u32 = 273;
    pub const AUTH_SESSION_STATE: u32 = 277;
    pub const ORIGIN_STATE_ID: u32 = 278;
    pub const DESTINATION_REALM: u32 = 283;
    pub const DESTINATION_HOST: u32 = 293;
    pub const ORIGIN_REALM: u32 = 296;
    pub const EXPERIMENTAL_RESULT: u32 = 297;
    pub const EXPERIMENTAL_RESULT_CODE: u32 = 298;
}

/// Auth-Session-State values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AuthSessionState {
    StateMaintained = 0,
    NoStateMaintained = 1,
}

/// Disconnect-Cause values for DPR (RFC 6733 Section 5.4.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum DisconnectCause {
    Rebooting = 0,
    Busy = 1,
    DoNotWantToTalkToYou = 2,
}

/// Experimental-Result grouped AVP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExperimentalResult {
    pub vendor_id: u32,
    pub experimental_result_code: u32,
}

impl ExperimentalResult {
    /// 3GPP experimental result with the given code
    pub fn new(result_code: u32) -> Self {
        Self {
            vendor_id: OGS_3GPP_VENDOR_ID,
            experimental_result_code: result_code,
        }
    }

    pub fn to_avp(self) -> Avp {
        Avp::mandatory(
            avp_code::EXPERIMENTAL_RESULT,
            AvpData::Grouped(vec![
                Avp::mandatory(avp_code::VENDOR_ID, AvpData::Unsigned32(self.vendor_id)),
                Avp::mandatory(
                    avp_code::EXPERIMENTAL_RESULT_CODE,
                    AvpData::Unsigned32(self.experimental_result_code),
                ),
            ]),
        )
    }

    pub fn from_avp(avp: &Avp) -> DiameterResult<Self> {
        let children = avp.grouped()?;
        let experimental_result_code = find_avp(&children, avp_code::EXPERIMENTAL_RESULT_CODE)
            .and_then(Avp::as_u32)
            .ok_or_else(|| DiameterError::MissingAvp("Experimental-Result-Code".into()))?;
        let vendor_id = find_avp(&children, avp_code::VENDOR_ID)
            .and_then(Avp::as_u32)
            .unwrap_or(OGS_3GPP_VENDOR_ID);
        Ok(Self {
            vendor_id,
            experimental_result_code,
        })
    }
}

/// Vendor-Specific-Application-Id for a 3GPP auth application
pub fn vendor_specific_application_id(application_id: u32) -> Avp {
    Avp::mandatory(
        avp_code::VENDOR_SPECIFIC_APPLICATION_ID,
        AvpData::Grouped(vec![
            Avp::mandatory(avp_code::VENDOR_ID, AvpData::Unsigned32(OGS_3GPP_VENDOR_ID)),
            Avp::mandatory(
                avp_code::AUTH_APPLICATION_ID,
                AvpData::Unsigned32(application_id),
            ),
        ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_experimental_result_wire_form() {
        let avp = ExperimentalResult::new(5005).to_avp();
        let mut buf = BytesMut::new();
        avp.encode(&mut buf);

        let decoded = Avp::decode(&mut buf.freeze()).unwrap();
        let result = ExperimentalResult::from_avp(&decoded).unwrap();
        assert_eq!(result.vendor_id, OGS_3GPP_VENDOR_ID);
        assert_eq!(result.experimental_result_code, 5005);
    }

    #[test]
    fn test_experimental_result_without_code() {
        let avp = Avp::mandatory(
            avp_code::EXPERIMENTAL_RESULT,
            AvpData::Grouped(vec![Avp::mandatory(
                avp_code::VENDOR_ID,
                AvpData::Unsigned32(OGS_3GPP_VENDOR_ID),
            )]),
        );
        assert!(ExperimentalResult::from_avp(&avp).is_err());
    }
}
