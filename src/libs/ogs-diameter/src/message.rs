//! Diameter message header and base message types
//!
//! Message format (RFC 6733):
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Version    |                 Message Length                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | command flags |                  Command-Code                 |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Application-ID                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Hop-by-Hop Identifier                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      End-to-End Identifier                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  AVPs ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::avp::{decode_avps, find_avp, Avp, AvpData};
use crate::common::{avp_code, ExperimentalResult};
use crate::error::{DiameterError, DiameterResult};
use crate::DIAMETER_VERSION;

/// Diameter message header size
pub const DIAMETER_HEADER_SIZE: usize = 20;

/// Command flags
pub mod cmd_flags {
    pub const REQUEST: u8 = 0x80;
    pub const PROXIABLE: u8 = 0x40;
    pub const ERROR: u8 = 0x20;
    /// Potentially re-transmitted
    pub const RETRANSMIT: u8 = 0x10;
}

/// Base Diameter command codes (RFC 6733)
pub mod base_cmd {
    pub const CAPABILITIES_EXCHANGE: u32 = 257;
    pub const DEVICE_WATCHDOG: u32 = 280;
    pub const DISCONNECT_PEER: u32 = 282;
}

/// Base Diameter application ID
pub const BASE_APPLICATION_ID: u32 = 0;

/// Diameter message header
#[derive(Debug, Clone)]
pub struct DiameterHeader {
    pub version: u8,
    /// Message length including the header; recomputed on encode
    pub length: u32,
    pub flags: u8,
    pub command_code: u32,
    pub application_id: u32,
    pub hop_by_hop_id: u32,
    pub end_to_end_id: u32,
}

impl DiameterHeader {
    /// Create a new request header
    pub fn new_request(command_code: u32, application_id: u32) -> Self {
        Self {
            version: DIAMETER_VERSION,
            length: DIAMETER_HEADER_SIZE as u32,
            flags: cmd_flags::REQUEST | cmd_flags::PROXIABLE,
            command_code,
            application_id,
            hop_by_hop_id: 0,
            end_to_end_id: 0,
        }
    }

    /// Answer header mirroring the request's identifiers
    pub fn new_answer(request: &DiameterHeader) -> Self {
        Self {
            version: DIAMETER_VERSION,
            length: DIAMETER_HEADER_SIZE as u32,
            flags: request.flags & cmd_flags::PROXIABLE,
            command_code: request.command_code,
            application_id: request.application_id,
            hop_by_hop_id: request.hop_by_hop_id,
            end_to_end_id: request.end_to_end_id,
        }
    }

    pub fn is_request(&self) -> bool {
        self.flags & cmd_flags::REQUEST != 0
    }

    pub fn is_answer(&self) -> bool {
        !self.is_request()
    }

    pub fn is_error(&self) -> bool {
        self.flags & cmd_flags::ERROR != 0
    }

    /// Mark a request as a possible retransmission
    pub fn set_retransmit(&mut self) {
        self.flags |= cmd_flags::RETRANSMIT;
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        // Length and command code are 24-bit fields
        buf.put_u8(((self.length >> 16) & 0xFF) as u8);
        buf.put_u16((self.length & 0xFFFF) as u16);
        buf.put_u8(self.flags);
        buf.put_u8(((self.command_code >> 16) & 0xFF) as u8);
        buf.put_u16((self.command_code & 0xFFFF) as u16);
        buf.put_u32(self.application_id);
        buf.put_u32(self.hop_by_hop_id);
        buf.put_u32(self.end_to_end_id);
    }

    pub fn decode(buf: &mut Bytes) -> DiameterResult<Self> {
        if buf.remaining() < DIAMETER_HEADER_SIZE {
            return Err(DiameterError::BufferTooSmall {
                needed: DIAMETER_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        let version = buf.get_u8();
        if version != DIAMETER_VERSION {
            return Err(DiameterError::Protocol(format!(
                "Unsupported Diameter version: {version}"
            )));
        }

        let length = ((buf.get_u8() as u32) << 16) | buf.get_u16() as u32;
        let flags = buf.get_u8();
        let command_code = ((buf.get_u8() as u32) << 16) | buf.get_u16() as u32;

        Ok(Self {
            version,
            length,
            flags,
            command_code,
            application_id: buf.get_u32(),
            hop_by_hop_id: buf.get_u32(),
            end_to_end_id: buf.get_u32(),
        })
    }
}

/// Diameter message (header + AVPs)
#[derive(Debug, Clone)]
pub struct DiameterMessage {
    pub header: DiameterHeader,
    pub avps: Vec<Avp>,
}

impl DiameterMessage {
    /// Create a new request message
    pub fn new_request(command_code: u32, application_id: u32) -> Self {
        Self {
            header: DiameterHeader::new_request(command_code, application_id),
            avps: Vec::new(),
        }
    }

    /// Create an empty answer to `request`
    pub fn new_answer(request: &DiameterMessage) -> Self {
        Self {
            header: DiameterHeader::new_answer(&request.header),
            avps: Vec::new(),
        }
    }

    /// Answer to `request` carrying its Session-Id, our identity and a Result-Code
    pub fn new_answer_with_result(
        request: &DiameterMessage,
        origin_host: &str,
        origin_realm: &str,
        result_code: u32,
    ) -> Self {
        let mut answer = Self::new_answer(request);
        if let Some(session_id) = request.session_id() {
            answer.add_avp(Avp::mandatory(
                avp_code::SESSION_ID,
                AvpData::Utf8String(session_id.to_string()),
            ));
        }
        answer.add_avp(Avp::mandatory(
            avp_code::RESULT_CODE,
            AvpData::Unsigned32(result_code),
        ));
        answer.add_origin(origin_host, origin_realm);
        answer
    }

    pub fn add_avp(&mut self, avp: Avp) {
        self.avps.push(avp);
    }

    /// Append Origin-Host and Origin-Realm
    pub fn add_origin(&mut self, origin_host: &str, origin_realm: &str) {
        self.add_avp(Avp::mandatory(
            avp_code::ORIGIN_HOST,
            AvpData::DiameterIdentity(origin_host.to_string()),
        ));
        self.add_avp(Avp::mandatory(
            avp_code::ORIGIN_REALM,
            AvpData::DiameterIdentity(origin_realm.to_string()),
        ));
    }

    pub fn find_avp(&self, code: u32) -> Option<&Avp> {
        find_avp(&self.avps, code)
    }

    /// Total message length
    pub fn calculate_length(&self) -> u32 {
        let avp_len: usize = self.avps.iter().map(Avp::encoded_len).sum();
        (DIAMETER_HEADER_SIZE + avp_len) as u32
    }

    pub fn encode(&self) -> BytesMut {
        let length = self.calculate_length();
        let mut buf = BytesMut::with_capacity(length as usize);

        let mut header = self.header.clone();
        header.length = length;
        header.encode(&mut buf);
        for avp in &self.avps {
            avp.encode(&mut buf);
        }

        buf
    }

    pub fn decode(buf: &mut Bytes) -> DiameterResult<Self> {
        let header = DiameterHeader::decode(buf)?;

        let avp_len = (header.length as usize)
            .checked_sub(DIAMETER_HEADER_SIZE)
            .ok_or_else(|| {
                DiameterError::InvalidMessage(format!(
                    "message length {} is less than header size",
                    header.length
                ))
            })?;
        if buf.remaining() < avp_len {
            return Err(DiameterError::BufferTooSmall {
                needed: avp_len,
                available: buf.remaining(),
            });
        }

        let avps = decode_avps(buf.copy_to_bytes(avp_len))?;
        Ok(Self { header, avps })
    }

    pub fn session_id(&self) -> Option<&str> {
        self.find_avp(avp_code::SESSION_ID)?.as_utf8_string()
    }

    pub fn origin_host(&self) -> Option<&str> {
        self.find_avp(avp_code::ORIGIN_HOST)?.as_utf8_string()
    }

    pub fn origin_realm(&self) -> Option<&str> {
        self.find_avp(avp_code::ORIGIN_REALM)?.as_utf8_string()
    }

    pub fn result_code(&self) -> Option<u32> {
        self.find_avp(avp_code::RESULT_CODE)?.as_u32()
    }

    /// Experimental-Result, if present and well formed
    pub fn experimental_result(&self) -> Option<ExperimentalResult> {
        ExperimentalResult::from_avp(self.find_avp(avp_code::EXPERIMENTAL_RESULT)?).ok()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.find_avp(avp_code::USER_NAME)?.as_utf8_string()
    }
}
