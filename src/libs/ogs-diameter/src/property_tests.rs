//! Property-based tests for the Diameter codec and SWx dictionary

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use proptest::prelude::*;

    use crate::avp::{Avp, AvpData};
    use crate::common::avp_code;
    use crate::message::DiameterMessage;
    use crate::swx::{self, auth_scheme, SipAuthDataItem, SwxEndpoint, SwxResult};

    fn arb_vector() -> impl Strategy<Value = SipAuthDataItem> {
        (
            prop::collection::vec(any::<u8>(), 32),
            prop::collection::vec(any::<u8>(), 4..=16),
            prop::collection::vec(any::<u8>(), 16),
            prop::collection::vec(any::<u8>(), 16),
        )
            .prop_map(|(autn, xres, ck, ik)| SipAuthDataItem {
                item_number: None,
                authentication_scheme: auth_scheme::EAP_AKA.to_string(),
                sip_authenticate: Bytes::from(autn),
                sip_authorization: Bytes::from(xres),
                confidentiality_key: Bytes::from(ck),
                integrity_key: Bytes::from(ik),
            })
    }

    fn endpoint() -> SwxEndpoint {
        SwxEndpoint {
            origin_host: "aaa.example.org".into(),
            origin_realm: "example.org".into(),
            destination_host: None,
            destination_realm: "example.org".into(),
        }
    }

    proptest! {
        /// Decoding garbage fails cleanly
        #[test]
        fn prop_decode_arbitrary_bytes_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
            let _ = DiameterMessage::decode(&mut Bytes::from(data));
        }

        /// Encoded length always matches the length field
        #[test]
        fn prop_encoded_length_matches_header(name in "[0-9]{1,15}", session in "[a-z.;0-9]{1,64}") {
            let mut msg = DiameterMessage::new_request(303, swx::SWX_APPLICATION_ID);
            msg.add_avp(Avp::mandatory(avp_code::SESSION_ID, AvpData::Utf8String(session)));
            msg.add_avp(Avp::mandatory(avp_code::USER_NAME, AvpData::Utf8String(name.clone())));

            let encoded = msg.encode();
            prop_assert_eq!(encoded.len() as u32, msg.calculate_length());
            prop_assert_eq!(encoded.len() % 4, 0);

            let decoded = DiameterMessage::decode(&mut encoded.freeze()).unwrap();
            prop_assert_eq!(decoded.user_name(), Some(name.as_str()));
        }

        /// Every vector an HSS puts in an MAA comes back out in order
        #[test]
        fn prop_maa_preserves_vectors(items in prop::collection::vec(arb_vector(), 0..8)) {
            let mar = swx::create_mar("s", &endpoint(), "001010000000001", items.len() as u32, auth_scheme::EAP_AKA, None);
            let maa = swx::create_maa(&mar, "hss", "example.org", SwxResult::Success(2001), None, &items);

            let parsed = swx::MultimediaAuthAnswer::parse(
                &DiameterMessage::decode(&mut maa.encode().freeze()).unwrap(),
            ).unwrap();
            prop_assert_eq!(parsed.auth_data_items, items);
        }

        /// TBCD digits survive encoding
        #[test]
        fn prop_tbcd_digits(digits in "[0-9]{1,15}") {
            prop_assert_eq!(swx::decode_tbcd(&swx::encode_tbcd(&digits)), digits);
        }
    }
}
