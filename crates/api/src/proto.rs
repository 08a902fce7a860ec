//! Generated protobuf types of the meshsync wire protocol.
//!
//! Prefer the validated types in [crate::wire], these are only the raw
//! message layouts.

#![allow(missing_docs)]

include!("../proto/gen/meshsync.wire.rs");

#[cfg(test)]
mod test {
    use super::*;
    use prost::Message;

    #[test]
    fn envelope_encode_decode() {
        let m = FetchMessage {
            fetch_message_type: fetch_message::FetchMessageType::LayerData
                as i32,
            data: bytes::Bytes::from_static(b"a"),
        };
        let dec = FetchMessage::decode(m.encode_to_vec().as_slice()).unwrap();
        assert_eq!(m, dec);
        assert_eq!(
            fetch_message::FetchMessageType::LayerData,
            dec.fetch_message_type()
        );
    }
}
